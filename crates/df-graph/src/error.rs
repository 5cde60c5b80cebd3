//! Graph-specific error types.

use df_core::{ConnectorId, NodeId};
use thiserror::Error;

pub type GraphResult<T> = Result<T, GraphError>;
pub type CompileResult<T> = Result<T, CompileError>;

/// Rejected graph edits. The graph is left unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Node {node} does not exist")]
    UnknownNode { node: NodeId },

    #[error("Node {node} already exists")]
    DuplicateNode { node: NodeId },

    #[error("Node {node} has no input {index} (it has {len})")]
    PortOutOfRange {
        node: NodeId,
        index: usize,
        len: usize,
    },

    #[error("Connector {connector} does not exist")]
    UnknownConnector { connector: ConnectorId },

    #[error("Input {index} of node {node} is not connected")]
    NotConnected { node: NodeId, index: usize },

    #[error("Connecting {start} -> {end} would create a cycle")]
    CycleRejected { start: NodeId, end: NodeId },

    #[error("Nodes {start} and {end} live in different workspaces")]
    CrossWorkspace { start: NodeId, end: NodeId },

    #[error("Function '{name}' does not exist")]
    UnknownFunction { name: String },

    #[error("Function '{name}' already exists")]
    DuplicateFunction { name: String },

    #[error("Invalid function name: '{name}'")]
    InvalidFunctionName { name: String },

    #[error("Cannot change node {node} from {from} to {to}")]
    KindChange {
        node: NodeId,
        from: &'static str,
        to: &'static str,
    },
}

/// Structural problems found while compiling a node. These abort only the
/// node being compiled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Node '{node_name}' ({node}) is missing input '{port}'")]
    MissingInput {
        node: NodeId,
        node_name: String,
        port: String,
    },

    #[error("Cyclic dependency through node {node}")]
    CyclicDependency { node: NodeId },

    #[error("Node {node} calls '{function}' with {inputs} inputs but it declares {expected} parameters")]
    ArityMismatch {
        node: NodeId,
        function: String,
        expected: usize,
        inputs: usize,
    },

    #[error("Node {node} calls unknown function '{function}'")]
    UnknownFunction { node: NodeId, function: String },

    #[error("Node {node} does not exist")]
    UnknownNode { node: NodeId },

    #[error("Node {node} ({kind}) cannot be built: {reason}")]
    InvalidNode {
        node: NodeId,
        kind: &'static str,
        reason: String,
    },
}
