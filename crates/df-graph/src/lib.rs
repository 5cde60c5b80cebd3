//! df-graph: graph model and compiler for dynaflow.
//!
//! Provides:
//! - Workspaces of nodes, ports and connectors, plus named function workspaces
//! - The closed node-kind registry and its build functions
//! - Graph edits with dirty propagation
//! - The compiler turning a node and its upstream graph into an `Expr`
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use df_core::MemoryDocument;
//! use df_graph::{compile, BuildContext, Graph, GraphEdit, NodeKind, Position, WorkspaceId};
//!
//! let mut graph = Graph::new();
//! let mut add = |kind| {
//!     graph
//!         .apply(GraphEdit::AddNode {
//!             workspace: WorkspaceId::Home,
//!             id: None,
//!             kind,
//!             name: None,
//!             position: Position::default(),
//!         })
//!         .unwrap()
//!         .node
//!         .unwrap()
//! };
//! let a = add(NodeKind::Number { value: 3.0 });
//! let b = add(NodeKind::Number { value: 4.0 });
//! let sum = add(NodeKind::Add);
//! graph.apply(GraphEdit::AddConnector { start: a, end: sum, end_index: 0 }).unwrap();
//! graph.apply(GraphEdit::AddConnector { start: b, end: sum, end_index: 1 }).unwrap();
//!
//! let ctx = BuildContext::new(Arc::new(MemoryDocument::new()));
//! let compiled = compile(&graph, &WorkspaceId::Home, sum, &ctx).unwrap();
//! assert_eq!(compiled.expr.to_string(), "(+ 3 4)");
//! ```

pub mod compile;
pub mod dirty;
pub mod edit;
pub mod error;
pub mod function;
pub mod graph;
pub mod kind;
pub mod validate;

// Re-exports for ergonomics
pub use compile::{
    compile, compile_function, compile_with, function_body, requires_transaction, Compiled,
    PassPlan,
};
pub use edit::{EditEffect, GraphEdit};
pub use error::{CompileError, CompileResult, GraphError, GraphResult};
pub use function::{is_valid_function_name, FunctionWorkspace};
pub use graph::{
    Connector, DirtyState, Graph, InputPort, Node, OutputPort, PortKind, Position, RunRecord,
    RunSlots, Workspace, WorkspaceId,
};
pub use kind::{find_kind, BuildContext, KindEntry, KindTag, NodeKind, KIND_TABLE};
pub use validate::find_cycle;
