//! Error types for the df-app service layer.

use std::path::PathBuf;

use df_core::NodeId;

use crate::watcher::WatchError;

/// Application error type that wraps errors from the backend crates and
/// gives the CLI a single error to report.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Project error: {0}")]
    Project(String),

    #[error("Failed to read project file: {path}")]
    ProjectFileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Graph edit rejected: {0}")]
    Graph(#[from] df_graph::GraphError),

    #[error("Compilation failed: {0}")]
    Compile(#[from] df_graph::CompileError),

    #[error("Evaluation failed: {0}")]
    Eval(#[from] df_eval::EvalError),

    #[error("Document error: {0}")]
    Document(#[from] df_core::DocumentError),

    #[error("Watch failed: {0}")]
    Watch(#[from] WatchError),

    #[error("Node {node} cannot hold a selection")]
    NotSelectable { node: NodeId },

    #[error("Mutation context is no longer running")]
    ContextClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for df-app operations.
pub type AppResult<T> = Result<T, AppError>;

impl From<df_project::ProjectError> for AppError {
    fn from(err: df_project::ProjectError) -> Self {
        AppError::Project(err.to_string())
    }
}
