//! Runtime service layer for dynaflow.
//!
//! Ties the graph, the evaluator and the host document together: a
//! [`Session`] owns the graph and environment and applies edits, and a
//! [`Scheduler`] runs dirty nodes with one document transaction per pass.
//! Both the CLI and embedding hosts go through this crate.

pub mod config;
pub mod context;
pub mod error;
pub mod log;
pub mod project_service;
pub mod run_state;
pub mod scheduler;
pub mod session;
pub mod transaction;
pub mod watcher;

pub use config::{RuntimeConfig, DEFAULT_TRANSACTION_NAME};
pub use context::{choose_context, ContextChoice, ExecutionToken, MutationContext};
pub use error::{AppError, AppResult};
pub use log::{LogSink, MemoryLog, TracingLog};
pub use project_service::{
    list_functions, load_project, load_session, project_from_session, save_project, save_session,
    session_from_project, validate_project, FunctionSummary,
};
pub use run_state::{RunGate, RunPhase, RunTrigger};
pub use scheduler::{RunOutcome, RunReport, RunTicket, Scheduler};
pub use session::{Edit, EditOutcome, Session};
pub use transaction::{TransactionCoordinator, TransactionMode};
pub use watcher::{Callback, WatchError, Watcher};
