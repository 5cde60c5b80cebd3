use thiserror::Error;

use crate::ids::EntityId;

pub type DocumentResult<T> = Result<T, DocumentError>;

/// Failures reported by the external document.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    #[error("Entity {id} does not exist")]
    EntityNotFound { id: EntityId },

    #[error("Entity {id} has no parameter '{name}'")]
    ParameterNotFound { id: EntityId, name: String },

    #[error("Mutation '{operation}' attempted outside a transaction")]
    NoTransaction { operation: &'static str },

    #[error("A transaction is already open: {name}")]
    TransactionOpen { name: String },

    #[error("Document rejected the change: {message}")]
    Rejected { message: String },
}
