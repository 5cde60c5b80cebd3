//! Evaluation errors.

use df_core::DocumentError;
use thiserror::Error;

pub type EvalResult<T> = Result<T, EvalError>;

/// Failures raised while evaluating an expression. These are ordinary
/// values: the scheduler logs them and rolls the pass back.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Unbound symbol: {name}")]
    UnboundSymbol { name: String },

    #[error("Symbol '{name}' is a primitive and cannot be redefined")]
    ReservedSymbol { name: String },

    #[error("Type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("'{callee}' expects {expected} arguments, got {found}")]
    Arity {
        callee: String,
        expected: String,
        found: usize,
    },

    #[error("Cannot call a value of type {found}")]
    NotCallable { found: &'static str },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Call depth exceeded {limit}")]
    RecursionLimit { limit: usize },

    #[error("External call failed: {message}")]
    External { message: String },

    #[error("{message}")]
    Runtime { message: String },
}

impl From<DocumentError> for EvalError {
    fn from(err: DocumentError) -> Self {
        EvalError::External {
            message: err.to_string(),
        }
    }
}
