//! df-core: stable foundation for dynaflow.
//!
//! Contains:
//! - ids (stable node identifiers, compact arena ids, external entity ids)
//! - document (the interface to the external mutable document)
//! - memory (an in-process document used by the CLI and tests)
//! - error (document error type)

pub mod document;
pub mod error;
pub mod ids;
pub mod memory;

// Re-exports: nice ergonomics for downstream crates
pub use document::{ChangeBatch, Document, EntityRef, ParamValue};
pub use error::{DocumentError, DocumentResult};
pub use ids::*;
pub use memory::{MemoryDocument, StoredEntity};
