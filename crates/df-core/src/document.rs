//! Interface to the external mutable document.
//!
//! The runtime never owns the entities it manipulates. Everything it knows
//! about them goes through [`Document`]: resolving identifiers, opening and
//! closing transactions, and the handful of mutations node kinds perform.

use core::fmt;

use crate::error::DocumentResult;
use crate::ids::EntityId;

/// Opaque reference to an external entity plus its type tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityRef {
    pub id: EntityId,
    pub kind: String,
}

impl EntityRef {
    pub fn new(id: EntityId, kind: impl Into<String>) -> Self {
        Self {
            id,
            kind: kind.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} {}>", self.kind, self.id)
    }
}

/// Value stored in an entity parameter.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ParamValue {
    Number(f64),
    Text(String),
    Boolean(bool),
    Entity(EntityId),
}

/// Identifiers touched by one external mutation boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    pub modified: Vec<EntityId>,
    pub deleted: Vec<EntityId>,
}

impl ChangeBatch {
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// The external document the runtime mutates.
///
/// Mutations are only legal while a transaction is open; implementations
/// reject them with [`crate::DocumentError::NoTransaction`] otherwise.
pub trait Document: Send + Sync {
    /// Look up an entity; `None` when it does not exist (or was deleted).
    fn resolve(&self, id: EntityId) -> Option<EntityRef>;

    fn start_transaction(&self, name: &str) -> DocumentResult<()>;

    /// Commit the open transaction. Returns the warnings the document raised
    /// while accepting the changes.
    fn commit_transaction(&self) -> DocumentResult<Vec<String>>;

    fn rollback_transaction(&self);

    fn transaction_active(&self) -> bool;

    fn create_entity(
        &self,
        kind: &str,
        params: Vec<(String, ParamValue)>,
    ) -> DocumentResult<EntityRef>;

    fn set_parameter(&self, id: EntityId, name: &str, value: ParamValue) -> DocumentResult<()>;

    fn get_parameter(&self, id: EntityId, name: &str) -> DocumentResult<ParamValue>;

    fn delete_entity(&self, id: EntityId) -> DocumentResult<()>;
}
