//! In-process document with snapshot rollback.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::document::{ChangeBatch, Document, EntityRef, ParamValue};
use crate::error::{DocumentError, DocumentResult};
use crate::ids::EntityId;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntity {
    pub kind: String,
    pub params: BTreeMap<String, ParamValue>,
}

#[derive(Debug, Clone)]
struct OpenTransaction {
    name: String,
    snapshot: BTreeMap<EntityId, StoredEntity>,
    snapshot_next_id: u64,
    modified: BTreeSet<EntityId>,
    deleted: BTreeSet<EntityId>,
}

#[derive(Debug, Default)]
struct Inner {
    entities: BTreeMap<EntityId, StoredEntity>,
    next_id: u64,
    open: Option<OpenTransaction>,
    committed: Vec<String>,
    rollbacks: usize,
    pending: Vec<ChangeBatch>,
    commit_warnings: Vec<String>,
    reject_next_commit: Option<String>,
}

impl Inner {
    fn touch(&mut self, id: EntityId) {
        if let Some(open) = self.open.as_mut() {
            open.modified.insert(id);
        }
    }

    fn require_transaction(&self, operation: &'static str) -> DocumentResult<()> {
        if self.open.is_none() {
            return Err(DocumentError::NoTransaction { operation });
        }
        Ok(())
    }
}

/// A [`Document`] kept entirely in memory.
///
/// Every committed transaction queues a [`ChangeBatch`] that callers drain
/// with [`MemoryDocument::take_changes`] and forward to the watcher. Edits
/// made through the `external_*` methods simulate a user touching the
/// document directly and queue their own batch.
#[derive(Debug, Default)]
pub struct MemoryDocument {
    inner: Mutex<Inner>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert an entity outside of any transaction, as if the user created it.
    pub fn insert_entity(&self, kind: &str, params: Vec<(String, ParamValue)>) -> EntityRef {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = EntityId(inner.next_id);
        inner.entities.insert(
            id,
            StoredEntity {
                kind: kind.to_string(),
                params: params.into_iter().collect(),
            },
        );
        EntityRef::new(id, kind)
    }

    /// Change a parameter outside of any transaction and queue the notification.
    pub fn external_set_parameter(
        &self,
        id: EntityId,
        name: &str,
        value: ParamValue,
    ) -> DocumentResult<()> {
        let mut inner = self.lock();
        let entity = inner
            .entities
            .get_mut(&id)
            .ok_or(DocumentError::EntityNotFound { id })?;
        entity.params.insert(name.to_string(), value);
        inner.pending.push(ChangeBatch {
            modified: vec![id],
            deleted: Vec::new(),
        });
        Ok(())
    }

    /// Delete an entity outside of any transaction and queue the notification.
    pub fn external_delete(&self, id: EntityId) -> DocumentResult<()> {
        let mut inner = self.lock();
        inner
            .entities
            .remove(&id)
            .ok_or(DocumentError::EntityNotFound { id })?;
        inner.pending.push(ChangeBatch {
            modified: Vec::new(),
            deleted: vec![id],
        });
        Ok(())
    }

    /// Drain the change batches queued since the last call.
    pub fn take_changes(&self) -> Vec<ChangeBatch> {
        std::mem::take(&mut self.lock().pending)
    }

    pub fn entity(&self, id: EntityId) -> Option<StoredEntity> {
        self.lock().entities.get(&id).cloned()
    }

    pub fn entity_count(&self) -> usize {
        self.lock().entities.len()
    }

    /// Names of committed transactions, oldest first.
    pub fn committed_transactions(&self) -> Vec<String> {
        self.lock().committed.clone()
    }

    pub fn rollback_count(&self) -> usize {
        self.lock().rollbacks
    }

    /// Warnings returned by the next commit.
    pub fn set_commit_warnings(&self, warnings: Vec<String>) {
        self.lock().commit_warnings = warnings;
    }

    /// Make the next commit fail with the given message.
    pub fn reject_next_commit(&self, message: impl Into<String>) {
        self.lock().reject_next_commit = Some(message.into());
    }
}

impl Document for MemoryDocument {
    fn resolve(&self, id: EntityId) -> Option<EntityRef> {
        self.lock()
            .entities
            .get(&id)
            .map(|entity| EntityRef::new(id, entity.kind.clone()))
    }

    fn start_transaction(&self, name: &str) -> DocumentResult<()> {
        let mut inner = self.lock();
        if let Some(open) = &inner.open {
            return Err(DocumentError::TransactionOpen {
                name: open.name.clone(),
            });
        }
        inner.open = Some(OpenTransaction {
            name: name.to_string(),
            snapshot: inner.entities.clone(),
            snapshot_next_id: inner.next_id,
            modified: BTreeSet::new(),
            deleted: BTreeSet::new(),
        });
        Ok(())
    }

    fn commit_transaction(&self) -> DocumentResult<Vec<String>> {
        let mut inner = self.lock();
        let open = inner
            .open
            .take()
            .ok_or(DocumentError::NoTransaction { operation: "commit" })?;

        if let Some(message) = inner.reject_next_commit.take() {
            // The document refuses; restore the pre-transaction state.
            inner.entities = open.snapshot;
            inner.next_id = open.snapshot_next_id;
            inner.rollbacks += 1;
            return Err(DocumentError::Rejected { message });
        }

        let deleted: Vec<EntityId> = open.deleted.iter().copied().collect();
        let modified: Vec<EntityId> = open
            .modified
            .iter()
            .copied()
            .filter(|id| !open.deleted.contains(id))
            .collect();
        let batch = ChangeBatch { modified, deleted };
        if !batch.is_empty() {
            inner.pending.push(batch);
        }
        inner.committed.push(open.name);
        Ok(std::mem::take(&mut inner.commit_warnings))
    }

    fn rollback_transaction(&self) {
        let mut inner = self.lock();
        if let Some(open) = inner.open.take() {
            inner.entities = open.snapshot;
            inner.next_id = open.snapshot_next_id;
            inner.rollbacks += 1;
        }
    }

    fn transaction_active(&self) -> bool {
        self.lock().open.is_some()
    }

    fn create_entity(
        &self,
        kind: &str,
        params: Vec<(String, ParamValue)>,
    ) -> DocumentResult<EntityRef> {
        let mut inner = self.lock();
        inner.require_transaction("create_entity")?;
        inner.next_id += 1;
        let id = EntityId(inner.next_id);
        inner.entities.insert(
            id,
            StoredEntity {
                kind: kind.to_string(),
                params: params.into_iter().collect(),
            },
        );
        inner.touch(id);
        Ok(EntityRef::new(id, kind))
    }

    fn set_parameter(&self, id: EntityId, name: &str, value: ParamValue) -> DocumentResult<()> {
        let mut inner = self.lock();
        inner.require_transaction("set_parameter")?;
        let entity = inner
            .entities
            .get_mut(&id)
            .ok_or(DocumentError::EntityNotFound { id })?;
        entity.params.insert(name.to_string(), value);
        inner.touch(id);
        Ok(())
    }

    fn get_parameter(&self, id: EntityId, name: &str) -> DocumentResult<ParamValue> {
        let inner = self.lock();
        let entity = inner
            .entities
            .get(&id)
            .ok_or(DocumentError::EntityNotFound { id })?;
        entity
            .params
            .get(name)
            .cloned()
            .ok_or_else(|| DocumentError::ParameterNotFound {
                id,
                name: name.to_string(),
            })
    }

    fn delete_entity(&self, id: EntityId) -> DocumentResult<()> {
        let mut inner = self.lock();
        inner.require_transaction("delete_entity")?;
        inner
            .entities
            .remove(&id)
            .ok_or(DocumentError::EntityNotFound { id })?;
        if let Some(open) = inner.open.as_mut() {
            open.deleted.insert(id);
        }
        Ok(())
    }
}
