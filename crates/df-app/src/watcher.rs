//! External-mutation watcher.
//!
//! Nodes register interest in document entities. When the document reports
//! a batch of modified and deleted identifiers, the watcher groups them by
//! registered callback and calls each distinct callback once with every
//! identifier that triggered it.

use std::collections::BTreeMap;
use std::sync::Arc;

use df_core::EntityId;

/// Callback invoked with the target and the identifiers that triggered it.
pub type Callback<T> = Arc<dyn Fn(&mut T, &[EntityId]) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WatchError {
    #[error("Entity {entity} does not exist in the document")]
    EntityMissing { entity: EntityId },
}

struct Registration<T> {
    on_modified: Callback<T>,
    on_deleted: Callback<T>,
}

pub struct Watcher<T> {
    entries: BTreeMap<EntityId, Registration<T>>,
}

impl<T> Default for Watcher<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T> std::fmt::Debug for Watcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("watched", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Callbacks are the same when they share an allocation.
fn same_callback<T>(a: &Callback<T>, b: &Callback<T>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

fn group<T>(
    ids: &[EntityId],
    pick: impl Fn(&Registration<T>) -> &Callback<T>,
    entries: &BTreeMap<EntityId, Registration<T>>,
) -> Vec<(Callback<T>, Vec<EntityId>)> {
    let mut groups: Vec<(Callback<T>, Vec<EntityId>)> = Vec::new();
    for id in ids {
        let Some(registration) = entries.get(id) else {
            continue;
        };
        let callback = pick(registration);
        match groups.iter_mut().find(|(cb, _)| same_callback(cb, callback)) {
            Some((_, group_ids)) => group_ids.push(*id),
            None => groups.push((Arc::clone(callback), vec![*id])),
        }
    }
    groups
}

impl<T> Watcher<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register callbacks for `entity`, replacing any earlier registration.
    pub fn watch(&mut self, entity: EntityId, on_modified: Callback<T>, on_deleted: Callback<T>) {
        self.entries.insert(
            entity,
            Registration {
                on_modified,
                on_deleted,
            },
        );
    }

    pub fn unwatch(&mut self, entity: EntityId) -> bool {
        self.entries.remove(&entity).is_some()
    }

    pub fn is_watched(&self, entity: EntityId) -> bool {
        self.entries.contains_key(&entity)
    }

    pub fn watched(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dispatch one change batch: modified callbacks first, then deleted
    /// callbacks. Deleted identifiers are unregistered afterwards.
    pub fn notify(&mut self, target: &mut T, modified: &[EntityId], deleted: &[EntityId]) {
        let modified_groups = group(modified, |r| &r.on_modified, &self.entries);
        let deleted_groups = group(deleted, |r| &r.on_deleted, &self.entries);

        for (callback, ids) in modified_groups.iter().chain(deleted_groups.iter()) {
            callback(&mut *target, ids.as_slice());
        }

        for id in deleted {
            self.entries.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Calls = Vec<(&'static str, Vec<EntityId>)>;

    fn recorder(tag: &'static str) -> Callback<Calls> {
        Arc::new(move |calls: &mut Calls, ids: &[EntityId]| calls.push((tag, ids.to_vec())))
    }

    #[test]
    fn shared_callback_fires_once_per_batch() {
        let mut watcher = Watcher::new();
        let modified = recorder("modified");
        let deleted = recorder("deleted");
        watcher.watch(EntityId(1), modified.clone(), deleted.clone());
        watcher.watch(EntityId(2), modified, deleted);

        let mut calls = Calls::new();
        watcher.notify(&mut calls, &[EntityId(1), EntityId(2)], &[]);

        assert_eq!(calls, vec![("modified", vec![EntityId(1), EntityId(2)])]);
    }

    #[test]
    fn distinct_callbacks_fire_separately() {
        let mut watcher = Watcher::new();
        watcher.watch(EntityId(1), recorder("a"), recorder("a-del"));
        watcher.watch(EntityId(2), recorder("b"), recorder("b-del"));

        let mut calls = Calls::new();
        watcher.notify(&mut calls, &[EntityId(2), EntityId(1), EntityId(9)], &[]);

        assert_eq!(
            calls,
            vec![("b", vec![EntityId(2)]), ("a", vec![EntityId(1)])]
        );
    }

    #[test]
    fn modified_before_deleted_then_unregistered() {
        let mut watcher = Watcher::new();
        watcher.watch(EntityId(1), recorder("m1"), recorder("d1"));
        watcher.watch(EntityId(2), recorder("m2"), recorder("d2"));

        let mut calls = Calls::new();
        watcher.notify(&mut calls, &[EntityId(2)], &[EntityId(1)]);

        assert_eq!(
            calls,
            vec![("m2", vec![EntityId(2)]), ("d1", vec![EntityId(1)])]
        );
        assert!(!watcher.is_watched(EntityId(1)));
        assert!(watcher.is_watched(EntityId(2)));
    }

    #[test]
    fn last_registration_wins() {
        let mut watcher = Watcher::new();
        watcher.watch(EntityId(1), recorder("old"), recorder("old"));
        watcher.watch(EntityId(1), recorder("new"), recorder("new"));

        let mut calls = Calls::new();
        watcher.notify(&mut calls, &[EntityId(1)], &[]);
        assert_eq!(calls, vec![("new", vec![EntityId(1)])]);

        assert!(watcher.unwatch(EntityId(1)));
        assert!(!watcher.unwatch(EntityId(1)));
        assert!(watcher.is_empty());
    }
}
