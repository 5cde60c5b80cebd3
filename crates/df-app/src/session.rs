//! The editing session.
//!
//! A [`Session`] owns everything a run touches: the graph, the top-level
//! environment, the watcher, and the transaction coordinator. It is the one
//! value the scheduler locks, so edits and runs never interleave.

use std::collections::BTreeSet;
use std::sync::Arc;

use df_core::{ChangeBatch, Document, EntityId, NodeId};
use df_eval::Environment;
use df_graph::{compile_function, BuildContext, Graph, GraphEdit, GraphError, Node, NodeKind};

use crate::config::RuntimeConfig;
use crate::error::{AppError, AppResult};
use crate::log::LogSink;
use crate::transaction::TransactionCoordinator;
use crate::watcher::{Callback, WatchError, Watcher};

/// An edit coming from the graph editor.
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    Graph(GraphEdit),
    /// Point a selection node at document entities. A single-selection node
    /// keeps the first.
    SetSelection {
        node: NodeId,
        entities: Vec<EntityId>,
    },
    /// Publish a function workspace: refresh callers' ports and rebind the
    /// function's name.
    SaveFunction {
        name: String,
    },
}

impl From<GraphEdit> for Edit {
    fn from(edit: GraphEdit) -> Self {
        Edit::Graph(edit)
    }
}

/// What an applied edit changed.
#[derive(Debug, Default)]
pub struct EditOutcome {
    pub node: Option<NodeId>,
    pub dirtied: Vec<NodeId>,
    /// Watches that could not be registered. Not fatal.
    pub watch_errors: Vec<WatchError>,
}

pub struct Session {
    pub graph: Graph,
    pub env: Environment,
    pub watcher: Watcher<Graph>,
    pub transactions: TransactionCoordinator,
    pub document: Arc<dyn Document>,
    pub log: Arc<dyn LogSink>,
    pub config: RuntimeConfig,
}

impl Session {
    pub fn new(document: Arc<dyn Document>, log: Arc<dyn LogSink>, config: RuntimeConfig) -> Self {
        let transactions =
            TransactionCoordinator::new(Arc::clone(&document), config.transaction_name.clone());
        Self {
            graph: Graph::new(),
            env: Environment::new(),
            watcher: Watcher::new(),
            transactions,
            document,
            log,
            config,
        }
    }

    pub fn build_context(&self) -> BuildContext {
        BuildContext::new(Arc::clone(&self.document))
    }

    pub fn apply_edit(&mut self, edit: impl Into<Edit>) -> AppResult<EditOutcome> {
        match edit.into() {
            Edit::Graph(edit) => self.apply_graph_edit(edit),
            Edit::SetSelection { node, entities } => self.set_selection(node, entities),
            Edit::SaveFunction { name } => {
                let dirtied = self.save_function(&name)?;
                Ok(EditOutcome {
                    dirtied,
                    ..EditOutcome::default()
                })
            }
        }
    }

    fn apply_graph_edit(&mut self, edit: GraphEdit) -> AppResult<EditOutcome> {
        let renamed = match &edit {
            GraphEdit::RenameFunction { from, to } => Some((from.clone(), to.clone())),
            _ => None,
        };
        let deleted = match &edit {
            GraphEdit::DeleteFunction { name } => Some(name.clone()),
            _ => None,
        };

        let effect = self.graph.apply(edit)?;

        for node in &effect.removed {
            self.unwatch_node(node);
        }
        if let Some((from, to)) = renamed {
            if self.env.remove(&from).is_some() {
                // Recompile so recursive calls pick up the new name too.
                if let Err(err) = self.define_function(&to) {
                    tracing::warn!(function = %to, error = %err, "renamed function left undefined");
                    self.log.log_line(&format!("Warning: {}", err));
                }
            }
        }
        if let Some(name) = deleted {
            self.env.remove(&name);
        }

        let watch_errors = match effect.rewatch {
            Some(node) => self.refresh_watches(node),
            None => Vec::new(),
        };

        Ok(EditOutcome {
            node: effect.node,
            dirtied: effect.dirtied,
            watch_errors,
        })
    }

    fn set_selection(&mut self, node: NodeId, entities: Vec<EntityId>) -> AppResult<EditOutcome> {
        let current = self
            .graph
            .node(node)
            .ok_or(GraphError::UnknownNode { node })?;

        let missing: Vec<WatchError> = entities
            .iter()
            .filter(|id| self.document.resolve(**id).is_none())
            .map(|id| WatchError::EntityMissing { entity: *id })
            .collect();
        let resolved = missing.is_empty();

        let kind = match &current.kind {
            NodeKind::Selection { .. } => NodeKind::Selection {
                entity: entities.first().copied().filter(|_| resolved),
            },
            NodeKind::MultiSelection { .. } => NodeKind::MultiSelection {
                entities: if resolved { entities } else { Vec::new() },
            },
            _ => return Err(AppError::NotSelectable { node }),
        };

        for err in &missing {
            tracing::warn!(%node, error = %err, "selection left empty");
            self.log.log_line(&format!("Warning: {}", err));
        }

        let effect = self.graph.apply(GraphEdit::SetNodeKind { node, kind })?;
        let mut watch_errors = missing;
        watch_errors.extend(self.refresh_watches(node));

        Ok(EditOutcome {
            node: Some(node),
            dirtied: effect.dirtied,
            watch_errors,
        })
    }

    /// Compile the function workspace `name`, bind it, and bring its callers
    /// in line with its parameters. Returns the callers dirtied.
    pub fn save_function(&mut self, name: &str) -> AppResult<Vec<NodeId>> {
        self.define_function(name)?;
        let dirtied = self.graph.sync_callers(name)?;
        tracing::info!(function = name, callers = dirtied.len(), "function saved");
        Ok(dirtied)
    }

    fn define_function(&mut self, name: &str) -> AppResult<()> {
        let function = self
            .graph
            .function(name)
            .ok_or_else(|| GraphError::UnknownFunction {
                name: name.to_string(),
            })?;
        match compile_function(&self.graph, function, &self.build_context())? {
            Some(lambda) => {
                let value = self.env.evaluate(&lambda)?;
                self.env.define(name, value)?;
            }
            None => {
                self.env.remove(name);
            }
        }
        Ok(())
    }

    /// Deliver one external change batch. Returns true when any watched
    /// entity was involved.
    pub fn notify_changed(&mut self, batch: &ChangeBatch) -> bool {
        let relevant = batch
            .modified
            .iter()
            .chain(&batch.deleted)
            .any(|id| self.watcher.is_watched(*id));
        if relevant {
            tracing::debug!(
                modified = batch.modified.len(),
                deleted = batch.deleted.len(),
                "dispatching document changes"
            );
            self.watcher
                .notify(&mut self.graph, &batch.modified, &batch.deleted);
        }
        relevant
    }

    /// Re-register a node's watches to match the entities its saved state
    /// refers to.
    pub fn refresh_watches(&mut self, node_id: NodeId) -> Vec<WatchError> {
        let Some(node) = self.graph.node(node_id) else {
            return Vec::new();
        };
        let wanted: BTreeSet<EntityId> = node.kind.referenced_entities().into_iter().collect();
        let stale: Vec<EntityId> = node.watched.difference(&wanted).copied().collect();
        for id in stale {
            self.watcher.unwatch(id);
        }

        let on_modified: Callback<Graph> = Arc::new(move |graph: &mut Graph, _ids: &[EntityId]| {
            graph.mark_dirty_with_callers(node_id);
        });
        let on_deleted: Callback<Graph> = Arc::new(move |graph: &mut Graph, ids: &[EntityId]| {
            if let Some(node) = graph.node_mut(node_id) {
                for id in ids {
                    node.watched.remove(id);
                }
            }
            graph.mark_dirty_with_callers(node_id);
        });

        let mut registered = BTreeSet::new();
        let mut errors = Vec::new();
        for id in wanted {
            if self.document.resolve(id).is_some() {
                self.watcher
                    .watch(id, Arc::clone(&on_modified), Arc::clone(&on_deleted));
                registered.insert(id);
            } else {
                let err = WatchError::EntityMissing { entity: id };
                tracing::warn!(node = %node_id, error = %err, "watch not registered");
                errors.push(err);
            }
        }

        if let Some(node) = self.graph.node_mut(node_id) {
            node.watched = registered;
        }
        errors
    }

    fn unwatch_node(&mut self, node: &Node) {
        for id in &node.watched {
            self.watcher.unwatch(*id);
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("nodes", &self.graph.all_nodes().count())
            .field("functions", &self.graph.functions().count())
            .field("watcher", &self.watcher)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
