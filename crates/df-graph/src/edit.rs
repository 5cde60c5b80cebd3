//! Graph edits.
//!
//! Every structural change goes through [`Graph::apply`], which validates the
//! edit, performs it, runs dirty propagation, and reports what changed so the
//! caller can keep watches and bindings in sync. A rejected edit leaves the
//! graph untouched.

use df_core::{ConnectorId, NodeId};

use crate::error::{GraphError, GraphResult};
use crate::function::{is_valid_function_name, FunctionWorkspace};
use crate::graph::{Graph, Node, Position, WorkspaceId};
use crate::kind::NodeKind;

#[derive(Debug, Clone, PartialEq)]
pub enum GraphEdit {
    AddNode {
        workspace: WorkspaceId,
        /// Explicit identifier, used when restoring a saved graph.
        id: Option<NodeId>,
        kind: NodeKind,
        name: Option<String>,
        position: Position,
    },
    RemoveNode {
        node: NodeId,
    },
    AddConnector {
        start: NodeId,
        end: NodeId,
        end_index: usize,
    },
    RemoveConnector {
        end: NodeId,
        end_index: usize,
    },
    /// Replace a node's saved state. The kind itself cannot change.
    SetNodeKind {
        node: NodeId,
        kind: NodeKind,
    },
    MoveNode {
        node: NodeId,
        position: Position,
    },
    RenameNode {
        node: NodeId,
        name: String,
    },
    NewFunction {
        name: String,
        category: String,
    },
    RenameFunction {
        from: String,
        to: String,
    },
    DeleteFunction {
        name: String,
    },
}

/// What an applied edit changed.
#[derive(Debug, Default)]
pub struct EditEffect {
    pub node: Option<NodeId>,
    pub connector: Option<ConnectorId>,
    /// Nodes turned Dirty by the edit.
    pub dirtied: Vec<NodeId>,
    /// Nodes that left the graph; their watches must go.
    pub removed: Vec<Node>,
    /// Node whose referenced entities may have changed.
    pub rewatch: Option<NodeId>,
}

impl Graph {
    pub fn apply(&mut self, edit: GraphEdit) -> GraphResult<EditEffect> {
        let mut effect = EditEffect::default();
        match edit {
            GraphEdit::AddNode {
                workspace,
                id,
                kind,
                name,
                position,
            } => {
                let id = id.unwrap_or_default();
                if self.contains_node(id) {
                    return Err(GraphError::DuplicateNode { node: id });
                }
                let inputs = self.input_names_for(&kind);
                let mut node = Node::with_inputs(id, kind, inputs).at(position);
                if let Some(name) = name {
                    node.name = name;
                }
                let ws = self.workspace_mut(&workspace).ok_or_else(|| match workspace.clone() {
                    WorkspaceId::Function(name) => GraphError::UnknownFunction { name },
                    WorkspaceId::Home => GraphError::UnknownNode { node: id },
                })?;
                ws.add_node(node)?;
                effect.node = Some(id);
                effect.dirtied = vec![id];
                effect.rewatch = Some(id);
            }

            GraphEdit::RemoveNode { node } => {
                let ws = self.workspace_of_mut(node)?;
                let consumers = ws.consumers(node);
                let removed = ws.remove_node(node)?;
                for consumer in consumers {
                    effect.dirtied.extend(ws.mark_dirty(consumer));
                }
                effect.removed.push(removed);
            }

            GraphEdit::AddConnector {
                start,
                end,
                end_index,
            } => {
                let start_ws = self.locate(start).ok_or(GraphError::UnknownNode { node: start })?;
                let end_ws = self.locate(end).ok_or(GraphError::UnknownNode { node: end })?;
                if start_ws != end_ws {
                    return Err(GraphError::CrossWorkspace { start, end });
                }
                let ws = self.workspace_of_mut(end)?;
                effect.connector = Some(ws.connect(start, end, end_index)?);
                effect.dirtied = ws.mark_dirty(end);
            }

            GraphEdit::RemoveConnector { end, end_index } => {
                let ws = self.workspace_of_mut(end)?;
                let connector = ws.disconnect_input(end, end_index)?;
                effect.connector = Some(connector.id);
                effect.dirtied = ws.mark_dirty(connector.start);
                effect.dirtied.extend(ws.mark_dirty(end));
            }

            GraphEdit::SetNodeKind { node, kind } => {
                let inputs = self.input_names_for(&kind);
                let ws = self.workspace_of_mut(node)?;
                let current = ws.require(node)?;
                if current.kind.tag() != kind.tag() {
                    return Err(GraphError::KindChange {
                        node,
                        from: current.kind.name(),
                        to: kind.name(),
                    });
                }
                let resize = matches!(kind, NodeKind::List { .. } | NodeKind::Function { .. });
                if let Some(target) = ws.node_mut(node) {
                    target.kind = kind;
                }
                if resize {
                    ws.set_input_names(node, &inputs)?;
                }
                effect.node = Some(node);
                effect.dirtied = ws.mark_dirty(node);
                effect.rewatch = Some(node);
            }

            GraphEdit::MoveNode { node, position } => {
                let target = self.node_mut(node).ok_or(GraphError::UnknownNode { node })?;
                target.position = position;
                effect.node = Some(node);
            }

            GraphEdit::RenameNode { node, name } => {
                let target = self.node_mut(node).ok_or(GraphError::UnknownNode { node })?;
                target.name = name;
                effect.node = Some(node);
            }

            GraphEdit::NewFunction { name, category } => {
                self.check_new_function_name(&name)?;
                self.functions
                    .insert(name.clone(), FunctionWorkspace::new(name, category));
            }

            GraphEdit::RenameFunction { from, to } => {
                if !self.functions.contains_key(&from) {
                    return Err(GraphError::UnknownFunction { name: from });
                }
                self.check_new_function_name(&to)?;
                let callers = self.callers(&from);
                if let Some(mut function) = self.functions.remove(&from) {
                    function.rename(to.clone());
                    self.functions.insert(to.clone(), function);
                }
                for caller in callers {
                    if let Some(node) = self.node_mut(caller) {
                        node.kind = NodeKind::Function { symbol: to.clone() };
                        if node.name == from {
                            node.name = to.clone();
                        }
                    }
                    effect.dirtied.extend(self.workspace_of_mut(caller)?.mark_dirty(caller));
                }
            }

            GraphEdit::DeleteFunction { name } => {
                let function = self
                    .functions
                    .remove(&name)
                    .ok_or(GraphError::UnknownFunction { name: name.clone() })?;
                effect.removed = function.workspace.nodes().cloned().collect();
                for caller in self.callers(&name) {
                    effect.dirtied.extend(self.workspace_of_mut(caller)?.mark_dirty(caller));
                }
            }
        }
        Ok(effect)
    }

    /// Bring every caller of `name` in line with the function's current
    /// parameter list. Returns the nodes dirtied.
    pub fn sync_callers(&mut self, name: &str) -> GraphResult<Vec<NodeId>> {
        let params = self
            .function(name)
            .ok_or_else(|| GraphError::UnknownFunction {
                name: name.to_string(),
            })?
            .parameters();

        let mut dirtied = Vec::new();
        for caller in self.callers(name) {
            let ws = self.workspace_of_mut(caller)?;
            ws.set_input_names(caller, &params)?;
            dirtied.extend(ws.mark_dirty(caller));
        }
        Ok(dirtied)
    }

    fn input_names_for(&self, kind: &NodeKind) -> Vec<String> {
        match kind {
            NodeKind::Function { symbol } => self
                .function(symbol)
                .map(FunctionWorkspace::parameters)
                .unwrap_or_default(),
            other => other.input_names(),
        }
    }

    fn check_new_function_name(&self, name: &str) -> GraphResult<()> {
        if !is_valid_function_name(name) {
            return Err(GraphError::InvalidFunctionName {
                name: name.to_string(),
            });
        }
        if self.functions.contains_key(name) {
            return Err(GraphError::DuplicateFunction {
                name: name.to_string(),
            });
        }
        Ok(())
    }
}
