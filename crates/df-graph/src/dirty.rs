//! Dirty-state bookkeeping.
//!
//! A node is Dirty when its cached result may no longer match what the
//! graph would compute. Edits dirty the edited node and everything
//! downstream of it; only a successful evaluation or an explicit reset makes
//! nodes Clean again.

use std::collections::{BTreeSet, VecDeque};

use df_core::NodeId;
use df_eval::Expr;

use crate::graph::{DirtyState, Graph, Workspace, WorkspaceId};

impl Workspace {
    /// Mark `start` and every node reachable from it along output->input
    /// edges Dirty. Returns the nodes visited, `start` first.
    pub fn mark_dirty(&mut self, start: NodeId) -> Vec<NodeId> {
        let mut visited = Vec::new();
        if !self.contains(start) {
            return visited;
        }

        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([start]);
        seen.insert(start);

        while let Some(id) = queue.pop_front() {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.state = DirtyState::Dirty;
            }
            visited.push(id);
            for next in self.consumers(id) {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        visited
    }

    /// Sinks that are Dirty or have never produced a result, in insertion
    /// order.
    pub fn collect_topmost_dirty(&self) -> Vec<NodeId> {
        self.nodes()
            .filter(|node| node.is_sink() && (node.is_dirty() || node.cached.is_none()))
            .map(|node| node.id)
            .collect()
    }

    /// Record a successful evaluation: every contributing node turns Clean
    /// and the root caches `result`.
    pub fn mark_evaluated(&mut self, contributors: &[NodeId], root: NodeId, result: Expr) {
        for id in contributors {
            if let Some(node) = self.nodes.get_mut(id) {
                node.state = DirtyState::Clean;
            }
        }
        if let Some(node) = self.nodes.get_mut(&root) {
            node.state = DirtyState::Clean;
            node.cached = Some(result);
        }
    }

    /// Mark every node Clean without touching cached results.
    pub fn reset_dirty(&mut self) {
        for node in self.nodes.values_mut() {
            node.state = DirtyState::Clean;
        }
    }

    /// Force a full recompute on the next run.
    pub fn mark_all_dirty(&mut self) {
        for node in self.nodes.values_mut() {
            node.state = DirtyState::Dirty;
        }
    }

    /// Restart per-run bookkeeping of every node.
    pub fn reset_runs(&self) {
        for node in self.nodes.values() {
            node.runs.reset();
        }
    }

    pub fn dirty_nodes(&self) -> Vec<NodeId> {
        self.nodes()
            .filter(|node| node.is_dirty())
            .map(|node| node.id)
            .collect()
    }
}

impl Graph {
    /// Dirty a node in whichever workspace owns it, plus its downstream.
    pub fn mark_node_dirty(&mut self, id: NodeId) -> Vec<NodeId> {
        self.workspace_of_mut(id)
            .map(|ws| ws.mark_dirty(id))
            .unwrap_or_default()
    }

    /// Dirty a node and its downstream. A node inside a function workspace
    /// also dirties every caller of that function, following callers that
    /// sit in other functions up to the home workspace.
    pub fn mark_dirty_with_callers(&mut self, id: NodeId) -> Vec<NodeId> {
        let mut visited = self.mark_node_dirty(id);
        let mut pending: Vec<String> = match self.locate(id) {
            Some(WorkspaceId::Function(name)) => vec![name.clone()],
            _ => Vec::new(),
        };
        let mut seen = BTreeSet::new();
        while let Some(name) = pending.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            for caller in self.callers(&name) {
                if let Some(WorkspaceId::Function(outer)) = self.locate(caller) {
                    pending.push(outer.clone());
                }
                visited.extend(self.mark_node_dirty(caller));
            }
        }
        visited
    }

    pub fn reset_runs(&self) {
        for ws in self.workspaces() {
            ws.reset_runs();
        }
    }
}
