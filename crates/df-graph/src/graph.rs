//! Core graph data structures.
//!
//! Nodes and connectors live in workspace-owned arenas and refer to each
//! other by identifier only: a connector names its endpoint nodes, a port
//! names the connector attached to it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use df_core::{ConnectorId, EntityId, Id, NodeId};
use df_eval::Expr;

use crate::error::{GraphError, GraphResult};
use crate::function::FunctionWorkspace;
use crate::kind::NodeKind;
use crate::validate;

/// Direction of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortKind {
    Input,
    Output,
}

/// Canvas position. Carried for persistence only.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    Clean,
    Dirty,
}

/// Input port: holds at most one incoming connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPort {
    pub name: String,
    pub connector: Option<ConnectorId>,
}

impl InputPort {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connector: None,
        }
    }
}

/// Output port: fans out to any number of connectors.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutputPort {
    pub connectors: Vec<ConnectorId>,
}

/// Per-node bookkeeping that survives across runs: how many times the node's
/// host operation ran in the current pass and which entities it produced on
/// each of those runs, so later passes update instead of duplicating.
#[derive(Debug, Default)]
pub struct RunRecord {
    pub count: usize,
    pub entities: Vec<EntityId>,
}

/// Shared handle on a node's [`RunRecord`]. Host operations built for the
/// node keep a clone.
#[derive(Debug, Clone, Default)]
pub struct RunSlots(Arc<Mutex<RunRecord>>);

impl RunSlots {
    pub fn lock(&self) -> MutexGuard<'_, RunRecord> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start counting from the first slot again.
    pub fn reset(&self) {
        self.lock().count = 0;
    }
}

/// A computation unit.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Display name.
    pub name: String,
    pub position: Position,
    pub inputs: Vec<InputPort>,
    pub output: OutputPort,
    pub state: DirtyState,
    pub cached: Option<Expr>,
    pub watched: BTreeSet<EntityId>,
    pub runs: RunSlots,
}

impl Node {
    /// Create a node whose input ports follow the kind's signature.
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        let inputs = kind.input_names();
        Self::with_inputs(id, kind, inputs)
    }

    /// Create a node with explicit input names (function calls take theirs
    /// from the function's parameter list).
    pub fn with_inputs(id: NodeId, kind: NodeKind, inputs: Vec<String>) -> Self {
        let name = kind.default_name();
        Self {
            id,
            kind,
            name,
            position: Position::default(),
            inputs: inputs.into_iter().map(InputPort::new).collect(),
            output: OutputPort::default(),
            state: DirtyState::Dirty,
            cached: None,
            watched: BTreeSet::new(),
            runs: RunSlots::default(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn is_dirty(&self) -> bool {
        self.state == DirtyState::Dirty
    }

    /// A sink has no outgoing connector.
    pub fn is_sink(&self) -> bool {
        self.output.connectors.is_empty()
    }
}

/// Directed edge from a node's output to another node's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connector {
    pub id: ConnectorId,
    pub start: NodeId,
    pub end: NodeId,
    pub end_index: usize,
}

/// Distinguishes the top-level workspace from function workspaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkspaceId {
    Home,
    Function(String),
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkspaceId::Home => f.write_str("home"),
            WorkspaceId::Function(name) => write!(f, "function '{}'", name),
        }
    }
}

/// An ordered set of nodes plus the connectors between them.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub(crate) id: WorkspaceId,
    pub(crate) order: Vec<NodeId>,
    pub(crate) nodes: HashMap<NodeId, Node>,
    pub(crate) connectors: BTreeMap<ConnectorId, Connector>,
    next_connector: u32,
}

impl Workspace {
    pub fn new(id: WorkspaceId) -> Self {
        Self {
            id,
            order: Vec::new(),
            nodes: HashMap::new(),
            connectors: BTreeMap::new(),
            next_connector: 0,
        }
    }

    pub fn id(&self) -> &WorkspaceId {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn node_ids(&self) -> &[NodeId] {
        &self.order
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn connectors(&self) -> impl Iterator<Item = &Connector> {
        self.connectors.values()
    }

    pub fn connector(&self, id: ConnectorId) -> Option<&Connector> {
        self.connectors.get(&id)
    }

    pub(crate) fn require(&self, id: NodeId) -> GraphResult<&Node> {
        self.nodes.get(&id).ok_or(GraphError::UnknownNode { node: id })
    }

    /// The node feeding input `index` of `id`, if connected.
    pub fn input_source(&self, id: NodeId, index: usize) -> Option<NodeId> {
        let port = self.nodes.get(&id)?.inputs.get(index)?;
        let connector = self.connectors.get(&port.connector?)?;
        Some(connector.start)
    }

    /// Nodes fed directly by `id`'s output, in connector order.
    pub fn consumers(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(&id)
            .map(|node| {
                node.output
                    .connectors
                    .iter()
                    .filter_map(|c| self.connectors.get(c))
                    .map(|c| c.end)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Insert a node. It starts Dirty and uncached.
    pub fn add_node(&mut self, node: Node) -> GraphResult<NodeId> {
        let id = node.id;
        if self.nodes.contains_key(&id) {
            return Err(GraphError::DuplicateNode { node: id });
        }
        self.order.push(id);
        self.nodes.insert(id, node);
        Ok(id)
    }

    /// Remove a node after severing every connector touching it. Nodes that
    /// lost an input are marked Dirty along with everything downstream.
    pub fn remove_node(&mut self, id: NodeId) -> GraphResult<Node> {
        let node = self.require(id)?;
        let mut touching: Vec<ConnectorId> = node.inputs.iter().filter_map(|p| p.connector).collect();
        touching.extend(node.output.connectors.iter().copied());

        for connector in touching {
            self.disconnect(connector)?;
        }

        self.order.retain(|n| *n != id);
        self.nodes
            .remove(&id)
            .ok_or(GraphError::UnknownNode { node: id })
    }

    /// Connect `start`'s output to input `end_index` of `end`. An existing
    /// connector on that input is detached first.
    pub fn connect(&mut self, start: NodeId, end: NodeId, end_index: usize) -> GraphResult<ConnectorId> {
        self.require(start)?;
        let len = self.require(end)?.inputs.len();
        if end_index >= len {
            return Err(GraphError::PortOutOfRange {
                node: end,
                index: end_index,
                len,
            });
        }
        if validate::would_create_cycle(self, start, end) {
            return Err(GraphError::CycleRejected { start, end });
        }

        if let Some(existing) = self.nodes[&end].inputs[end_index].connector {
            self.disconnect(existing)?;
        }

        let id = Id::from_index(self.next_connector);
        self.next_connector += 1;
        self.connectors.insert(
            id,
            Connector {
                id,
                start,
                end,
                end_index,
            },
        );
        if let Some(node) = self.nodes.get_mut(&start) {
            node.output.connectors.push(id);
        }
        if let Some(node) = self.nodes.get_mut(&end) {
            node.inputs[end_index].connector = Some(id);
        }

        self.mark_dirty(end);
        Ok(id)
    }

    /// Remove a connector. Both endpoints count as edited.
    pub fn disconnect(&mut self, id: ConnectorId) -> GraphResult<Connector> {
        let connector = self
            .connectors
            .remove(&id)
            .ok_or(GraphError::UnknownConnector { connector: id })?;

        if let Some(node) = self.nodes.get_mut(&connector.start) {
            node.output.connectors.retain(|c| *c != id);
        }
        if let Some(port) = self
            .nodes
            .get_mut(&connector.end)
            .and_then(|node| node.inputs.get_mut(connector.end_index))
        {
            if port.connector == Some(id) {
                port.connector = None;
            }
        }

        self.mark_dirty(connector.start);
        self.mark_dirty(connector.end);
        Ok(connector)
    }

    /// Remove whatever connector feeds input `index` of `node`.
    pub fn disconnect_input(&mut self, node: NodeId, index: usize) -> GraphResult<Connector> {
        let target = self.require(node)?;
        let port = target.inputs.get(index).ok_or(GraphError::PortOutOfRange {
            node,
            index,
            len: target.inputs.len(),
        })?;
        let connector = port
            .connector
            .ok_or(GraphError::NotConnected { node, index })?;
        self.disconnect(connector)
    }

    /// Replace a node's input list with `names`.
    ///
    /// Growing appends fresh ports. Shrinking drops trailing ports only while
    /// they are unconnected; a connected port is kept so the node fails to
    /// compile instead of silently losing a wire.
    pub fn set_input_names(&mut self, id: NodeId, names: &[String]) -> GraphResult<()> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or(GraphError::UnknownNode { node: id })?;

        for (port, name) in node.inputs.iter_mut().zip(names) {
            port.name = name.clone();
        }
        if names.len() > node.inputs.len() {
            let extra = names[node.inputs.len()..].iter().cloned().map(InputPort::new);
            node.inputs.extend(extra);
        }
        while node.inputs.len() > names.len()
            && node.inputs.last().is_some_and(|p| p.connector.is_none())
        {
            node.inputs.pop();
        }

        self.mark_dirty(id);
        Ok(())
    }
}

/// The whole program: the home workspace plus named function workspaces.
/// Node identifiers are unique across all of them.
#[derive(Debug, Clone)]
pub struct Graph {
    pub home: Workspace,
    pub(crate) functions: BTreeMap<String, FunctionWorkspace>,
}

impl Graph {
    pub fn new() -> Self {
        Self {
            home: Workspace::new(WorkspaceId::Home),
            functions: BTreeMap::new(),
        }
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionWorkspace> {
        self.functions.values()
    }

    pub fn function(&self, name: &str) -> Option<&FunctionWorkspace> {
        self.functions.get(name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut FunctionWorkspace> {
        self.functions.get_mut(name)
    }

    pub fn workspace(&self, id: &WorkspaceId) -> Option<&Workspace> {
        match id {
            WorkspaceId::Home => Some(&self.home),
            WorkspaceId::Function(name) => self.functions.get(name).map(|f| &f.workspace),
        }
    }

    pub fn workspace_mut(&mut self, id: &WorkspaceId) -> Option<&mut Workspace> {
        match id {
            WorkspaceId::Home => Some(&mut self.home),
            WorkspaceId::Function(name) => self.functions.get_mut(name).map(|f| &mut f.workspace),
        }
    }

    pub fn workspaces(&self) -> impl Iterator<Item = &Workspace> {
        std::iter::once(&self.home).chain(self.functions.values().map(|f| &f.workspace))
    }

    pub fn workspaces_mut(&mut self) -> impl Iterator<Item = &mut Workspace> {
        std::iter::once(&mut self.home).chain(self.functions.values_mut().map(|f| &mut f.workspace))
    }

    /// Every node in every workspace.
    pub fn all_nodes(&self) -> impl Iterator<Item = &Node> {
        self.workspaces().flat_map(|ws| ws.nodes())
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.workspaces().any(|ws| ws.contains(id))
    }

    /// The workspace that owns `id`.
    pub fn locate(&self, id: NodeId) -> Option<&WorkspaceId> {
        self.workspaces().find(|ws| ws.contains(id)).map(|ws| &ws.id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.workspaces().find_map(|ws| ws.node(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.workspaces_mut().find_map(|ws| ws.node_mut(id))
    }

    pub(crate) fn workspace_of_mut(&mut self, id: NodeId) -> GraphResult<&mut Workspace> {
        self.workspaces_mut()
            .find(|ws| ws.contains(id))
            .ok_or(GraphError::UnknownNode { node: id })
    }

    /// Nodes (in any workspace) that call the function `name`.
    pub fn callers(&self, name: &str) -> Vec<NodeId> {
        self.all_nodes()
            .filter(|node| matches!(&node.kind, NodeKind::Function { symbol } if symbol == name))
            .map(|node| node.id)
            .collect()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(ws: &mut Workspace, value: f64) -> NodeId {
        ws.add_node(Node::new(NodeId::new(), NodeKind::Number { value }))
            .unwrap()
    }

    fn add(ws: &mut Workspace) -> NodeId {
        ws.add_node(Node::new(NodeId::new(), NodeKind::Add)).unwrap()
    }

    #[test]
    fn second_connector_replaces_first() {
        let mut ws = Workspace::new(WorkspaceId::Home);
        let a = number(&mut ws, 1.0);
        let b = number(&mut ws, 2.0);
        let sum = add(&mut ws);

        let first = ws.connect(a, sum, 0).unwrap();
        let second = ws.connect(b, sum, 0).unwrap();

        assert!(ws.connector(first).is_none());
        assert_eq!(ws.node(sum).unwrap().inputs[0].connector, Some(second));
        assert!(ws.node(a).unwrap().is_sink());
        assert_eq!(ws.input_source(sum, 0), Some(b));
    }

    #[test]
    fn port_index_is_checked() {
        let mut ws = Workspace::new(WorkspaceId::Home);
        let a = number(&mut ws, 1.0);
        let sum = add(&mut ws);
        assert_eq!(
            ws.connect(a, sum, 2).unwrap_err(),
            GraphError::PortOutOfRange {
                node: sum,
                index: 2,
                len: 2
            }
        );
    }

    #[test]
    fn removing_a_node_severs_its_connectors() {
        let mut ws = Workspace::new(WorkspaceId::Home);
        let a = number(&mut ws, 1.0);
        let sum = add(&mut ws);
        let out = ws
            .add_node(Node::new(NodeId::new(), NodeKind::Watch))
            .unwrap();
        ws.connect(a, sum, 0).unwrap();
        ws.connect(sum, out, 0).unwrap();

        ws.remove_node(sum).unwrap();

        assert_eq!(ws.connectors().count(), 0);
        assert!(ws.node(a).unwrap().is_sink());
        assert_eq!(ws.node(out).unwrap().inputs[0].connector, None);
        assert_eq!(ws.node_ids(), &[a, out]);
    }

    #[test]
    fn shrinking_inputs_keeps_connected_ports() {
        let mut ws = Workspace::new(WorkspaceId::Home);
        let a = number(&mut ws, 1.0);
        let call = ws
            .add_node(Node::with_inputs(
                NodeId::new(),
                NodeKind::Function { symbol: "f".into() },
                vec!["x".into(), "y".into(), "z".into()],
            ))
            .unwrap();
        ws.connect(a, call, 1).unwrap();

        ws.set_input_names(call, &["p".to_string()]).unwrap();

        let names: Vec<&str> = ws.node(call).unwrap().inputs.iter().map(|p| p.name.as_str()).collect();
        // "z" was free and dropped; "y" is wired and survives.
        assert_eq!(names, vec!["p", "y"]);
    }

    #[test]
    fn graph_locates_nodes_across_workspaces() {
        let mut graph = Graph::new();
        let a = number(&mut graph.home, 1.0);
        assert_eq!(graph.locate(a), Some(&WorkspaceId::Home));
        assert!(graph.contains_node(a));
        assert!(graph.locate(NodeId::new()).is_none());
    }
}
