//! Structural checks over a workspace's connector graph.

use df_core::NodeId;
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graphmap::DiGraphMap;

use crate::graph::Workspace;

fn dependency_graph(ws: &Workspace) -> DiGraphMap<NodeId, ()> {
    let mut graph = DiGraphMap::new();
    for id in ws.node_ids() {
        graph.add_node(*id);
    }
    for connector in ws.connectors() {
        graph.add_edge(connector.start, connector.end, ());
    }
    graph
}

/// Would a connector `start -> end` close a cycle?
pub(crate) fn would_create_cycle(ws: &Workspace, start: NodeId, end: NodeId) -> bool {
    if start == end {
        return true;
    }
    let graph = dependency_graph(ws);
    has_path_connecting(&graph, end, start, None)
}

/// A node on some cycle, if the workspace has one. Loaded graphs bypass the
/// edit-time check, so the loader calls this before first compile.
pub fn find_cycle(ws: &Workspace) -> Option<NodeId> {
    toposort(&dependency_graph(ws), None)
        .err()
        .map(|cycle| cycle.node_id())
}
