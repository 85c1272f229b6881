//! Graph rewrites applied after the build: bypass elimination, pruning and
//! the compact view filter.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::ViewMode;
use crate::graph::{Edge, FlowGraph, Node, NodeId, NodeTag};

/// Thread edges through blank merge nodes that have exactly one successor
/// and delete those nodes. Repeats until nothing changes, so running it a
/// second time is a no-op. Returns the number of nodes removed.
pub fn eliminate_bypass_nodes(graph: &mut FlowGraph) -> usize {
    let mut removed = 0;
    loop {
        let round = eliminate_round(graph);
        if round == 0 {
            break;
        }
        removed += round;
    }
    if removed > 0 {
        tracing::debug!(removed, "bypass nodes eliminated");
    }
    removed
}

fn eliminate_round(graph: &mut FlowGraph) -> usize {
    let (start, end) = (graph.start(), graph.end());
    let forward: BTreeMap<NodeId, NodeId> = graph
        .nodes()
        .filter(|node| node.is_bypass() && node.id != start && node.id != end)
        .filter_map(|node| {
            let successors = graph.successors(node.id);
            match successors.len() {
                1 => successors.first().copied().filter(|&to| to != node.id).map(|to| (node.id, to)),
                _ => None,
            }
        })
        .collect();

    let resolved: BTreeMap<NodeId, NodeId> = forward
        .keys()
        .filter_map(|&from| resolve_chain(&forward, from).map(|to| (from, to)))
        .collect();
    if resolved.is_empty() {
        return 0;
    }

    let mut seen = BTreeSet::new();
    let edges: Vec<Edge> = graph
        .edges()
        .iter()
        .filter(|edge| !resolved.contains_key(&edge.from))
        .map(|edge| {
            let mut edge = edge.clone();
            if let Some(&to) = resolved.get(&edge.to) {
                edge.to = to;
            }
            edge
        })
        .filter(|edge| seen.insert(edge.clone()))
        .collect();
    graph.replace_edges(edges);

    for id in resolved.keys() {
        graph.remove_node(*id);
    }
    resolved.len()
}

/// Follow a forwarding chain to its first non-forwarding node. A chain that
/// loops back on itself has no target.
fn resolve_chain(forward: &BTreeMap<NodeId, NodeId>, from: NodeId) -> Option<NodeId> {
    let mut visited = BTreeSet::from([from]);
    let mut target = *forward.get(&from)?;
    while let Some(&next) = forward.get(&target) {
        if !visited.insert(target) {
            return None;
        }
        target = next;
    }
    (!visited.contains(&target)).then_some(target)
}

/// Delete every node no edge touches, except `end`.
pub fn prune_unreferenced_nodes(graph: &mut FlowGraph) -> usize {
    let referenced: BTreeSet<NodeId> = graph
        .edges()
        .iter()
        .flat_map(|edge| [edge.from, edge.to])
        .chain([graph.end()])
        .collect();
    let unused: Vec<NodeId> = graph
        .node_ids()
        .into_iter()
        .filter(|id| !referenced.contains(id))
        .collect();
    for id in &unused {
        graph.remove_node(*id);
    }
    if !unused.is_empty() {
        tracing::debug!(pruned = unused.len(), "unreferenced nodes pruned");
    }
    unused.len()
}

/// Final sweep: no edge may point at a node that is gone.
pub fn drop_dangling_edges(graph: &mut FlowGraph) -> usize {
    let before = graph.edges().len();
    let edges: Vec<Edge> = graph
        .edges()
        .iter()
        .filter(|edge| graph.contains(edge.from) && graph.contains(edge.to))
        .cloned()
        .collect();
    let dropped = before - edges.len();
    graph.replace_edges(edges);
    if dropped > 0 {
        tracing::debug!(dropped, "dangling edges dropped");
    }
    dropped
}

/// Compact view hides prints, imports, exception plumbing and constructor
/// bodies by turning them into bypass nodes. Other views leave the graph
/// as is.
pub fn apply_view_mode(graph: &mut FlowGraph, mode: ViewMode) {
    if mode != ViewMode::Compact {
        return;
    }
    let (start, end) = (graph.start(), graph.end());
    let noise: Vec<NodeId> = graph
        .nodes()
        .filter(|node| node.id != start && node.id != end && is_compact_noise(node))
        .map(|node| node.id)
        .collect();
    tracing::debug!(hidden = noise.len(), "compact view");
    for id in noise {
        if let Some(node) = graph.node_mut(id) {
            node.make_bypass();
        }
    }
    eliminate_bypass_nodes(graph);
}

fn is_compact_noise(node: &Node) -> bool {
    if node.tag == NodeTag::Collapsed {
        return false;
    }
    if matches!(node.tag, NodeTag::Import | NodeTag::ImportFrom | NodeTag::Raise | NodeTag::Assert) {
        return true;
    }
    if node.scope.as_ref().is_some_and(|scope| scope.is_constructor()) {
        return true;
    }
    let lower = node.text.to_lowercase();
    let stripped = lower.trim();
    lower.contains("print")
        || stripped.starts_with("import")
        || lower.contains(" import ")
        || ["raise", "except", "assert", " error"].iter().any(|token| lower.contains(token))
        || stripped.starts_with("try")
        || lower.contains(" try ")
        || stripped.starts_with("pass")
}
