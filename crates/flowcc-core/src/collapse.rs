//! Subgraph collapse: large or listed scopes are folded into a single
//! placeholder node.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::config::FlowConfig;
use crate::entry::EntrySelection;
use crate::graph::{Edge, FlowGraph, NodeId};
use crate::scope::Scope;

/// A scope replaced by a placeholder node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollapsedSubgraph {
    pub scope: Scope,
    /// Nodes absorbed, nested scopes included.
    pub node_count: usize,
    pub subgraph_name: String,
    pub placeholder: NodeId,
    pub placeholder_ident: String,
    /// Rendered ids of the absorbed nodes, sorted.
    pub scope_nodes: Vec<String>,
}

pub struct CollapseManager<'a> {
    config: &'a FlowConfig,
    entry: &'a EntrySelection,
}

impl<'a> CollapseManager<'a> {
    pub fn new(config: &'a FlowConfig, entry: &'a EntrySelection) -> Self {
        Self { config, entry }
    }

    /// Decide whether `scope` collapses. Rules, first match wins:
    ///
    /// 1. exact key in the force list: collapse;
    /// 2. exact key in the whitelist: expand;
    /// 3. the entry point: expand;
    /// 4. owning class in the force list: collapse;
    /// 5. owning class in the whitelist: expand;
    /// 6. collapse when the direct node count exceeds the threshold.
    pub fn should_collapse(&self, scope: &Scope, direct_nodes: usize) -> bool {
        if *scope == Scope::Main {
            return false;
        }
        let key = scope.key();
        let force = &self.config.force_collapse_list;
        let whitelist = &self.config.subgraph_whitelist;
        if force.contains(&key) {
            return true;
        }
        if whitelist.contains(&key) {
            return false;
        }
        if self.entry.name.as_deref() == Some(key.as_str()) || self.entry.protects(scope) {
            return false;
        }
        if let Some(class) = scope.owning_class() {
            if force.contains(class) {
                return true;
            }
            if whitelist.contains(class) {
                return false;
            }
        }
        direct_nodes > self.config.limits.max_subgraph_nodes
    }

    /// Fold every collapsing scope, outermost first, and rewrite edges onto
    /// the placeholders.
    pub fn collapse(&self, graph: &mut FlowGraph) -> BTreeMap<Scope, CollapsedSubgraph> {
        let collapsing: Vec<Scope> = graph
            .live_scopes()
            .into_iter()
            .filter(|scope| self.should_collapse(scope, graph.nodes_in_scope(scope).len()))
            .collect();
        let reach: BTreeMap<&Scope, BTreeSet<Scope>> = collapsing
            .iter()
            .map(|scope| (scope, descendants(graph, scope)))
            .collect();

        let mut absorbed_scopes = BTreeSet::new();
        let mut redirect: BTreeMap<NodeId, NodeId> = BTreeMap::new();
        let mut collapsed = BTreeMap::new();

        for scope in &collapsing {
            if absorbed_scopes.contains(scope) {
                continue;
            }
            // Leave it to a collapsing ancestor, unless the two call each other.
            let dominated = collapsing.iter().any(|other| {
                other != scope
                    && !absorbed_scopes.contains(other)
                    && reach[other].contains(scope)
                    && !reach[scope].contains(other)
            });
            if dominated {
                continue;
            }
            let region: BTreeSet<Scope> = reach[scope]
                .iter()
                .filter(|s| !absorbed_scopes.contains(*s))
                .cloned()
                .collect();
            let absorbed: Vec<NodeId> = graph
                .nodes()
                .filter(|node| node.scope.as_ref().is_some_and(|s| region.contains(s)))
                .map(|node| node.id)
                .collect();
            let mut scope_nodes: Vec<String> = absorbed.iter().map(|id| graph.ident(*id).to_string()).collect();
            scope_nodes.sort();

            let node_count = absorbed.len();
            let placeholder_ident = format!("collapsed_nodes__{}_{node_count}", scope.key());
            for id in &absorbed {
                graph.remove_node(*id);
            }
            let placeholder = graph.add_placeholder(
                placeholder_ident.clone(),
                format!("Collapsed nodes ({node_count})"),
                scope.clone(),
            );
            redirect.extend(absorbed.iter().map(|id| (*id, placeholder)));
            tracing::debug!(scope = %scope, node_count, "collapsed subgraph");

            absorbed_scopes.extend(region);
            collapsed.insert(
                scope.clone(),
                CollapsedSubgraph {
                    scope: scope.clone(),
                    node_count,
                    subgraph_name: scope.describe(node_count),
                    placeholder,
                    placeholder_ident,
                    scope_nodes,
                },
            );
        }

        if !redirect.is_empty() {
            rewrite_edges(graph, &redirect);
        }
        collapsed
    }
}

/// `scope` and every scope reachable from it through the scope forest.
fn descendants(graph: &FlowGraph, scope: &Scope) -> BTreeSet<Scope> {
    let mut seen = BTreeSet::from([scope.clone()]);
    let mut queue = VecDeque::from([scope.clone()]);
    while let Some(current) = queue.pop_front() {
        for child in graph.children_of(&current) {
            if seen.insert(child.clone()) {
                queue.push_back(child.clone());
            }
        }
    }
    seen
}

/// Edges inside a placeholder vanish; edges crossing into or out of one are
/// pointed at it, deduplicated and appended in sorted order.
fn rewrite_edges(graph: &mut FlowGraph, redirect: &BTreeMap<NodeId, NodeId>) {
    let mut kept = Vec::new();
    let mut boundary = BTreeSet::new();
    for edge in graph.edges() {
        let from = redirect.get(&edge.from).copied();
        let to = redirect.get(&edge.to).copied();
        if from.is_none() && to.is_none() {
            kept.push(edge.clone());
            continue;
        }
        let from = from.unwrap_or(edge.from);
        let to = to.unwrap_or(edge.to);
        if from == to {
            continue;
        }
        boundary.insert(Edge {
            from,
            to,
            label: edge.label.clone(),
            direction: edge.direction,
        });
    }
    kept.extend(boundary);
    graph.replace_edges(kept);
}
