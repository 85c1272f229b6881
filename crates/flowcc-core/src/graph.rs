//! Graph store: nodes, edges and the scope forest.
//!
//! One `FlowGraph` belongs to one diagram generation. The builder fills it,
//! then each later stage takes it by `&mut` in turn; nothing reads it while
//! another stage writes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use strum_macros::{Display, EnumString, IntoStaticStr};

use crate::scope::Scope;

/// Node id, allocated from a counter shared by every node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ShapeKind {
    Start,
    End,
    Condition,
    Loop,
    /// Structural join point; blank text makes it a bypass node.
    Merge,
    Statement,
    Call,
    Import,
    Exception,
    Try,
    Finally,
    Exit,
}

impl ShapeKind {
    /// Mermaid opening and closing delimiters.
    pub fn delimiters(&self) -> (&'static str, &'static str) {
        match self {
            ShapeKind::Start | ShapeKind::End => ("[", "]"),
            ShapeKind::Condition | ShapeKind::Try => ("{\"", "\"}"),
            ShapeKind::Loop => ("{{\"", "\"}}"),
            ShapeKind::Merge => ("{{", "}}"),
            ShapeKind::Statement => ("[\"", "\"]"),
            ShapeKind::Call | ShapeKind::Exception => ("[[\"", "\"]]"),
            ShapeKind::Import | ShapeKind::Exit | ShapeKind::Finally => ("[/\"", "\"\\]"),
        }
    }
}

/// What produced a node. The rendered id is the tag followed by the number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum NodeTag {
    Start,
    End,
    IfCond,
    Merge,
    ForLoop,
    WhileLoop,
    LoopExit,
    EndCall,
    Print,
    Expr,
    Call,
    RecursiveCall,
    NestingLimit,
    MethodCall,
    Method,
    Instantiate,
    Assign,
    AugAssign,
    Return,
    Import,
    ImportFrom,
    Try,
    Except,
    Else,
    Finally,
    Raise,
    With,
    Assert,
    Pass,
    Lambda,
    Comprehension,
    ExitFunction,
    Error,
    Warning,
    ClassAnchor,
    Unsupported,
    Collapsed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub tag: NodeTag,
    /// Rendered Mermaid id, e.g. `if_cond7`.
    pub ident: String,
    pub text: String,
    pub shape: ShapeKind,
    pub scope: Option<Scope>,
    pub line: Option<u32>,
    pub highlighted: bool,
}

impl Node {
    pub fn is_bypass(&self) -> bool {
        self.shape == ShapeKind::Merge && self.text.trim().is_empty()
    }

    /// Turn the node into a blank merge so bypass elimination threads
    /// edges through it.
    pub fn make_bypass(&mut self) {
        self.shape = ShapeKind::Merge;
        self.text.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum EdgeDirection {
    #[default]
    Forward,
    /// Drawn `<-->`: a method call that returns to its caller.
    CallAndReturn,
}

impl EdgeDirection {
    pub fn arrow(&self) -> &'static str {
        match self {
            EdgeDirection::Forward => "-->",
            EdgeDirection::CallAndReturn => "<-->",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub label: Option<String>,
    pub direction: EdgeDirection,
}

impl Edge {
    pub fn new(from: NodeId, to: NodeId) -> Self {
        Self {
            from,
            to,
            label: None,
            direction: EdgeDirection::Forward,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_direction(mut self, direction: EdgeDirection) -> Self {
        self.direction = direction;
        self
    }
}

/// Returned by [`FlowGraph::add_node`] once the node budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetExhausted;

#[derive(Debug, Clone)]
pub struct FlowGraph {
    nodes: BTreeMap<NodeId, Node>,
    edges: Vec<Edge>,
    scope_children: BTreeMap<Scope, BTreeSet<Scope>>,
    counter: u32,
    max_nodes: usize,
    start: NodeId,
    end: NodeId,
}

impl FlowGraph {
    /// Create a graph holding only the start and end nodes. The budget is
    /// never below two so those always fit.
    pub fn new(max_nodes: usize) -> Self {
        let mut graph = Self {
            nodes: BTreeMap::new(),
            edges: Vec::new(),
            scope_children: BTreeMap::new(),
            counter: 0,
            max_nodes: max_nodes.max(2),
            start: NodeId::default(),
            end: NodeId::default(),
        };
        graph.start = graph.push_node(NodeTag::Start, "Start".into(), ShapeKind::Start, None);
        graph.end = graph.push_node(NodeTag::End, "End".into(), ShapeKind::End, None);
        graph
    }

    pub fn start(&self) -> NodeId {
        self.start
    }

    pub fn end(&self) -> NodeId {
        self.end
    }

    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }

    pub fn add_node(
        &mut self,
        tag: NodeTag,
        text: impl Into<String>,
        shape: ShapeKind,
        scope: Option<Scope>,
    ) -> Result<NodeId, BudgetExhausted> {
        if self.nodes.len() >= self.max_nodes {
            return Err(BudgetExhausted);
        }
        Ok(self.push_node(tag, text.into(), shape, scope))
    }

    fn push_node(&mut self, tag: NodeTag, text: String, shape: ShapeKind, scope: Option<Scope>) -> NodeId {
        self.counter += 1;
        let id = NodeId(self.counter);
        let tag_name: &'static str = tag.into();
        let ident = format!("{tag_name}{}", self.counter);
        self.insert(Node {
            id,
            tag,
            ident,
            text,
            shape,
            scope,
            line: None,
            highlighted: false,
        });
        id
    }

    /// Insert a collapse placeholder. Placeholders replace absorbed nodes,
    /// so they are not charged against the budget.
    pub fn add_placeholder(&mut self, ident: String, text: String, scope: Scope) -> NodeId {
        self.counter += 1;
        let id = NodeId(self.counter);
        self.insert(Node {
            id,
            tag: NodeTag::Collapsed,
            ident,
            text,
            shape: ShapeKind::Statement,
            scope: Some(scope),
            line: None,
            highlighted: false,
        });
        id
    }

    fn insert(&mut self, node: Node) {
        self.nodes.insert(node.id, node);
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

    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        if id == self.end {
            return None;
        }
        self.nodes.remove(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Rendered id of a node, empty when it no longer exists.
    pub fn ident(&self, id: NodeId) -> &str {
        self.nodes.get(&id).map(|n| n.ident.as_str()).unwrap_or("")
    }

    pub fn add_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    pub fn connect(&mut self, from: NodeId, to: NodeId) {
        self.add_edge(Edge::new(from, to));
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Swap in a rewritten edge list, returning the old one.
    pub fn replace_edges(&mut self, edges: Vec<Edge>) -> Vec<Edge> {
        std::mem::replace(&mut self.edges, edges)
    }

    pub fn successors(&self, id: NodeId) -> BTreeSet<NodeId> {
        self.edges
            .iter()
            .filter(|e| e.from == id)
            .map(|e| e.to)
            .collect()
    }

    pub fn add_child_scope(&mut self, parent: Scope, child: Scope) {
        self.scope_children.entry(parent).or_default().insert(child);
    }

    pub fn scope_children(&self) -> &BTreeMap<Scope, BTreeSet<Scope>> {
        &self.scope_children
    }

    pub fn children_of(&self, scope: &Scope) -> impl Iterator<Item = &Scope> {
        self.scope_children.get(scope).into_iter().flatten()
    }

    /// Nodes directly in `scope`, in id order.
    pub fn nodes_in_scope(&self, scope: &Scope) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.scope.as_ref() == Some(scope))
            .map(|n| n.id)
            .collect()
    }

    /// Every scope that still owns a node.
    pub fn live_scopes(&self) -> BTreeSet<Scope> {
        self.nodes.values().filter_map(|n| n.scope.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_graph_has_start_and_end() {
        let graph = FlowGraph::new(10);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.ident(graph.start()), "start1");
        assert_eq!(graph.ident(graph.end()), "end2");
        assert_eq!(graph.node(graph.end()).map(|n| n.text.as_str()), Some("End"));
    }

    #[test]
    fn test_budget_refuses_nodes() {
        let mut graph = FlowGraph::new(3);
        let id = graph
            .add_node(NodeTag::Print, "print('a')", ShapeKind::Statement, Some(Scope::Main))
            .unwrap();
        assert_eq!(graph.ident(id), "print3");
        assert_eq!(
            graph.add_node(NodeTag::Print, "print('b')", ShapeKind::Statement, Some(Scope::Main)),
            Err(BudgetExhausted)
        );
        assert_eq!(graph.node_count(), 3);
    }

    #[test]
    fn test_budget_never_below_two() {
        let graph = FlowGraph::new(0);
        assert_eq!(graph.max_nodes(), 2);
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn test_tag_prefixes() {
        let mut graph = FlowGraph::new(10);
        let cond = graph
            .add_node(NodeTag::IfCond, "if x", ShapeKind::Condition, Some(Scope::Main))
            .unwrap();
        let merge = graph.add_node(NodeTag::LoopExit, " ", ShapeKind::Merge, None).unwrap();
        assert_eq!(graph.ident(cond), "if_cond3");
        assert_eq!(graph.ident(merge), "loop_exit4");
        assert!(graph.node(merge).is_some_and(Node::is_bypass));
        assert!(!graph.node(cond).is_some_and(Node::is_bypass));
    }

    #[test]
    fn test_end_cannot_be_removed() {
        let mut graph = FlowGraph::new(10);
        let end = graph.end();
        assert!(graph.remove_node(end).is_none());
        assert!(graph.contains(end));
    }

    #[test]
    fn test_scope_queries() {
        let mut graph = FlowGraph::new(10);
        let f = Scope::function("f");
        let a = graph
            .add_node(NodeTag::Assign, "x = 1", ShapeKind::Statement, Some(f.clone()))
            .unwrap();
        graph.add_child_scope(Scope::Main, f.clone());
        assert_eq!(graph.nodes_in_scope(&f), vec![a]);
        assert_eq!(graph.children_of(&Scope::Main).collect::<Vec<_>>(), vec![&f]);
        assert!(graph.live_scopes().contains(&f));
        assert!(!graph.live_scopes().contains(&Scope::Main));
    }

    #[test]
    fn test_shape_delimiters() {
        assert_eq!(ShapeKind::Merge.delimiters(), ("{{", "}}"));
        assert_eq!(ShapeKind::Import.delimiters(), ("[/\"", "\"\\]"));
        assert_eq!(ShapeKind::Exception.delimiters(), ShapeKind::Call.delimiters());
        assert_eq!(ShapeKind::Loop.to_string(), "loop");
    }
}
