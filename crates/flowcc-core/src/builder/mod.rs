//! Graph builder: walks the syntax model and fills a [`FlowGraph`].
//!
//! Every statement kind has one handler. A handler receives the node the
//! flow arrives from and returns where the flow continues:
//!
//! - `Ok(Some(id))`: the next statement connects from `id`;
//! - `Ok(None)`: the branch terminated (return, raise, break, continue, exit);
//! - `Err(BudgetExhausted)`: the node budget refused a node and the whole
//!   walk unwinds.
//!
//! Function calls to known top-level functions are spliced inline under a
//! `Function` scope; method calls are drawn once per method under a
//! `Method` scope and reused by later callers.

mod calls;
mod control;
mod methods;
pub mod text;

use std::collections::BTreeMap;

use crate::ast::{ClassDef, FunctionDef, Program, Stmt, StmtKind};
use crate::config::FlowConfig;
use crate::entry::EntrySelection;
use crate::graph::{BudgetExhausted, Edge, EdgeDirection, FlowGraph, NodeId, NodeTag, ShapeKind};
use crate::resolver::TypeResolver;
use crate::scope::Scope;

use self::text::TextShaper;

pub(crate) type Flow = Result<Option<NodeId>, BudgetExhausted>;

/// Stack headroom below which the walk moves to a fresh segment.
const STACK_RED_ZONE: usize = 64 * 1024;
const STACK_GROW_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub(crate) struct LoopFrame {
    pub start: NodeId,
    pub exit: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct MethodKey {
    pub class: String,
    pub method: String,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct MethodEntry {
    pub entry: NodeId,
    pub last: NodeId,
}

/// Top-level definitions, indexed before the walk starts.
pub(crate) struct Definitions<'p> {
    pub functions: BTreeMap<&'p str, &'p FunctionDef>,
    pub classes: BTreeMap<&'p str, &'p ClassDef>,
}

impl<'p> Definitions<'p> {
    fn index(program: &'p Program) -> Self {
        let mut functions = BTreeMap::new();
        let mut classes = BTreeMap::new();
        for stmt in &program.body {
            match &stmt.kind {
                StmtKind::FunctionDef(def) => {
                    functions.insert(def.name.as_str(), def);
                }
                StmtKind::ClassDef(def) => {
                    classes.insert(def.name.as_str(), def);
                }
                _ => {}
            }
        }
        Self { functions, classes }
    }

    pub fn method(&self, class: &str, method: &str) -> Option<&'p FunctionDef> {
        self.classes.get(class).and_then(|def| def.method(method))
    }
}

pub struct GraphBuilder<'a> {
    config: &'a FlowConfig,
    entry: &'a EntrySelection,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(config: &'a FlowConfig, entry: &'a EntrySelection) -> Self {
        Self { config, entry }
    }

    pub fn build(&self, program: &Program) -> FlowGraph {
        let defs = Definitions::index(program);
        tracing::debug!(
            functions = defs.functions.len(),
            classes = defs.classes.len(),
            "building flow graph"
        );
        let mut cx = BuilderContext::new(self.config, self.entry, defs);
        let start = cx.graph.start();
        let end = cx.graph.end();
        match cx.process_list(&program.body, start, &Scope::Main, None) {
            Ok(Some(current)) if current == start => cx.connect(start, end),
            Ok(Some(current)) => {
                let last = cx.method_last.get(&current).copied().unwrap_or(current);
                cx.connect(last, end);
            }
            Ok(None) => {}
            Err(BudgetExhausted) => {
                tracing::warn!(max_nodes = cx.graph.max_nodes(), "node budget exhausted");
            }
        }
        tracing::debug!(
            nodes = cx.graph.node_count(),
            edges = cx.graph.edges().len(),
            "flow graph built"
        );
        cx.graph
    }
}

/// All mutable state of one walk.
pub(crate) struct BuilderContext<'a, 'p> {
    pub config: &'a FlowConfig,
    pub entry: &'a EntrySelection,
    pub defs: Definitions<'p>,
    pub graph: FlowGraph,
    pub resolver: TypeResolver,
    pub loops: Vec<LoopFrame>,
    /// `end_call` merges of the active function splices.
    pub calls: Vec<NodeId>,
    pub depth: usize,
    pending_label: Option<&'static str>,
    /// Entry node of the current splice of each function; recursion target.
    pub function_starts: BTreeMap<String, NodeId>,
    pub methods: BTreeMap<MethodKey, MethodEntry>,
    /// Caller node to the last node of the method it called.
    pub method_last: BTreeMap<NodeId, NodeId>,
    /// Return nodes per method, consulted in sequential mode.
    pub method_exits: BTreeMap<Scope, Vec<NodeId>>,
    pub import_rendered: bool,
    exhausted_reported: bool,
    current_line: Option<u32>,
}

impl<'a, 'p> BuilderContext<'a, 'p> {
    fn new(config: &'a FlowConfig, entry: &'a EntrySelection, defs: Definitions<'p>) -> Self {
        let resolver = TypeResolver::new(defs.classes.keys().copied());
        Self {
            config,
            entry,
            defs,
            graph: FlowGraph::new(config.limits.max_nodes),
            resolver,
            loops: Vec::new(),
            calls: Vec::new(),
            depth: 0,
            pending_label: None,
            function_starts: BTreeMap::new(),
            methods: BTreeMap::new(),
            method_last: BTreeMap::new(),
            method_exits: BTreeMap::new(),
            import_rendered: false,
            exhausted_reported: false,
            current_line: None,
        }
    }

    pub fn text(&self) -> TextShaper<'a> {
        let config: &'a FlowConfig = self.config;
        TextShaper::new(&config.limits)
    }

    /// Add a node for the statement being walked. Breakpoint lines get the
    /// marker on any node with visible text.
    pub fn add_node(
        &mut self,
        tag: NodeTag,
        text: impl Into<String>,
        shape: ShapeKind,
        scope: Option<&Scope>,
    ) -> Result<NodeId, BudgetExhausted> {
        let mut text = text.into();
        let highlighted = !text.trim().is_empty()
            && self
                .current_line
                .is_some_and(|line| self.config.breakpoint_lines.contains(&line));
        if highlighted {
            text = format!("🔴 {text}");
        }
        let id = self.graph.add_node(tag, text, shape, scope.cloned())?;
        if let Some(node) = self.graph.node_mut(id) {
            node.line = self.current_line;
            node.highlighted = highlighted;
        }
        Ok(id)
    }

    /// Blank merge node; these carry no scope.
    pub fn add_merge(&mut self, tag: NodeTag) -> Result<NodeId, BudgetExhausted> {
        self.graph.add_node(tag, " ", ShapeKind::Merge, None)
    }

    /// Plain edge; takes the pending first-edge label if one is set.
    pub fn connect(&mut self, from: NodeId, to: NodeId) {
        let mut edge = Edge::new(from, to);
        if let Some(label) = self.pending_label.take() {
            edge = edge.with_label(label);
        }
        self.graph.add_edge(edge);
    }

    pub fn connect_labeled(&mut self, from: NodeId, to: NodeId, label: &str) {
        self.graph.add_edge(Edge::new(from, to).with_label(label));
    }

    /// Edge from a caller into a method entry.
    pub fn connect_method(&mut self, from: NodeId, to: NodeId) {
        let edge = if self.config.sequential_flow {
            Edge::new(from, to).with_label("Call")
        } else {
            Edge::new(from, to)
                .with_label("Call and Return")
                .with_direction(EdgeDirection::CallAndReturn)
        };
        self.graph.add_edge(edge);
    }

    /// Run `f` inside a function splice: the `end_call` frame is pushed, the
    /// depth raised and the caller's loops hidden, all undone on every path.
    pub fn enter_call<T>(&mut self, end_call: NodeId, f: impl FnOnce(&mut Self) -> T) -> T {
        self.calls.push(end_call);
        self.depth += 1;
        let loops = std::mem::take(&mut self.loops);
        let line = self.current_line;
        let result = f(self);
        self.current_line = line;
        self.loops = loops;
        self.depth -= 1;
        self.calls.pop();
        result
    }

    /// Method bodies see neither the caller's loops nor its call frames.
    /// Depth is not raised; the method cache already bounds the walk.
    pub fn enter_method<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let loops = std::mem::take(&mut self.loops);
        let calls = std::mem::take(&mut self.calls);
        let line = self.current_line;
        let result = f(self);
        self.current_line = line;
        self.calls = calls;
        self.loops = loops;
        result
    }

    pub fn nesting_exceeded(&self) -> bool {
        self.depth >= self.config.limits.max_nesting_depth
    }

    pub fn is_function(&self, name: &str) -> bool {
        self.defs.functions.contains_key(name)
    }

    pub fn is_class(&self, name: &str) -> bool {
        self.defs.classes.contains_key(name)
    }

    /// Walk a statement list starting from `prev`. `first_label` names the
    /// first edge drawn inside the list.
    pub fn process_list(
        &mut self,
        stmts: &'p [Stmt],
        prev: NodeId,
        scope: &Scope,
        first_label: Option<&'static str>,
    ) -> Flow {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            self.pending_label = first_label;
            let mut current = prev;
            for (index, stmt) in stmts.iter().enumerate() {
                if !self.should_process(stmt, index) {
                    continue;
                }
                self.current_line = Some(stmt.line);
                let result = self.visit_stmt(stmt, current, scope);
                // A statement that drew nothing leaves the label for the next one.
                if !matches!(result, Ok(Some(next)) if next == current) {
                    self.pending_label = None;
                }
                match result {
                    Ok(Some(next)) => current = next,
                    Ok(None) => return Ok(None),
                    Err(exhausted) => {
                        self.report_exhausted(current);
                        return Err(exhausted);
                    }
                }
            }
            self.pending_label = None;
            Ok(Some(current))
        })
    }

    fn should_process(&self, stmt: &Stmt, index: usize) -> bool {
        let config = self.config;
        match &stmt.kind {
            _ if index == 0 && stmt.is_string_literal() => false,
            StmtKind::FunctionDef(_) => false,
            StmtKind::For { .. } => config.show_for_loops,
            StmtKind::While { .. } => config.show_while_loops,
            StmtKind::Assign { .. } | StmtKind::AugAssign { .. } => config.show_variables,
            StmtKind::If { .. } => config.show_ifs,
            StmtKind::Try(_) => config.show_exceptions,
            StmtKind::Return(_) => config.show_returns,
            StmtKind::ClassDef(_) => config.show_classes,
            _ => true,
        }
    }

    fn visit_stmt(&mut self, stmt: &'p Stmt, prev: NodeId, scope: &Scope) -> Flow {
        match &stmt.kind {
            StmtKind::If { test, body, orelse } => self.visit_if(test, body, orelse, prev, scope),
            StmtKind::For { target, iter, body, .. } => {
                let text = self.text().for_loop(target, iter);
                self.visit_loop(NodeTag::ForLoop, text, ShapeKind::Loop, body, prev, scope)
            }
            StmtKind::While { test, body, .. } => {
                let text = self.text().while_loop(test);
                self.visit_loop(NodeTag::WhileLoop, text, ShapeKind::Condition, body, prev, scope)
            }
            StmtKind::Break => Ok(self.visit_jump(prev, |frame| frame.exit)),
            StmtKind::Continue => Ok(self.visit_jump(prev, |frame| frame.start)),
            StmtKind::FunctionDef(_) => Ok(Some(prev)),
            StmtKind::ClassDef(def) => self.visit_class(def, prev),
            StmtKind::Assign { targets, value } => self.visit_assign(targets, value, prev, scope),
            StmtKind::AugAssign { target, op, value } => {
                self.visit_aug_assign(target, op, value, prev, scope)
            }
            StmtKind::Expr(expr) => self.visit_expr_stmt(expr, prev, scope),
            StmtKind::Return(value) => self.visit_return(value.as_ref(), prev, scope),
            StmtKind::Try(stmt) => self.visit_try(stmt, prev, scope),
            StmtKind::Raise { exc, cause } => {
                let text = self.text().raise(exc.as_ref(), cause.as_ref());
                let node = self.add_node(NodeTag::Raise, text, ShapeKind::Exception, Some(scope))?;
                self.connect(prev, node);
                Ok(None)
            }
            StmtKind::With { items, body } => {
                let text = self.text().with(items);
                let node = self.add_node(NodeTag::With, text, ShapeKind::Exception, Some(scope))?;
                self.connect(prev, node);
                let end = self.process_list(body, node, scope, None)?;
                Ok(Some(end.unwrap_or(node)))
            }
            StmtKind::Assert { test, msg } => {
                let text = self.text().assert(test, msg.as_ref());
                self.add_linked(NodeTag::Assert, text, ShapeKind::Exception, prev, scope)
            }
            StmtKind::Pass => self.add_linked(NodeTag::Pass, "Pass", ShapeKind::Statement, prev, scope),
            StmtKind::Import { .. } | StmtKind::ImportFrom { .. } => self.visit_import(stmt, prev, scope),
            StmtKind::Unsupported { kind } => {
                tracing::debug!(kind = %kind, line = stmt.line, "unsupported statement");
                let text = format!("Unsupported Node: {kind}");
                self.add_linked(NodeTag::Unsupported, text, ShapeKind::Import, prev, scope)
            }
        }
    }

    /// Add a node, connect it from `prev` and continue from it.
    pub fn add_linked(
        &mut self,
        tag: NodeTag,
        text: impl Into<String>,
        shape: ShapeKind,
        prev: NodeId,
        scope: &Scope,
    ) -> Flow {
        let node = self.add_node(tag, text, shape, Some(scope))?;
        self.connect(prev, node);
        Ok(Some(node))
    }

    fn visit_import(&mut self, stmt: &Stmt, prev: NodeId, scope: &Scope) -> Flow {
        if !self.config.show_imports {
            return Ok(Some(prev));
        }
        if self.import_rendered {
            if matches!(stmt.kind, StmtKind::Import { .. })
                && let Some(node) = self.graph.node_mut(prev)
                && node.shape == ShapeKind::Import
                && !node.text.ends_with("...")
            {
                node.text.push_str("\n...");
            }
            return Ok(Some(prev));
        }
        self.import_rendered = true;
        let tag = match stmt.kind {
            StmtKind::ImportFrom { .. } => NodeTag::ImportFrom,
            _ => NodeTag::Import,
        };
        let text = self.text().stmt(stmt);
        self.add_linked(tag, text, ShapeKind::Import, prev, scope)
    }

    /// Connect `prev` to `end` once the budget runs out. Later unwinding
    /// levels leave the graph alone.
    fn report_exhausted(&mut self, current: NodeId) {
        if self.exhausted_reported {
            return;
        }
        self.exhausted_reported = true;
        let end = self.graph.end();
        let label = format!("Max node limit {} exceeded", self.config.limits.max_nodes);
        self.connect_labeled(current, end, &label);
    }

    /// Fold `text` into `prev` when both are simple statements of the same
    /// scope. Returns whether it did.
    pub fn try_consolidate(&mut self, prev: NodeId, scope: &Scope, text: &str) -> bool {
        if !self.config.merge_common_nodes {
            return false;
        }
        let Some(node) = self.graph.node_mut(prev) else {
            return false;
        };
        if node.scope.as_ref() != Some(scope) {
            return false;
        }
        const BLOCKERS: [&str; 5] = ["if", "for", "while", "Call:", "return"];
        if BLOCKERS.iter().any(|blocker| node.text.contains(blocker)) {
            return false;
        }
        let simple = node.text.contains("print(")
            || (node.text.contains('=') && !(node.text.contains('(') && node.text.contains(')')))
            || node.tag == NodeTag::AugAssign;
        if !simple {
            return false;
        }
        node.text = format!("{}\n{text}", node.text);
        true
    }
}

#[cfg(test)]
mod tests;
