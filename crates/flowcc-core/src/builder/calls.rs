//! Expression statements, assignments, returns and function splicing.

use std::collections::BTreeMap;

use crate::ast::{Call, Expr};
use crate::graph::{NodeId, NodeTag, ShapeKind};
use crate::scope::Scope;

use super::{BuilderContext, Flow};

const EXIT_FUNCTIONS: [&str; 4] = ["sys.exit", "os._exit", "exit", "quit"];

/// How a spliced call appears at its site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum CallSite {
    /// `f(x)` on its own line, drawn as `Call: f(x)`.
    Statement,
    /// `y = f(x)`, drawn with the assignment text.
    Assignment,
}

impl CallSite {
    fn shape(self) -> ShapeKind {
        match self {
            CallSite::Statement => ShapeKind::Call,
            CallSite::Assignment => ShapeKind::Statement,
        }
    }
}

fn is_exit_call(call: &Call) -> bool {
    call.dotted_name()
        .is_some_and(|name| EXIT_FUNCTIONS.contains(&name.as_str()))
}

impl<'a, 'p> BuilderContext<'a, 'p> {
    pub(super) fn visit_expr_stmt(&mut self, expr: &Expr, prev: NodeId, scope: &Scope) -> Flow {
        let call = match expr {
            Expr::Call(call) => call,
            Expr::Lambda { params, body } => {
                let text = self.text().lambda(params, body);
                return self.add_linked(NodeTag::Lambda, text, ShapeKind::Call, prev, scope);
            }
            Expr::Comprehension(comp) => {
                let text = self.text().comprehension(comp);
                return self.add_linked(NodeTag::Comprehension, text, ShapeKind::Call, prev, scope);
            }
            _ => {
                let text = self.text().expr(expr);
                return self.add_linked(NodeTag::Expr, text, ShapeKind::Statement, prev, scope);
            }
        };
        let text = self.text().expr(expr);

        if is_exit_call(call) {
            let node = self.add_node(NodeTag::ExitFunction, format!("Exit: {text}"), ShapeKind::Exit, Some(scope))?;
            self.connect(prev, node);
            return Ok(None);
        }
        if let Some((receiver, method)) = call.method() {
            return self.visit_method_call(receiver, method, &text, prev, scope);
        }
        match call.func_name() {
            Some("print") => self.visit_print(expr, call, prev, scope),
            Some(class) if self.is_class(class) => {
                if !self.config.show_classes {
                    return Ok(Some(prev));
                }
                self.visit_instantiation(class, call, &text, prev, scope)
            }
            _ if !self.config.show_functions => Ok(Some(prev)),
            Some(name) if self.is_function(name) => {
                self.splice_function(name, text, CallSite::Statement, prev, scope)
            }
            _ => self.add_linked(NodeTag::Expr, text, ShapeKind::Call, prev, scope),
        }
    }

    /// Inline the body of top-level function `name` after a call node.
    pub(super) fn splice_function(
        &mut self,
        name: &str,
        text: String,
        site: CallSite,
        prev: NodeId,
        scope: &Scope,
    ) -> Flow {
        let max_depth = self.config.limits.max_nesting_depth;
        if self.nesting_exceeded() {
            tracing::debug!(function = name, depth = self.depth, "nesting limit reached");
            let text = match site {
                CallSite::Statement => format!("Call: {text} (Max nesting depth {max_depth} exceeded)"),
                CallSite::Assignment => format!("{text}\n (Max nesting depth {max_depth} exceeded)"),
            };
            return self.add_linked(NodeTag::NestingLimit, text, site.shape(), prev, scope);
        }

        if matches!(scope, Scope::Function(current) if current == name) {
            let text = match site {
                CallSite::Statement => format!("Recursive Call: {text}"),
                CallSite::Assignment => text,
            };
            let node = self.add_node(NodeTag::RecursiveCall, text, site.shape(), Some(scope))?;
            self.connect(prev, node);
            if let Some(&start) = self.function_starts.get(name) {
                self.connect_labeled(node, start, "Recursion");
            }
            return Ok(Some(node));
        }

        let (tag, text) = match site {
            CallSite::Statement => (NodeTag::Call, format!("Call: {text}")),
            CallSite::Assignment => (NodeTag::Assign, text),
        };
        let call_node = self.add_node(tag, text, site.shape(), Some(scope))?;
        self.connect(prev, call_node);
        self.splice_body(name, Scope::function(name), call_node, scope)
    }

    /// Walk `name`'s body under `callee_scope`, returning the `end_call`
    /// merge its paths join at.
    fn splice_body(&mut self, name: &str, callee_scope: Scope, call_node: NodeId, scope: &Scope) -> Flow {
        let Some(def) = self.defs.functions.get(name).copied() else {
            return Ok(Some(call_node));
        };
        tracing::trace!(function = name, scope = %callee_scope, depth = self.depth, "splice");
        self.graph.add_child_scope(scope.clone(), callee_scope.clone());
        if matches!(callee_scope, Scope::Function(_)) {
            self.function_starts.insert(name.to_string(), call_node);
        }
        let end_call = self.add_merge(NodeTag::EndCall)?;
        let body_end = self.enter_call(end_call, |cx| {
            cx.process_list(&def.body, call_node, &callee_scope, None)
        })?;
        if let Some(end) = body_end {
            self.connect(end, end_call);
        }
        Ok(Some(end_call))
    }

    /// A print node, followed by one splice per known function called from
    /// its positional arguments.
    fn visit_print(&mut self, expr: &Expr, call: &Call, prev: NodeId, scope: &Scope) -> Flow {
        if !self.config.show_prints {
            return Ok(Some(prev));
        }
        let text = self.text().print(expr);
        let spliced: Vec<&Call> = call
            .args
            .iter()
            .flat_map(|arg| match arg {
                Expr::Call(inner) => vec![inner],
                Expr::FString { .. } => arg.calls(),
                _ => Vec::new(),
            })
            .filter(|inner| inner.func_name().is_some_and(|name| self.is_function(name)))
            .collect();

        if spliced.is_empty() && self.try_consolidate(prev, scope, &text) {
            return Ok(Some(prev));
        }
        let print = self.add_node(NodeTag::Print, text, ShapeKind::Statement, Some(scope))?;
        self.connect(prev, print);

        let max_depth = self.config.limits.max_nesting_depth;
        let mut counters: BTreeMap<&str, u32> = BTreeMap::new();
        let mut current = print;
        for inner in spliced {
            let Some(name) = inner.func_name() else {
                continue;
            };
            let index = counters.entry(name).or_default();
            *index += 1;
            let index = *index;
            let call_text = self.text().expr(&Expr::Call(inner.clone()));
            if self.nesting_exceeded() {
                let text = format!("Call: {call_text} (Max nesting depth {max_depth} exceeded)");
                let node = self.add_node(NodeTag::NestingLimit, text, ShapeKind::Call, Some(scope))?;
                self.connect(current, node);
                current = node;
                continue;
            }
            let node = self.add_node(NodeTag::Call, format!("Call: {call_text}"), ShapeKind::Call, Some(scope))?;
            self.connect(current, node);
            let instance = Scope::CallInstance {
                function: name.to_string(),
                index,
            };
            current = self.splice_body(name, instance, node, scope)?.unwrap_or(node);
        }
        Ok(Some(current))
    }

    pub(super) fn visit_assign(&mut self, targets: &[Expr], value: &Expr, prev: NodeId, scope: &Scope) -> Flow {
        if let [target] = targets {
            self.resolver.record_assignment(target, value, scope);
        }
        let text = self.text().assign(targets, value);

        if let ([target], Expr::Call(call)) = (targets, value) {
            if let Some((receiver, method)) = call.method() {
                if self.config.show_classes {
                    return self.visit_method_assign(receiver, method, text, prev, scope);
                }
            } else if let Some(name) = call.func_name() {
                if self.is_class(name) {
                    if self.config.show_classes {
                        return self.visit_instance_assign(target, name, call, text, prev, scope);
                    }
                } else if !self.config.show_functions {
                    return Ok(Some(prev));
                } else if self.is_function(name) {
                    return self.splice_function(name, text, CallSite::Assignment, prev, scope);
                }
            }
        }

        if !matches!(value, Expr::Call(_)) && self.try_consolidate(prev, scope, &text) {
            return Ok(Some(prev));
        }
        self.add_linked(NodeTag::Assign, text, ShapeKind::Statement, prev, scope)
    }

    pub(super) fn visit_aug_assign(
        &mut self,
        target: &Expr,
        op: &str,
        value: &Expr,
        prev: NodeId,
        scope: &Scope,
    ) -> Flow {
        let text = self.text().aug_assign(target, op, value);
        if !matches!(value, Expr::Call(_)) && self.try_consolidate(prev, scope, &text) {
            return Ok(Some(prev));
        }
        self.add_linked(NodeTag::AugAssign, text, ShapeKind::Statement, prev, scope)
    }

    /// Returns always end the branch. Outside methods the return node
    /// connects to the innermost `end_call`, or to `end` at top level.
    pub(super) fn visit_return(&mut self, value: Option<&Expr>, prev: NodeId, scope: &Scope) -> Flow {
        let text = self.text().return_stmt(value);
        let node = self.add_node(NodeTag::Return, text, ShapeKind::Statement, Some(scope))?;
        self.connect(prev, node);

        if let (Some(value), Scope::Function(name)) = (value, scope)
            && value.calls().iter().any(|call| call.func_name() == Some(name.as_str()))
        {
            if let Some(&start) = self.function_starts.get(name) {
                self.connect_labeled(node, start, "Recursion");
            }
            return Ok(None);
        }

        if let Some(Expr::Call(call)) = value
            && let Some((receiver, method)) = call.method()
            && self.config.show_classes
            && let Some(class) = self.resolver.resolve_receiver_class(receiver, scope)
            && self.defs.method(&class, method).is_some()
        {
            self.splice_method(&class, method, node)?;
        }

        if scope.is_method() {
            if self.config.sequential_flow {
                self.method_exits.entry(scope.clone()).or_default().push(node);
            }
        } else if let Some(&end_call) = self.calls.last() {
            self.connect(node, end_call);
        } else {
            let end = self.graph.end();
            self.connect(node, end);
        }
        Ok(None)
    }
}
