//! Classes, instantiation and method splicing.

use crate::ast::{Call, ClassDef, Expr};
use crate::graph::{BudgetExhausted, NodeId, NodeTag, ShapeKind};
use crate::scope::Scope;

use super::{BuilderContext, Flow, MethodEntry, MethodKey};

/// Result of routing `recv.m(...)` to a method body.
enum MethodOutcome {
    /// The method was drawn; `exit` is where sequential flow resumes.
    Spliced { exit: NodeId },
    /// An error or warning node was drawn instead.
    Diagnostic(NodeId),
}

impl<'a, 'p> BuilderContext<'a, 'p> {
    /// A class definition leaves an unconnected anchor in its scope.
    pub(super) fn visit_class(&mut self, def: &ClassDef, prev: NodeId) -> Flow {
        let scope = Scope::class(def.name.as_str());
        self.add_node(NodeTag::ClassAnchor, " ", ShapeKind::Statement, Some(&scope))?;
        Ok(Some(prev))
    }

    /// `C(...)` on its own line.
    pub(super) fn visit_instantiation(
        &mut self,
        class: &str,
        call: &Call,
        text: &str,
        prev: NodeId,
        scope: &Scope,
    ) -> Flow {
        let node = self.add_node(NodeTag::Instantiate, format!("Create: {text}"), ShapeKind::Call, Some(scope))?;
        self.connect(prev, node);
        self.propagate_constructor(class, call, scope);
        if self.defs.method(class, "__init__").is_some() {
            self.splice_method(class, "__init__", node)?;
        } else if let Some(&anchor) = self.graph.nodes_in_scope(&Scope::class(class)).first() {
            self.connect_labeled(node, anchor, "Instantiate");
        }
        Ok(Some(node))
    }

    /// `x = C(...)`: the assignment node, the variable's type, then the
    /// constructor.
    pub(super) fn visit_instance_assign(
        &mut self,
        target: &Expr,
        class: &str,
        call: &Call,
        text: String,
        prev: NodeId,
        scope: &Scope,
    ) -> Flow {
        let node = self.add_node(NodeTag::Assign, text, ShapeKind::Statement, Some(scope))?;
        self.connect(prev, node);
        if let Some(var) = target.as_name() {
            self.resolver.bind_variable(var, class);
        }
        self.propagate_constructor(class, call, scope);
        if self.defs.method(class, "__init__").is_some() {
            self.splice_method(class, "__init__", node)?;
        }
        Ok(Some(node))
    }

    fn propagate_constructor(&mut self, class: &str, call: &Call, scope: &Scope) {
        if let Some(init) = self.defs.method(class, "__init__") {
            let params = init.visible_params();
            self.resolver
                .propagate_constructor_args(class, &params, &call.args, scope);
        }
    }

    /// `recv.m(...)` as an expression statement.
    pub(super) fn visit_method_call(
        &mut self,
        receiver: &Expr,
        method: &str,
        text: &str,
        prev: NodeId,
        scope: &Scope,
    ) -> Flow {
        let node = self.add_node(NodeTag::MethodCall, format!("Call: {text}"), ShapeKind::Call, Some(scope))?;
        self.connect(prev, node);
        if !self.config.show_classes {
            return Ok(Some(node));
        }
        match self.route_method(receiver, method, node, scope)? {
            MethodOutcome::Spliced { exit } if self.config.sequential_flow && exit != node => Ok(Some(exit)),
            MethodOutcome::Spliced { .. } => Ok(Some(node)),
            MethodOutcome::Diagnostic(diagnostic) => Ok(Some(diagnostic)),
        }
    }

    /// `y = recv.m(...)`.
    pub(super) fn visit_method_assign(
        &mut self,
        receiver: &Expr,
        method: &str,
        text: String,
        prev: NodeId,
        scope: &Scope,
    ) -> Flow {
        let node = self.add_node(NodeTag::Assign, text, ShapeKind::Statement, Some(scope))?;
        self.connect(prev, node);

        if method == "__init__"
            && let Expr::Call(inner) = receiver
            && let Some(class) = inner.func_name().filter(|name| self.is_class(name))
        {
            if self.defs.method(class, "__init__").is_some() {
                self.splice_method(class, "__init__", node)?;
            }
            let text = format!("⚠️ Redundant __init__ call: {class}() already calls constructor");
            let warning = self.diagnostic(NodeTag::Warning, text, node, scope)?;
            return Ok(Some(warning));
        }

        match self.route_method(receiver, method, node, scope)? {
            MethodOutcome::Spliced { exit } => {
                if self.config.sequential_flow && exit != node {
                    self.connect(exit, node);
                }
                Ok(Some(node))
            }
            MethodOutcome::Diagnostic(diagnostic) => Ok(Some(diagnostic)),
        }
    }

    /// Resolve the receiver's class and splice the method, or explain why
    /// that is not possible with an error or warning node.
    fn route_method(
        &mut self,
        receiver: &Expr,
        method: &str,
        caller: NodeId,
        scope: &Scope,
    ) -> Result<MethodOutcome, BudgetExhausted> {
        let Some(class) = self.resolver.resolve_receiver_class(receiver, scope) else {
            tracing::debug!(method, "unresolved method receiver");
            let text = format!("❌ Could not resolve class for method '{method}'");
            return Ok(MethodOutcome::Diagnostic(self.diagnostic(NodeTag::Error, text, caller, scope)?));
        };
        let Some(def) = self.defs.method(&class, method) else {
            let is_property = self
                .defs
                .classes
                .get(class.as_str())
                .is_some_and(|def| def.data_attributes().contains(method));
            let (tag, text) = if is_property {
                (NodeTag::Warning, format!("⚠️ '{method}' is a property, not a method"))
            } else {
                (NodeTag::Error, format!("❌ Method '{method}' not found in {class}"))
            };
            return Ok(MethodOutcome::Diagnostic(self.diagnostic(tag, text, caller, scope)?));
        };

        let static_call = receiver
            .as_name()
            .is_some_and(|name| name == class && self.resolver.variable_class(name).is_none());
        if static_call && def.first_param() == Some("self") && !self.entry.is_class_entry() {
            let text = format!("❌ Instance method '{method}' called on class '{class}' without instantiation");
            return Ok(MethodOutcome::Diagnostic(self.diagnostic(NodeTag::Error, text, caller, scope)?));
        }

        let exit = self.splice_method(&class, method, caller)?;
        Ok(MethodOutcome::Spliced { exit })
    }

    fn diagnostic(&mut self, tag: NodeTag, text: String, caller: NodeId, scope: &Scope) -> Result<NodeId, BudgetExhausted> {
        let node = self.add_node(tag, text, ShapeKind::Exception, Some(scope))?;
        self.connect(caller, node);
        Ok(node)
    }

    /// Draw the call edge into `class.method`, walking its body the first
    /// time. Returns the node the caller's flow resumes at in sequential
    /// mode: the last recorded return, else the method's last node.
    pub(super) fn splice_method(&mut self, class: &str, method: &str, caller: NodeId) -> Result<NodeId, BudgetExhausted> {
        let key = MethodKey {
            class: class.to_string(),
            method: method.to_string(),
        };
        let scope = Scope::method(class, method);

        if let Some(cached) = self.methods.get(&key).copied() {
            self.connect_method(caller, cached.entry);
            self.method_last.insert(caller, cached.last);
            return Ok(self.method_exit(&scope).unwrap_or(cached.last));
        }

        let Some(def) = self.defs.method(class, method) else {
            return Ok(caller);
        };
        let params = def.visible_params().join(", ");
        let text = if scope.is_constructor() {
            format!("Constructor: __init__({params})")
        } else {
            format!("Method: {method}({params})")
        };
        let entry = self.add_node(NodeTag::Method, text, ShapeKind::Call, Some(&scope))?;
        self.methods.insert(key.clone(), MethodEntry { entry, last: entry });
        self.connect_method(caller, entry);
        self.graph.add_child_scope(Scope::class(class), scope.clone());
        tracing::trace!(scope = %scope, "method subgraph");

        let body_end = self.enter_method(|cx| cx.process_list(&def.body, entry, &scope, None))?;
        let last = body_end.unwrap_or(entry);
        if let Some(cached) = self.methods.get_mut(&key) {
            cached.last = last;
        }
        self.method_last.insert(caller, last);
        Ok(self.method_exit(&scope).unwrap_or(last))
    }

    fn method_exit(&self, scope: &Scope) -> Option<NodeId> {
        if !self.config.sequential_flow {
            return None;
        }
        self.method_exits.get(scope).and_then(|exits| exits.last().copied())
    }
}
