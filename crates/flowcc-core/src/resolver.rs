//! Light receiver typing for method-call splicing.
//!
//! Only what the walk has seen is known: variables bound by `x = C(...)`,
//! constructor parameters fed from typed arguments, and `self.attr`
//! assignments. A miss is never an error; the builder shows a warning node.

use std::collections::{BTreeMap, BTreeSet};

use crate::ast::Expr;
use crate::scope::Scope;

type Bindings = BTreeMap<String, String>;

#[derive(Debug, Default, Clone)]
pub struct TypeResolver {
    classes: BTreeSet<String>,
    variable_types: Bindings,
    parameter_types: BTreeMap<Scope, Bindings>,
    attribute_types: BTreeMap<Scope, Bindings>,
}

impl TypeResolver {
    pub fn new<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            classes: classes.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn is_class(&self, name: &str) -> bool {
        self.classes.contains(name)
    }

    pub fn bind_variable(&mut self, var: &str, class: &str) {
        tracing::trace!(var, class, "bind variable");
        self.variable_types.insert(var.to_string(), class.to_string());
    }

    pub fn variable_class(&self, var: &str) -> Option<&str> {
        self.variable_types.get(var).map(String::as_str)
    }

    pub fn bind_parameter(&mut self, scope: Scope, param: &str, class: &str) {
        self.parameter_types
            .entry(scope)
            .or_default()
            .insert(param.to_string(), class.to_string());
    }

    pub fn parameter_class(&self, scope: &Scope, param: &str) -> Option<&str> {
        lookup(&self.parameter_types, scope, param)
    }

    pub fn bind_attribute(&mut self, scope: Scope, attr: &str, class: &str) {
        tracing::trace!(scope = %scope, attr, class, "bind attribute");
        self.attribute_types
            .entry(scope)
            .or_default()
            .insert(attr.to_string(), class.to_string());
    }

    pub fn attribute_class(&self, scope: &Scope, attr: &str) -> Option<&str> {
        lookup(&self.attribute_types, scope, attr)
    }

    /// Record `self.a = p` when `p` has a known parameter type here, and
    /// `self.a = C(...)` when `C` is a known class.
    pub fn record_assignment(&mut self, target: &Expr, value: &Expr, scope: &Scope) {
        let Some(attr) = target.self_attribute() else {
            return;
        };
        let class = match value {
            Expr::Name(param) => self.parameter_class(scope, param).map(str::to_string),
            Expr::Call(call) => call
                .func_name()
                .filter(|name| self.is_class(name))
                .map(str::to_string),
            _ => None,
        };
        if let Some(class) = class {
            self.bind_attribute(scope.clone(), attr, &class);
        }
    }

    /// Map constructor parameters of `class` to the types of the positional
    /// arguments at an instantiation site.
    pub fn propagate_constructor_args(
        &mut self,
        class: &str,
        params: &[&str],
        args: &[Expr],
        scope: &Scope,
    ) {
        let init = Scope::method(class, "__init__");
        for (param, arg) in params.iter().zip(args) {
            let resolved = match arg {
                Expr::Name(var) => self.variable_class(var).map(str::to_string),
                Expr::Attribute { .. } => self.resolve_attribute(arg, scope),
                _ => None,
            };
            if let Some(resolved) = resolved {
                self.bind_parameter(init.clone(), param, &resolved);
            }
        }
    }

    /// The class a method receiver evaluates to, checked in order: a typed
    /// variable, a bare class name, a fresh `C(...)`, a typed `self.attr`,
    /// and finally `self` inside a method.
    pub fn resolve_receiver_class(&self, receiver: &Expr, scope: &Scope) -> Option<String> {
        let resolved = match receiver {
            Expr::Name(name) => self
                .variable_class(name)
                .map(str::to_string)
                .or_else(|| self.is_class(name).then(|| name.clone())),
            Expr::Call(call) => call
                .func_name()
                .filter(|name| self.is_class(name))
                .map(str::to_string),
            Expr::Attribute { .. } => self.resolve_attribute(receiver, scope),
            _ => None,
        };
        resolved.or_else(|| match (receiver, scope) {
            (Expr::Name(name), Scope::Method { class, .. }) if name == "self" => Some(class.clone()),
            _ => None,
        })
    }

    fn resolve_attribute(&self, expr: &Expr, scope: &Scope) -> Option<String> {
        let attr = expr.self_attribute()?;
        if let Some(class) = self.attribute_class(scope, attr) {
            return Some(class.to_string());
        }
        let Scope::Method { class, .. } = scope else {
            return None;
        };
        let init = Scope::method(class.as_str(), "__init__");
        if let Some(found) = self.attribute_class(&init, attr) {
            return Some(found.to_string());
        }
        self.attribute_types
            .iter()
            .filter(|(s, _)| s.is_method() && s.owning_class() == Some(class.as_str()))
            .find_map(|(_, bindings)| bindings.get(attr).cloned())
    }
}

fn lookup<'a>(map: &'a BTreeMap<Scope, Bindings>, scope: &Scope, key: &str) -> Option<&'a str> {
    map.get(scope).and_then(|b| b.get(key)).map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> TypeResolver {
        TypeResolver::new(["Car", "Engine", "Design"])
    }

    #[test]
    fn test_variable_then_class_name() {
        let mut r = resolver();
        r.bind_variable("car", "Car");
        assert_eq!(r.resolve_receiver_class(&Expr::name("car"), &Scope::Main).as_deref(), Some("Car"));
        assert_eq!(r.resolve_receiver_class(&Expr::name("Engine"), &Scope::Main).as_deref(), Some("Engine"));
        assert_eq!(r.resolve_receiver_class(&Expr::name("unknown"), &Scope::Main), None);
    }

    #[test]
    fn test_fresh_instantiation() {
        let r = resolver();
        let receiver = Expr::call(Expr::name("Car"), vec![]);
        assert_eq!(r.resolve_receiver_class(&receiver, &Scope::Main).as_deref(), Some("Car"));
        let receiver = Expr::call(Expr::name("make"), vec![]);
        assert_eq!(r.resolve_receiver_class(&receiver, &Scope::Main), None);
    }

    #[test]
    fn test_self_attribute_lookup_order() {
        let mut r = resolver();
        let init = Scope::method("Car", "__init__");
        let drive = Scope::method("Car", "drive");
        let tune = Scope::method("Car", "tune");

        r.bind_parameter(init.clone(), "engine", "Engine");
        r.record_assignment(
            &Expr::attr(Expr::name("self"), "engine"),
            &Expr::name("engine"),
            &init,
        );
        r.record_assignment(
            &Expr::attr(Expr::name("self"), "design"),
            &Expr::call(Expr::name("Design"), vec![]),
            &tune,
        );

        let engine = Expr::attr(Expr::name("self"), "engine");
        let design = Expr::attr(Expr::name("self"), "design");
        assert_eq!(r.resolve_receiver_class(&engine, &drive).as_deref(), Some("Engine"));
        assert_eq!(r.resolve_receiver_class(&design, &drive).as_deref(), Some("Design"));
        assert_eq!(r.resolve_receiver_class(&design, &Scope::Main), None);
    }

    #[test]
    fn test_self_falls_back_to_enclosing_class() {
        let r = resolver();
        let scope = Scope::method("Car", "drive");
        assert_eq!(r.resolve_receiver_class(&Expr::name("self"), &scope).as_deref(), Some("Car"));
        assert_eq!(r.resolve_receiver_class(&Expr::name("self"), &Scope::Main), None);
    }

    #[test]
    fn test_constructor_propagation() {
        let mut r = resolver();
        r.bind_variable("e", "Engine");
        let args = vec![Expr::name("e"), Expr::int(4)];
        r.propagate_constructor_args("Car", &["engine", "wheels"], &args, &Scope::Main);
        let init = Scope::method("Car", "__init__");
        assert_eq!(r.parameter_class(&init, "engine"), Some("Engine"));
        assert_eq!(r.parameter_class(&init, "wheels"), None);
    }
}
