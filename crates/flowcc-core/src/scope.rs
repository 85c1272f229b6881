use std::fmt;

/// A named region of the diagram.
///
/// Ordering is derived, so a `BTreeSet<Scope>` iterates main first, then
/// functions, classes, methods and call instances, each sorted by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    Main,
    Function(String),
    Class(String),
    Method { class: String, method: String },
    /// One splice of a function called from inside a `print(...)`; `index`
    /// counts calls to the same function within that print, from 1.
    CallInstance { function: String, index: u32 },
}

impl Scope {
    pub fn function(name: impl Into<String>) -> Self {
        Scope::Function(name.into())
    }

    pub fn class(name: impl Into<String>) -> Self {
        Scope::Class(name.into())
    }

    pub fn method(class: impl Into<String>, method: impl Into<String>) -> Self {
        Scope::Method {
            class: class.into(),
            method: method.into(),
        }
    }

    /// String key used for metadata, placeholder ids and config lists.
    pub fn key(&self) -> String {
        match self {
            Scope::Main => "main".to_string(),
            Scope::Function(name) => name.clone(),
            Scope::Class(name) => format!("class_{name}"),
            Scope::Method { class, method } => format!("class_{class}_{method}"),
            Scope::CallInstance { function, index } => format!("{function}_call_{index}"),
        }
    }

    /// The class a class or method scope belongs to.
    pub fn owning_class(&self) -> Option<&str> {
        match self {
            Scope::Class(name) => Some(name),
            Scope::Method { class, .. } => Some(class),
            _ => None,
        }
    }

    /// The function whose body this scope walks, for recursion checks.
    pub fn function_name(&self) -> Option<&str> {
        match self {
            Scope::Function(name) => Some(name),
            Scope::CallInstance { function, .. } => Some(function),
            _ => None,
        }
    }

    pub fn is_method(&self) -> bool {
        matches!(self, Scope::Method { .. })
    }

    pub fn is_constructor(&self) -> bool {
        matches!(self, Scope::Method { method, .. } if method == "__init__")
    }

    /// Region header; main has none.
    pub fn title(&self) -> Option<String> {
        match self {
            Scope::Main => None,
            Scope::Function(name) => Some(format!("Function: {name}()")),
            Scope::Class(name) => Some(format!("Class: {name}")),
            Scope::Method { method, .. } => Some(format!("Method: {method}")),
            Scope::CallInstance { function, index } => {
                Some(format!("Function: {function}() - Call {index}"))
            }
        }
    }

    /// Region header with a node count, as shown on collapsed regions.
    pub fn describe(&self, node_count: usize) -> String {
        match self.title() {
            Some(title) => format!("{title} ({node_count} nodes)"),
            None => format!("Main Flow ({node_count} nodes)"),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_scope_keys() {
        assert_eq!(Scope::Main.key(), "main");
        assert_eq!(Scope::function("load").key(), "load");
        assert_eq!(Scope::class("Car").key(), "class_Car");
        assert_eq!(Scope::method("Car", "__init__").key(), "class_Car___init__");
        let instance = Scope::CallInstance {
            function: "square".into(),
            index: 2,
        };
        assert_eq!(instance.key(), "square_call_2");
    }

    #[test]
    fn test_scope_titles() {
        assert_eq!(Scope::Main.title(), None);
        assert_eq!(Scope::method("Car", "drive").title().as_deref(), Some("Method: drive"));
        assert_eq!(
            Scope::function("fact").describe(6),
            "Function: fact() (6 nodes)"
        );
        let instance = Scope::CallInstance {
            function: "f".into(),
            index: 1,
        };
        assert_eq!(instance.describe(3), "Function: f() - Call 1 (3 nodes)");
        assert_eq!(Scope::class("Car").describe(1), "Class: Car (1 nodes)");
    }

    #[test]
    fn test_scope_ordering_is_stable() {
        let scopes: BTreeSet<Scope> = [
            Scope::method("B", "run"),
            Scope::function("z"),
            Scope::Main,
            Scope::class("A"),
            Scope::function("a"),
        ]
        .into_iter()
        .collect();
        let keys: Vec<String> = scopes.iter().map(Scope::key).collect();
        assert_eq!(keys, vec!["main", "a", "z", "class_A", "class_B_run"]);
    }

    #[test]
    fn test_owning_class() {
        assert_eq!(Scope::method("Car", "drive").owning_class(), Some("Car"));
        assert_eq!(Scope::class("Car").owning_class(), Some("Car"));
        assert_eq!(Scope::function("drive").owning_class(), None);
        assert!(Scope::method("Car", "__init__").is_constructor());
    }
}
