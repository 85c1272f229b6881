use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::scope::Scope;

/// Top-level definition name (or `Class.method`) to its 1-based line.
pub type LineMap = BTreeMap<String, u32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Function,
    Class,
}

/// What the diagram is built for: a whole file, one function, one class or
/// one method (a function or class entry carrying both a name and a class).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntrySelection {
    pub kind: Option<EntryKind>,
    pub name: Option<String>,
    pub class: Option<String>,
    pub file_path: Option<String>,
    pub line_map: LineMap,
}

impl EntrySelection {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            kind: Some(EntryKind::File),
            file_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn function(name: impl Into<String>) -> Self {
        Self {
            kind: Some(EntryKind::Function),
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn class(name: impl Into<String>) -> Self {
        Self {
            kind: Some(EntryKind::Class),
            class: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn method(class: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            kind: Some(EntryKind::Class),
            name: Some(method.into()),
            class: Some(class.into()),
            ..Self::default()
        }
    }

    pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_line_map(mut self, line_map: LineMap) -> Self {
        self.line_map = line_map;
        self
    }

    /// Read `ENTRY_TYPE`, `ENTRY_NAME` and `ENTRY_CLASS` through `lookup`.
    /// Blank values count as unset; an unknown type is logged and dropped.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let kind = read("ENTRY_TYPE").and_then(|raw| match EntryKind::from_str(&raw) {
            Ok(kind) => Some(kind),
            Err(_) => {
                tracing::warn!(value = %raw, "ignoring unknown entry type");
                None
            }
        });
        Self {
            kind,
            name: read("ENTRY_NAME"),
            class: read("ENTRY_CLASS"),
            ..Self::default()
        }
    }

    pub fn is_class_entry(&self) -> bool {
        self.kind == Some(EntryKind::Class)
    }

    /// Whether `scope` is the region this entry asks for; such a region is
    /// never collapsed by size alone.
    pub fn protects(&self, scope: &Scope) -> bool {
        let name = self.name.as_deref();
        let class = self.class.as_deref();
        match (self.kind, scope) {
            (None | Some(EntryKind::File), _) => false,
            (_, Scope::Method { class: c, method }) => {
                name == Some(method.as_str()) && class == Some(c.as_str())
            }
            (Some(EntryKind::Function), Scope::Function(f))
            | (Some(EntryKind::Function), Scope::CallInstance { function: f, .. }) => {
                class.is_none() && name == Some(f.as_str())
            }
            (Some(EntryKind::Class), Scope::Class(c)) => name.is_none() && class == Some(c.as_str()),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_entry_kind_parse() {
        assert_eq!(EntryKind::from_str("function").ok(), Some(EntryKind::Function));
        assert_eq!(EntryKind::from_str("Class").ok(), Some(EntryKind::Class));
        assert_eq!(EntryKind::File.to_string(), "file");
        assert!(EntryKind::from_str("module").is_err());
    }

    #[test]
    fn test_protects() {
        let f = EntrySelection::function("fact");
        assert!(f.protects(&Scope::function("fact")));
        assert!(f.protects(&Scope::CallInstance {
            function: "fact".into(),
            index: 1
        }));
        assert!(!f.protects(&Scope::function("other")));

        let c = EntrySelection::class("Car");
        assert!(c.protects(&Scope::class("Car")));
        assert!(!c.protects(&Scope::method("Car", "drive")));

        let m = EntrySelection::method("Car", "drive");
        assert!(m.protects(&Scope::method("Car", "drive")));
        assert!(!m.protects(&Scope::class("Car")));

        assert!(!EntrySelection::file("a.py").protects(&Scope::function("fact")));
        assert!(!EntrySelection::default().protects(&Scope::Main));
    }

    #[test]
    fn test_from_env() {
        let vars: HashMap<&str, &str> =
            [("ENTRY_TYPE", "class"), ("ENTRY_NAME", " "), ("ENTRY_CLASS", "Car")].into();
        let entry = EntrySelection::from_env_with(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(entry.kind, Some(EntryKind::Class));
        assert_eq!(entry.name, None);
        assert_eq!(entry.class.as_deref(), Some("Car"));

        let entry = EntrySelection::from_env_with(|k| (k == "ENTRY_TYPE").then(|| "bogus".to_string()));
        assert_eq!(entry.kind, None);
    }
}
