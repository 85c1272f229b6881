//! Line mapping and entry-point slicing of Python source.

use flowcc_core::{EntryKind, EntrySelection, LineMap};
use flowcc_error::{Error, Result};
use tree_sitter::Node;

use crate::lower::{Lowerer, check_syntax, definition, line, named, parse_tree};

/// Top-level functions and classes, plus `Class.method` for every method,
/// mapped to the 1-based line of their `def`/`class` keyword.
pub fn line_mapping(source: &str) -> Result<LineMap> {
    let tree = parse_tree(source)?;
    let root = tree.root_node();
    check_syntax(root)?;
    let lowerer = Lowerer {
        source: source.as_bytes(),
    };

    let mut map = LineMap::new();
    for node in named(root).into_iter().map(definition) {
        let Some(name) = node.child_by_field_name("name").map(|n| lowerer.text(n)) else {
            continue;
        };
        match node.kind() {
            "function_definition" => {
                map.insert(name.to_string(), line(node));
            }
            "class_definition" => {
                map.insert(name.to_string(), line(node));
                for method in class_methods(node) {
                    if let Some(method_name) = method.child_by_field_name("name") {
                        map.insert(format!("{name}.{}", lowerer.text(method_name)), line(method));
                    }
                }
            }
            _ => {}
        }
    }
    Ok(map)
}

fn class_methods(class: Node<'_>) -> Vec<Node<'_>> {
    class
        .child_by_field_name("body")
        .map(|body| {
            named(body)
                .into_iter()
                .map(definition)
                .filter(|member| member.kind() == "function_definition")
                .collect()
        })
        .unwrap_or_default()
}

/// Reduce `source` to what the entry needs: every top-level definition and
/// one call line that starts the flow at the entry. File entries, and no
/// entry at all, keep the source unchanged.
pub fn slice_for_entry(source: &str, entry: &EntrySelection) -> Result<String> {
    let name = entry.name.as_deref();
    let class = entry.class.as_deref();
    let call_line = match (entry.kind, name, class) {
        (None | Some(EntryKind::File), _, _) => return Ok(source.to_string()),
        (Some(_), Some(name), Some(class)) => format!("{class}.{name}()"),
        (Some(EntryKind::Function), Some(name), None) => format!("{name}()"),
        (Some(EntryKind::Class), None, Some(class)) => format!("{class}()"),
        (Some(kind), _, _) => {
            return Err(Error::invalid_argument(format!("a {kind} entry needs a name"))
                .with_operation("py::slice_for_entry"));
        }
    };

    let tree = parse_tree(source)?;
    let root = tree.root_node();
    check_syntax(root)?;
    let lowerer = Lowerer {
        source: source.as_bytes(),
    };

    let definitions: Vec<Node<'_>> = named(root)
        .into_iter()
        .map(definition)
        .filter(|node| matches!(node.kind(), "function_definition" | "class_definition"))
        .collect();
    let defines = |kind: &str, wanted: &str| {
        definitions.iter().find(|node| {
            node.kind() == kind
                && node.child_by_field_name("name").map(|n| lowerer.text(n)) == Some(wanted)
        })
    };
    let found = match (name, class) {
        (Some(name), Some(class)) => defines("class_definition", class).is_some_and(|node| {
            class_methods(*node)
                .iter()
                .any(|method| method.child_by_field_name("name").map(|n| lowerer.text(n)) == Some(name))
        }),
        (Some(name), None) => defines("function_definition", name).is_some(),
        (None, Some(class)) => defines("class_definition", class).is_some(),
        (None, None) => false,
    };
    if !found {
        let wanted = call_line.trim_end_matches("()").to_string();
        return Err(Error::entry_not_found(wanted).with_operation("py::slice_for_entry"));
    }

    let mut sliced: Vec<&str> = definitions.iter().map(|node| lowerer.text(*node)).collect();
    sliced.push(&call_line);
    tracing::debug!(entry = %call_line, definitions = definitions.len(), "sliced source for entry");
    Ok(format!("{}\n", sliced.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SOURCE: &str = "import os\n\ndef helper():\n    return 1\n\nclass Car:\n    def drive(self):\n        helper()\n\n    @property\n    def speed(self):\n        return 3\n\nprint(helper())\n";

    #[test]
    fn test_line_mapping() {
        let map = line_mapping(SOURCE).unwrap();
        assert_eq!(map.get("helper"), Some(&3));
        assert_eq!(map.get("Car"), Some(&6));
        assert_eq!(map.get("Car.drive"), Some(&7));
        assert_eq!(map.get("Car.speed"), Some(&11));
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn test_file_entry_keeps_source() {
        let entry = EntrySelection::file("demo.py");
        assert_eq!(slice_for_entry(SOURCE, &entry).unwrap(), SOURCE);
        assert_eq!(slice_for_entry(SOURCE, &EntrySelection::default()).unwrap(), SOURCE);
    }

    #[test]
    fn test_function_entry() {
        let sliced = slice_for_entry(SOURCE, &EntrySelection::function("helper")).unwrap();
        assert!(sliced.starts_with("def helper():\n    return 1\nclass Car:\n"));
        assert!(sliced.ends_with("        return 3\nhelper()\n"));
        assert!(!sliced.contains("import os"));
        assert!(!sliced.contains("print("));
    }

    #[test]
    fn test_class_and_method_entries() {
        let class = slice_for_entry(SOURCE, &EntrySelection::class("Car")).unwrap();
        assert!(class.ends_with("\nCar()\n"));
        let method = slice_for_entry(SOURCE, &EntrySelection::method("Car", "drive")).unwrap();
        assert!(method.ends_with("\nCar.drive()\n"));
    }

    #[test]
    fn test_missing_entry() {
        let err = slice_for_entry(SOURCE, &EntrySelection::function("nope")).unwrap_err();
        assert_eq!(err.kind(), flowcc_error::ErrorKind::EntryNotFound);
        let err = slice_for_entry(SOURCE, &EntrySelection::method("Car", "fly")).unwrap_err();
        assert_eq!(err.kind(), flowcc_error::ErrorKind::EntryNotFound);
    }
}
