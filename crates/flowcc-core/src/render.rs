//! Mermaid text and the JSON metadata sidecar.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::collapse::CollapsedSubgraph;
use crate::config::{FlowConfig, ViewMode};
use crate::entry::{EntryKind, EntrySelection, LineMap};
use crate::graph::{Edge, FlowGraph, Node};
use crate::scope::Scope;

const INDENT: &str = "    ";

/// Make text safe inside a quoted Mermaid label.
pub fn escape_label(text: &str) -> String {
    text.replace('<', "&lt")
        .replace('>', "&gt")
        .replace('"', "'")
        .replace('\n', "\\n")
}

pub fn node_declaration(node: &Node) -> String {
    let (open, close) = node.shape.delimiters();
    format!("{}{open}{}{close}", node.ident, escape_label(&node.text))
}

pub fn edge_line(graph: &FlowGraph, edge: &Edge) -> String {
    let arrow = edge.direction.arrow();
    let (from, to) = (graph.ident(edge.from), graph.ident(edge.to));
    match &edge.label {
        Some(label) => format!("{INDENT}{from} {arrow}|{label}| {to}"),
        None => format!("{INDENT}{from} {arrow} {to}"),
    }
}

pub struct Renderer<'a> {
    graph: &'a FlowGraph,
    collapsed: &'a BTreeMap<Scope, CollapsedSubgraph>,
    view_mode: ViewMode,
}

impl<'a> Renderer<'a> {
    pub fn new(
        graph: &'a FlowGraph,
        collapsed: &'a BTreeMap<Scope, CollapsedSubgraph>,
        view_mode: ViewMode,
    ) -> Self {
        Self {
            graph,
            collapsed,
            view_mode,
        }
    }

    pub fn render(&self) -> String {
        let mut lines = vec!["graph TD".to_string()];
        lines.extend(self.graph.nodes().map(|node| format!("\t{}", node_declaration(node))));
        lines.extend(self.regions());
        lines.extend(self.graph.edges().iter().map(|edge| edge_line(self.graph, edge)));
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }

    /// Region blocks: main first, then classes, then functions that no
    /// other scope calls.
    fn regions(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut visited = BTreeSet::new();
        let live = self.graph.live_scopes();

        self.region(&Scope::Main, "", &mut visited, &mut out);

        let classes: BTreeSet<Scope> = live
            .iter()
            .filter_map(|scope| scope.owning_class().map(Scope::class))
            .collect();
        for class in &classes {
            self.region(class, "", &mut visited, &mut out);
        }

        let nested: BTreeSet<&Scope> = self.graph.scope_children().values().flatten().collect();
        for scope in &live {
            if matches!(scope, Scope::Function(_) | Scope::CallInstance { .. }) && !nested.contains(scope) {
                self.region(scope, "", &mut visited, &mut out);
            }
        }
        out
    }

    fn children(&self, scope: &Scope) -> BTreeSet<Scope> {
        let mut children: BTreeSet<Scope> = self.graph.children_of(scope).cloned().collect();
        if let Scope::Class(class) = scope {
            children.extend(
                self.graph
                    .live_scopes()
                    .into_iter()
                    .filter(|s| s.is_method() && s.owning_class() == Some(class.as_str())),
            );
        }
        children
    }

    fn hides_empty_constructor(&self, scope: &Scope, nodes: &[&Node]) -> bool {
        matches!(self.view_mode, ViewMode::Terse | ViewMode::Compact)
            && scope.is_constructor()
            && nodes.iter().all(|node| node.is_bypass())
    }

    fn region(&self, scope: &Scope, indent: &str, visited: &mut BTreeSet<Scope>, out: &mut Vec<String>) {
        if !visited.insert(scope.clone()) {
            return;
        }
        let nodes: Vec<&Node> = self
            .graph
            .nodes_in_scope(scope)
            .into_iter()
            .filter_map(|id| self.graph.node(id))
            .collect();
        if self.hides_empty_constructor(scope, &nodes) {
            return;
        }

        if let Some(collapsed) = self.collapsed.get(scope) {
            out.push(format!("{indent}subgraph \"{}\"", collapsed.subgraph_name));
            if let Some(node) = self.graph.node(collapsed.placeholder) {
                out.push(format!("{indent}{INDENT}{}", node_declaration(node)));
            }
            out.push(format!("{indent}end"));
            return;
        }

        let children = self.children(scope);
        let is_class = matches!(scope, Scope::Class(_));
        if nodes.is_empty() && !is_class {
            for child in &children {
                self.region(child, indent, visited, out);
            }
            return;
        }

        let title = scope.title();
        if let Some(title) = &title {
            out.push(format!("{indent}subgraph \"{title}\""));
        }
        for node in &nodes {
            out.push(format!("{indent}{INDENT}{}", node_declaration(node)));
        }
        let child_indent = format!("{indent}{INDENT}");
        for child in &children {
            self.region(child, &child_indent, visited, out);
        }
        if title.is_some() {
            out.push(format!("{indent}end"));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubgraphStatus {
    Collapsed,
    Expanded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubgraphInfo {
    pub node_count: usize,
    pub original_scope: String,
    pub subgraph_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapsed_node_id: Option<String>,
    pub scope_nodes: Vec<String>,
    pub status: SubgraphStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub name: Option<String>,
    pub class: Option<String>,
    /// Line of the entry definition in the unsliced file.
    pub line_offset: Option<u32>,
}

impl EntryInfo {
    pub fn from_selection(entry: &EntrySelection) -> Option<Self> {
        let kind = entry.kind?;
        let lookup_key = match (entry.class.as_deref(), entry.name.as_deref()) {
            (Some(class), Some(name)) => Some(format!("{class}.{name}")),
            (Some(class), None) => Some(class.to_string()),
            (None, Some(name)) => Some(name.to_string()),
            (None, None) => None,
        };
        let line_offset = lookup_key.and_then(|key| entry.line_map.get(&key).copied());
        Some(Self {
            kind,
            name: entry.name.clone(),
            class: entry.class.clone(),
            line_offset,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub collapsed_subgraphs: BTreeMap<String, SubgraphInfo>,
    pub expanded_subgraphs: BTreeMap<String, SubgraphInfo>,
    pub subgraph_status_map: BTreeMap<String, SubgraphInfo>,
    pub all_subgraphs: Vec<String>,
    pub file_path: Option<String>,
    pub name_to_line_map: LineMap,
    pub subgraph_whitelist: Vec<String>,
    pub force_collapse_list: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_selection: Option<EntryInfo>,
}

impl Metadata {
    pub fn build(
        graph: &FlowGraph,
        collapsed: &BTreeMap<Scope, CollapsedSubgraph>,
        config: &FlowConfig,
        entry: &EntrySelection,
    ) -> Self {
        let mut meta = Self::from_inputs(config, entry);

        for info in collapsed.values() {
            meta.collapsed_subgraphs.insert(
                info.scope.key(),
                SubgraphInfo {
                    node_count: info.node_count,
                    original_scope: info.scope.key(),
                    subgraph_name: info.subgraph_name.clone(),
                    collapsed_node_id: Some(info.placeholder_ident.clone()),
                    scope_nodes: info.scope_nodes.clone(),
                    status: SubgraphStatus::Collapsed,
                },
            );
        }

        let live: BTreeSet<Scope> = graph
            .live_scopes()
            .into_iter()
            .filter(|scope| *scope != Scope::Main)
            .collect();
        for scope in live.iter().filter(|scope| !collapsed.contains_key(*scope)) {
            let scope_nodes: Vec<String> = graph
                .nodes_in_scope(scope)
                .into_iter()
                .map(|id| graph.ident(id).to_string())
                .collect();
            meta.expanded_subgraphs.insert(
                scope.key(),
                SubgraphInfo {
                    node_count: scope_nodes.len(),
                    original_scope: scope.key(),
                    subgraph_name: scope.describe(scope_nodes.len()),
                    collapsed_node_id: None,
                    scope_nodes,
                    status: SubgraphStatus::Expanded,
                },
            );
        }

        meta.subgraph_status_map = meta
            .expanded_subgraphs
            .iter()
            .chain(&meta.collapsed_subgraphs)
            .map(|(key, info)| (key.clone(), info.clone()))
            .collect();
        let all: BTreeSet<String> = live.iter().map(Scope::key).collect();
        meta.all_subgraphs = all.into_iter().collect();
        meta
    }

    /// Metadata carrying only what the caller supplied; used when no graph
    /// could be built.
    pub fn from_inputs(config: &FlowConfig, entry: &EntrySelection) -> Self {
        Self {
            file_path: entry.file_path.clone(),
            name_to_line_map: entry.line_map.clone(),
            subgraph_whitelist: config.subgraph_whitelist.iter().cloned().collect(),
            force_collapse_list: config.force_collapse_list.iter().cloned().collect(),
            entry_selection: EntryInfo::from_selection(entry),
            ..Self::default()
        }
    }

    pub fn to_json_pretty(&self) -> flowcc_error::Result<String> {
        serde_json::to_string_pretty(self).map_err(|err| {
            flowcc_error::Error::serialization_failed(err.to_string())
                .with_operation("metadata::to_json_pretty")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeDirection, NodeTag, ShapeKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_escape_label() {
        assert_eq!(escape_label("if a < b and c > \"d\""), "if a &lt b and c &gt 'd'");
        assert_eq!(escape_label("x = 1\ny = 2"), "x = 1\\ny = 2");
    }

    #[test]
    fn test_render_main_and_function_regions() {
        let mut graph = FlowGraph::new(20);
        let call = graph
            .add_node(NodeTag::Call, "Call: greet()", ShapeKind::Call, Some(Scope::Main))
            .unwrap();
        let body = graph
            .add_node(NodeTag::Print, "print(`hi`)", ShapeKind::Statement, Some(Scope::function("greet")))
            .unwrap();
        graph.add_child_scope(Scope::Main, Scope::function("greet"));
        graph.connect(graph.start(), call);
        graph.connect(call, body);
        graph.add_edge(Edge::new(body, graph.end()).with_label("done"));

        let collapsed = BTreeMap::new();
        let text = Renderer::new(&graph, &collapsed, ViewMode::Detailed).render();
        let expected = [
            "graph TD",
            "\tstart1[Start]",
            "\tend2[End]",
            "\tcall3[[\"Call: greet()\"]]",
            "\tprint4[\"print(`hi`)\"]",
            "    call3[[\"Call: greet()\"]]",
            "    subgraph \"Function: greet()\"",
            "        print4[\"print(`hi`)\"]",
            "    end",
            "    start1 --> call3",
            "    call3 --> print4",
            "    print4 -->|done| end2",
            "",
        ]
        .join("\n");
        assert_eq!(text, expected);
    }

    #[test]
    fn test_render_class_nests_methods() {
        let mut graph = FlowGraph::new(20);
        let create = graph
            .add_node(NodeTag::Assign, "car = Car()", ShapeKind::Statement, Some(Scope::Main))
            .unwrap();
        let init = graph
            .add_node(NodeTag::Method, "Constructor: __init__()", ShapeKind::Call, Some(Scope::method("Car", "__init__")))
            .unwrap();
        graph.add_edge(
            Edge::new(create, init)
                .with_label("Call and Return")
                .with_direction(EdgeDirection::CallAndReturn),
        );
        let collapsed = BTreeMap::new();
        let text = Renderer::new(&graph, &collapsed, ViewMode::Detailed).render();
        assert!(text.contains("subgraph \"Class: Car\"\n    subgraph \"Method: __init__\"\n        method4[[\"Constructor: __init__()\"]]\n    end\nend"));
        assert!(text.contains("    assign3 <-->|Call and Return| method4"));
    }

    #[test]
    fn test_terse_skips_blank_constructor() {
        let mut graph = FlowGraph::new(20);
        let init = graph
            .add_node(NodeTag::Method, "", ShapeKind::Merge, Some(Scope::method("Car", "__init__")))
            .unwrap();
        graph.connect(graph.start(), init);
        let collapsed = BTreeMap::new();
        let terse = Renderer::new(&graph, &collapsed, ViewMode::Terse).render();
        assert!(!terse.contains("Method: __init__"));
        let detailed = Renderer::new(&graph, &collapsed, ViewMode::Detailed).render();
        assert!(detailed.contains("Method: __init__"));
    }

    #[test]
    fn test_metadata_shape() {
        let mut graph = FlowGraph::new(20);
        graph
            .add_node(NodeTag::Assign, "x = 1", ShapeKind::Statement, Some(Scope::function("f")))
            .unwrap();
        let mut line_map = LineMap::new();
        line_map.insert("f".into(), 3);
        let entry = EntrySelection::function("f")
            .with_file_path("demo.py")
            .with_line_map(line_map);
        let config = FlowConfig::default().with_whitelist(["f"]);
        let meta = Metadata::build(&graph, &BTreeMap::new(), &config, &entry);

        assert_eq!(meta.all_subgraphs, vec!["f".to_string()]);
        let info = &meta.expanded_subgraphs["f"];
        assert_eq!(info.subgraph_name, "Function: f() (1 nodes)");
        assert_eq!(info.scope_nodes, vec!["assign3".to_string()]);
        assert_eq!(meta.subgraph_status_map.len(), 1);
        assert_eq!(meta.entry_selection.as_ref().and_then(|e| e.line_offset), Some(3));

        let json: serde_json::Value = serde_json::from_str(&meta.to_json_pretty().unwrap()).unwrap();
        assert_eq!(json["expanded_subgraphs"]["f"]["status"], "expanded");
        assert_eq!(json["entry_selection"]["type"], "function");
        assert_eq!(json["subgraph_whitelist"][0], "f");
        assert_eq!(json["file_path"], "demo.py");
    }
}
