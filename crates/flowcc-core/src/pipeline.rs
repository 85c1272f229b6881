//! End-to-end generation: build, optimize, collapse, filter, render.

use crate::ast::Program;
use crate::builder::GraphBuilder;
use crate::collapse::CollapseManager;
use crate::config::FlowConfig;
use crate::entry::EntrySelection;
use crate::optimize;
use crate::render::{Metadata, Renderer};

/// Diagram emitted when the source could not be processed at all.
pub const ERROR_DIAGRAM: &str = "graph TD\n    error[\"Error processing code\"]\n";

#[derive(Debug, Clone, PartialEq)]
pub struct Flowchart {
    pub diagram: String,
    pub metadata: Metadata,
}

pub fn error_flowchart() -> Flowchart {
    Flowchart {
        diagram: ERROR_DIAGRAM.to_string(),
        metadata: Metadata::default(),
    }
}

/// Turn a program into Mermaid text plus metadata. Never fails: anything
/// the builder cannot follow shows up as warning or error nodes.
pub fn generate(program: &Program, config: &FlowConfig, entry: &EntrySelection) -> Flowchart {
    let mut graph = GraphBuilder::new(config, entry).build(program);
    optimize::eliminate_bypass_nodes(&mut graph);

    let collapsed = CollapseManager::new(config, entry).collapse(&mut graph);
    optimize::apply_view_mode(&mut graph, config.view_mode);
    if config.prune_unused_nodes {
        optimize::prune_unreferenced_nodes(&mut graph);
    }
    optimize::drop_dangling_edges(&mut graph);

    let diagram = Renderer::new(&graph, &collapsed, config.view_mode).render();
    let metadata = Metadata::build(&graph, &collapsed, config, entry);
    tracing::info!(
        nodes = graph.node_count(),
        edges = graph.edges().len(),
        collapsed = collapsed.len(),
        "flowchart generated"
    );
    Flowchart { diagram, metadata }
}
