pub mod ast;
pub mod builder;
pub mod collapse;
pub mod config;
pub mod entry;
pub mod graph;
pub mod optimize;
pub mod pipeline;
pub mod render;
pub mod resolver;
pub mod scope;

pub use ast::{Program, Stmt, StmtKind};
pub use builder::GraphBuilder;
pub use collapse::{CollapseManager, CollapsedSubgraph};
pub use config::{FlowConfig, FlowLimits, ViewMode};
pub use entry::{EntryKind, EntrySelection, LineMap};
pub use graph::{Edge, EdgeDirection, FlowGraph, Node, NodeId, NodeTag, ShapeKind};
pub use pipeline::{ERROR_DIAGRAM, Flowchart, error_flowchart, generate};
pub use render::{Metadata, Renderer, SubgraphInfo, SubgraphStatus};
pub use resolver::TypeResolver;
pub use scope::Scope;
