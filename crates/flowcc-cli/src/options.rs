//! Command-line options for the `flowcc` binary.

use std::path::PathBuf;

use clap::{Args, Parser};
use flowcc_core::{EntryKind, EntrySelection, FlowConfig, ViewMode};

/// Which part of the file the diagram starts from.
#[derive(Args, Debug, Clone, Default)]
pub struct EntryOptions {
    /// Entry kind: 'file', 'function' or 'class'
    #[arg(long = "entry-type", value_name = "TYPE")]
    pub entry_type: Option<EntryKind>,

    /// Function or method name of the entry
    #[arg(long = "entry-name", value_name = "NAME")]
    pub entry_name: Option<String>,

    /// Class of the entry (for class and method entries)
    #[arg(long = "entry-class", value_name = "CLASS")]
    pub entry_class: Option<String>,
}

/// Overrides applied on top of defaults, config file and environment.
#[derive(Args, Debug, Clone, Default)]
pub struct DiagramOptions {
    /// Draw method calls as one-way edges into a separate exit node
    #[arg(long)]
    pub sequential_flow: bool,

    /// View mode: 'terse', 'compact' or 'detailed'
    #[arg(long = "view", value_name = "MODE")]
    pub view: Option<ViewMode>,

    /// Regions with more direct nodes than this collapse
    #[arg(long = "max-subgraph-nodes", value_name = "N")]
    pub max_subgraph_nodes: Option<usize>,

    #[arg(long = "max-nodes", value_name = "N")]
    pub max_nodes: Option<usize>,

    #[arg(long = "max-nesting-depth", value_name = "N")]
    pub max_nesting_depth: Option<usize>,

    /// Scopes that never collapse by size (comma separated)
    #[arg(long, value_name = "SCOPES", value_delimiter = ',')]
    pub whitelist: Vec<String>,

    /// Scopes that always collapse (comma separated)
    #[arg(long = "force-collapse", value_name = "SCOPES", value_delimiter = ',')]
    pub force_collapse: Vec<String>,
}

#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "flowcc",
    about = "flowcc: Python source in, Mermaid control-flow diagram out",
    version
)]
pub struct FlowccOptions {
    /// Python file to convert
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    #[command(flatten)]
    pub entry: EntryOptions,

    #[command(flatten)]
    pub diagram: DiagramOptions,

    /// TOML file with diagram options
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output file path (writes to file instead of stdout)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Write the subgraph metadata JSON here
    #[arg(long = "metadata", value_name = "FILE")]
    pub metadata: Option<PathBuf>,
}

impl FlowccOptions {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            ..Self::default()
        }
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn with_metadata(mut self, path: impl Into<PathBuf>) -> Self {
        self.metadata = Some(path.into());
        self
    }

    pub fn with_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.config = Some(path.into());
        self
    }

    pub fn with_entry(mut self, kind: EntryKind, name: Option<&str>, class: Option<&str>) -> Self {
        self.entry = EntryOptions {
            entry_type: Some(kind),
            entry_name: name.map(str::to_string),
            entry_class: class.map(str::to_string),
        };
        self
    }

    pub fn with_max_subgraph_nodes(mut self, max: usize) -> Self {
        self.diagram.max_subgraph_nodes = Some(max);
        self
    }
}

impl DiagramOptions {
    /// Flags win over everything loaded before them.
    pub fn apply(&self, config: &mut FlowConfig) {
        if self.sequential_flow {
            config.sequential_flow = true;
        }
        if let Some(mode) = self.view {
            config.view_mode = mode;
        }
        if let Some(max) = self.max_subgraph_nodes {
            config.limits.max_subgraph_nodes = max;
        }
        if let Some(max) = self.max_nodes {
            config.limits.max_nodes = max;
        }
        if let Some(max) = self.max_nesting_depth {
            config.limits.max_nesting_depth = max;
        }
        config.subgraph_whitelist.extend(self.whitelist.iter().cloned());
        config.force_collapse_list.extend(self.force_collapse.iter().cloned());
    }
}

impl EntryOptions {
    /// Flags override the matching `ENTRY_*` variables one field at a time.
    pub fn apply(&self, entry: &mut EntrySelection) {
        if self.entry_type.is_some() {
            entry.kind = self.entry_type;
        }
        if self.entry_name.is_some() {
            entry.name = self.entry_name.clone();
        }
        if self.entry_class.is_some() {
            entry.class = self.entry_class.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_flags() {
        let opts = FlowccOptions::try_parse_from([
            "flowcc",
            "demo.py",
            "--sequential-flow",
            "--view",
            "simple",
            "--whitelist",
            "a,b",
            "--force-collapse",
            "class_Car",
            "--entry-type",
            "function",
            "--entry-name",
            "main",
            "-o",
            "out.mmd",
        ])
        .unwrap();
        assert_eq!(opts.file, PathBuf::from("demo.py"));
        assert_eq!(opts.output, Some(PathBuf::from("out.mmd")));

        let mut config = FlowConfig::default();
        opts.diagram.apply(&mut config);
        assert!(config.sequential_flow);
        assert_eq!(config.view_mode, ViewMode::Compact);
        assert!(config.subgraph_whitelist.contains("a") && config.subgraph_whitelist.contains("b"));
        assert!(config.force_collapse_list.contains("class_Car"));

        let mut entry = EntrySelection::default();
        opts.entry.apply(&mut entry);
        assert_eq!(entry, EntrySelection::function("main"));
    }

    #[test]
    fn test_missing_file_argument() {
        assert!(FlowccOptions::try_parse_from(["flowcc"]).is_err());
    }
}
