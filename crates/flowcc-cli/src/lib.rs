//! flowcc command-line interface.
//!
pub mod options;

use std::path::Path;

use anyhow::Context;
use flowcc_core::{EntrySelection, FlowConfig, Flowchart};
use flowcc_error::{Error, Result};

pub use options::{DiagramOptions, EntryOptions, FlowccOptions};

/// Defaults, then the TOML file, then the environment.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<FlowConfig> {
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            FlowConfig::from_toml_str(&text)
                .with_context(|| format!("failed to parse config file {}", path.display()))?
        }
        None => FlowConfig::default(),
    };
    config.apply_env();
    Ok(config)
}

/// Build the diagram for `opts` without writing anything.
pub fn generate(opts: &FlowccOptions) -> Result<Flowchart> {
    let source = std::fs::read_to_string(&opts.file).map_err(|err| {
        Error::from(err)
            .with_operation("cli::generate")
            .with_context("path", opts.file.display().to_string())
    })?;

    let mut config = load_config(opts.config.as_deref()).map_err(|err| {
        Error::config_invalid(format!("{err:#}")).with_operation("cli::load_config")
    })?;
    opts.diagram.apply(&mut config);

    let mut entry = EntrySelection::from_env_with(|key| std::env::var(key).ok())
        .with_file_path(opts.file.display().to_string());
    opts.entry.apply(&mut entry);

    tracing::debug!(file = %opts.file.display(), view = %config.view_mode, "generating flowchart");
    flowcc_py::render_source(&source, &config, &entry)
}

/// Main entry point: generate, then write the diagram and metadata.
pub fn run(opts: &FlowccOptions) -> Result<()> {
    let chart = generate(opts)?;

    match &opts.output {
        Some(path) => {
            std::fs::write(path, &chart.diagram)?;
            tracing::info!(path = %path.display(), "diagram written");
        }
        None => print!("{}", chart.diagram),
    }

    if let Some(path) = &opts.metadata {
        std::fs::write(path, chart.metadata.to_json_pretty()?)?;
        tracing::info!(path = %path.display(), "metadata written");
    }
    Ok(())
}
