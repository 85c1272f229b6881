mod entry;
mod lower;

pub use entry::{line_mapping, slice_for_entry};
pub use lower::{parse_program, parse_tree};

use flowcc_core::{EntrySelection, FlowConfig, Flowchart, error_flowchart, generate};
use flowcc_error::Result;

/// Source text in, diagram out.
///
/// Source that does not parse yields the error diagram instead of an error;
/// only a bad entry selection is reported to the caller.
pub fn render_source(source: &str, config: &FlowConfig, entry: &EntrySelection) -> Result<Flowchart> {
    let line_map = match line_mapping(source) {
        Ok(map) => map,
        Err(err) => {
            tracing::warn!(error = %err, "source does not parse");
            return Ok(error_flowchart());
        }
    };
    let entry = entry.clone().with_line_map(line_map);
    let sliced = slice_for_entry(source, &entry)?;
    match parse_program(&sliced) {
        Ok(program) => Ok(generate(&program, config, &entry)),
        Err(err) => {
            tracing::warn!(error = %err, "source does not parse");
            Ok(error_flowchart())
        }
    }
}
