use std::path::Path;

use crate::domain::compiler::{CompileOptions, CompiledWorkflow, process_graph};
use crate::error::Result;
use crate::loader::workflow_loader::load_workflow;

pub mod api;
pub mod domain;
pub mod error;
pub mod loader;
pub mod logger;

pub use crate::domain::compiler::{FilterLevel, compile};
pub use crate::domain::graph::WorkflowGraph;

/// Loads a workflow description, compiles it and writes the descriptor, the launch script and its side files.
///
/// The `name` and `filterLevel` of the file are used unless the `name` and `filter_level` arguments are given.
pub fn compile_workflow_file(file_path: impl AsRef<Path>, name: Option<&str>, filter_level: Option<FilterLevel>, options: CompileOptions) -> Result<CompiledWorkflow> {
    let definition = load_workflow(file_path)?;
    log::info!("Workflow description loaded successfully.");

    let options = options.for_definition(&definition, name, filter_level);
    process_graph(definition.graph, &options)
}
