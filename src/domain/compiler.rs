use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::api::descriptor_dto::DescriptorDto;
use crate::domain::graph::WorkflowGraph;
use crate::domain::resolver::resolve_contracts;
use crate::domain::synthesizer::Artifact;
use crate::domain::synthesizer::descriptor::to_descriptor;
use crate::domain::synthesizer::launch::{LaunchPlan, LauncherConfig, to_launch_plan};
use crate::domain::validator::check_cycles;
use crate::error::{Error, Result};
use crate::loader::workflow_loader::WorkflowDefinition;

/// How much contract checking the workflow gets.
///
/// Every level except `None` runs the resolver at compile time, the level itself is handed to the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterLevel {
    #[default]
    None,
    DeclarationOnly,
    /// The runtime checks the exchanged data again.
    DeclarationAndExecutable,
    /// Link processes check the data they forward as well.
    Everywhere,
}

impl FilterLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterLevel::None => "NONE",
            FilterLevel::DeclarationOnly => "DECLARATION_ONLY",
            FilterLevel::DeclarationAndExecutable => "DECLARATION_AND_EXECUTABLE",
            FilterLevel::Everywhere => "EVERYWHERE",
        }
    }

    pub fn resolves_contracts(&self) -> bool {
        *self != FilterLevel::None
    }
}

impl FromStr for FilterLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "NONE" => Ok(FilterLevel::None),
            "DECLARATION_ONLY" => Ok(FilterLevel::DeclarationOnly),
            "DECLARATION_AND_EXECUTABLE" => Ok(FilterLevel::DeclarationAndExecutable),
            "EVERYWHERE" => Ok(FilterLevel::Everywhere),
            _ => Err(Error::ModelConstructionError(format!("Unknown filter level '{}'", s))),
        }
    }
}

impl fmt::Display for FilterLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Settings of one compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Base name of the descriptor (`<name>.json`) and of the script (`<name>.sh`).
    pub name: String,
    pub output_dir: PathBuf,
    pub filter_level: FilterLevel,
    pub launcher: LauncherConfig,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self { name: "workflow".to_string(), output_dir: PathBuf::from("."), filter_level: FilterLevel::default(), launcher: LauncherConfig::default() }
    }
}

impl CompileOptions {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), ..Self::default() }
    }

    pub fn with_filter_level(mut self, filter_level: FilterLevel) -> Self {
        self.filter_level = filter_level;
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_launcher(mut self, launcher: LauncherConfig) -> Self {
        self.launcher = launcher;
        self
    }

    /// Takes the name and filter level of a loaded description. `name` and `filter_level` override them when given.
    pub fn for_definition(self, definition: &WorkflowDefinition, name: Option<&str>, filter_level: Option<FilterLevel>) -> Self {
        Self {
            name: name.unwrap_or(&definition.name).to_string(),
            filter_level: filter_level.or(definition.filter_level).unwrap_or_default(),
            ..self
        }
    }
}

/// Everything a successful compilation produced, nothing written yet.
#[derive(Debug, Clone)]
pub struct CompiledWorkflow {
    pub name: String,
    pub descriptor: DescriptorDto,
    pub launch: LaunchPlan,

    /// Non-fatal conditions found while building and resolving.
    pub warnings: Vec<String>,
}

impl CompiledWorkflow {
    pub fn descriptor_file_name(&self) -> String {
        format!("{}.json", self.name)
    }

    pub fn script_file_name(&self) -> String {
        format!("{}.sh", self.name)
    }

    pub fn descriptor_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.descriptor)?)
    }

    /// The descriptor followed by the launch script and its side files.
    pub fn artifacts(&self) -> Result<Vec<Artifact>> {
        let mut artifacts = vec![Artifact::text(&self.descriptor_file_name(), self.descriptor_json()?)];
        artifacts.extend(self.launch.artifacts.iter().cloned());
        Ok(artifacts)
    }

    /// Writes every artifact into `dir`, scripts with execute permission.
    pub fn write_to(&self, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        let artifacts = self.artifacts()?;
        fs::create_dir_all(dir)?;

        let mut written = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            let path = dir.join(&artifact.file_name);
            fs::write(&path, &artifact.contents)?;
            if artifact.executable {
                make_executable(&path)?;
            }
            log::info!("Wrote '{}'", path.display());
            written.push(path);
        }
        Ok(written)
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o555);
    fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Runs re-ranking, contract resolution, cycle validation and synthesis, in this order.
///
/// Nothing is written; see [`process_graph`].
pub fn compile(mut graph: WorkflowGraph, options: &CompileOptions) -> Result<CompiledWorkflow> {
    if graph.node_count() == 0 {
        return Err(Error::ModelConstructionError(format!("Workflow '{}' has no node", options.name)));
    }
    log::info!("Compiling workflow '{}' with {} nodes and {} edges", options.name, graph.node_count(), graph.edge_count());
    let mut warnings = graph.warnings().to_vec();

    if graph.finalize_ranking() {
        log::info!("Topologies were re-ranked after a host subset was derived");
    }

    let resolution = if options.filter_level.resolves_contracts() {
        let resolution = resolve_contracts(&graph)?;
        warnings.extend(resolution.warnings.iter().cloned());
        Some(resolution)
    } else {
        log::info!("Filter level {} skips contract resolution", options.filter_level);
        None
    };

    check_cycles(&graph)?;

    let descriptor = to_descriptor(&graph, resolution.as_ref(), options.filter_level)?;
    let launch = to_launch_plan(&graph, &format!("{}.json", options.name), &format!("{}.sh", options.name), &options.launcher)?;

    log::info!("Compiled workflow '{}' with {} warnings", options.name, warnings.len());
    Ok(CompiledWorkflow { name: options.name.clone(), descriptor, launch, warnings })
}

/// Compiles the graph and writes its artifacts into the output directory.
pub fn process_graph(graph: WorkflowGraph, options: &CompileOptions) -> Result<CompiledWorkflow> {
    let compiled = compile(graph, options)?;
    compiled.write_to(&options.output_dir)?;
    Ok(compiled)
}
