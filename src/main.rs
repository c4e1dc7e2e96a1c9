use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use workflow_compiler::domain::compiler::{CompileOptions, compile};
use workflow_compiler::domain::synthesizer::launch::LauncherConfig;
use workflow_compiler::loader::workflow_loader::load_workflow;
use workflow_compiler::{FilterLevel, compile_workflow_file, logger};

/// Compiles a workflow description into a runtime descriptor and a launch script.
#[derive(Parser, Debug)]
#[command(name = "workflow_compiler", version, about)]
struct Cli {
    /// Workflow description file (JSON).
    file: PathBuf,

    /// Directory receiving the generated files.
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Base name of the generated files, defaults to the workflow name.
    #[arg(short, long)]
    name: Option<String>,

    /// NONE, DECLARATION_ONLY, DECLARATION_AND_EXECUTABLE or EVERYWHERE.
    #[arg(short, long)]
    filter_level: Option<FilterLevel>,

    /// Directory of the launcher, with a trailing separator.
    #[arg(long, default_value = "")]
    launcher_path: String,

    /// Options added to every launcher invocation.
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    launcher_opts: String,

    /// Run every check and print the descriptor without writing any file.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logger::init();

    let launcher = LauncherConfig { path: cli.launcher_path, options: cli.launcher_opts };
    let options = CompileOptions::default().with_output_dir(&cli.output_dir).with_launcher(launcher);

    if cli.dry_run {
        let definition = load_workflow(&cli.file).with_context(|| format!("Failed to load '{}'", cli.file.display()))?;
        let options = options.for_definition(&definition, cli.name.as_deref(), cli.filter_level);
        let compiled = compile(definition.graph, &options).context("Compilation failed")?;
        println!("{}", compiled.descriptor_json()?);
        log::info!("Dry run finished with {} warnings, nothing was written", compiled.warnings.len());
        return Ok(());
    }

    let compiled = compile_workflow_file(&cli.file, cli.name.as_deref(), cli.filter_level, options)
        .with_context(|| format!("Failed to compile '{}'", cli.file.display()))?;

    log::info!(
        "Workflow '{}' compiled as {} into '{}' ({} warnings)",
        compiled.name,
        compiled.launch.strategy,
        cli.output_dir.display(),
        compiled.warnings.len()
    );
    Ok(())
}
