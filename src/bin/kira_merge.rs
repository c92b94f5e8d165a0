use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_merge::app::{App, BuildOptions, BuildResult, DiscoverResult, ProgressSinkKind};
use kira_merge::config::{ConfigLoader, ResolvedConfig, load_tables};
use kira_merge::error::KiraError;
use kira_merge::host::ScriptHost;
use kira_merge::output::{ConsoleSink, JsonOutput, OutputMode};
use kira_merge::planner::PlannedAction;
use kira_merge::registry::DataRegistry;
use kira_merge::store::{Store, WriteSummary};

#[derive(Parser)]
#[command(name = "kira-merge")]
#[command(about = "Plan merge scripts that gather sample data slots into step outputs")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Resolve the merge parameters and plan one script per sample or project")]
    Plan(PlanArgs),
    #[command(about = "List the source slots basic mode would merge")]
    Discover(DiscoverArgs),
    #[command(about = "Print the effective lookup tables")]
    Tables(TablesArgs),
}

#[derive(Args)]
struct PlanArgs {
    #[arg(long)]
    config: Option<String>,

    /// Sample registry, overrides the config value.
    #[arg(long)]
    registry: Option<Utf8PathBuf>,

    /// Extra lookup tables merged over the built-ins.
    #[arg(long)]
    tables: Option<Utf8PathBuf>,

    /// Where `--write` puts scripts, registry and manifest. Defaults to the step directory.
    #[arg(long)]
    out: Option<Utf8PathBuf>,

    #[arg(long)]
    write: bool,

    /// Fail when any warning is raised.
    #[arg(long)]
    strict: bool,
}

#[derive(Args)]
struct DiscoverArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    registry: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct TablesArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    tables: Option<Utf8PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    if error.is_configuration() {
        return 2;
    }
    match error {
        KiraError::MissingConfig => 2,
        KiraError::NothingToMerge
        | KiraError::SourceNotFound { .. }
        | KiraError::ScopeNotInferable(_)
        | KiraError::UnknownSourceType(_)
        | KiraError::AmbiguousExtension { .. }
        | KiraError::UnknownExtension { .. }
        | KiraError::WarningsDenied(_) => 3,
        KiraError::EmptySlot { .. }
        | KiraError::AmbiguousImport { .. }
        | KiraError::DuplicateTarget { .. }
        | KiraError::DuplicateScript { .. } => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::Plan(args) => run_plan(args, output_mode),
        Commands::Discover(args) => run_discover(args, output_mode),
        Commands::Tables(args) => run_tables(args),
    }
}

fn run_plan(args: PlanArgs, output_mode: OutputMode) -> miette::Result<()> {
    let mut resolved = ConfigLoader::resolve(args.config.as_deref())?;
    if let Some(registry) = args.registry {
        resolved.registry = registry;
    }
    if let Some(tables) = args.tables {
        resolved.tables = Some(tables);
    }

    let registry = DataRegistry::load(&resolved.registry)?;
    let app = App::new(resolved.load_tables()?, resolved.settings.clone());
    let mut host = host_for(&resolved, args.write);
    let options = BuildOptions {
        strict: args.strict,
    };

    let result = match output_mode {
        OutputMode::Interactive => {
            let sink = ConsoleSink::new(ProgressSinkKind::Build);
            app.build(registry, resolved.params.clone(), &mut host, options, &sink)?
        }
        OutputMode::NonInteractive => {
            app.build(registry, resolved.params.clone(), &mut host, options, &JsonOutput)?
        }
    };

    let written = if args.write {
        let root = args.out.unwrap_or_else(|| resolved.base_dir.clone());
        Some(Store::new(root).write_build(&result, host.stamped())?)
    } else {
        None
    };

    match output_mode {
        OutputMode::Interactive => print_build_summary(&result, written.as_ref()),
        OutputMode::NonInteractive => {
            JsonOutput::print_build(&result).into_diagnostic()?;
            if let Some(summary) = &written {
                JsonOutput::print_written(summary).into_diagnostic()?;
            }
        }
    }
    Ok(())
}

fn run_discover(args: DiscoverArgs, output_mode: OutputMode) -> miette::Result<()> {
    let resolved = ConfigLoader::resolve(args.config.as_deref())?;
    let registry_path = args.registry.unwrap_or_else(|| resolved.registry.clone());
    let registry = DataRegistry::load(&registry_path)?;
    let app = App::new(resolved.load_tables()?, resolved.settings.clone());

    match output_mode {
        OutputMode::Interactive => {
            let sink = ConsoleSink::new(ProgressSinkKind::Discover);
            let result = app.discover(&registry, &resolved.params, &sink);
            print_discover_summary(&result);
        }
        OutputMode::NonInteractive => {
            let result = app.discover(&registry, &resolved.params, &JsonOutput);
            JsonOutput::print_discover(&result).into_diagnostic()?;
        }
    }
    Ok(())
}

fn run_tables(args: TablesArgs) -> miette::Result<()> {
    let tables = match args.tables {
        Some(path) => load_tables(Some(&path))?,
        None => match ConfigLoader::resolve(args.config.as_deref()) {
            Ok(resolved) => resolved.load_tables()?,
            Err(KiraError::MissingConfig) => load_tables(None)?,
            Err(err) => return Err(err.into()),
        },
    };
    JsonOutput::print_tables(&tables).into_diagnostic()?;
    Ok(())
}

fn host_for(resolved: &ResolvedConfig, create_dirs: bool) -> ScriptHost {
    ScriptHost::new(resolved.base_dir.clone())
        .with_local_dir(resolved.local_dir.clone())
        .with_sample_dirs(resolved.sample_dirs)
        .with_create_dirs(create_dirs)
}

fn print_build_summary(result: &BuildResult, written: Option<&WriteSummary>) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!("{cyan}KIRA-MERGE plan ({} mode){reset}", result.mode.as_str());
    println!("{green}Actions: {}{reset}", result.actions.len());
    println!("{yellow}Warnings: {}{reset}", result.warnings.len());

    for action in &result.actions {
        match action {
            PlannedAction::Convert(block) => {
                println!("{cyan}> {} ({} -> {}){reset}", block.key, block.source, block.target);
                println!("{cyan}  {}{reset}", block.command_line());
            }
            PlannedAction::Import {
                key,
                source,
                target,
                path,
            } => {
                println!("{green}= {key} ({source} -> {target}) imported {path}{reset}");
            }
            PlannedAction::Skip { key, source } => {
                println!("{yellow}- {key} ({source}) skipped{reset}");
            }
        }
    }

    for warning in &result.warnings {
        println!("{yellow}! {}{reset}", warning.message);
    }

    if let Some(summary) = written {
        println!(
            "{green}Wrote {} scripts, {} and {}{reset}",
            summary.scripts.len(),
            summary.registry,
            summary.manifest
        );
    }
}

fn print_discover_summary(result: &DiscoverResult) {
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";
    println!("{cyan}Source slots ({} mode): {}{reset}", result.mode.as_str(), result.slots.len());
    for slot in &result.slots {
        println!("  {} [{}]", slot.source, slot.scope);
    }
}
