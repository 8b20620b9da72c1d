use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use libmerge_merger::{MergeConfig, Merger};
use libmerge_syntax::SymbolPolicy;
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

mod config;
mod report;

pub use config::{FileConfig, CONFIG_FILE_NAME};

fn print_stdout(text: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    print_stdout(&text)
}

#[derive(Parser)]
#[command(name = "libmerge")]
#[command(about = "Inline Python library imports into a single submittable file", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: ./libmerge.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Workspace root; relative imports may not climb above it
    #[arg(long, global = true)]
    workspace_root: Option<PathBuf>,

    /// Library directory whose name is the importable package (e.g. contest/lib)
    #[arg(long, global = true)]
    library_root: Option<PathBuf>,

    /// Glob of files allowed to degrade instead of failing (repeatable)
    #[arg(long = "lenient", global = true, value_name = "GLOB")]
    lenient: Vec<String>,

    /// Inline exactly the imported names, without same-module dependencies
    #[arg(long, global = true)]
    exact_symbols: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge one file and print (or write) the result
    Merge(MergeArgs),

    /// Merge <contest>/<problem>/<problem>.py into the output directory
    Bundle(BundleArgs),

    /// Show how each top-level import of a file resolves
    Imports(ImportsArgs),
}

#[derive(Args)]
struct MergeArgs {
    /// File to merge
    file: PathBuf,

    /// Write the merged code here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print a JSON report (merged text, modules, notes)
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct BundleArgs {
    /// Contest id (directory under the contest dir)
    contest: String,

    /// Problem id
    problem: String,

    /// Print a JSON report instead of the output path
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ImportsArgs {
    /// File to inspect
    file: PathBuf,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

pub fn main_entry() -> Result<()> {
    let mut cli = Cli::parse();

    // Keep stdout clean for JSON parsing
    let json_output = match &cli.command {
        Commands::Merge(args) => args.json,
        Commands::Bundle(args) => args.json,
        Commands::Imports(args) => args.json,
    };
    if json_output {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let cwd = env::current_dir().context("Failed to read current directory")?;
    let config = load_config(&cli, &cwd)?;

    match cli.command {
        Commands::Merge(args) => run_merge(args, &config, &cwd)?,
        Commands::Bundle(args) => run_bundle(args, &config)?,
        Commands::Imports(args) => run_imports(args, &config, &cwd)?,
    }

    Ok(())
}

/// File configuration with command-line overrides applied
fn load_config(cli: &Cli, cwd: &Path) -> Result<FileConfig> {
    let mut config = FileConfig::load(cli.config.as_deref(), cwd)?;
    apply_overrides(&mut config.merge, cli, cwd);
    config
        .merge
        .validate()
        .map_err(anyhow::Error::msg)
        .context("Invalid merge configuration")?;
    Ok(config)
}

fn apply_overrides(merge: &mut MergeConfig, cli: &Cli, cwd: &Path) {
    if let Some(root) = &cli.workspace_root {
        merge.workspace_root = config::absolutize(root, cwd);
    }
    if let Some(lib) = &cli.library_root {
        merge.library_root = config::absolutize(lib, cwd);
    }
    merge.lenient_fixtures.extend(cli.lenient.iter().cloned());
    if cli.exact_symbols {
        merge.symbol_policy = SymbolPolicy::Exact;
    }
}

fn run_merge(args: MergeArgs, config: &FileConfig, cwd: &Path) -> Result<()> {
    let merger = Merger::new(config.merge.clone())?;
    let file = config::absolutize(&args.file, cwd);
    let outcome = merger
        .merge_detailed(&file)
        .with_context(|| format!("Failed to merge {}", args.file.display()))?;

    if let Some(path) = &args.output {
        write_file(path, &outcome.text)?;
        log::info!("Wrote {}", path.display());
    }

    if args.json {
        print_json(&outcome)?;
    } else if args.output.is_none() {
        print_stdout(&outcome.text)?;
    }
    Ok(())
}

fn run_bundle(args: BundleArgs, config: &FileConfig) -> Result<()> {
    let source = config.problem_source(&args.contest, &args.problem);
    if !source.is_file() {
        anyhow::bail!("Problem source not found: {}", source.display());
    }

    let merger = Merger::new(config.merge.clone())?;
    let outcome = merger
        .merge_detailed(&source)
        .with_context(|| format!("Failed to merge {}", source.display()))?;

    let output = config.bundle_output(&args.problem);
    write_file(&output, &outcome.text)?;
    log::info!(
        "Bundled {}/{} into {}",
        args.contest,
        args.problem,
        output.display()
    );

    if args.json {
        print_json(&report::BundleReport::new(
            &args.contest,
            &args.problem,
            output,
            outcome,
        ))?;
    } else {
        print_stdout(&format!("{}\n", output.display()))?;
    }
    Ok(())
}

fn run_imports(args: ImportsArgs, config: &FileConfig, cwd: &Path) -> Result<()> {
    let merger = Merger::new(config.merge.clone())?;
    let file = config::absolutize(&args.file, cwd);
    let imports = merger
        .inspect_imports(&file)
        .with_context(|| format!("Failed to inspect {}", args.file.display()))?;

    if args.json {
        print_json(&report::ImportsReport { file, imports })?;
    } else {
        print_stdout(&report::render_imports(
            &imports,
            &config.merge.workspace_root,
        ))?;
    }
    Ok(())
}

fn write_file(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}
