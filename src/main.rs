use std::path::{Path, PathBuf};

use agmip_harmonize::aggregation::DomainArtifacts;
use agmip_harmonize::batch::{discover_inputs, run_batch};
use agmip_harmonize::config::load_domain_config;
use agmip_harmonize::decomposition::{decompose_all, discover_drivers, effects_to_frame, DecompositionOptions};
use agmip_harmonize::emissions::run_emissions_calcs;
use agmip_harmonize::frame::{file_stem, read_canonical_csv, write_csv, write_records};
use agmip_harmonize::land::run_land_calcs;
use agmip_harmonize::merge::{default_merge_name, default_raw_merge_name, merge_files, merge_raw};
use agmip_harmonize::percent_change::pc_diff_file;
use agmip_harmonize::run_log::TIMESTAMP_FORMAT;
use agmip_harmonize::{
    logging, DomainConfig, HarmonizeError, PercentChangeOptions, Pipeline, PipelineConfig, RawCsvReader, RunLog,
    Template,
};
use anyhow::{bail, Context};
use chrono::Local;
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Harmonize AgMIP model submissions")]
struct Cli {
    #[arg(long, global = true, help = "Pipeline settings (JSON)")]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        default_value = "VariableUnitValueTable.csv",
        help = "Variable/unit template (CSV export)"
    )]
    template: PathBuf,

    #[arg(long, global = true, default_value = "info", help = "Log level when RUST_LOG is unset")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the full pipeline on one raw file
    Run(RunArgs),
    /// Run the pipeline on every submission in a directory
    Batch(BatchArgs),
    /// Combine several files into one dataset
    Merge(MergeArgs),
    /// Percent-change engine on a canonical CSV
    PcDiff(PcDiffArgs),
    /// Emissions aggregation on a percent-change file
    Emissions(DomainArgs),
    /// Land aggregation on a percent-change file
    Land(DomainArgs),
    /// Driver decomposition on a canonical CSV
    Decompose(DecomposeArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(help = "Raw submission CSV")]
    file: PathBuf,

    #[arg(long, help = "Raw layout; overrides raw_format from the config")]
    format: Option<String>,
}

#[derive(Debug, Args)]
struct BatchArgs {
    #[arg(help = "Directory holding raw submissions")]
    dir: PathBuf,

    #[arg(long, help = "Worker threads; overrides workers from the config")]
    workers: Option<usize>,

    #[arg(long, help = "Raw layout; overrides raw_format from the config")]
    format: Option<String>,
}

#[derive(Debug, Args)]
struct MergeArgs {
    #[arg(required = true, help = "Files to merge, in order")]
    files: Vec<PathBuf>,

    #[arg(short, long, help = "Output path (default: output/ beside the first file, dated name)")]
    output: Option<PathBuf>,

    #[arg(long, help = "Inputs are raw submissions; later models replace earlier ones")]
    raw: bool,

    #[arg(long, help = "Drop every record whose key occurs more than once")]
    drop_duplicates: bool,
}

#[derive(Debug, Args)]
struct PcDiffArgs {
    #[arg(help = "Canonical CSV with header")]
    file: PathBuf,

    #[arg(long, help = "Output directory (default: pc-diff beside the input)")]
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct DomainArgs {
    #[arg(help = "Percent-change CSV")]
    file: PathBuf,

    #[arg(long, help = "Per-model settings (JSON)")]
    models: PathBuf,

    #[arg(long, help = "Keep only each model's reference and end years")]
    endpoints_only: bool,
}

#[derive(Debug, Args)]
struct DecomposeArgs {
    #[arg(help = "Canonical CSV with header")]
    file: PathBuf,

    #[arg(long = "driver", help = "Driver to decompose (repeatable; default: all found)")]
    drivers: Vec<String>,

    #[arg(long, help = "Divide effects by the full change")]
    normalized: bool,

    #[arg(short, long, help = "Output path (default: <stem>_decomposition.csv)")]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Run(args) => handle_run(&cli.template, config, args),
        Command::Batch(args) => handle_batch(&cli.template, config, args),
        Command::Merge(args) => handle_merge(&config, args),
        Command::PcDiff(args) => handle_pc_diff(&config, args),
        Command::Emissions(args) => handle_domain(&config, args, run_emissions_calcs),
        Command::Land(args) => handle_domain(&config, args, run_land_calcs),
        Command::Decompose(args) => handle_decompose(&config, args),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn load_template(path: &Path) -> anyhow::Result<Template> {
    Template::load(path).with_context(|| format!("failed to load template {}", path.display()))
}

fn reader_for(config: &PipelineConfig, format: Option<&str>) -> anyhow::Result<RawCsvReader> {
    let format = format.unwrap_or(&config.raw_format);
    Ok(RawCsvReader::new(format.parse()?))
}

fn handle_run(template: &Path, config: PipelineConfig, args: RunArgs) -> anyhow::Result<()> {
    let template = load_template(template)?;
    let reader = reader_for(&config, args.format.as_deref())?;
    let summary = Pipeline::new(&template, &config, &reader)
        .run(&args.file)
        .with_context(|| format!("pipeline failed for {}", args.file.display()))?;

    println!(
        "{}: {} records in, {} after checks, {} percent-change rows ({} interpolated, {} soft failures)",
        summary.model,
        summary.input_records,
        summary.checked_records,
        summary.pc_diff_rows,
        summary.interpolated_rows,
        summary.soft_failures
    );
    println!("saved {}", summary.artifacts.pc_diff.display());
    Ok(())
}

fn handle_batch(template: &Path, mut config: PipelineConfig, args: BatchArgs) -> anyhow::Result<()> {
    if let Some(workers) = args.workers {
        config.workers = workers;
        config.normalize()?;
    }
    let template = load_template(template)?;
    let reader = reader_for(&config, args.format.as_deref())?;
    let inputs = discover_inputs(&args.dir)
        .with_context(|| format!("failed to list {}", args.dir.display()))?;
    if inputs.is_empty() {
        bail!("no submissions found in {}", args.dir.display());
    }

    let pipeline = Pipeline::new(&template, &config, &reader);
    let outcomes = run_batch(&inputs, &pipeline, config.workers)?;

    let mut failed = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(summary) => println!(
                "ok     {} -> {}",
                outcome.path.display(),
                summary.artifacts.pc_diff.display()
            ),
            Err(err) => {
                failed += 1;
                println!("failed {}: {err}", outcome.path.display());
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} files failed", outcomes.len());
    }
    Ok(())
}

fn handle_merge(config: &PipelineConfig, args: MergeArgs) -> anyhow::Result<()> {
    let mut log = RunLog::new("merge");
    let records = if args.raw {
        let reader = reader_for(config, None)?;
        merge_raw(&args.files, &reader, args.drop_duplicates, &mut log)?
    } else {
        merge_files(&args.files, args.drop_duplicates, &mut log)?
    };

    let output = match args.output {
        Some(path) => path,
        None => {
            let dir = args.files[0].parent().unwrap_or_else(|| Path::new("."));
            let today = Local::now().date_naive();
            let name = if args.raw {
                default_raw_merge_name(today)
            } else {
                let base_dir = dir.file_name().and_then(|n| n.to_str()).unwrap_or("inputs");
                default_merge_name(base_dir, today, args.drop_duplicates)
            };
            dir.join("output").join(name)
        }
    };
    write_records(&records, &output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("saved {} records to {}", records.len(), output.display());
    Ok(())
}

fn handle_pc_diff(config: &PipelineConfig, args: PcDiffArgs) -> anyhow::Result<()> {
    let output_dir = match args.output_dir {
        Some(dir) => dir,
        None => args
            .file
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("pc-diff"),
    };
    let mut log = RunLog::new(args.file.display().to_string());
    let output = pc_diff_file(&args.file, &output_dir, &PercentChangeOptions::from(config), &mut log)?;
    let log_path = output_dir.join("logs").join(format!(
        "{}_pc-diff_{}.log",
        file_stem(&args.file)?,
        log.started().format(TIMESTAMP_FORMAT)
    ));
    log.write_to(&log_path)?;
    println!("saved {}", output.display());
    Ok(())
}

type DomainRun = fn(
    &Path,
    &DomainConfig,
    &PercentChangeOptions,
    bool,
) -> Result<Option<DomainArtifacts>, HarmonizeError>;

fn handle_domain(config: &PipelineConfig, args: DomainArgs, run: DomainRun) -> anyhow::Result<()> {
    let models = load_domain_config(&args.models)
        .with_context(|| format!("failed to load model settings {}", args.models.display()))?;
    match run(&args.file, &models, &PercentChangeOptions::from(config), args.endpoints_only)? {
        Some(artifacts) => {
            println!("saved {}", artifacts.wide.display());
            println!("saved {}", artifacts.long.display());
            println!("saved {}", artifacts.pc_diff.display());
        }
        None => println!("{} has no valid entries for these models", args.file.display()),
    }
    Ok(())
}

fn handle_decompose(config: &PipelineConfig, args: DecomposeArgs) -> anyhow::Result<()> {
    let records = read_canonical_csv(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let options = DecompositionOptions {
        baseline_scenario: config.baseline_scenario.clone(),
        alternate_scenario: config.alternate_scenario.clone(),
        normalized: args.normalized,
    };
    let drivers = if args.drivers.is_empty() {
        discover_drivers(&records, &options)
    } else {
        args.drivers
    };
    if drivers.is_empty() {
        bail!("no driver scenarios found in {}", args.file.display());
    }

    let mut log = RunLog::new(args.file.display().to_string());
    let effects = decompose_all(&records, &drivers, &options, &mut log);
    let output = match args.output {
        Some(path) => path,
        None => args
            .file
            .with_file_name(format!("{}_decomposition.csv", file_stem(&args.file)?)),
    };
    write_csv(&mut effects_to_frame(&effects)?, &output)?;
    println!("saved {} effects to {}", effects.len(), output.display());
    Ok(())
}
