//! CLI entry point for the biometric quality study.

use anyhow::{Context, Result, anyhow};
use biometric_insights::loader::{data_info, load_enrolment_data, load_update_data};
use biometric_insights::{
    AnalysisConfig, AnalysisConfigBuilder, MissingValueStrategy, StudyPipeline, StudyResult,
};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// CLI-compatible missing value strategy enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMissingStrategy {
    /// Report missing counts only
    Report,
    /// Drop rows with any missing value
    DropRows,
    /// Drop columns above --missing-threshold
    DropColumns,
    /// Fill text columns with their mode
    FillMode,
    /// Fill numeric columns with their median
    FillMedian,
}

impl CliMissingStrategy {
    fn into_strategy(self, threshold: f64) -> MissingValueStrategy {
        match self {
            Self::Report => MissingValueStrategy::Report,
            Self::DropRows => MissingValueStrategy::DropRows,
            Self::DropColumns => MissingValueStrategy::DropColumns { threshold },
            Self::FillMode => MissingValueStrategy::FillMode,
            Self::FillMedian => MissingValueStrategy::FillMedian,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Age-group biometric quality study",
    long_about = "Loads enrolment and update records, cleans them, compares biometric quality \
                  across age groups and writes tables, charts and reports.\n\n\
                  EXAMPLES:\n  \
                  # Enrolments only\n  \
                  biometric-insights --enrolment data/enrolment.csv\n\n  \
                  # With update records and a custom output directory\n  \
                  biometric-insights --enrolment data/enrolment.csv --updates data/updates.csv -o results/\n\n  \
                  # Preview the run\n  \
                  biometric-insights --enrolment data/enrolment.csv --dry-run"
)]
struct Args {
    /// Path to the enrolment file (.csv, .xlsx, .xls, .xlsm, .ods)
    #[arg(long)]
    enrolment: PathBuf,

    /// Path to the update file
    #[arg(long)]
    updates: Option<PathBuf>,

    /// Output directory for tables, charts and reports
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON configuration file
    ///
    /// Flags given on the command line override values from the file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Strategy for missing values
    #[arg(long, value_enum)]
    missing_strategy: Option<CliMissingStrategy>,

    /// Missing fraction above which drop-columns removes a column (0.0 - 1.0)
    #[arg(long, default_value = "0.5")]
    missing_threshold: f64,

    /// Significance level for hypothesis tests
    #[arg(long)]
    alpha: Option<f64>,

    /// Standard deviations from the group mean that flag an anomaly
    #[arg(long)]
    zscore_threshold: Option<f64>,

    /// Expected anomaly fraction for the isolation forest (0.0 - 0.5]
    #[arg(long)]
    contamination: Option<f64>,

    /// Random seed for the isolation forest
    #[arg(long)]
    seed: Option<u64>,

    /// Keep enrolments on or after this date (YYYY-MM-DD)
    #[arg(long)]
    start_date: Option<String>,

    /// Keep enrolments on or before this date (YYYY-MM-DD)
    #[arg(long)]
    end_date: Option<String>,

    /// Skip PNG chart rendering
    #[arg(long)]
    no_charts: bool,

    /// Show the data overview and planned steps without running the study
    #[arg(long)]
    dry_run: bool,

    /// Output the JSON study report to stdout instead of a human-readable
    /// summary
    ///
    /// Disables all progress logs.
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show errors and final result)
    #[arg(short, long)]
    quiet: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled so stdout only
/// carries the report.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Merge the config file (if any) with command-line overrides.
fn build_config(args: &Args) -> Result<AnalysisConfig> {
    let base = match &args.config {
        Some(path) => AnalysisConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };

    let mut builder = AnalysisConfigBuilder::from_config(base.clone());
    if let Some(strategy) = args.missing_strategy {
        builder = builder.missing_strategy(strategy.into_strategy(args.missing_threshold));
    }
    if let Some(alpha) = args.alpha {
        builder = builder.alpha(alpha);
    }
    if let Some(threshold) = args.zscore_threshold {
        builder = builder.zscore_threshold(threshold);
    }
    if let Some(contamination) = args.contamination {
        builder = builder.contamination(contamination);
    }
    if let Some(seed) = args.seed {
        builder = builder.random_state(seed);
    }
    if args.start_date.is_some() || args.end_date.is_some() {
        builder = builder.date_range(
            args.start_date.clone().or(base.date_range.start),
            args.end_date.clone().or(base.date_range.end),
        );
    }
    if let Some(output) = &args.output {
        builder = builder.output_dir(output);
    }
    if args.no_charts {
        builder = builder.render_charts(false);
    }

    Ok(builder.build()?)
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet, args.json);

    for path in std::iter::once(&args.enrolment).chain(args.updates.as_ref()) {
        if !path.exists() {
            return Err(anyhow!("Input file not found: {}", path.display()));
        }
    }

    let config = build_config(&args)?;

    let mut builder = StudyPipeline::builder().config(config);
    if !args.quiet && !args.json {
        builder = builder.on_progress(|update| {
            info!(
                "[{:.0}%] {}: {}",
                update.progress * 100.0,
                update.stage.display_name(),
                update.message
            );
        });
    }
    let pipeline = builder.build()?;

    if args.dry_run {
        return run_dry_run(&args, &pipeline);
    }

    info!("{}", "=".repeat(80));
    info!("Starting biometric quality study...");
    info!("{}", "=".repeat(80));

    let result = pipeline
        .run(&args.enrolment, args.updates.as_deref())
        .map_err(|e| {
            error!("Study failed: {}", e);
            anyhow!("Study failed: {}", e)
        })?;

    if args.json {
        let report_path = result
            .report_path
            .as_ref()
            .ok_or_else(|| anyhow!("Study report was not written"))?;
        println!("{}", std::fs::read_to_string(report_path)?);
        return Ok(());
    }

    print_human_readable_summary(&args, &result);
    Ok(())
}

/// Show what the study would do without writing anything.
///
/// Uses `println!` on purpose: this output is the point of --dry-run and must
/// show regardless of log level.
fn run_dry_run(args: &Args, pipeline: &StudyPipeline) -> Result<()> {
    let columns = &pipeline.config().columns;

    println!("\n{}", "=".repeat(80));
    println!("DRY RUN - Preview of the study");
    println!("{}\n", "=".repeat(80));

    println!("DATASET OVERVIEW");
    println!("{}", "-".repeat(40));
    let enrolments = load_enrolment_data(&args.enrolment, columns)?;
    println!("{}", data_info(&enrolments, "Enrolment Data")?.summary());
    if let Some(path) = &args.updates {
        let updates = load_update_data(path, columns)?;
        println!();
        println!("{}", data_info(&updates, "Update Data")?.summary());
    }
    println!();

    println!("PLANNED STEPS");
    println!("{}", "-".repeat(40));
    for (i, step) in pipeline
        .planned_steps(args.updates.is_some())
        .iter()
        .enumerate()
    {
        println!("  {}. {}", i + 1, step);
    }
    println!();

    println!("{}", "=".repeat(80));
    println!("To run the study, run without --dry-run");
    println!("{}", "=".repeat(80));

    Ok(())
}

/// Print the default end-of-run summary.
fn print_human_readable_summary(args: &Args, result: &StudyResult) {
    let findings = &result.findings;

    println!();
    println!("{}", "=".repeat(80));
    println!("STUDY COMPLETE");
    println!("{}", "=".repeat(80));
    println!();

    println!("Enrolments: {}", args.enrolment.display());
    if let Some(updates) = &args.updates {
        println!("Updates:    {}", updates.display());
    }
    if let Some(cleaning) = &findings.cleaning {
        println!(
            "Records:    {} -> {} ({} removed)",
            cleaning.original_records, cleaning.cleaned_records, cleaning.records_removed
        );
    }
    println!("Duration:   {}ms", result.duration_ms);
    println!();

    if let Some(quality) = &findings.quality_by_age {
        println!("{}", quality.summary());
        println!();
    }

    println!("Statistical Tests:");
    let tests = [
        findings.chi_square.as_ref().map(|t| t.summary()),
        findings.anova.as_ref().map(|t| t.summary()),
        findings.kruskal_wallis.as_ref().map(|t| t.summary()),
    ];
    for summary in tests.into_iter().flatten() {
        println!("  {}", summary.replace('\n', "\n  "));
    }
    if let Some(zscore) = &findings.zscore_anomalies {
        println!("  {}", zscore.summary().replace('\n', "\n  "));
    }
    if let Some(forest) = &findings.isolation_forest {
        println!("  {}", forest.summary().replace('\n', "\n  "));
    }
    println!();

    println!("Outputs ({}):", result.outputs.len());
    for path in &result.outputs {
        println!("  - {}", display_relative(path));
    }
    println!();

    if !result.warnings.is_empty() {
        println!("Warnings:");
        for warning in &result.warnings {
            println!("  ! {}", warning);
        }
        println!();
    }

    println!("Use --json for machine-readable output");
    println!("{}", "=".repeat(80));
}

fn display_relative(path: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(cwd).ok().map(Path::to_path_buf))
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}
