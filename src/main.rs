//! feature-rollup - portfolio rollup host
//!
//! Loads a work-item snapshot, recomputes every feature, scheduled task
//! and epic in it, and writes a report (and optionally the updated
//! snapshot).
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (unreadable snapshot, bad config, ineligible feature, etc.)

use anyhow::{Context, Result};
use feature_rollup::cli::{Args, OutputFormat};
use feature_rollup::config::{Config, DEFAULT_CONFIG_FILE};
use feature_rollup::graph::WorkGraph;
use feature_rollup::models::WorkItemId;
use feature_rollup::recompute::{recompute, RunOptions};
use feature_rollup::report;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration before logging so its verbosity applies
    let config = match load_config(&args) {
        Ok(mut config) => {
            config.merge_with_args(&args);
            config
        }
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(config.log_level(&args));

    info!("feature-rollup v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    debug!("Config: {:?}", config);

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Rollup failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .rollup.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to add product owners, programs and rollup options.");
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Recompute the snapshot and write the outputs. Returns the exit code.
async fn run(args: Args, config: Config) -> Result<i32> {
    config.validate().context("Invalid configuration")?;

    let graph_path = args
        .graph
        .clone()
        .context("No snapshot given (--graph FILE)")?;

    println!("📥 Loading snapshot: {}", graph_path.display());
    let json = std::fs::read_to_string(&graph_path)
        .with_context(|| format!("Failed to read snapshot: {}", graph_path.display()))?;
    let graph = WorkGraph::from_json(&json)
        .with_context(|| format!("Invalid snapshot: {}", graph_path.display()))?;
    info!("Loaded {} work items", graph.len());

    let mut options = RunOptions::from_config(
        &config,
        &graph_path.display().to_string(),
        args.evaluation_time(),
    );
    options.features = args.features.iter().copied().map(WorkItemId).collect();
    options.tasks = args.tasks.iter().copied().map(WorkItemId).collect();
    options.program = args.program.clone();
    options.show_progress = !args.quiet;

    println!("🔄 Recomputing rollups...");
    println!("   Evaluated at: {}", options.now.to_rfc3339());
    println!("   Concurrency: {}", options.concurrency);
    if let Some(ref program) = options.program {
        println!("   Program: {}", program);
    }

    let directory = config.team_directory();
    let (graph, run_report) = recompute(graph, &options, directory).await?;

    // Write the report
    let output_path = PathBuf::from(&config.general.output);
    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&run_report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&run_report),
    };
    std::fs::write(&output_path, &output)
        .with_context(|| format!("Failed to write report to {}", output_path.display()))?;

    // Write the updated snapshot
    if let Some(ref path) = args.write_graph {
        let snapshot = serde_json::to_string_pretty(&graph.to_snapshot())
            .context("Failed to serialize updated snapshot")?;
        std::fs::write(path, snapshot)
            .with_context(|| format!("Failed to write snapshot to {}", path.display()))?;
        println!("💾 Updated snapshot saved to: {}", path.display());
    }

    // Print summary
    println!("\n📊 Rollup Summary:");
    println!("   Features: {}", run_report.features.len());
    println!("   Scheduled tasks updated: {}", run_report.tasks.len());
    if !run_report.blocked.is_empty() {
        println!(
            "   ⛔ Tasks blocked by conflicting links: {}",
            run_report.blocked.len()
        );
    }
    println!("   Epics: {}", run_report.epics.len());
    println!("   Unchanged: {}", run_report.unchanged.len());
    println!("   Duration: {:.1}s", run_report.metadata.duration_seconds);
    println!(
        "\n✅ Rollup complete! Report saved to: {}",
        output_path.display()
    );

    Ok(0)
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is set up. A config file that exists but cannot be
/// read, parsed or validated aborts the run.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    Ok(Config::load_default()
        .with_context(|| format!("Failed to load {}", DEFAULT_CONFIG_FILE))?
        .unwrap_or_default())
}
