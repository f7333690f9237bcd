//! Batchscan - operator CLI for the nightly scan pipeline.
//!
//! The scan itself runs inside the application that owns the indicator
//! engine and strategies; this binary covers the pre-open gap filter, a
//! provider connectivity check and configuration inspection.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use batchscan::gap_filter::{GapFilter, GapFilterConfig};
use batchscan::scanner::{load_batch_result, write_json_atomic};
use batchscan::{fetcher_from_config, Universe};
use batchscan_common::config::{config_path, Config};
use batchscan_common::logging::init_logging_with_exclusions;

#[derive(Parser, Debug)]
#[command(name = "batchscan")]
#[command(version)]
#[command(about = "Batch market scanner: gap filter, fetch check and config inspection", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.batchscan/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Gate the persisted scan candidates against live quotes
    Filter {
        /// Scan artifact to read (defaults to the configured output path)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Where to write the filter report
        #[arg(long)]
        output: Option<PathBuf>,

        /// Override the gap threshold (fraction, e.g. 0.03)
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Fetch daily bars for the universe and report coverage
    Fetch {
        /// Universe file (defaults to ~/.batchscan/universe.txt)
        #[arg(long)]
        universe: Option<PathBuf>,

        /// Calendar days of history
        #[arg(long, default_value = "200")]
        days: i64,
    },

    /// Print the effective configuration and validate it
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_with_env(cli.config.as_deref())?;

    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::debug!("Batchscan v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Filter {
            input,
            output,
            threshold,
        } => run_filter(&config, input, output, threshold).await,
        Commands::Fetch { universe, days } => run_fetch(&config, universe, days).await,
        Commands::Config => show_config(&config, cli.config),
    }
}

async fn run_filter(
    config: &Config,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    threshold: Option<f64>,
) -> Result<()> {
    config.validate()?;

    let input = input.unwrap_or_else(|| config.output_path());
    let output = output.unwrap_or_else(|| config.filtered_output_path());

    let scan = load_batch_result(&input)
        .await
        .with_context(|| format!("loading scan results from {}", input.display()))?;

    let mut filter_config = GapFilterConfig::from_config(config);
    if let Some(threshold) = threshold {
        filter_config.threshold = threshold;
    }

    let fetcher = fetcher_from_config(config)?;
    let filter = GapFilter::new(filter_config, Arc::new(fetcher))?;
    let report = filter.run(scan.candidates).await;

    write_json_atomic(&output, &report)
        .await
        .with_context(|| format!("writing filter report to {}", output.display()))?;

    println!("{}", report.summary());
    for c in &report.candidates {
        let status = if c.passed_filter { "PASS" } else { "REJECT" };
        let gap = c
            .gap_pct
            .map(|g| format!("{:+.2}%", g * 100.0))
            .unwrap_or_else(|| "-".into());
        println!(
            "  #{:<3} {:<8} {:<16} {:<6} gap {:>8}  {} {}",
            c.candidate.rank,
            c.candidate.symbol,
            c.candidate.strategy,
            c.candidate.direction,
            gap,
            status,
            c.filter_reason
        );
    }
    println!("Report written to {}", output.display());
    Ok(())
}

async fn run_fetch(config: &Config, universe: Option<PathBuf>, days: i64) -> Result<()> {
    config.validate()?;

    let path = universe.unwrap_or_else(|| config.universe_path());
    let universe = Universe::load(&path)?;
    let fetcher = fetcher_from_config(config)?;

    let started = std::time::Instant::now();
    let bars = fetcher.fetch_daily_bars(universe.symbols(), days).await;
    let total_bars: usize = bars.values().map(Vec::len).sum();

    println!(
        "Fetched {} bars for {}/{} symbols in {:.1}s",
        total_bars,
        bars.len(),
        universe.len(),
        started.elapsed().as_secs_f64()
    );

    let missing: Vec<&str> = universe
        .symbols()
        .iter()
        .filter(|s| !bars.contains_key(*s))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        println!("No data: {}", missing.join(", "));
    }
    Ok(())
}

fn show_config(config: &Config, explicit: Option<PathBuf>) -> Result<()> {
    let mut shown = config.clone();
    if shown.market_data.api_key.is_some() {
        shown.market_data.api_key = Some("***".into());
    }
    if shown.market_data.api_secret.is_some() {
        shown.market_data.api_secret = Some("***".into());
    }

    let path = explicit.unwrap_or_else(config_path);
    println!("# {}", path.display());
    println!("{}", serde_json::to_string_pretty(&shown)?);

    match config.validate() {
        Ok(()) => println!("Configuration is valid"),
        Err(e) => println!("Configuration is invalid: {}", e),
    }
    Ok(())
}
