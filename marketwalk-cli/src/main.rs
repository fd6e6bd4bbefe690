//! MarketWalk CLI — candle and listings snapshot acquisition.
//!
//! Commands:
//! - `candles` — walk OHLCV history for every task on a worker pool
//! - `snapshots` — scrape one historical listings table per date
//! - `dates` — print the snapshot dates a range expands to

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use marketwalk_core::sink::OutputFormat;
use marketwalk_core::source::scrape::generate_snapshot_dates;
use marketwalk_runner::{
    load_universe_csv, run_candles, run_snapshots, snapshot_series, CandleTask, LogProgress,
    OutcomeSummary, RunConfig, RunReport,
};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "marketwalk",
    about = "MarketWalk — incremental market data acquisition",
    version
)]
struct Cli {
    /// Log level when RUST_LOG is not set (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Also append log lines to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by the acquisition commands.
#[derive(Args)]
struct RunArgs {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Worker pool size (overrides run.workers).
    #[arg(long)]
    workers: Option<usize>,

    /// Output directory (overrides the config).
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Output formats (overrides the config), e.g. --format csv --format parquet.
    #[arg(long = "format")]
    formats: Vec<OutputFormat>,

    /// Write per-series outcomes and the summary as JSON.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Exit with status 1 if any series ends in an error.
    #[arg(long, default_value_t = false)]
    fail_on_error: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk OHLCV candles for a task list.
    Candles {
        #[command(flatten)]
        run: RunArgs,

        /// Universe CSV (Symbol,First_Sighted_Date,Exchange) instead of [[tasks]].
        #[arg(long)]
        universe: Option<PathBuf>,

        /// Single base asset to fetch (e.g. JST), with --venue.
        #[arg(long, requires = "venue")]
        symbol: Option<String>,

        /// Venue for --symbol: binance-futures or bybit.
        #[arg(long)]
        venue: Option<String>,

        /// Start date for --symbol (YYYY-MM-DD).
        #[arg(long)]
        start: Option<String>,

        /// Timeframe for --symbol.
        #[arg(long, default_value = "1m")]
        timeframe: String,

        /// Continue each series after its last saved candle.
        #[arg(long, default_value_t = false)]
        resume: bool,
    },
    /// Scrape historical listings snapshots for a date range.
    Snapshots {
        #[command(flatten)]
        run: RunArgs,

        /// First date (YYYYMMDD).
        #[arg(long)]
        start: Option<String>,

        /// Last date (YYYYMMDD), inclusive.
        #[arg(long)]
        end: Option<String>,

        /// Days between snapshots.
        #[arg(long)]
        step_days: Option<i64>,

        /// WebDriver endpoint (overrides snapshots.webdriver_url).
        #[arg(long)]
        webdriver_url: Option<String>,

        /// Show the browser window.
        #[arg(long, default_value_t = false)]
        no_headless: bool,
    },
    /// Print the snapshot dates for a range.
    Dates {
        /// First date (YYYYMMDD).
        #[arg(long)]
        start: String,

        /// Last date (YYYYMMDD), inclusive.
        #[arg(long)]
        end: String,

        /// Days between dates.
        #[arg(long, default_value_t = 7)]
        step_days: i64,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_file.as_deref())?;

    match cli.command {
        Commands::Candles {
            run,
            universe,
            symbol,
            venue,
            start,
            timeframe,
            resume,
        } => {
            let single = symbol.map(|symbol| CandleTask {
                symbol,
                venue: venue.unwrap_or_default(),
                start,
                timeframe,
            });
            run_candles_cmd(run, universe, single, resume)
        }
        Commands::Snapshots {
            run,
            start,
            end,
            step_days,
            webdriver_url,
            no_headless,
        } => run_snapshots_cmd(run, start, end, step_days, webdriver_url, no_headless),
        Commands::Dates {
            start,
            end,
            step_days,
        } => {
            for date in generate_snapshot_dates(&start, &end, step_days)? {
                println!("{date}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_logging(level: &str, log_file: Option<&Path>) -> Result<()> {
    // target prefix: covers marketwalk_core, marketwalk_runner and marketwalk_cli
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("marketwalk={level}")));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("install log subscriber")?;
    Ok(())
}

/// Config file (or defaults) with the shared command-line overrides applied.
fn load_config(run: &RunArgs) -> Result<RunConfig> {
    let mut config = match &run.config {
        Some(path) => RunConfig::from_file(path)?,
        None => RunConfig::default(),
    };
    if let Some(workers) = run.workers {
        config.run.workers = workers;
    }
    Ok(config)
}

/// Only errored or panicked series count; partial and empty series do not.
fn exits_with_failure(summary: &OutcomeSummary, fail_on_error: bool) -> bool {
    fail_on_error && summary.has_failures()
}

fn finish(report: RunReport, run: &RunArgs) -> Result<ExitCode> {
    if let Some(path) = &run.report {
        report.write_json(path)?;
        info!(path = %path.display(), "report written");
    }
    if exits_with_failure(&report.summary, run.fail_on_error) {
        warn!(failed = report.summary.failed, "exiting with failure status");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn run_candles_cmd(
    run: RunArgs,
    universe: Option<PathBuf>,
    single: Option<CandleTask>,
    resume: bool,
) -> Result<ExitCode> {
    let mut config = load_config(&run)?;
    if let Some(dir) = &run.output_dir {
        config.run.output_dir = dir.clone();
    }
    if !run.formats.is_empty() {
        config.run.formats = run.formats.clone();
    }
    config.run.resume |= resume;
    config.validate()?;

    let tasks = match (universe, single) {
        (Some(path), _) => load_universe_csv(&path)?,
        (None, Some(task)) => vec![task],
        (None, None) => config.tasks.clone(),
    };
    if tasks.is_empty() {
        bail!("no candle tasks: pass --universe, --symbol, or add [[tasks]] to the config");
    }

    let report = run_candles(&config, &tasks, &LogProgress)?;
    finish(report, &run)
}

fn run_snapshots_cmd(
    run: RunArgs,
    start: Option<String>,
    end: Option<String>,
    step_days: Option<i64>,
    webdriver_url: Option<String>,
    no_headless: bool,
) -> Result<ExitCode> {
    let mut config = load_config(&run)?;
    let snapshots = &mut config.snapshots;
    if let Some(dir) = &run.output_dir {
        snapshots.output_dir = dir.clone();
    }
    if !run.formats.is_empty() {
        snapshots.formats = run.formats.clone();
    }
    if let Some(url) = webdriver_url {
        snapshots.scrape.webdriver_url = url;
    }
    if no_headless {
        snapshots.scrape.headless = false;
    }
    if let Some(step) = step_days {
        snapshots.step_days = step;
    }
    let start = start
        .or_else(|| snapshots.start.clone())
        .context("no start date: pass --start or set snapshots.start")?;
    let end = end
        .or_else(|| snapshots.end.clone())
        .context("no end date: pass --end or set snapshots.end")?;
    let step = snapshots.step_days;
    config.validate()?;

    let dates = snapshot_series(&start, &end, step)?;
    if dates.is_empty() {
        bail!("date range {start}..{end} is empty");
    }

    let report = run_snapshots(&config, &dates, &LogProgress)?;
    finish(report, &run)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(succeeded: usize, partial: usize, no_data: usize, failed: usize) -> OutcomeSummary {
        OutcomeSummary {
            total: succeeded + no_data + failed,
            succeeded,
            partial,
            no_data,
            failed,
            records: succeeded * 100,
        }
    }

    #[test]
    fn failures_exit_zero_by_default() {
        assert!(!exits_with_failure(&summary(3, 0, 1, 2), false));
    }

    #[test]
    fn fail_on_error_exits_nonzero_only_for_failures() {
        assert!(exits_with_failure(&summary(3, 0, 0, 1), true));
        assert!(!exits_with_failure(&summary(3, 2, 4, 0), true));
        assert!(!exits_with_failure(&OutcomeSummary::default(), true));
    }

    #[test]
    fn fail_on_error_flag_is_parsed() {
        let cli = Cli::try_parse_from([
            "marketwalk",
            "candles",
            "--symbol",
            "JST",
            "--venue",
            "bybit",
            "--fail-on-error",
        ])
        .unwrap();
        match cli.command {
            Commands::Candles { run, symbol, .. } => {
                assert!(run.fail_on_error);
                assert_eq!(symbol.as_deref(), Some("JST"));
            }
            _ => panic!("expected candles command"),
        }

        let cli = Cli::try_parse_from(["marketwalk", "snapshots"]).unwrap();
        match cli.command {
            Commands::Snapshots { run, .. } => assert!(!run.fail_on_error),
            _ => panic!("expected snapshots command"),
        }
    }
}
