//! MarketWalk Runner — fan-out acquisition runs.
//!
//! This crate builds on `marketwalk-core` to provide:
//! - Run configuration (TOML) and task lists (config or universe CSV)
//! - Per-series pipelines (walker → sink) with resume support
//! - The fan-out coordinator on a fixed-size worker pool
//! - Task outcomes and the end-of-run summary

pub mod config;
pub mod error;
pub mod fanout;
pub mod outcome;
pub mod pipeline;
pub mod tasks;

pub use config::{RunConfig, RunSection, SnapshotSection, WalkSection};
pub use error::RunnerError;
pub use fanout::{FanOut, FanOutProgress, LogProgress, PoolError};
pub use outcome::{OutcomeStatus, OutcomeSummary, TaskOutcome};
pub use pipeline::{acquire_series, SeriesOutcome};
pub use tasks::{load_universe_csv, snapshot_series, CandleTask};

use marketwalk_core::domain::{SnapshotRow, SnapshotSeries};
use marketwalk_core::sink::{CandleFileSink, SnapshotFileSink};
use marketwalk_core::source::rest::RestAdapterFactory;
use marketwalk_core::source::scrape::SnapshotAdapterFactory;
use marketwalk_core::source::{AdapterFactory, SourceAdapter, WorkerAdapters};
use marketwalk_core::walker::WalkPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Outcomes of one run plus their summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub outcomes: Vec<TaskOutcome>,
    pub summary: OutcomeSummary,
}

impl RunReport {
    pub fn new(outcomes: Vec<TaskOutcome>) -> Self {
        let summary = OutcomeSummary::from_outcomes(&outcomes);
        Self { outcomes, summary }
    }

    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<(), RunnerError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| RunnerError::Write {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        std::fs::write(path, json).map_err(|e| RunnerError::Write {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// Acquire every candle task, one REST adapter per worker per venue.
pub fn run_candles(
    config: &RunConfig,
    tasks: &[CandleTask],
    progress: &dyn FanOutProgress,
) -> Result<RunReport, RunnerError> {
    let factory = RestAdapterFactory::new(&config.venue_overrides()?)?;
    let sink = CandleFileSink::new(&config.run.output_dir, config.run.formats.clone());
    let policy = config.walk.policy();
    let resume = config.run.resume;
    let fan = FanOut::new(config.run.workers)?;

    info!(
        tasks = tasks.len(),
        workers = fan.workers(),
        output_dir = %config.run.output_dir.display(),
        resume,
        "starting candle run"
    );

    let outcomes = fan.run(
        tasks,
        || WorkerAdapters::new(&factory),
        |adapters, task| {
            let (series, start) = task.resolve()?;
            let adapter = adapters.adapter_for(&series)?;
            acquire_series(adapter, &sink, &series, start, &policy, resume)
        },
        progress,
    );
    Ok(RunReport::new(outcomes))
}

/// Scrape one listings snapshot per date, one browser session per worker.
pub fn run_snapshots(
    config: &RunConfig,
    dates: &[SnapshotSeries],
    progress: &dyn FanOutProgress,
) -> Result<RunReport, RunnerError> {
    let snapshots = &config.snapshots;
    let factory = SnapshotAdapterFactory::new(snapshots.scrape.clone())?;
    let sink = SnapshotFileSink::new(&snapshots.output_dir, snapshots.formats.clone());
    let fan = FanOut::new(config.run.workers)?;

    info!(
        dates = dates.len(),
        workers = fan.workers(),
        output_dir = %snapshots.output_dir.display(),
        "starting snapshot run"
    );

    Ok(run_snapshots_with(
        &fan,
        &factory,
        &sink,
        &config.walk.policy(),
        dates,
        progress,
    ))
}

/// Snapshot fan-out over any adapter factory yielding snapshot rows.
pub fn run_snapshots_with<F>(
    fan: &FanOut,
    factory: &F,
    sink: &SnapshotFileSink,
    policy: &WalkPolicy,
    dates: &[SnapshotSeries],
    progress: &dyn FanOutProgress,
) -> RunReport
where
    F: AdapterFactory,
    F::Adapter: SourceAdapter<Series = SnapshotSeries, Record = SnapshotRow> + Send,
{
    let outcomes = fan.run(
        dates,
        || WorkerAdapters::new(factory),
        |adapters, series| {
            let adapter = adapters.adapter_for(series)?;
            acquire_series(adapter, sink, series, Some(series.cursor()), policy, false)
        },
        progress,
    );
    RunReport::new(outcomes)
}

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn shared_run_types_are_send_sync() {
        assert_send::<RunConfig>();
        assert_sync::<RunConfig>();
        assert_send::<TaskOutcome>();
        assert_sync::<TaskOutcome>();
        assert_sync::<FanOut>();
        assert_send::<RunReport>();
    }
}
