//! Task outcomes and the end-of-run summary.

use crate::pipeline::SeriesOutcome;
use marketwalk_core::{AcquireError, ErrorKind};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Final status of one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// New records were fetched and handed to the sink.
    Success {
        records: usize,
        saved: usize,
        /// Error that cut the walk short after records were salvaged.
        partial: Option<String>,
    },
    /// The walk ended without records and without an error.
    NoData,
    Error { kind: ErrorKind, reason: String },
    /// The task panicked; the worker state was discarded.
    Panicked { message: String },
}

impl OutcomeStatus {
    pub fn from_result(result: Result<SeriesOutcome, AcquireError>) -> Self {
        match result {
            Ok(o) if o.fetched == 0 => Self::NoData,
            Ok(o) => Self::Success {
                records: o.fetched,
                saved: o.saved,
                partial: o.partial.map(|e| e.to_string()),
            },
            Err(e) => Self::Error {
                kind: e.kind(),
                reason: e.to_string(),
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Panicked { .. })
    }
}

/// Outcome of one task, produced once when its pipeline terminates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub series: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
    pub elapsed_ms: u64,
}

impl TaskOutcome {
    /// Per-series log line.
    pub fn log(&self) {
        match &self.status {
            OutcomeStatus::Success {
                records,
                saved,
                partial: None,
            } => info!(series = %self.series, records, saved, elapsed_ms = self.elapsed_ms, "series complete"),
            OutcomeStatus::Success {
                records,
                saved,
                partial: Some(reason),
            } => warn!(series = %self.series, records, saved, %reason, "series saved partially"),
            OutcomeStatus::NoData => info!(series = %self.series, "no data found for series"),
            OutcomeStatus::Error { kind, reason } => {
                error!(series = %self.series, %kind, %reason, "series failed")
            }
            OutcomeStatus::Panicked { message } => {
                error!(series = %self.series, %message, "series task panicked")
            }
        }
    }
}

/// Counts over all outcomes of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeSummary {
    pub total: usize,
    pub succeeded: usize,
    /// Successes that were cut short by an error.
    pub partial: usize,
    pub no_data: usize,
    pub failed: usize,
    pub records: usize,
}

impl OutcomeSummary {
    pub fn from_outcomes(outcomes: &[TaskOutcome]) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            match &outcome.status {
                OutcomeStatus::Success {
                    records, partial, ..
                } => {
                    summary.succeeded += 1;
                    summary.records += records;
                    if partial.is_some() {
                        summary.partial += 1;
                    }
                }
                OutcomeStatus::NoData => summary.no_data += 1,
                OutcomeStatus::Error { .. } | OutcomeStatus::Panicked { .. } => summary.failed += 1,
            }
        }
        summary
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn log_summary(&self) {
        info!(
            total = self.total,
            succeeded = self.succeeded,
            partial = self.partial,
            no_data = self.no_data,
            failed = self.failed,
            records = self.records,
            "run summary"
        );
    }
}
