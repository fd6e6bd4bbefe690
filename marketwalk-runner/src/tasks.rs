//! Task lists: which series to acquire and where each one starts.
//!
//! Candle tasks come from `[[tasks]]` in the config file or from a universe
//! CSV (`Symbol,First_Sighted_Date,Exchange`). Tasks are resolved into
//! typed series inside the per-task boundary, so one bad row fails only
//! that task.

use crate::error::RunnerError;
use marketwalk_core::domain::{date_cursor, parse_start_date, CandleSeries, Cursor, SnapshotSeries};
use marketwalk_core::source::scrape::{parse_compact_date, snapshot_dates};
use marketwalk_core::AcquireError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

fn default_timeframe() -> String {
    "1m".to_string()
}

/// One candle series as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandleTask {
    /// Base asset, e.g. `JST`.
    pub symbol: String,
    pub venue: String,
    /// `YYYY-MM-DD`; absent means the venue's default start.
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
}

impl CandleTask {
    pub fn new(symbol: &str, venue: &str, start: Option<&str>) -> Self {
        Self {
            symbol: symbol.to_string(),
            venue: venue.to_string(),
            start: start.map(str::to_string),
            timeframe: default_timeframe(),
        }
    }

    /// Typed series and start cursor.
    pub fn resolve(&self) -> Result<(CandleSeries, Option<Cursor>), AcquireError> {
        let symbol = self.symbol.trim();
        if symbol.is_empty() {
            return Err(AcquireError::Config("task has an empty symbol".into()));
        }
        let venue = self.venue.parse()?;
        let timeframe = self.timeframe.parse()?;
        let start = match self.start.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) => Some(date_cursor(parse_start_date(s)?)),
        };
        Ok((CandleSeries::new(symbol.to_uppercase(), timeframe, venue), start))
    }
}

impl fmt::Display for CandleTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.symbol, self.venue, self.timeframe)
    }
}

/// One row of a universe CSV.
#[derive(Debug, Deserialize)]
struct UniverseRow {
    #[serde(rename = "Symbol")]
    symbol: String,
    #[serde(rename = "First_Sighted_Date", default)]
    first_sighted_date: Option<String>,
    #[serde(rename = "Exchange")]
    exchange: String,
}

/// Load candle tasks from a universe CSV (1m timeframe).
pub fn load_universe_csv(path: &Path) -> Result<Vec<CandleTask>, RunnerError> {
    let task_err = |reason: String| RunnerError::TaskList {
        path: path.to_path_buf(),
        reason,
    };
    let mut rdr = csv::Reader::from_path(path).map_err(|e| task_err(e.to_string()))?;
    let mut tasks = Vec::new();
    for (i, row) in rdr.deserialize::<UniverseRow>().enumerate() {
        let row = row.map_err(|e| task_err(format!("row {}: {e}", i + 1)))?;
        tasks.push(CandleTask {
            symbol: row.symbol,
            venue: row.exchange,
            start: row.first_sighted_date.filter(|s| !s.trim().is_empty()),
            timeframe: default_timeframe(),
        });
    }
    Ok(tasks)
}

/// Snapshot series for `start..=end` (`YYYYMMDD`) every `step_days`.
pub fn snapshot_series(start: &str, end: &str, step_days: i64) -> Result<Vec<SnapshotSeries>, RunnerError> {
    let dates = snapshot_dates(parse_compact_date(start)?, parse_compact_date(end)?, step_days)?;
    Ok(dates.into_iter().map(SnapshotSeries::new).collect())
}
