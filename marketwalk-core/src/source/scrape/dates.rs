//! Snapshot date ranges.

use crate::error::AcquireError;
use chrono::{Duration, NaiveDate};

const COMPACT: &str = "%Y%m%d";

/// Dates from `start` to `end` inclusive, `step_days` apart.
pub fn snapshot_dates(
    start: NaiveDate,
    end: NaiveDate,
    step_days: i64,
) -> Result<Vec<NaiveDate>, AcquireError> {
    if step_days <= 0 {
        return Err(AcquireError::Config(format!(
            "snapshot step must be at least one day, got {step_days}"
        )));
    }
    let step = Duration::days(step_days);
    let mut dates = Vec::new();
    let mut current = start;
    while current <= end {
        dates.push(current);
        current = match current.checked_add_signed(step) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(dates)
}

/// Parse a compact `YYYYMMDD` date.
pub fn parse_compact_date(s: &str) -> Result<NaiveDate, AcquireError> {
    NaiveDate::parse_from_str(s.trim(), COMPACT)
        .map_err(|e| AcquireError::Config(format!("invalid snapshot date '{s}' (want YYYYMMDD): {e}")))
}

/// [`snapshot_dates`] over compact `YYYYMMDD` strings.
pub fn generate_snapshot_dates(
    start: &str,
    end: &str,
    step_days: i64,
) -> Result<Vec<String>, AcquireError> {
    let dates = snapshot_dates(parse_compact_date(start)?, parse_compact_date(end)?, step_days)?;
    Ok(dates.iter().map(|d| d.format(COMPACT).to_string()).collect())
}
