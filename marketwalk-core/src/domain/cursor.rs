//! Cursor helpers.
//!
//! A cursor is an epoch-millisecond position. Walks compare it against the
//! wall clock, and a page advances it to `last_record.timestamp + 1`.

use crate::error::AcquireError;
use chrono::{NaiveDate, Utc};

/// Position marker handed to `fetch_page` (epoch milliseconds, UTC).
pub type Cursor = i64;

/// Wall-clock "now" as a cursor.
pub fn now_ms() -> Cursor {
    Utc::now().timestamp_millis()
}

/// Midnight UTC of `date` as a cursor.
pub fn date_cursor(date: NaiveDate) -> Cursor {
    date.and_time(chrono::NaiveTime::MIN)
        .and_utc()
        .timestamp_millis()
}

/// Parse a task start date (`YYYY-MM-DD`).
pub fn parse_start_date(s: &str) -> Result<NaiveDate, AcquireError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| AcquireError::Config(format!("invalid start date '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_cursor_is_midnight_utc() {
        let d = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        assert_eq!(date_cursor(d), 1_672_531_200_000);
    }

    #[test]
    fn start_date_parsing() {
        assert_eq!(
            parse_start_date("2023-03-17").unwrap(),
            NaiveDate::from_ymd_opt(2023, 3, 17).unwrap()
        );
        assert!(matches!(
            parse_start_date("17/03/2023"),
            Err(AcquireError::Config(_))
        ));
    }
}
