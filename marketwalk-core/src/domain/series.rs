//! Series identifiers — the unit of work and the output file key.

use super::cursor::{date_cursor, Cursor};
use super::timeframe::Timeframe;
use super::venue::Venue;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One symbol's candles at one timeframe on one venue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandleSeries {
    /// Base asset as listed in the task (e.g. `JST`).
    pub symbol: String,
    pub timeframe: Timeframe,
    pub venue: Venue,
}

impl CandleSeries {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe, venue: Venue) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            venue,
        }
    }

    /// Venue market symbol (`JSTUSDT`).
    pub fn market(&self) -> String {
        self.venue.format_symbol(&self.symbol)
    }

    /// Output file stem: `<SYMBOL>_<venue>_<timeframe>_ohlcv`.
    pub fn file_stem(&self) -> String {
        format!("{}_{}_{}_ohlcv", self.symbol, self.venue, self.timeframe)
    }
}

impl fmt::Display for CandleSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.symbol, self.venue, self.timeframe)
    }
}

/// One calendar date of the listings snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotSeries {
    pub date: NaiveDate,
}

impl SnapshotSeries {
    pub fn new(date: NaiveDate) -> Self {
        Self { date }
    }

    /// Compact date used in URLs and file names (`YYYYMMDD`).
    pub fn compact_date(&self) -> String {
        self.date.format("%Y%m%d").to_string()
    }

    /// Cursor at which this date's single page lives.
    pub fn cursor(&self) -> Cursor {
        date_cursor(self.date)
    }

    /// Output file stem: `universe_snapshot_<YYYYMMDD>`.
    pub fn file_stem(&self) -> String {
        format!("universe_snapshot_{}", self.compact_date())
    }
}

impl fmt::Display for SnapshotSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.compact_date())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candle_series_naming() {
        let s = CandleSeries::new("JST", Timeframe::M1, Venue::Bybit);
        assert_eq!(s.to_string(), "JST@bybit/1m");
        assert_eq!(s.market(), "JSTUSDT");
        assert_eq!(s.file_stem(), "JST_bybit_1m_ohlcv");
    }

    #[test]
    fn same_symbol_on_other_venue_or_timeframe_gets_its_own_file() {
        let bybit = CandleSeries::new("JST", Timeframe::M1, Venue::Bybit);
        let binance = CandleSeries::new("JST", Timeframe::M1, Venue::BinanceFutures);
        let hourly = CandleSeries::new("JST", Timeframe::H1, Venue::Bybit);
        assert_eq!(binance.file_stem(), "JST_binance-futures_1m_ohlcv");
        assert_ne!(bybit.file_stem(), binance.file_stem());
        assert_ne!(bybit.file_stem(), hourly.file_stem());
    }

    #[test]
    fn snapshot_series_naming() {
        let s = SnapshotSeries::new(NaiveDate::from_ymd_opt(2023, 1, 8).unwrap());
        assert_eq!(s.to_string(), "20230108");
        assert_eq!(s.file_stem(), "universe_snapshot_20230108");
    }
}
