//! Candle — one OHLCV record of a kline series.

use super::page::Timestamped;
use serde::{Deserialize, Serialize};

/// OHLCV candle keyed by its open time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Open time, epoch milliseconds UTC.
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl Timestamped for Candle {
    fn timestamp_ms(&self) -> i64 {
        self.timestamp
    }
}
