//! Supported exchange venues.

use crate::error::AcquireError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Derivatives venue serving USDT-margined perpetual klines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Venue {
    /// Binance USDⓈ-M futures.
    #[serde(rename = "binance-futures")]
    BinanceFutures,
    /// Bybit linear perpetuals.
    #[serde(rename = "bybit")]
    Bybit,
}

impl Venue {
    pub const ALL: [Venue; 2] = [Self::BinanceFutures, Self::Bybit];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BinanceFutures => "binance-futures",
            Self::Bybit => "bybit",
        }
    }

    /// Venue market symbol for a base asset, e.g. `JST` -> `JSTUSDT`.
    pub fn format_symbol(self, base: &str) -> String {
        let base = base.trim().to_uppercase();
        match self {
            Self::BinanceFutures | Self::Bybit => format!("{base}USDT"),
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::BinanceFutures => "https://fapi.binance.com",
            Self::Bybit => "https://api.bybit.com",
        }
    }

    /// Largest page the klines endpoint will return.
    pub fn max_page_limit(self) -> usize {
        match self {
            Self::BinanceFutures => 1500,
            Self::Bybit => 1000,
        }
    }

    /// Request rate shared by every worker talking to this venue.
    pub fn default_requests_per_second(self) -> u32 {
        match self {
            // klines at limit=1500 weigh 10 against a 2400/min budget
            Self::BinanceFutures => 4,
            Self::Bybit => 10,
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Venue {
    type Err = AcquireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "binance-futures" => Ok(Self::BinanceFutures),
            "bybit" => Ok(Self::Bybit),
            other => Err(AcquireError::Config(format!(
                "exchange '{other}' not recognized (expected binance-futures or bybit)"
            ))),
        }
    }
}
