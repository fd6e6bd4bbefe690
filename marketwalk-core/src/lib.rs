//! MarketWalk Core — incremental, cursor-paginated market data acquisition.
//!
//! This crate contains everything needed to pull one series to completion:
//! - Domain types (series identifiers, cursors, pages, candles, snapshot rows)
//! - The `SourceAdapter` seam and the per-worker adapter cache
//! - Cursor walker with page validation and retry/backoff policy
//! - REST kline paginator (Binance USDⓈ-M, Bybit linear) with a shared
//!   rate budget and circuit breaker per venue
//! - Rendered-page snapshot scraper over a WebDriver session
//! - CSV/Parquet sinks with metadata sidecars

pub mod domain;
pub mod error;
pub mod sink;
pub mod source;
pub mod walker;

pub use error::{AcquireError, ErrorKind};
