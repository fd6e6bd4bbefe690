//! Bybit v5 linear perpetuals: `/v5/market/kline` and `/v5/market/instruments-info`.
//!
//! Bybit answers a kline query with the newest candles of the requested
//! window first, so a forward walk asks for the window
//! `[cursor, cursor + limit * timeframe)` and reverses the list. Unlike
//! Binance's `startTime`, a window never jumps ahead to the first candle, so
//! the adapter slides past empty windows itself.

use super::json::{array, millis_at, number_at};
use crate::domain::{Candle, Cursor, Timeframe};
use crate::error::AcquireError;
use serde_json::Value;

pub const KLINES_PATH: &str = "/v5/market/kline";
pub const INSTRUMENTS_PATH: &str = "/v5/market/instruments-info";
pub const CATEGORY: &str = "linear";

const RATE_LIMIT_CODE: i64 = 10006;
const PARAMS_ERROR_CODE: i64 = 10001;

pub fn klines_query(
    market: &str,
    timeframe: Timeframe,
    cursor: Option<Cursor>,
    limit: usize,
) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("category", CATEGORY.to_string()),
        ("symbol", market.to_string()),
        ("interval", timeframe.bybit_interval().to_string()),
        ("limit", limit.to_string()),
    ];
    if let Some(start) = cursor {
        query.push(("start", start.to_string()));
        query.push(("end", window_end(start, timeframe, limit).to_string()));
    }
    query
}

/// Last millisecond of the `limit`-candle window starting at `start`.
pub fn window_end(start: Cursor, timeframe: Timeframe, limit: usize) -> Cursor {
    let span = timeframe.as_millis().saturating_mul(limit as i64);
    start.saturating_add(span).saturating_sub(1)
}

/// One listed linear instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    pub symbol: String,
    /// Listing time; no candle exists before it.
    pub launch_time: Option<Cursor>,
}

pub fn instruments_query(page_cursor: Option<&str>) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("category", CATEGORY.to_string()),
        ("limit", "1000".to_string()),
    ];
    if let Some(c) = page_cursor {
        query.push(("cursor", c.to_string()));
    }
    query
}

/// Unwrap the `{retCode, retMsg, result}` envelope.
pub fn result(body: &Value) -> Result<&Value, AcquireError> {
    let code = body
        .get("retCode")
        .and_then(Value::as_i64)
        .ok_or_else(|| AcquireError::ResponseFormatChanged("bybit response has no retCode".into()))?;
    if code != 0 {
        let msg = body.get("retMsg").and_then(Value::as_str).unwrap_or("");
        return Err(match code {
            RATE_LIMIT_CODE => AcquireError::RateLimited { retry_after_secs: 1 },
            PARAMS_ERROR_CODE => AcquireError::Config(format!("bybit error {code}: {msg}")),
            _ => AcquireError::Transport(format!("bybit error {code}: {msg}")),
        });
    }
    body.get("result")
        .ok_or_else(|| AcquireError::ResponseFormatChanged("bybit response has no result".into()))
}

pub fn parse_klines(body: &Value) -> Result<Vec<Candle>, AcquireError> {
    let list = result(body)?
        .get("list")
        .ok_or_else(|| AcquireError::ResponseFormatChanged("kline result has no list".into()))?;
    let mut candles = array(list, "kline list")?
        .iter()
        .map(|row| {
            let row = array(row, "kline row")?;
            Ok(Candle {
                timestamp: millis_at(row, 0, "start_time")?,
                open: number_at(row, 1, "open")?,
                high: number_at(row, 2, "high")?,
                low: number_at(row, 3, "low")?,
                close: number_at(row, 4, "close")?,
                volume: number_at(row, 5, "volume")?,
            })
        })
        .collect::<Result<Vec<_>, AcquireError>>()?;
    candles.reverse();
    Ok(candles)
}

/// Instruments of one page plus the cursor of the next page.
pub fn parse_instruments(body: &Value) -> Result<(Vec<Instrument>, Option<String>), AcquireError> {
    let result = result(body)?;
    let list = result
        .get("list")
        .ok_or_else(|| AcquireError::ResponseFormatChanged("instruments result has no list".into()))?;
    let instruments = array(list, "instruments")?
        .iter()
        .filter_map(|i| {
            let symbol = i.get("symbol").and_then(Value::as_str)?;
            let launch_time = i
                .get("launchTime")
                .and_then(Value::as_str)
                .and_then(|t| t.parse::<i64>().ok());
            Some(Instrument {
                symbol: symbol.to_string(),
                launch_time,
            })
        })
        .collect();
    let next = result
        .get("nextPageCursor")
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .map(String::from);
    Ok((instruments, next))
}
