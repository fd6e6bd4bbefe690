//! Binance USDⓈ-M futures: `/fapi/v1/klines` and `/fapi/v1/exchangeInfo`.
//!
//! Klines come back oldest-first as positional arrays:
//! `[openTime, "open", "high", "low", "close", "volume", closeTime, ...]`.

use super::json::{array, millis_at, number_at};
use crate::domain::{Candle, Cursor, Timeframe};
use crate::error::AcquireError;
use serde_json::Value;

pub const KLINES_PATH: &str = "/fapi/v1/klines";
pub const EXCHANGE_INFO_PATH: &str = "/fapi/v1/exchangeInfo";

pub fn klines_query(
    market: &str,
    timeframe: Timeframe,
    cursor: Option<Cursor>,
    limit: usize,
) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("symbol", market.to_string()),
        ("interval", timeframe.as_str().to_string()),
        ("limit", limit.to_string()),
    ];
    if let Some(since) = cursor {
        query.push(("startTime", since.to_string()));
    }
    query
}

pub fn parse_klines(body: &Value) -> Result<Vec<Candle>, AcquireError> {
    array(body, "klines")?
        .iter()
        .map(|row| {
            let row = array(row, "kline row")?;
            Ok(Candle {
                timestamp: millis_at(row, 0, "open_time")?,
                open: number_at(row, 1, "open")?,
                high: number_at(row, 2, "high")?,
                low: number_at(row, 3, "low")?,
                close: number_at(row, 4, "close")?,
                volume: number_at(row, 5, "volume")?,
            })
        })
        .collect()
}

pub fn parse_markets(body: &Value) -> Result<Vec<String>, AcquireError> {
    let symbols = body
        .get("symbols")
        .ok_or_else(|| AcquireError::ResponseFormatChanged("exchangeInfo has no 'symbols'".into()))?;
    Ok(array(symbols, "symbols")?
        .iter()
        .filter_map(|s| s.get("symbol").and_then(Value::as_str))
        .map(String::from)
        .collect())
}

/// Binance error payload: `{"code": -1121, "msg": "Invalid symbol."}`.
pub fn api_error(body: &Value) -> Option<String> {
    let code = body.get("code")?.as_i64()?;
    let msg = body.get("msg").and_then(Value::as_str).unwrap_or("");
    Some(format!("binance error {code}: {msg}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_includes_start_time_only_with_cursor() {
        let q = klines_query("JSTUSDT", Timeframe::M1, None, 1500);
        assert!(!q.iter().any(|(k, _)| *k == "startTime"));

        let q = klines_query("JSTUSDT", Timeframe::M1, Some(1_672_531_200_000), 1500);
        assert!(q.contains(&("startTime", "1672531200000".to_string())));
        assert!(q.contains(&("interval", "1m".to_string())));
    }

    #[test]
    fn parses_positional_klines() {
        let body = json!([
            [1672531200000i64, "0.0212", "0.0215", "0.0210", "0.0214", "120340", 1672531259999i64, "2570.1", 88, "60000", "1280.3", "0"],
            [1672531260000i64, "0.0214", "0.0216", "0.0213", "0.0215", "98012", 1672531319999i64, "2101.7", 71, "41000", "880.2", "0"]
        ]);
        let candles = parse_klines(&body).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp, 1_672_531_200_000);
        assert_eq!(candles[1].close, 0.0215);
        assert_eq!(candles[0].volume, 120_340.0);
    }

    #[test]
    fn malformed_row_is_a_format_change() {
        let body = json!([[1672531200000i64, "x"]]);
        assert!(matches!(
            parse_klines(&body),
            Err(AcquireError::ResponseFormatChanged(_))
        ));
    }

    #[test]
    fn parses_market_list() {
        let body = json!({"symbols": [{"symbol": "BTCUSDT"}, {"symbol": "JSTUSDT"}]});
        assert_eq!(parse_markets(&body).unwrap(), vec!["BTCUSDT", "JSTUSDT"]);
    }
}
