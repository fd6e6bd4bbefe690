//! Candle series files: `{SYMBOL}_{venue}_{timeframe}_ohlcv.csv` and/or `.parquet`.

use super::{ensure_dir, write_atomic, write_err, OutputFormat, SeriesMeta, Sink, SinkReport};
use crate::domain::{Candle, CandleSeries};
use crate::error::AcquireError;
use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const COLUMNS: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

/// One CSV line; the timestamp is rendered as UTC wall time.
#[derive(Debug, Serialize, Deserialize)]
struct CsvCandle {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

fn format_timestamp(ms: i64) -> Result<String, AcquireError> {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
        .ok_or_else(|| AcquireError::Write(format!("timestamp {ms} out of range")))
}

fn parse_timestamp(s: &str) -> Result<i64, AcquireError> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map(|dt| dt.and_utc().timestamp_millis())
        .map_err(|e| AcquireError::Write(format!("bad stored timestamp '{s}': {e}")))
}

/// Writes each candle series to its own file(s) under one directory.
#[derive(Debug, Clone)]
pub struct CandleFileSink {
    dir: PathBuf,
    formats: Vec<OutputFormat>,
}

impl CandleFileSink {
    pub fn new(dir: impl Into<PathBuf>, formats: Vec<OutputFormat>) -> Self {
        Self {
            dir: dir.into(),
            formats,
        }
    }

    /// CSV only.
    pub fn csv(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, vec![OutputFormat::Csv])
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, series: &CandleSeries, format: OutputFormat) -> PathBuf {
        self.dir
            .join(format!("{}.{}", series.file_stem(), format.extension()))
    }
}

impl Sink<CandleSeries, Candle> for CandleFileSink {
    fn persist(&self, series: &CandleSeries, candles: Vec<Candle>) -> Result<SinkReport, AcquireError> {
        let (Some(first), Some(last)) = (candles.first(), candles.last()) else {
            warn!(series = %series, "no candles to write; skipping");
            return Ok(SinkReport::Skipped);
        };
        let (first_ts, last_ts) = (first.timestamp, last.timestamp);

        ensure_dir(&self.dir)?;
        let mut files = Vec::with_capacity(self.formats.len());
        for &format in &self.formats {
            let path = self.path_for(series, format);
            match format {
                OutputFormat::Csv => write_csv(&path, &candles)?,
                OutputFormat::Parquet => write_parquet(&path, &candles)?,
            }
            debug!(series = %series, path = %path.display(), "candle file written");
            files.push(path);
        }

        let hash = blake3::hash(
            &serde_json::to_vec(&candles)
                .map_err(|e| AcquireError::Write(format!("hash serialization: {e}")))?,
        )
        .to_hex()
        .to_string();
        SeriesMeta::new(series.to_string(), candles.len(), first_ts, last_ts, hash, &files)
            .write(&SeriesMeta::path(&self.dir, &series.file_stem()))?;

        info!(series = %series, records = candles.len(), files = files.len(), "series saved");
        Ok(SinkReport::Written {
            files,
            records: candles.len(),
        })
    }

    /// Previously saved candles, read from CSV if present, else Parquet.
    fn existing(&self, series: &CandleSeries) -> Result<Vec<Candle>, AcquireError> {
        let csv_path = self.path_for(series, OutputFormat::Csv);
        if csv_path.exists() {
            return read_csv(&csv_path);
        }
        let parquet_path = self.path_for(series, OutputFormat::Parquet);
        if parquet_path.exists() {
            return read_parquet(&parquet_path);
        }
        Ok(Vec::new())
    }
}

fn write_csv(path: &Path, candles: &[Candle]) -> Result<(), AcquireError> {
    write_atomic(path, |file| {
        let mut wtr = csv::Writer::from_writer(file);
        for c in candles {
            wtr.serialize(CsvCandle {
                timestamp: format_timestamp(c.timestamp)?,
                open: c.open,
                high: c.high,
                low: c.low,
                close: c.close,
                volume: c.volume,
            })
            .map_err(|e| write_err(path, "csv row", e))?;
        }
        wtr.flush().map_err(|e| write_err(path, "csv flush", e))
    })
}

fn read_csv(path: &Path) -> Result<Vec<Candle>, AcquireError> {
    let mut rdr = csv::Reader::from_path(path).map_err(|e| write_err(path, "open csv", e))?;
    let mut candles = Vec::new();
    for row in rdr.deserialize::<CsvCandle>() {
        let row = row.map_err(|e| write_err(path, "csv row", e))?;
        candles.push(Candle::new(
            parse_timestamp(&row.timestamp)?,
            row.open,
            row.high,
            row.low,
            row.close,
            row.volume,
        ));
    }
    Ok(candles)
}

fn candles_to_dataframe(candles: &[Candle]) -> Result<DataFrame, AcquireError> {
    let timestamps: Vec<i64> = candles.iter().map(|c| c.timestamp).collect();
    let opens: Vec<f64> = candles.iter().map(|c| c.open).collect();
    let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
    let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();

    DataFrame::new(vec![
        Column::new("timestamp".into(), timestamps)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .map_err(|e| AcquireError::Write(format!("timestamp cast: {e}")))?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])
    .map_err(|e| AcquireError::Write(format!("dataframe creation: {e}")))
}

fn write_parquet(path: &Path, candles: &[Candle]) -> Result<(), AcquireError> {
    let mut df = candles_to_dataframe(candles)?;
    write_atomic(path, |file| {
        ParquetWriter::new(file)
            .finish(&mut df)
            .map(|_| ())
            .map_err(|e| write_err(path, "write parquet", e))
    })
}

fn read_parquet(path: &Path) -> Result<Vec<Candle>, AcquireError> {
    let file = fs::File::open(path).map_err(|e| write_err(path, "open", e))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| write_err(path, "read parquet", e))?;

    for name in COLUMNS {
        if df.column(name).is_err() {
            return Err(write_err(path, "stored file", format!("missing column '{name}'")));
        }
    }

    let col_err = |e: PolarsError| write_err(path, "column read", e);
    let ts = df
        .column("timestamp")
        .map_err(col_err)?
        .cast(&DataType::Int64)
        .map_err(col_err)?;
    let ts = ts.i64().map_err(col_err)?;
    let f64_col = |name: &str| -> Result<Float64Chunked, AcquireError> {
        Ok(df.column(name).map_err(col_err)?.f64().map_err(col_err)?.clone())
    };
    let (open, high, low, close, volume) = (
        f64_col("open")?,
        f64_col("high")?,
        f64_col("low")?,
        f64_col("close")?,
        f64_col("volume")?,
    );

    let mut candles = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let timestamp = ts
            .get(i)
            .ok_or_else(|| write_err(path, "stored file", format!("null timestamp at row {i}")))?;
        candles.push(Candle::new(
            timestamp,
            open.get(i).unwrap_or(f64::NAN),
            high.get(i).unwrap_or(f64::NAN),
            low.get(i).unwrap_or(f64::NAN),
            close.get(i).unwrap_or(f64::NAN),
            volume.get(i).unwrap_or(0.0),
        ));
    }
    Ok(candles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Timeframe, Venue};

    // 2024-01-01T00:00:00Z
    const T0: i64 = 1_704_067_200_000;

    fn series() -> CandleSeries {
        CandleSeries::new("JST", Timeframe::M1, Venue::Bybit)
    }

    fn candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let p = 0.03 + i as f64 * 0.001;
                Candle::new(T0 + i as i64 * 60_000, p, p + 0.002, p - 0.001, p + 0.001, 1500.0 + i as f64)
            })
            .collect()
    }

    #[test]
    fn csv_layout_matches_expected_header() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CandleFileSink::csv(dir.path());
        sink.persist(&series(), candles(2)).unwrap();

        let text = fs::read_to_string(dir.path().join("JST_bybit_1m_ohlcv.csv")).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("timestamp,open,high,low,close,volume"));
        assert!(lines.next().unwrap().starts_with("2024-01-01 00:00:00,0.03,"));
        assert!(lines.next().unwrap().starts_with("2024-01-01 00:01:00,"));
        assert!(dir.path().join("JST_bybit_1m_ohlcv.meta.json").exists());
    }

    #[test]
    fn existing_reads_back_csv() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CandleFileSink::csv(dir.path());
        let written = candles(5);
        sink.persist(&series(), written.clone()).unwrap();
        assert_eq!(sink.existing(&series()).unwrap(), written);
    }

    #[test]
    fn existing_reads_back_parquet() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CandleFileSink::new(dir.path(), vec![OutputFormat::Parquet]);
        let written = candles(4);
        let report = sink.persist(&series(), written.clone()).unwrap();
        assert_eq!(
            report,
            SinkReport::Written {
                files: vec![dir.path().join("JST_bybit_1m_ohlcv.parquet")],
                records: 4
            }
        );
        assert_eq!(sink.existing(&series()).unwrap(), written);
    }

    #[test]
    fn same_symbol_on_two_venues_keeps_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CandleFileSink::csv(dir.path());
        let bybit = series();
        let binance = CandleSeries::new("JST", Timeframe::H1, Venue::BinanceFutures);

        sink.persist(&bybit, candles(1)).unwrap();
        assert!(sink.existing(&binance).unwrap().is_empty());

        sink.persist(&binance, candles(3)).unwrap();
        assert_eq!(sink.existing(&bybit).unwrap(), candles(1));
        assert_eq!(sink.existing(&binance).unwrap(), candles(3));
        assert!(dir.path().join("JST_binance-futures_1h_ohlcv.csv").exists());
    }

    #[test]
    fn empty_result_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CandleFileSink::csv(dir.path().join("out"));
        assert_eq!(sink.persist(&series(), Vec::new()).unwrap(), SinkReport::Skipped);
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn nothing_saved_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CandleFileSink::csv(dir.path());
        assert!(sink.existing(&series()).unwrap().is_empty());
    }

    #[test]
    fn meta_sidecar_records_range() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CandleFileSink::csv(dir.path());
        sink.persist(&series(), candles(3)).unwrap();
        let meta = SeriesMeta::read(&SeriesMeta::path(dir.path(), "JST_bybit_1m_ohlcv")).unwrap();
        assert_eq!(meta.series, "JST@bybit/1m");
        assert_eq!(meta.records, 3);
        assert_eq!(meta.first_timestamp, T0);
        assert_eq!(meta.last_timestamp, T0 + 120_000);
        assert_eq!(meta.data_hash.len(), 64);
    }

    #[test]
    fn unwritable_dir_is_a_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let sink = CandleFileSink::csv(blocker.join("sub"));
        let err = sink.persist(&series(), candles(1)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Write);
    }
}
