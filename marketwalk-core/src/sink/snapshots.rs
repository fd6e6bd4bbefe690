//! Listings snapshot files: `universe_snapshot_{YYYYMMDD}.{parquet|csv}`.
//!
//! Every column is stored as a string in extracted order. CSV keeps the
//! scraped header text verbatim; Parquet needs unique, non-empty column
//! names, so blank headers become `column_{i}` and repeats get a `_{n}`
//! suffix.

use super::{ensure_dir, write_atomic, write_err, OutputFormat, SeriesMeta, Sink, SinkReport};
use crate::domain::{SnapshotRow, SnapshotSeries};
use crate::error::AcquireError;
use polars::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Writes each snapshot date to its own file(s) under one directory.
#[derive(Debug, Clone)]
pub struct SnapshotFileSink {
    dir: PathBuf,
    formats: Vec<OutputFormat>,
}

impl SnapshotFileSink {
    pub fn new(dir: impl Into<PathBuf>, formats: Vec<OutputFormat>) -> Self {
        Self {
            dir: dir.into(),
            formats,
        }
    }

    pub fn path_for(&self, series: &SnapshotSeries, format: OutputFormat) -> PathBuf {
        self.dir
            .join(format!("{}.{}", series.file_stem(), format.extension()))
    }
}

impl Sink<SnapshotSeries, SnapshotRow> for SnapshotFileSink {
    fn persist(&self, series: &SnapshotSeries, rows: Vec<SnapshotRow>) -> Result<SinkReport, AcquireError> {
        let Some(first) = rows.first() else {
            warn!(series = %series, "snapshot has no rows; skipping");
            return Ok(SinkReport::Skipped);
        };
        let headers = first.columns.clone();
        if let Some(i) = rows.iter().position(|r| r.values.len() != headers.len()) {
            return Err(AcquireError::ContractViolation(format!(
                "snapshot row {i} does not match the {}-column header",
                headers.len()
            )));
        }

        ensure_dir(&self.dir)?;
        let mut files = Vec::with_capacity(self.formats.len());
        for &format in &self.formats {
            let path = self.path_for(series, format);
            match format {
                OutputFormat::Csv => write_csv(&path, &headers, &rows)?,
                OutputFormat::Parquet => write_parquet(&path, &headers, &rows)?,
            }
            files.push(path);
        }

        let mut hasher = blake3::Hasher::new();
        for row in &rows {
            for value in &row.values {
                hasher.update(value.as_bytes());
                hasher.update(&[0x1f]);
            }
            hasher.update(&[0x1e]);
        }
        let ts = series.cursor();
        SeriesMeta::new(
            series.to_string(),
            rows.len(),
            ts,
            ts,
            hasher.finalize().to_hex().to_string(),
            &files,
        )
        .write(&SeriesMeta::path(&self.dir, &series.file_stem()))?;

        info!(series = %series, records = rows.len(), files = files.len(), "snapshot saved");
        Ok(SinkReport::Written {
            files,
            records: rows.len(),
        })
    }
}

fn write_csv(path: &Path, headers: &[String], rows: &[SnapshotRow]) -> Result<(), AcquireError> {
    write_atomic(path, |file| {
        let mut wtr = csv::Writer::from_writer(file);
        wtr.write_record(headers)
            .map_err(|e| write_err(path, "csv header", e))?;
        for row in rows {
            wtr.write_record(&row.values)
                .map_err(|e| write_err(path, "csv row", e))?;
        }
        wtr.flush().map_err(|e| write_err(path, "csv flush", e))
    })
}

/// Unique, non-empty column names for a columnar file.
pub fn column_names(headers: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let base = if h.is_empty() {
                format!("column_{i}")
            } else {
                h.clone()
            };
            let mut name = base.clone();
            let mut n = 1;
            while !seen.insert(name.clone()) {
                name = format!("{base}_{n}");
                n += 1;
            }
            name
        })
        .collect()
}

fn write_parquet(path: &Path, headers: &[String], rows: &[SnapshotRow]) -> Result<(), AcquireError> {
    let columns: Vec<Column> = column_names(headers)
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let values: Vec<&str> = rows.iter().map(|r| r.values[i].as_str()).collect();
            Column::new(name.as_str().into(), values)
        })
        .collect();
    let mut df = DataFrame::new(columns).map_err(|e| write_err(path, "dataframe creation", e))?;

    write_atomic(path, |file| {
        ParquetWriter::new(file)
            .finish(&mut df)
            .map(|_| ())
            .map_err(|e| write_err(path, "write parquet", e))
    })
}
