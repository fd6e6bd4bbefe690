//! Sinks — durable storage for one completed series.
//!
//! Layout: `{output_dir}/{file_stem}.{csv|parquet}` plus a
//! `{file_stem}.meta.json` sidecar. Writes are atomic (write to a uniquely
//! named temp file in the same directory, rename into place) and the last
//! writer wins. A sink never retries; a
//! failed write is reported as [`AcquireError::Write`].

pub mod candles;
pub mod meta;
pub mod snapshots;

use crate::error::AcquireError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub use candles::CandleFileSink;
pub use meta::SeriesMeta;
pub use snapshots::SnapshotFileSink;

/// Persists one series' records.
pub trait Sink<S, R>: Sync {
    /// Write `records` for `series`. An empty record set is skipped with a warning.
    fn persist(&self, series: &S, records: Vec<R>) -> Result<SinkReport, AcquireError>;

    /// Records already stored for `series`, oldest first.
    fn existing(&self, _series: &S) -> Result<Vec<R>, AcquireError> {
        Ok(Vec::new())
    }
}

/// What a `persist` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkReport {
    Written { files: Vec<PathBuf>, records: usize },
    /// Nothing to write.
    Skipped,
}

/// On-disk tabular format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Parquet,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Parquet => "parquet",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = AcquireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "parquet" => Ok(Self::Parquet),
            other => Err(AcquireError::Config(format!(
                "unsupported output format '{other}' (expected csv or parquet)"
            ))),
        }
    }
}

fn write_err(path: &Path, what: &str, e: impl fmt::Display) -> AcquireError {
    AcquireError::Write(format!("{}: {what}: {e}", path.display()))
}

/// Create `dir` if it does not exist.
pub(crate) fn ensure_dir(dir: &Path) -> Result<(), AcquireError> {
    fs::create_dir_all(dir).map_err(|e| write_err(dir, "failed to create dir", e))
}

/// Write `path` through `write` into a unique temp file beside it, then
/// rename into place. Concurrent writers never share a temp file.
pub(crate) fn write_atomic<F>(path: &Path, write: F) -> Result<(), AcquireError>
where
    F: FnOnce(fs::File) -> Result<(), AcquireError>,
{
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp = tempfile::Builder::new()
        .prefix(".marketwalk-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| write_err(dir, "create temp file", e))?;
    let file = tmp
        .as_file()
        .try_clone()
        .map_err(|e| write_err(tmp.path(), "clone temp handle", e))?;

    // Dropping `tmp` on error removes the temp file.
    write(file)?;

    tmp.persist(path)
        .map(|_| ())
        .map_err(|e| write_err(path, "atomic rename failed", e.error))
}
