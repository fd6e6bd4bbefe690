//! Metadata sidecar written next to each series file.

use super::{write_atomic, write_err};
use crate::error::AcquireError;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// `{file_stem}.meta.json`: what was written, when, and a content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesMeta {
    pub series: String,
    pub records: usize,
    pub first_timestamp: i64,
    pub last_timestamp: i64,
    /// blake3 of the serialized records.
    pub data_hash: String,
    pub files: Vec<String>,
    pub written_at: NaiveDateTime,
}

impl SeriesMeta {
    pub fn new(
        series: impl Into<String>,
        records: usize,
        first_timestamp: i64,
        last_timestamp: i64,
        data_hash: String,
        files: &[PathBuf],
    ) -> Self {
        Self {
            series: series.into(),
            records,
            first_timestamp,
            last_timestamp,
            data_hash,
            files: files
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect(),
            written_at: Utc::now().naive_utc(),
        }
    }

    pub fn path(dir: &Path, file_stem: &str) -> PathBuf {
        dir.join(format!("{file_stem}.meta.json"))
    }

    pub fn write(&self, path: &Path) -> Result<(), AcquireError> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| write_err(path, "meta serialization", e))?;
        write_atomic(path, |mut f| {
            f.write_all(&json).map_err(|e| write_err(path, "meta write", e))
        })
    }

    /// Read a sidecar; `None` when it is missing or unreadable.
    pub fn read(path: &Path) -> Option<Self> {
        let content = fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }
}
