//! SnapshotRow — one row of a scraped listings table.

use super::page::Timestamped;
use std::sync::Arc;

/// A table row, stamped with the snapshot date it was scraped for.
///
/// Rows of one snapshot share a single header list.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRow {
    pub timestamp: i64,
    pub columns: Arc<Vec<String>>,
    pub values: Vec<String>,
}

impl SnapshotRow {
    /// Value under the first column named `column`.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
    }
}

impl Timestamped for SnapshotRow {
    fn timestamp_ms(&self) -> i64 {
        self.timestamp
    }
}
