//! Run configuration (`marketwalk.toml`).
//!
//! Every section and field has a default, so an empty file is a valid
//! configuration.

use crate::error::RunnerError;
use crate::tasks::CandleTask;
use marketwalk_core::domain::Venue;
use marketwalk_core::sink::OutputFormat;
use marketwalk_core::source::rest::VenueSettings;
use marketwalk_core::source::scrape::ScrapeSettings;
use marketwalk_core::walker::{RetryPolicy, WalkPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub run: RunSection,
    pub walk: WalkSection,
    /// Per-venue overrides keyed by venue name (`binance-futures`, `bybit`).
    pub venues: BTreeMap<String, VenueSettings>,
    pub tasks: Vec<CandleTask>,
    pub snapshots: SnapshotSection,
}

/// `[run]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSection {
    /// Fixed size of the worker pool.
    pub workers: usize,
    pub output_dir: PathBuf,
    /// Candle output formats.
    pub formats: Vec<OutputFormat>,
    /// Continue from the last saved candle of each series.
    pub resume: bool,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            workers: 10,
            output_dir: PathBuf::from("data/ohlcv"),
            formats: vec![OutputFormat::Csv],
            resume: false,
        }
    }
}

/// `[walk]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkSection {
    pub page_limit: usize,
    /// Mandatory pause between pages of one series.
    pub page_delay_ms: u64,
    /// Retries per page for transient failures. 0 disables retry.
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for WalkSection {
    fn default() -> Self {
        Self {
            page_limit: 1500,
            page_delay_ms: 1000,
            max_retries: 0,
            retry_base_delay_ms: 500,
        }
    }
}

impl WalkSection {
    pub fn policy(&self) -> WalkPolicy {
        let retry = if self.max_retries == 0 {
            RetryPolicy::none()
        } else {
            RetryPolicy::with_retries(
                self.max_retries,
                Duration::from_millis(self.retry_base_delay_ms),
            )
        };
        WalkPolicy::new(self.page_limit, Duration::from_millis(self.page_delay_ms)).with_retry(retry)
    }
}

/// `[snapshots]`: browser settings plus the date range to scrape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotSection {
    #[serde(flatten)]
    pub scrape: ScrapeSettings,
    /// First date, `YYYYMMDD`.
    pub start: Option<String>,
    /// Last date, `YYYYMMDD`, inclusive.
    pub end: Option<String>,
    pub step_days: i64,
    pub output_dir: PathBuf,
    pub formats: Vec<OutputFormat>,
}

impl Default for SnapshotSection {
    fn default() -> Self {
        Self {
            scrape: ScrapeSettings::default(),
            start: None,
            end: None,
            step_days: 7,
            output_dir: PathBuf::from("data/universe"),
            formats: vec![OutputFormat::Parquet],
        }
    }
}

impl RunConfig {
    /// Load and validate a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, RunnerError> {
        let content = std::fs::read_to_string(path).map_err(|e| RunnerError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a configuration string.
    pub fn from_toml(content: &str) -> Result<Self, RunnerError> {
        let config: Self =
            toml::from_str(content).map_err(|e| RunnerError::Config(format!("parse TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RunnerError> {
        if self.run.workers == 0 {
            return Err(RunnerError::Config("run.workers must be at least 1".into()));
        }
        if self.walk.page_limit == 0 {
            return Err(RunnerError::Config("walk.page_limit must be at least 1".into()));
        }
        if self.run.formats.is_empty() {
            return Err(RunnerError::Config("run.formats must name at least one format".into()));
        }
        if self.snapshots.formats.is_empty() {
            return Err(RunnerError::Config(
                "snapshots.formats must name at least one format".into(),
            ));
        }
        if self.snapshots.step_days <= 0 {
            return Err(RunnerError::Config("snapshots.step_days must be positive".into()));
        }
        self.venue_overrides()?;
        Ok(())
    }

    /// `[venues.*]` keyed by parsed venue.
    pub fn venue_overrides(&self) -> Result<BTreeMap<Venue, VenueSettings>, RunnerError> {
        self.venues
            .iter()
            .map(|(name, settings)| {
                let venue: Venue = name
                    .parse()
                    .map_err(|e| RunnerError::Config(format!("[venues.{name}]: {e}")))?;
                Ok((venue, settings.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = RunConfig::from_toml("").unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.run.workers, 10);
        let policy = config.walk.policy();
        assert_eq!(policy.page_limit, 1500);
        assert_eq!(policy.page_delay, Duration::from_secs(1));
        assert_eq!(policy.retry.max_retries, 0);
        assert_eq!(config.snapshots.scrape.max_scrolls, 500);
    }

    #[test]
    fn full_file_parses() {
        let config = RunConfig::from_toml(
            r#"
            [run]
            workers = 4
            output_dir = "out/ohlcv"
            formats = ["csv", "parquet"]
            resume = true

            [walk]
            page_limit = 1000
            page_delay_ms = 250
            max_retries = 3
            retry_base_delay_ms = 100

            [venues.bybit]
            base_url = "http://localhost:8080"
            requests_per_second = 2

            [[tasks]]
            symbol = "JST"
            venue = "bybit"
            start = "2023-01-01"

            [[tasks]]
            symbol = "FLR"
            venue = "bybit"
            start = "2023-03-17"
            timeframe = "1h"

            [snapshots]
            webdriver_url = "http://localhost:4444"
            headless = false
            start = "20230101"
            end = "20230115"
            step_days = 7
            formats = ["csv"]
            "#,
        )
        .unwrap();

        assert_eq!(config.run.workers, 4);
        assert!(config.run.resume);
        assert_eq!(config.run.formats, vec![OutputFormat::Csv, OutputFormat::Parquet]);
        assert_eq!(config.walk.policy().retry.max_retries, 3);
        assert_eq!(config.tasks.len(), 2);
        assert_eq!(config.tasks[0].timeframe, "1m");
        assert_eq!(config.tasks[1].timeframe, "1h");
        assert_eq!(config.snapshots.scrape.webdriver_url, "http://localhost:4444");
        assert!(!config.snapshots.scrape.headless);
        assert_eq!(config.snapshots.scrape.scroll_increment_px, 1000);
        assert_eq!(config.snapshots.start.as_deref(), Some("20230101"));

        let overrides = config.venue_overrides().unwrap();
        assert_eq!(
            overrides[&Venue::Bybit].base_url.as_deref(),
            Some("http://localhost:8080")
        );
    }

    #[test]
    fn zero_workers_rejected() {
        assert!(matches!(
            RunConfig::from_toml("[run]\nworkers = 0\n"),
            Err(RunnerError::Config(_))
        ));
    }

    #[test]
    fn unknown_format_rejected() {
        assert!(RunConfig::from_toml("[run]\nformats = [\"xlsx\"]\n").is_err());
    }

    #[test]
    fn unknown_venue_section_rejected() {
        let err = RunConfig::from_toml("[venues.kraken]\nrequests_per_second = 1\n").unwrap_err();
        assert!(err.to_string().contains("kraken"));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = RunConfig::from_file(Path::new("/nonexistent/marketwalk.toml")).unwrap_err();
        assert!(matches!(err, RunnerError::Read { .. }));
    }
}
