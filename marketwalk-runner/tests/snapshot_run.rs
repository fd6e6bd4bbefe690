//! Snapshot runs: dates → browser adapter → walker → snapshot files, through the fan-out.

use marketwalk_core::domain::SnapshotSeries;
use marketwalk_core::sink::{OutputFormat, SnapshotFileSink};
use marketwalk_core::source::scrape::{BrowserDriver, ScrapeSettings, SnapshotAdapter};
use marketwalk_core::source::{AdapterFactory, RateBudget};
use marketwalk_core::walker::WalkPolicy;
use marketwalk_core::{AcquireError, ErrorKind};
use marketwalk_runner::{run_snapshots_with, snapshot_series, FanOut, LogProgress, OutcomeStatus};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn listing(rows: &[(&str, &str, &str)]) -> String {
    let body: String = rows
        .iter()
        .map(|(rank, name, symbol)| format!("<tr><td>{rank}</td><td>{name}</td><td>{symbol}</td></tr>"))
        .collect();
    format!(
        r#"<html><body><div class="cmc-table-listing"><table>
        <thead><tr><th>Rank</th><th>Name</th><th>Symbol</th></tr></thead>
        <tbody>{body}</tbody></table></div></body></html>"#
    )
}

/// Serves canned pages by URL; the document never grows.
struct CannedBrowser {
    pages: Arc<HashMap<String, String>>,
    current: Option<String>,
}

impl BrowserDriver for CannedBrowser {
    fn navigate(&mut self, url: &str) -> Result<(), AcquireError> {
        if !self.pages.contains_key(url) {
            return Err(AcquireError::Render(format!("timed out loading {url}")));
        }
        self.current = Some(url.to_string());
        Ok(())
    }

    fn execute_script(&mut self, _script: &str) -> Result<Value, AcquireError> {
        Ok(json!(4000))
    }

    fn page_source(&mut self) -> Result<String, AcquireError> {
        self.current
            .as_ref()
            .and_then(|url| self.pages.get(url))
            .cloned()
            .ok_or_else(|| AcquireError::Render("no page loaded".into()))
    }
}

struct CannedFactory {
    pages: Arc<HashMap<String, String>>,
    settings: ScrapeSettings,
    budget: Arc<RateBudget>,
    sessions: AtomicUsize,
}

impl CannedFactory {
    fn new(pages: &[(&str, String)]) -> Self {
        let settings = ScrapeSettings {
            base_url: "https://listings.test/historical/".into(),
            page_load_ms: 0,
            scroll_pause_ms: 0,
            max_scrolls: 5,
            ..ScrapeSettings::default()
        };
        let pages = pages
            .iter()
            .map(|(date, html)| (format!("{}{date}/", settings.base_url), html.clone()))
            .collect();
        Self {
            pages: Arc::new(pages),
            settings,
            budget: Arc::new(RateBudget::per_second("snapshot-site", 1000).unwrap()),
            sessions: AtomicUsize::new(0),
        }
    }
}

impl AdapterFactory for CannedFactory {
    type Adapter = SnapshotAdapter<CannedBrowser>;

    fn adapter_key(&self, _series: &SnapshotSeries) -> String {
        "browser".into()
    }

    fn build(&self, _series: &SnapshotSeries) -> Result<Self::Adapter, AcquireError> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        let browser = CannedBrowser {
            pages: Arc::clone(&self.pages),
            current: None,
        };
        Ok(SnapshotAdapter::new(browser, self.settings.clone(), Arc::clone(&self.budget)))
    }
}

#[test]
fn weekly_snapshots_are_scraped_and_saved_per_date() {
    let dir = tempfile::tempdir().unwrap();
    let sink = SnapshotFileSink::new(dir.path(), vec![OutputFormat::Csv, OutputFormat::Parquet]);
    let factory = CannedFactory::new(&[
        ("20230101", listing(&[("1", "Bitcoin", "BTC"), ("2", "Ethereum", "ETH")])),
        // No listings table on this date.
        ("20230108", "<html><body><p>maintenance</p></body></html>".to_string()),
        // 20230115 never loads.
    ]);
    let dates = snapshot_series("20230101", "20230115", 7).unwrap();
    assert_eq!(dates.len(), 3);

    let fan = FanOut::new(2).unwrap();
    let report = run_snapshots_with(
        &fan,
        &factory,
        &sink,
        &WalkPolicy::new(1500, Duration::ZERO),
        &dates,
        &LogProgress,
    );

    let statuses: Vec<&OutcomeStatus> = report.outcomes.iter().map(|o| &o.status).collect();
    assert!(matches!(statuses[0], OutcomeStatus::Success { records: 2, saved: 2, .. }));
    assert_eq!(*statuses[1], OutcomeStatus::NoData);
    assert!(matches!(
        statuses[2],
        OutcomeStatus::Error {
            kind: ErrorKind::Render,
            ..
        }
    ));
    assert_eq!(report.summary.succeeded, 1);
    assert_eq!(report.summary.no_data, 1);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.records, 2);

    let csv = std::fs::read_to_string(sink.path_for(&dates[0], OutputFormat::Csv)).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("Rank,Name,Symbol"));
    assert_eq!(lines.next(), Some("1,Bitcoin,BTC"));
    assert_eq!(lines.next(), Some("2,Ethereum,ETH"));
    assert!(sink.path_for(&dates[0], OutputFormat::Parquet).exists());
    assert!(!sink.path_for(&dates[1], OutputFormat::Csv).exists());
    assert!(!sink.path_for(&dates[2], OutputFormat::Csv).exists());

    assert!(factory.sessions.load(Ordering::SeqCst) <= 2);
}
