//! Rendered-page snapshot adapter.
//!
//! Each snapshot date is one page: navigate a browser to the historical
//! listings URL for that date, scroll until the document stops growing, then
//! pull the listings table out of the rendered markup. The adapter returns
//! the whole table as a single final [`Page`], so a walk over a
//! [`SnapshotSeries`] makes exactly one fetch.

pub mod dates;
pub mod table;
pub mod webdriver;

use super::{AdapterFactory, RateBudget, SourceAdapter};
use crate::domain::{Cursor, Page, SnapshotRow, SnapshotSeries};
use crate::error::AcquireError;
use crate::walker::retry::pause;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use dates::{generate_snapshot_dates, parse_compact_date, snapshot_dates};
pub use table::{extract_last_table, Table, LISTING_CONTAINER_CLASS};
pub use webdriver::{BrowserDriver, SessionOptions, WebDriverSession};

const HEIGHT_SCRIPT: &str = "return document.body.scrollHeight";

/// `[snapshots]` configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeSettings {
    /// Historical listings root; the compact date and `/` are appended.
    pub base_url: String,
    /// Running WebDriver endpoint.
    pub webdriver_url: String,
    pub headless: bool,
    /// Wait after navigation before the first scroll.
    pub page_load_ms: u64,
    /// Wait after each scroll step.
    pub scroll_pause_ms: u64,
    pub scroll_increment_px: u32,
    /// Give up on a page that is still growing after this many scrolls.
    pub max_scrolls: u32,
    /// Minimum spacing between page loads across all workers.
    pub min_interval_ms: u64,
    /// Class of the `div` wrapping the listings table.
    pub container_class: String,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            base_url: "https://coinmarketcap.com/historical/".to_string(),
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            page_load_ms: 2000,
            scroll_pause_ms: 2000,
            scroll_increment_px: 1000,
            max_scrolls: 500,
            min_interval_ms: 1000,
            container_class: LISTING_CONTAINER_CLASS.to_string(),
        }
    }
}

impl ScrapeSettings {
    /// Snapshot URL for one date.
    pub fn url_for(&self, series: &SnapshotSeries) -> String {
        format!(
            "{}/{}/",
            self.base_url.trim_end_matches('/'),
            series.compact_date()
        )
    }
}

fn height(driver: &mut impl BrowserDriver) -> Result<i64, AcquireError> {
    let value = driver.execute_script(HEIGHT_SCRIPT)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|h| h as i64))
        .ok_or_else(|| AcquireError::Render(format!("scroll height is not a number: {value}")))
}

/// Scroll down in fixed steps until the document height stops changing.
///
/// Returns the number of scroll steps taken.
pub fn scroll_until_stable(
    driver: &mut impl BrowserDriver,
    settings: &ScrapeSettings,
) -> Result<u32, AcquireError> {
    let step = format!("window.scrollBy(0, {});", settings.scroll_increment_px);
    let pause_each = Duration::from_millis(settings.scroll_pause_ms);
    let mut last_height = height(driver)?;

    for scrolls in 1..=settings.max_scrolls {
        driver.execute_script(&step)?;
        pause(pause_each);
        let new_height = height(driver)?;
        if new_height == last_height {
            return Ok(scrolls);
        }
        last_height = new_height;
    }

    Err(AcquireError::Render(format!(
        "page still growing after {} scrolls",
        settings.max_scrolls
    )))
}

/// Scrapes one listings snapshot per call.
pub struct SnapshotAdapter<D> {
    driver: D,
    settings: ScrapeSettings,
    budget: Arc<RateBudget>,
}

impl<D: BrowserDriver> SnapshotAdapter<D> {
    pub fn new(driver: D, settings: ScrapeSettings, budget: Arc<RateBudget>) -> Self {
        Self {
            driver,
            settings,
            budget,
        }
    }

    fn scrape(&mut self, series: &SnapshotSeries) -> Result<Option<Table>, AcquireError> {
        let url = self.settings.url_for(series);
        self.budget.acquire();
        debug!(%url, "loading snapshot page");
        self.driver.navigate(&url)?;
        pause(Duration::from_millis(self.settings.page_load_ms));
        let scrolls = scroll_until_stable(&mut self.driver, &self.settings)?;
        debug!(%url, scrolls, "page height stable");
        let html = self.driver.page_source()?;
        extract_last_table(&html, &self.settings.container_class)
    }
}

impl<D: BrowserDriver> SourceAdapter for SnapshotAdapter<D> {
    type Series = SnapshotSeries;
    type Record = SnapshotRow;

    fn name(&self) -> &str {
        "browser:snapshot"
    }

    /// The page is the whole table; `limit` does not apply.
    fn fetch_page(
        &mut self,
        series: &SnapshotSeries,
        cursor: Option<Cursor>,
        _limit: usize,
    ) -> Result<Page<SnapshotRow>, AcquireError> {
        let at = series.cursor();
        if cursor.is_some_and(|c| c > at) {
            return Ok(Page::empty());
        }

        let Some(table) = self.scrape(series)? else {
            warn!(series = %series, "no listings table on page");
            return Ok(Page::empty());
        };

        let columns = Arc::new(table.headers);
        let rows: Vec<SnapshotRow> = table
            .rows
            .into_iter()
            .map(|values| SnapshotRow {
                timestamp: at,
                columns: Arc::clone(&columns),
                values,
            })
            .collect();
        info!(series = %series, rows = rows.len(), columns = columns.len(), "snapshot scraped");
        Ok(Page::last(rows))
    }
}

/// Starts one browser session per worker.
#[derive(Debug)]
pub struct SnapshotAdapterFactory {
    settings: ScrapeSettings,
    budget: Arc<RateBudget>,
}

impl SnapshotAdapterFactory {
    pub fn new(settings: ScrapeSettings) -> Result<Self, AcquireError> {
        let budget = RateBudget::every(
            "snapshot-site",
            Duration::from_millis(settings.min_interval_ms),
        )?;
        Ok(Self {
            settings,
            budget: Arc::new(budget),
        })
    }

    pub fn settings(&self) -> &ScrapeSettings {
        &self.settings
    }
}

impl AdapterFactory for SnapshotAdapterFactory {
    type Adapter = SnapshotAdapter<WebDriverSession>;

    fn adapter_key(&self, _series: &SnapshotSeries) -> String {
        "browser".to_string()
    }

    fn build(&self, _series: &SnapshotSeries) -> Result<Self::Adapter, AcquireError> {
        let opts = SessionOptions {
            headless: self.settings.headless,
            ..SessionOptions::default()
        };
        let session = WebDriverSession::start(&self.settings.webdriver_url, &opts)?;
        Ok(SnapshotAdapter::new(
            session,
            self.settings.clone(),
            Arc::clone(&self.budget),
        ))
    }
}
