//! REST kline paginator for Binance USDⓈ-M and Bybit linear perpetuals.
//!
//! One [`RestKlineAdapter`] per worker per venue. Every request first checks
//! the venue's circuit breaker, then waits on the venue's shared
//! [`RateBudget`]. Failures are mapped onto [`AcquireError`] and returned to
//! the walker; the adapter itself never retries.
//!
//! Bybit pages are fixed time windows. A window before the instrument's
//! launch or inside a trading gap comes back empty, so the adapter starts
//! no earlier than the launch time and slides past empty windows until one
//! has candles or the window reaches the present.

pub mod binance;
pub mod bybit;
mod json;

use super::{AdapterFactory, CircuitBreaker, RateBudget, SourceAdapter};
use crate::domain::{now_ms, Candle, CandleSeries, Cursor, Page, Timeframe, Venue};
use crate::error::AcquireError;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bybit instruments are listed 1000 per page; stop following cursors after this many.
const MAX_INSTRUMENT_PAGES: usize = 50;

/// Per-venue overrides from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VenueSettings {
    /// Override of the venue's public REST endpoint.
    pub base_url: Option<String>,
    /// Override of the venue-wide request budget.
    pub requests_per_second: Option<u32>,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for VenueSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            requests_per_second: None,
            timeout_secs: 30,
        }
    }
}

impl VenueSettings {
    pub fn base_url(&self, venue: Venue) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| venue.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn requests_per_second(&self, venue: Venue) -> u32 {
        self.requests_per_second
            .unwrap_or_else(|| venue.default_requests_per_second())
    }
}

/// Kline paginator for one venue.
pub struct RestKlineAdapter {
    venue: Venue,
    name: String,
    base_url: String,
    client: reqwest::blocking::Client,
    budget: Arc<RateBudget>,
    breaker: Arc<CircuitBreaker>,
    markets: HashSet<String>,
    launch_times: HashMap<String, Cursor>,
}

impl RestKlineAdapter {
    /// Build the HTTP client and load the venue's market list.
    pub fn connect(
        venue: Venue,
        settings: &VenueSettings,
        budget: Arc<RateBudget>,
        breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, AcquireError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(concat!("marketwalk/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AcquireError::Config(format!("failed to build HTTP client: {e}")))?;

        let mut adapter = Self {
            venue,
            name: format!("rest:{venue}"),
            base_url: settings.base_url(venue),
            client,
            budget,
            breaker,
            markets: HashSet::new(),
            launch_times: HashMap::new(),
        };
        adapter.load_markets()?;
        Ok(adapter)
    }

    pub fn venue(&self) -> Venue {
        self.venue
    }

    /// Refresh the set of tradable market symbols.
    pub fn load_markets(&mut self) -> Result<usize, AcquireError> {
        self.launch_times.clear();
        let markets: Vec<String> = match self.venue {
            Venue::BinanceFutures => {
                let body = self.get_json(binance::EXCHANGE_INFO_PATH, &[])?;
                binance::parse_markets(&body)?
            }
            Venue::Bybit => {
                let mut all = Vec::new();
                let mut page_cursor: Option<String> = None;
                for _ in 0..MAX_INSTRUMENT_PAGES {
                    let query = bybit::instruments_query(page_cursor.as_deref());
                    let body = self.get_json(bybit::INSTRUMENTS_PATH, &query)?;
                    let (instruments, next) = bybit::parse_instruments(&body)?;
                    for instrument in instruments {
                        if let Some(t) = instrument.launch_time {
                            self.launch_times.insert(instrument.symbol.clone(), t);
                        }
                        all.push(instrument.symbol);
                    }
                    match next {
                        Some(c) => page_cursor = Some(c),
                        None => break,
                    }
                }
                all
            }
        };
        self.markets = markets.into_iter().collect();
        info!(venue = %self.venue, markets = self.markets.len(), "markets loaded");
        Ok(self.markets.len())
    }

    pub fn has_market(&self, market: &str) -> bool {
        self.markets.contains(market)
    }

    /// Listing time of a market, when the venue reports one.
    pub fn launch_time(&self, market: &str) -> Option<Cursor> {
        self.launch_times.get(market).copied()
    }

    fn fetch_bybit(
        &self,
        market: &str,
        timeframe: Timeframe,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> Result<Vec<Candle>, AcquireError> {
        let mut start = match (cursor, self.launch_time(market)) {
            (Some(c), Some(launch)) => Some(c.max(launch)),
            (c, _) => c,
        };
        loop {
            let query = bybit::klines_query(market, timeframe, start, limit);
            let candles = bybit::parse_klines(&self.get_json(bybit::KLINES_PATH, &query)?)?;
            let Some(from) = start else {
                return Ok(candles);
            };
            let next = bybit::window_end(from, timeframe, limit).saturating_add(1);
            if !candles.is_empty() || next > now_ms() {
                return Ok(candles);
            }
            debug!(market, from, next, "empty window; sliding forward");
            start = Some(next);
        }
    }

    fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, AcquireError> {
        if !self.breaker.is_allowed() {
            return Err(AcquireError::CircuitBreakerTripped {
                venue: self.venue.to_string(),
            });
        }

        self.budget.acquire();

        let url = format!("{}{path}", self.base_url);
        debug!(venue = %self.venue, %url, ?query, "GET");

        let resp = match self.client.get(&url).query(query).send() {
            Ok(resp) => resp,
            Err(e) => {
                self.breaker.record_failure();
                return Err(AcquireError::Transport(format!("{url}: {e}")));
            }
        };

        let status = resp.status();

        if status == StatusCode::FORBIDDEN || status.as_u16() == 418 {
            self.breaker.trip();
            return Err(AcquireError::CircuitBreakerTripped {
                venue: self.venue.to_string(),
            });
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            self.breaker.record_failure();
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            warn!(venue = %self.venue, retry_after, "rate limited by venue");
            return Err(AcquireError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if status == StatusCode::BAD_REQUEST {
            let detail = resp
                .json::<Value>()
                .ok()
                .and_then(|body| binance::api_error(&body))
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(AcquireError::Config(format!("{url}: {detail}")));
        }

        if !status.is_success() {
            self.breaker.record_failure();
            return Err(AcquireError::Transport(format!("HTTP {status} for {url}")));
        }

        let body = resp.json::<Value>().map_err(|e| {
            AcquireError::ResponseFormatChanged(format!("failed to parse response from {url}: {e}"))
        })?;
        self.breaker.record_success();
        Ok(body)
    }
}

impl SourceAdapter for RestKlineAdapter {
    type Series = CandleSeries;
    type Record = Candle;

    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_page(
        &mut self,
        series: &CandleSeries,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> Result<Page<Candle>, AcquireError> {
        if series.venue != self.venue {
            return Err(AcquireError::Config(format!(
                "series {series} routed to {} adapter",
                self.venue
            )));
        }

        let market = series.market();
        if !self.has_market(&market) {
            return Err(AcquireError::Config(format!(
                "market {market} is not listed on {}",
                self.venue
            )));
        }

        let limit = limit.clamp(1, self.venue.max_page_limit());
        let candles = match self.venue {
            Venue::BinanceFutures => {
                let query = binance::klines_query(&market, series.timeframe, cursor, limit);
                binance::parse_klines(&self.get_json(binance::KLINES_PATH, &query)?)?
            }
            Venue::Bybit => self.fetch_bybit(&market, series.timeframe, cursor, limit)?,
        };

        debug!(series = %series, cursor = ?cursor, received = candles.len(), "klines page");
        Ok(Page::new(candles))
    }
}

/// Resources shared by every adapter of one venue.
#[derive(Debug, Clone)]
pub struct VenueResources {
    pub settings: VenueSettings,
    pub budget: Arc<RateBudget>,
    pub breaker: Arc<CircuitBreaker>,
}

/// Builds [`RestKlineAdapter`]s on the worker that uses them.
#[derive(Debug)]
pub struct RestAdapterFactory {
    venues: BTreeMap<Venue, VenueResources>,
}

impl RestAdapterFactory {
    /// One rate budget and breaker per supported venue.
    pub fn new(overrides: &BTreeMap<Venue, VenueSettings>) -> Result<Self, AcquireError> {
        let mut venues = BTreeMap::new();
        for venue in Venue::ALL {
            let settings = overrides.get(&venue).cloned().unwrap_or_default();
            let budget = RateBudget::per_second(venue.as_str(), settings.requests_per_second(venue))?;
            venues.insert(
                venue,
                VenueResources {
                    settings,
                    budget: Arc::new(budget),
                    breaker: Arc::new(CircuitBreaker::for_venue(venue.as_str())),
                },
            );
        }
        Ok(Self { venues })
    }

    pub fn resources(&self, venue: Venue) -> Option<&VenueResources> {
        self.venues.get(&venue)
    }
}

impl AdapterFactory for RestAdapterFactory {
    type Adapter = RestKlineAdapter;

    fn adapter_key(&self, series: &CandleSeries) -> String {
        series.venue.to_string()
    }

    fn build(&self, series: &CandleSeries) -> Result<RestKlineAdapter, AcquireError> {
        let res = self.resources(series.venue).ok_or_else(|| {
            AcquireError::Config(format!("no resources configured for {}", series.venue))
        })?;
        RestKlineAdapter::connect(
            series.venue,
            &res.settings,
            Arc::clone(&res.budget),
            Arc::clone(&res.breaker),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_fall_back_to_venue_defaults() {
        let s = VenueSettings::default();
        assert_eq!(s.base_url(Venue::Bybit), "https://api.bybit.com");
        assert_eq!(s.requests_per_second(Venue::BinanceFutures), 4);

        let s = VenueSettings {
            base_url: Some("http://localhost:8080/".into()),
            requests_per_second: Some(2),
            timeout_secs: 5,
        };
        assert_eq!(s.base_url(Venue::Bybit), "http://localhost:8080");
        assert_eq!(s.requests_per_second(Venue::Bybit), 2);
    }

    #[test]
    fn factory_shares_one_budget_per_venue() {
        let factory = RestAdapterFactory::new(&BTreeMap::new()).unwrap();
        let bybit = factory.resources(Venue::Bybit).unwrap();
        let binance = factory.resources(Venue::BinanceFutures).unwrap();
        assert_eq!(bybit.budget.name(), "bybit");
        assert_eq!(binance.breaker.venue(), "binance-futures");
        assert!(!Arc::ptr_eq(&bybit.budget, &binance.budget));
    }

    #[test]
    fn zero_rate_override_is_rejected() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            Venue::Bybit,
            VenueSettings {
                requests_per_second: Some(0),
                ..VenueSettings::default()
            },
        );
        assert!(matches!(
            RestAdapterFactory::new(&overrides),
            Err(AcquireError::Config(_))
        ));
    }

    #[test]
    fn adapters_are_keyed_by_venue() {
        use crate::domain::Timeframe;
        let factory = RestAdapterFactory::new(&BTreeMap::new()).unwrap();
        let series = CandleSeries::new("JST", Timeframe::M1, Venue::Bybit);
        assert_eq!(factory.adapter_key(&series), "bybit");
    }
}
