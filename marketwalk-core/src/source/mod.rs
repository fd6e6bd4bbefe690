//! Source adapters — "fetch the next page after cursor C" for one series.
//!
//! Two families live here: the REST kline paginator ([`rest`]) and the
//! rendered-page snapshot scraper ([`scrape`]). Adapters hold per-worker
//! state (HTTP client, browser session) and are built by an
//! [`AdapterFactory`] on the worker that uses them; only the rate budget and
//! circuit breaker are shared between workers.

pub mod circuit_breaker;
pub mod rate_budget;
pub mod rest;
pub mod scrape;

use crate::domain::{Cursor, Page, Timestamped};
use crate::error::AcquireError;
use std::collections::HashMap;
use std::fmt;

pub use circuit_breaker::CircuitBreaker;
pub use rate_budget::RateBudget;

/// A bounded-size, time-ordered data source.
pub trait SourceAdapter {
    type Series: fmt::Display;
    type Record: Timestamped;

    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// Fetch up to `limit` records at or after `cursor`.
    ///
    /// `None` asks for the adapter's default starting point. An empty page
    /// signals exhaustion. Adapters do not retry.
    fn fetch_page(
        &mut self,
        series: &Self::Series,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> Result<Page<Self::Record>, AcquireError>;
}

impl<A: SourceAdapter + ?Sized> SourceAdapter for Box<A> {
    type Series = A::Series;
    type Record = A::Record;

    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch_page(
        &mut self,
        series: &Self::Series,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> Result<Page<Self::Record>, AcquireError> {
        (**self).fetch_page(series, cursor, limit)
    }
}

/// Builds adapters on the worker that will own them.
pub trait AdapterFactory: Sync {
    type Adapter: SourceAdapter;

    /// Adapters are cached per worker under this key (e.g. the venue).
    fn adapter_key(&self, series: &<Self::Adapter as SourceAdapter>::Series) -> String;

    fn build(
        &self,
        series: &<Self::Adapter as SourceAdapter>::Series,
    ) -> Result<Self::Adapter, AcquireError>;
}

/// The adapters one worker has built so far, keyed by [`AdapterFactory::adapter_key`].
pub struct WorkerAdapters<'f, F: AdapterFactory> {
    factory: &'f F,
    adapters: HashMap<String, F::Adapter>,
}

impl<'f, F: AdapterFactory> WorkerAdapters<'f, F> {
    pub fn new(factory: &'f F) -> Self {
        Self {
            factory,
            adapters: HashMap::new(),
        }
    }

    /// Adapter for `series`, built on first use. A failed build is not cached.
    pub fn adapter_for(
        &mut self,
        series: &<F::Adapter as SourceAdapter>::Series,
    ) -> Result<&mut F::Adapter, AcquireError> {
        let key = self.factory.adapter_key(series);
        if !self.adapters.contains_key(&key) {
            let adapter = self.factory.build(series)?;
            tracing::debug!(adapter = adapter.name(), key = %key, "adapter built for worker");
            self.adapters.insert(key.clone(), adapter);
        }
        self.adapters
            .get_mut(&key)
            .ok_or_else(|| AcquireError::Config(format!("adapter '{key}' missing after build")))
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
