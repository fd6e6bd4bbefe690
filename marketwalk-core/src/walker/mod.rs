//! Cursor walker — drives one series from a start cursor to completion.
//!
//! The loop runs while the cursor is unset or earlier than the wall clock.
//! Each accepted page moves the cursor to `last_record.timestamp + 1`; the
//! walk ends when a page comes back empty (or marked last), when the cursor
//! catches up with "now", or on the first unrecoverable error. Pages already
//! accepted are never discarded: an error stops the walk and the records
//! fetched so far are returned with it.

pub mod retry;

use crate::domain::{now_ms, Cursor, Page, Timestamped};
use crate::error::AcquireError;
use crate::source::SourceAdapter;
use tracing::{debug, error, warn};

pub use retry::{RetryPolicy, WalkPolicy};

/// Why a walk stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// The cursor reached the wall clock (or started beyond it).
    CaughtUp,
    /// The source returned an empty or final page.
    Exhausted,
    /// A fetch failed or a page broke the ordering contract.
    Failed(AcquireError),
}

/// How a finished walk classifies.
#[derive(Debug, Clone, PartialEq)]
pub enum WalkStatus {
    /// At least one record was accumulated, even if the walk later failed.
    Success,
    /// No records and no error.
    NoData,
    /// The walk failed before accumulating anything.
    Error(AcquireError),
}

/// Result of one walk: every accepted record in cursor order.
#[derive(Debug, Clone)]
pub struct Walk<R> {
    pub records: Vec<R>,
    /// Pages accepted.
    pub pages: usize,
    /// Adapter calls made, retries included.
    pub requests: usize,
    /// Cursor the next request would have used.
    pub cursor: Option<Cursor>,
    pub stop: StopReason,
}

impl<R> Walk<R> {
    pub fn status(&self) -> WalkStatus {
        match (&self.stop, self.records.is_empty()) {
            (_, false) => WalkStatus::Success,
            (StopReason::Failed(e), true) => WalkStatus::Error(e.clone()),
            (_, true) => WalkStatus::NoData,
        }
    }

    /// The error that ended the walk, if any.
    pub fn failure(&self) -> Option<&AcquireError> {
        match &self.stop {
            StopReason::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Walk `series` from `start` against the wall clock.
pub fn walk<A>(
    adapter: &mut A,
    series: &A::Series,
    start: Option<Cursor>,
    policy: &WalkPolicy,
) -> Walk<A::Record>
where
    A: SourceAdapter + ?Sized,
{
    walk_until(adapter, series, start, policy, now_ms)
}

/// Walk `series` from `start`, reading "now" from `now`.
pub fn walk_until<A, C>(
    adapter: &mut A,
    series: &A::Series,
    start: Option<Cursor>,
    policy: &WalkPolicy,
    now: C,
) -> Walk<A::Record>
where
    A: SourceAdapter + ?Sized,
    C: Fn() -> Cursor,
{
    let mut cursor = start;
    let mut records: Vec<A::Record> = Vec::new();
    let mut pages = 0usize;
    let mut requests = 0usize;

    let stop = loop {
        if let Some(c) = cursor {
            if c >= now() {
                debug!(series = %series, cursor = c, "cursor caught up with wall clock");
                break StopReason::CaughtUp;
            }
        }

        if pages > 0 {
            retry::pause(policy.page_delay);
        }

        let page = match fetch_with_retry(adapter, series, cursor, policy, &mut requests) {
            Ok(page) => page,
            Err(e) => {
                error!(
                    adapter = adapter.name(),
                    series = %series,
                    cursor = ?cursor,
                    salvaged = records.len(),
                    error = %e,
                    "page fetch failed; stopping walk"
                );
                break StopReason::Failed(e);
            }
        };

        if page.is_empty() {
            debug!(series = %series, pages, "source exhausted");
            break StopReason::Exhausted;
        }

        let next = match next_cursor(&page, cursor) {
            Ok(next) => next,
            Err(e) => {
                error!(
                    adapter = adapter.name(),
                    series = %series,
                    cursor = ?cursor,
                    salvaged = records.len(),
                    error = %e,
                    "page rejected; stopping walk"
                );
                break StopReason::Failed(e);
            }
        };

        let last = page.last;
        pages += 1;
        debug!(
            series = %series,
            page = pages,
            records = page.len(),
            next_cursor = next,
            "page accepted"
        );
        records.extend(page.records);
        cursor = Some(next);

        if last {
            break StopReason::Exhausted;
        }
    };

    Walk {
        records,
        pages,
        requests,
        cursor,
        stop,
    }
}

fn fetch_with_retry<A>(
    adapter: &mut A,
    series: &A::Series,
    cursor: Option<Cursor>,
    policy: &WalkPolicy,
    requests: &mut usize,
) -> Result<Page<A::Record>, AcquireError>
where
    A: SourceAdapter + ?Sized,
{
    let mut attempt = 0u32;
    loop {
        *requests += 1;
        match adapter.fetch_page(series, cursor, policy.page_limit) {
            Ok(page) => return Ok(page),
            Err(e) => {
                attempt += 1;
                if !policy.retry.should_retry(attempt, &e) {
                    return Err(e);
                }
                let delay = policy.retry.delay_for(attempt, &e);
                warn!(
                    series = %series,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying page fetch"
                );
                retry::pause(delay);
            }
        }
    }
}

/// Validate a non-empty page against the cursor it was requested with and
/// return the cursor for the next request.
fn next_cursor<R: Timestamped>(page: &Page<R>, cursor: Option<Cursor>) -> Result<Cursor, AcquireError> {
    if let Some(i) = page.first_out_of_order() {
        return Err(AcquireError::ContractViolation(format!(
            "record {i} of page is earlier than the record before it"
        )));
    }

    let (Some(first), Some(last)) = (page.first_timestamp(), page.last_timestamp()) else {
        return Err(AcquireError::ContractViolation("empty page has no last record".into()));
    };

    if let Some(c) = cursor {
        if first < c {
            return Err(AcquireError::ContractViolation(format!(
                "page starts at {first}, before requested cursor {c}"
            )));
        }
    }

    let next = last
        .checked_add(1)
        .ok_or_else(|| AcquireError::ContractViolation(format!("timestamp {last} overflows")))?;

    match cursor {
        Some(c) if next <= c => Err(AcquireError::ContractViolation(format!(
            "cursor would not advance past {c}"
        ))),
        _ => Ok(next),
    }
}
