//! One series pipeline: walker → accumulator → sink.

use marketwalk_core::domain::{Cursor, Timestamped};
use marketwalk_core::sink::{Sink, SinkReport};
use marketwalk_core::source::SourceAdapter;
use marketwalk_core::walker::{walk, WalkPolicy, WalkStatus};
use marketwalk_core::AcquireError;
use tracing::{debug, info};

/// What a completed pipeline produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesOutcome {
    /// Records fetched by this run.
    pub fetched: usize,
    /// Records in the written file (previously saved ones included).
    pub saved: usize,
    /// Error that stopped the walk after records were salvaged.
    pub partial: Option<AcquireError>,
}

/// Acquire one series and persist it.
///
/// With `resume`, the walk starts right after the last record the sink
/// already holds (or at `start`, whichever is later) and the sink receives
/// the saved records followed by the new ones. A walk that fails before
/// fetching anything is an error; a walk that fetches nothing writes
/// nothing.
pub fn acquire_series<A, K>(
    adapter: &mut A,
    sink: &K,
    series: &A::Series,
    start: Option<Cursor>,
    policy: &WalkPolicy,
    resume: bool,
) -> Result<SeriesOutcome, AcquireError>
where
    A: SourceAdapter + ?Sized,
    K: Sink<A::Series, A::Record> + ?Sized,
{
    let mut start = start;
    let mut saved = Vec::new();
    if resume {
        saved = sink.existing(series)?;
        if let Some(last) = saved.last() {
            let resume_at = last.timestamp_ms() + 1;
            start = Some(start.map_or(resume_at, |s| s.max(resume_at)));
            info!(series = %series, saved = saved.len(), resume_at, "resuming after saved records");
        }
    }

    let walk = walk(adapter, series, start, policy);
    debug!(series = %series, pages = walk.pages, requests = walk.requests, stop = ?walk.stop, "walk finished");

    match walk.status() {
        WalkStatus::Error(e) => return Err(e),
        WalkStatus::NoData => {
            return Ok(SeriesOutcome {
                fetched: 0,
                saved: saved.len(),
                partial: None,
            })
        }
        WalkStatus::Success => {}
    }

    let partial = walk.failure().cloned();
    let fetched = walk.records.len();
    saved.extend(walk.records);

    let written = match sink.persist(series, saved)? {
        SinkReport::Written { records, .. } => records,
        SinkReport::Skipped => 0,
    };

    Ok(SeriesOutcome {
        fetched,
        saved: written,
        partial,
    })
}
