//! Page — one batch of records returned by a single adapter call.

/// Records that carry a position in time.
pub trait Timestamped {
    /// Record time in epoch milliseconds.
    fn timestamp_ms(&self) -> i64;
}

/// Records from one `fetch_page` call, in non-decreasing time order.
///
/// An empty page means the source is exhausted. A source that knows it has
/// nothing after this page marks it `last` so the walker stops without
/// issuing another request.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<R> {
    pub records: Vec<R>,
    pub last: bool,
}

impl<R> Page<R> {
    pub fn new(records: Vec<R>) -> Self {
        Self {
            records,
            last: false,
        }
    }

    /// A page after which the source has nothing more for this series.
    pub fn last(records: Vec<R>) -> Self {
        Self {
            records,
            last: true,
        }
    }

    pub fn empty() -> Self {
        Self::last(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

impl<R: Timestamped> Page<R> {
    pub fn first_timestamp(&self) -> Option<i64> {
        self.records.first().map(Timestamped::timestamp_ms)
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.records.last().map(Timestamped::timestamp_ms)
    }

    /// Index of the first record whose time is earlier than its predecessor's.
    pub fn first_out_of_order(&self) -> Option<usize> {
        self.records
            .windows(2)
            .position(|w| w[1].timestamp_ms() < w[0].timestamp_ms())
            .map(|i| i + 1)
    }
}
