//! Domain types: series identifiers, cursors, pages and the two record kinds.

pub mod candle;
pub mod cursor;
pub mod page;
pub mod series;
pub mod snapshot;
pub mod timeframe;
pub mod venue;

pub use candle::Candle;
pub use cursor::{date_cursor, now_ms, parse_start_date, Cursor};
pub use page::{Page, Timestamped};
pub use series::{CandleSeries, SnapshotSeries};
pub use snapshot::SnapshotRow;
pub use timeframe::Timeframe;
pub use venue::Venue;
