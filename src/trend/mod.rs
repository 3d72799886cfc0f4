pub mod buckets;
pub mod buffer;
pub mod history;

pub use buckets::{bucket_history, BucketSpec, LAST_HOUR_BY_FIVE_MINUTES, LAST_HOUR_BY_MINUTE};
pub use buffer::{TrendBuffers, DETAIL_TREND_CAPACITY};
pub use history::{SnapshotHistory, DASHBOARD_HISTORY_CAPACITY};
