/// Headless dashboard views
///
/// Each view owns its state and its timers and runs as one future until
/// the shutdown signal fires. All state changes happen inside that
/// future; network calls run as tracked tasks whose results come back
/// over a channel.
pub mod dashboard;
pub mod device_detail;
pub mod devices;

pub use dashboard::DashboardView;
pub use device_detail::DeviceDetailView;
pub use devices::DevicesView;

use std::sync::Arc;
use std::time::Duration;
use time::UtcOffset;
use tokio::time::{interval, Interval, MissedTickBehavior};

use crate::api::ApiClient;
use crate::config::{DashboardConfig, PollIntervals};
use crate::store::KeyValueStore;
use crate::trend::BucketSpec;

/// Everything a view needs from the outside world
#[derive(Clone)]
pub struct ViewContext {
    pub api: ApiClient,
    pub store: Arc<dyn KeyValueStore>,
    pub display_offset: UtcOffset,
    pub intervals: PollIntervals,
    pub hourly_view: BucketSpec,
}

impl ViewContext {
    pub fn new(config: &DashboardConfig, api: ApiClient, store: Arc<dyn KeyValueStore>) -> Self {
        ViewContext {
            api,
            store,
            display_offset: config.display_offset,
            intervals: config.intervals.clone(),
            hourly_view: config.hourly_view,
        }
    }
}

/// Interval that fires immediately, then every `period`, without bursting after stalls
pub(crate) fn poll_timer(period: Duration) -> Interval {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

/// PPM with two decimals, as shown on the gauges
pub fn format_ppm(ppm: f64) -> String {
    format!("{:.2}", ppm)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::store::MemoryStore;
    use url::Url;

    /// A context pointing at an unroutable backend with an in-memory store
    pub fn context() -> (ViewContext, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let api = ApiClient::new(
            &Url::parse("http://127.0.0.1:9").unwrap(),
            Duration::from_millis(200),
        )
        .unwrap();
        let ctx = ViewContext {
            api,
            store: store.clone(),
            display_offset: UtcOffset::UTC,
            intervals: PollIntervals::default(),
            hourly_view: crate::trend::LAST_HOUR_BY_MINUTE,
        };
        (ctx, store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ppm_formatting() {
        assert_eq!(format_ppm(0.0), "0.00");
        assert_eq!(format_ppm(12.346), "12.35");
    }
}
