/// Online/offline classification of devices from reading recency
use time::{Duration, OffsetDateTime};

use crate::models::{DeviceStatus, LastUpdated, SensorReading};

/// Must match the freshness window the backend uses for "active"
pub const LIVENESS_WINDOW: Duration = Duration::seconds(30);

/// Classify a device from its most recent readings
///
/// A device is active when its newest parseable reading is at most
/// `window` old. Readings whose timestamp could not be parsed at ingestion
/// are ignored.
pub fn classify_device(
    readings: &[SensorReading],
    now: OffsetDateTime,
    window: Duration,
) -> DeviceStatus {
    if readings.is_empty() {
        return DeviceStatus::inactive(LastUpdated::NoData);
    }

    let most_recent = match readings.iter().filter_map(|r| r.timestamp).max() {
        Some(at) => at,
        None => return DeviceStatus::inactive(LastUpdated::InvalidTimestamp),
    };

    DeviceStatus {
        is_active: now - most_recent <= window,
        last_updated: LastUpdated::At(most_recent),
    }
}
