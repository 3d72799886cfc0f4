use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use time::{OffsetDateTime, UtcOffset};

use crate::utils::format_datetime;

/// One validated gas reading from the live data endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub gas_name: String,
    pub ppm: f64,
    pub timestamp: Option<OffsetDateTime>,
}

/// One validated sample from the historical data endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalPoint {
    pub at: OffsetDateTime,
    pub ppm: f64,
}

/// Latest per-gas values for one device at one poll tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GasSnapshot {
    pub timestamp: Option<OffsetDateTime>,
    pub values: BTreeMap<String, f64>,
}

impl GasSnapshot {
    /// Build the newest snapshot out of a batch of readings.
    ///
    /// Readings are grouped by timestamp and the most recent group wins.
    /// Readings without a usable timestamp are stamped with `now`.
    pub fn latest(readings: &[SensorReading], now: OffsetDateTime) -> Option<GasSnapshot> {
        let mut groups: BTreeMap<OffsetDateTime, BTreeMap<String, f64>> = BTreeMap::new();

        for reading in readings {
            let at = reading.timestamp.unwrap_or(now);
            groups
                .entry(at)
                .or_default()
                .insert(reading.gas_name.clone(), reading.ppm);
        }

        groups
            .into_iter()
            .next_back()
            .map(|(timestamp, values)| GasSnapshot {
                timestamp: Some(timestamp),
                values,
            })
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub time: String,
    pub ppm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyBucket {
    pub time_label: String,
    pub average_ppm: f64,
}

/// A device registered locally by an administrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub position: String,
}

/// A device as listed by the backend
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiDevice {
    pub id: String,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl ApiDevice {
    pub fn is_active(&self) -> bool {
        self.status.as_deref() == Some("active")
    }
}

/// A user account as listed by the backend. Credentials are not kept.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

/// Body of `POST /api/users`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

/// Session record kept in the client-side store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
}

/// When a device last reported, or why that is unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastUpdated {
    NoData,
    InvalidTimestamp,
    CheckFailed,
    At(OffsetDateTime),
}

impl LastUpdated {
    pub fn render(&self, offset: UtcOffset) -> String {
        match self {
            LastUpdated::NoData => "No data".to_string(),
            LastUpdated::InvalidTimestamp => "Invalid timestamp".to_string(),
            LastUpdated::CheckFailed => "Error checking status".to_string(),
            LastUpdated::At(at) => format_datetime(&at.to_offset(offset)),
        }
    }
}

impl fmt::Display for LastUpdated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(UtcOffset::UTC))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatus {
    pub is_active: bool,
    pub last_updated: LastUpdated,
}

impl DeviceStatus {
    pub fn inactive(last_updated: LastUpdated) -> Self {
        DeviceStatus {
            is_active: false,
            last_updated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn reading(gas: &str, ppm: f64, at: Option<OffsetDateTime>) -> SensorReading {
        SensorReading {
            gas_name: gas.to_string(),
            ppm,
            timestamp: at,
        }
    }

    #[test]
    fn latest_snapshot_takes_newest_timestamp_group() {
        let now = datetime!(2024-01-01 12:00:00 UTC);
        let older = datetime!(2024-01-01 11:59:50 UTC);
        let newer = datetime!(2024-01-01 11:59:55 UTC);
        let readings = vec![
            reading("CO", 10.0, Some(older)),
            reading("CO", 12.0, Some(newer)),
            reading("H2", 80.0, Some(newer)),
        ];

        let snapshot = GasSnapshot::latest(&readings, now).unwrap();
        assert_eq!(snapshot.timestamp, Some(newer));
        assert_eq!(snapshot.values.len(), 2);
        assert_eq!(snapshot.values["CO"], 12.0);
    }

    #[test]
    fn readings_without_timestamp_are_stamped_now() {
        let now = datetime!(2024-01-01 12:00:00 UTC);
        let readings = vec![reading("CO", 3.0, None)];

        let snapshot = GasSnapshot::latest(&readings, now).unwrap();
        assert_eq!(snapshot.timestamp, Some(now));
        assert!(GasSnapshot::latest(&[], now).is_none());
    }

    #[test]
    fn user_decoding_ignores_password() {
        let user: User = serde_json::from_str(
            r#"{"id":"u1","username":"ana","email":"a@x.io","password":"pw","deviceId":"dev-1"}"#,
        )
        .unwrap();
        assert_eq!(user.device_id.as_deref(), Some("dev-1"));
        assert_eq!(user.phone_number, None);
    }

    #[test]
    fn last_updated_renders_placeholders() {
        assert_eq!(LastUpdated::NoData.to_string(), "No data");
        assert_eq!(LastUpdated::InvalidTimestamp.to_string(), "Invalid timestamp");
        assert_eq!(LastUpdated::CheckFailed.to_string(), "Error checking status");
        assert_eq!(
            LastUpdated::At(datetime!(2024-01-01 00:00:00 UTC)).to_string(),
            "01.01.2024 - 00:00:00"
        );
    }
}
