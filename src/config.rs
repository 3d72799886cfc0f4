use log::info;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use time::UtcOffset;
use url::Url;

use crate::trend::{BucketSpec, LAST_HOUR_BY_FIVE_MINUTES, LAST_HOUR_BY_MINUTE};
use crate::utils::parse_utc_offset;

const DEFAULT_API_BASE_URL: &str = "http://localhost:5000";
const DEFAULT_STORE_PATH: &str = "dashboard-store.json";

#[derive(Debug, Clone, PartialEq)]
pub struct PollIntervals {
    pub live: Duration,
    pub history: Duration,
    pub activity: Duration,
    pub dashboard: Duration,
    pub clock: Duration,
    pub store_watch: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        PollIntervals {
            live: Duration::from_secs(5),
            history: Duration::from_secs(60),
            activity: Duration::from_secs(10),
            dashboard: Duration::from_secs(10),
            clock: Duration::from_secs(1),
            store_watch: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub api_base_url: Url,
    pub store_path: PathBuf,
    pub device_id: Option<String>,
    pub display_offset: UtcOffset,
    pub request_timeout: Duration,
    pub intervals: PollIntervals,
    pub hourly_view: BucketSpec,
}

impl DashboardConfig {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        // Load environment variables
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Box<dyn std::error::Error>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let raw_url = var("API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let api_base_url =
            Url::parse(&raw_url).map_err(|e| format!("API_BASE_URL '{}' is not a valid URL: {}", raw_url, e))?;
        if !matches!(api_base_url.scheme(), "http" | "https") {
            return Err(format!("API_BASE_URL must be http or https, got '{}'", raw_url).into());
        }

        let display_offset = match var("DISPLAY_UTC_OFFSET") {
            Some(raw) => parse_utc_offset(&raw)
                .ok_or_else(|| format!("DISPLAY_UTC_OFFSET '{}' must look like +02:00", raw))?,
            None => UtcOffset::UTC,
        };

        let hourly_view = match var("HOURLY_VIEW").as_deref() {
            None | Some("1min") => LAST_HOUR_BY_MINUTE,
            Some("5min") => LAST_HOUR_BY_FIVE_MINUTES,
            Some(other) => return Err(format!("HOURLY_VIEW must be 1min or 5min, got '{}'", other).into()),
        };

        let seconds = |key: &str, default: Duration| -> Result<Duration, String> {
            match var(key) {
                Some(raw) => raw
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs)
                    .ok_or_else(|| format!("{} must be a positive number of seconds, got '{}'", key, raw)),
                None => Ok(default),
            }
        };

        let defaults = PollIntervals::default();
        let intervals = PollIntervals {
            live: seconds("LIVE_POLL_SECS", defaults.live)?,
            history: seconds("HISTORY_POLL_SECS", defaults.history)?,
            activity: seconds("ACTIVITY_POLL_SECS", defaults.activity)?,
            dashboard: seconds("DASHBOARD_POLL_SECS", defaults.dashboard)?,
            clock: defaults.clock,
            store_watch: seconds("STORE_WATCH_SECS", defaults.store_watch)?,
        };

        let config = DashboardConfig {
            api_base_url,
            store_path: PathBuf::from(var("STORE_PATH").unwrap_or_else(|| DEFAULT_STORE_PATH.to_string())),
            device_id: var("DEVICE_ID"),
            display_offset,
            request_timeout: seconds("REQUEST_TIMEOUT_SECS", Duration::from_secs(10))?,
            intervals,
            hourly_view,
        };

        info!(
            "Backend: {}, store: {}, detail device: {}",
            config.api_base_url,
            config.store_path.display(),
            config.device_id.as_deref().unwrap_or("none")
        );

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use time::macros::offset;

    fn config_from(vars: &[(&str, &str)]) -> Result<DashboardConfig, Box<dyn std::error::Error>> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        DashboardConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.api_base_url.as_str(), "http://localhost:5000/");
        assert_eq!(config.store_path, PathBuf::from(DEFAULT_STORE_PATH));
        assert_eq!(config.device_id, None);
        assert_eq!(config.display_offset, UtcOffset::UTC);
        assert_eq!(config.intervals, PollIntervals::default());
        assert_eq!(config.hourly_view, LAST_HOUR_BY_MINUTE);
    }

    #[test]
    fn overrides() {
        let config = config_from(&[
            ("API_BASE_URL", "https://aq.example.com/v1"),
            ("DEVICE_ID", "dev-7"),
            ("DISPLAY_UTC_OFFSET", "+03:00"),
            ("LIVE_POLL_SECS", "2"),
            ("HOURLY_VIEW", "5min"),
        ])
        .unwrap();
        assert_eq!(config.api_base_url.host_str(), Some("aq.example.com"));
        assert_eq!(config.device_id.as_deref(), Some("dev-7"));
        assert_eq!(config.display_offset, offset!(+3));
        assert_eq!(config.intervals.live, Duration::from_secs(2));
        assert_eq!(config.hourly_view, LAST_HOUR_BY_FIVE_MINUTES);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(config_from(&[("API_BASE_URL", "not a url")]).is_err());
        assert!(config_from(&[("API_BASE_URL", "ftp://host")]).is_err());
        assert!(config_from(&[("LIVE_POLL_SECS", "0")]).is_err());
        assert!(config_from(&[("HOURLY_VIEW", "1day")]).is_err());
        assert!(config_from(&[("DISPLAY_UTC_OFFSET", "EST")]).is_err());
    }
}
