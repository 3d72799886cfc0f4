/// Parsing of the timestamp encodings the backend emits
///
/// Readings carry either an ISO-8601 string, a Unix time in seconds or
/// milliseconds, or either of those numbers as a string.
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::{OffsetDateTime, PrimitiveDateTime};

/// Numbers below this are Unix seconds, the rest Unix milliseconds.
///
/// 1e11 seconds lies in the year 5138 and 1e11 milliseconds in 1973, so
/// present-day values of either unit fall on the correct side.
pub const SECONDS_CUTOFF: f64 = 1e11;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Number(f64),
    Text(String),
}

fn iso_prefix() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}T").expect("valid ISO prefix pattern"))
}

/// Parse a raw timestamp. Returns None when no encoding applies.
pub fn parse_timestamp(raw: &RawTimestamp) -> Option<OffsetDateTime> {
    match raw {
        RawTimestamp::Number(n) => from_unix_number(*n),
        RawTimestamp::Text(text) => {
            let text = text.trim();
            if iso_prefix().is_match(text) {
                parse_iso(text)
            } else {
                text.parse::<f64>().ok().and_then(from_unix_number)
            }
        }
    }
}

fn parse_iso(text: &str) -> Option<OffsetDateTime> {
    if let Ok(at) = OffsetDateTime::parse(text, &Rfc3339) {
        return Some(at);
    }
    if let Ok(at) = OffsetDateTime::parse(text, &Iso8601::DEFAULT) {
        return Some(at);
    }
    // No offset given: treat as UTC
    PrimitiveDateTime::parse(text, &Iso8601::DEFAULT)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

fn from_unix_number(n: f64) -> Option<OffsetDateTime> {
    // Zero and non-finite values mean "no timestamp"
    if !n.is_finite() || n == 0.0 {
        return None;
    }
    let millis = if n < SECONDS_CUTOFF { n * 1000.0 } else { n };
    let nanos = (millis * 1_000_000.0).round() as i128;
    OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
}
