/// Formatting helpers for timestamps shown on the dashboard
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

/// Format a timestamp for human-readable display
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS format
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    let format = format_description!("[day].[month].[year] - [hour]:[minute]:[second]");
    dt.format(&format).unwrap_or_else(|_| dt.to_string())
}

/// Wall-clock label used by the short-interval trend charts (HH:MM:SS)
pub fn clock_label(dt: &OffsetDateTime, offset: UtcOffset) -> String {
    let format = format_description!("[hour]:[minute]:[second]");
    let local = dt.to_offset(offset);
    local.format(&format).unwrap_or_else(|_| local.time().to_string())
}

/// Minute label used by the bucketed charts (HH:MM)
pub fn minute_label(dt: &OffsetDateTime, offset: UtcOffset) -> String {
    let format = format_description!("[hour]:[minute]");
    let local = dt.to_offset(offset);
    local.format(&format).unwrap_or_else(|_| local.time().to_string())
}

/// Parse a `+HH:MM` / `-HH:MM` offset, as used by DISPLAY_UTC_OFFSET
pub fn parse_utc_offset(value: &str) -> Option<UtcOffset> {
    let format = format_description!("[offset_hour sign:mandatory]:[offset_minute]");
    UtcOffset::parse(value.trim(), &format).ok()
}
