use chrono::{DateTime, Local};

/// Renders a millisecond epoch timestamp (as found in upload names) as local
/// ISO-8601 time. Falls back to the raw string when it is not a valid instant.
pub fn iso_from_millis(timestamp: &str) -> String {
    timestamp
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map(|utc| {
            utc.with_timezone(&Local)
                .format("%Y-%m-%dT%H:%M:%S%.3f")
                .to_string()
        })
        .unwrap_or_else(|| timestamp.to_string())
}
