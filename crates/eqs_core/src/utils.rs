//! Small shared helpers

use chrono::{DateTime, Utc};

/// Current wall-clock time in UTC.
///
/// Every timestamp the engine records (snapshot publication, cache inserts,
/// visualization expiry) comes from here so callers can compare them
/// directly.
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Converts a TTL in (fractional) seconds to a duration with millisecond precision.
pub fn seconds_to_duration(seconds: f64) -> chrono::Duration {
    chrono::Duration::milliseconds((seconds * 1000.0).round() as i64)
}
