//! Timestamp helpers.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Wall-clock timestamp used for job stage entries and breaker failures.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC time as an ISO 8601 string with microseconds.
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Converts a duration to fractional milliseconds for logs and metadata.
#[must_use]
pub fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_utc_is_recent() {
        let before = Utc::now();
        let now = now_utc();
        assert!(now >= before);
    }

    #[test]
    fn test_duration_ms() {
        assert!((duration_ms(Duration::from_micros(1500)) - 1.5).abs() < f64::EPSILON);
    }
}
