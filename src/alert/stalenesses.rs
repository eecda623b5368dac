/// Reading staleness detection.
///
/// Nodes report every 12 seconds under normal conditions. During a flood a
/// silent station is dangerous: a dead node or a lost uplink looks exactly
/// like calm water on a dashboard that only shows the last status. This
/// module lets summaries flag stations whose latest reading is too old.
///
/// # Clock injection
/// All functions accept a `now: DateTime<Utc>` parameter rather than calling
/// `Utc::now()` internally, so tests stay deterministic.

use chrono::{DateTime, Utc};

use crate::model::Reading;

/// Default maximum age before a station's latest reading counts as stale:
/// five minutes, i.e. twenty-five missed acquisition cycles.
pub const DEFAULT_MAX_AGE_MINUTES: i64 = 5;

/// Returns `true` if the reading is older than `max_age_minutes` relative
/// to `now`.
///
/// Staleness is strictly greater than the threshold:
///   age > max_age_minutes  →  stale
///   age == max_age_minutes →  not stale
///
/// A reading stamped in the future (clock skew between gateway hosts) is
/// never stale.
pub fn is_stale_at(reading: &Reading, max_age_minutes: i64, now: DateTime<Utc>) -> bool {
    let age = now.signed_duration_since(reading.timestamp);
    age.num_seconds() > max_age_minutes * 60
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{StationId, Status};
    use chrono::TimeZone;

    fn reading_at(timestamp: DateTime<Utc>) -> Reading {
        Reading {
            timestamp,
            distance_cm: Some(120.4),
            temperature: Some(29.0),
            humidity: Some(78.0),
            rainfall_percent: Some(12.5),
            turbidity_voltage: Some(1.84),
            latitude: None,
            longitude: None,
            rate_cm_per_min: Some(0.2),
            percent_change: Some(0.17),
            status: Status::Safe,
            flood_danger: false,
            humidity_danger: false,
            station_id: Some(StationId(1)),
        }
    }

    /// A fixed "now" used across all tests: 2025-01-15 08:00:00 UTC.
    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_recent_reading_is_not_stale() {
        let reading = reading_at(fixed_now() - chrono::Duration::seconds(12));
        assert!(!is_stale_at(&reading, 5, fixed_now()));
    }

    #[test]
    fn test_reading_exactly_at_threshold_is_not_stale() {
        let reading = reading_at(fixed_now() - chrono::Duration::minutes(5));
        assert!(
            !is_stale_at(&reading, 5, fixed_now()),
            "staleness is strictly greater than, not >="
        );
    }

    #[test]
    fn test_reading_one_second_past_threshold_is_stale() {
        let reading = reading_at(fixed_now() - chrono::Duration::seconds(5 * 60 + 1));
        assert!(is_stale_at(&reading, 5, fixed_now()));
    }

    #[test]
    fn test_future_reading_is_not_stale() {
        let reading = reading_at(fixed_now() + chrono::Duration::minutes(3));
        assert!(!is_stale_at(&reading, 5, fixed_now()));
    }

    #[test]
    fn test_same_reading_stale_under_tight_threshold_not_under_loose() {
        let reading = reading_at(fixed_now() - chrono::Duration::minutes(30));
        assert!(is_stale_at(&reading, 20, fixed_now()));
        assert!(!is_stale_at(&reading, 60, fixed_now()));
    }
}
