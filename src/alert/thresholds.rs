//! Flood and humidity danger classification.
//!
//! Turns the window's rate of change plus the auxiliary climate readings
//! into the status label and the two danger flags a node reports. Pure
//! function of its inputs; no state is carried between calls.
//!
//! The "Collecting → Aman" display override applied to readings without a
//! rate is NOT done here. It lives in the ingestion layer so that the policy
//! stays visible and separate from the detector.

use crate::model::{RateResult, Status};

/// Rise rate (cm/min) above which a flood is declared in dry conditions.
pub const DRY_FLOOD_THRESHOLD_CM_PER_MIN: f64 = 2.0;

/// Rise rate (cm/min) above which a flood is declared during heavy rain.
/// Rising water is expected while it rains, so the bar is higher.
pub const RAIN_FLOOD_THRESHOLD_CM_PER_MIN: f64 = 5.0;

/// Raindrop sensor wetness (%) above which the rain threshold applies.
pub const HEAVY_RAIN_PERCENT: f64 = 60.0;

/// Rate (cm/min) below which the water is reported as receding.
pub const RECEDING_THRESHOLD_CM_PER_MIN: f64 = -1.5;

/// Relative humidity (%) at or above which the humidity flag is raised.
pub const HUMIDITY_DANGER_PERCENT: f64 = 90.0;

/// Everything the classifier looks at for one acquisition cycle.
///
/// Missing rainfall must be mapped to `0.0` by the caller before building
/// this; missing humidity is simply `None`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierInput {
    pub rate: RateResult,
    pub rainfall_percent: f64,
    pub humidity: Option<f64>,
    pub buffer_full: bool,
    pub buffer_fill: usize,
    pub buffer_capacity: usize,
    pub sensor_ok: bool,
}

/// Result of classifying one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub status: Status,
    pub flood_danger: bool,
    pub humidity_danger: bool,
}

/// The rise rate a reading must exceed to count as a flood, given the
/// current rainfall.
pub fn flood_threshold(rainfall_percent: f64) -> f64 {
    if rainfall_percent > HEAVY_RAIN_PERCENT {
        RAIN_FLOOD_THRESHOLD_CM_PER_MIN
    } else {
        DRY_FLOOD_THRESHOLD_CM_PER_MIN
    }
}

/// Humidity channel, independent of the flood status.
pub fn is_humidity_danger(humidity: Option<f64>) -> bool {
    humidity.is_some_and(|h| h >= HUMIDITY_DANGER_PERCENT)
}

/// Classifies one cycle. States are checked in priority order: sensor
/// fault, warm-up, degenerate timing, then the rate thresholds. Never fails.
pub fn classify(input: &ClassifierInput) -> Classification {
    let humidity_danger = is_humidity_danger(input.humidity);

    let (status, flood_danger) = if !input.sensor_ok {
        (Status::SensorError, false)
    } else if !input.buffer_full {
        let collecting = Status::Collecting {
            filled: input.buffer_fill,
            capacity: input.buffer_capacity,
        };
        (collecting, false)
    } else if !input.rate.valid {
        (Status::CalcErrTime, false)
    } else {
        let rate = input.rate.rate_cm_per_min;
        if rate > flood_threshold(input.rainfall_percent) {
            (Status::FloodDanger, true)
        } else if rate < RECEDING_THRESHOLD_CM_PER_MIN {
            (Status::WaterReceding, false)
        } else {
            (Status::Safe, false)
        }
    };

    Classification {
        status,
        flood_danger,
        humidity_danger,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_rate(rate_cm_per_min: f64) -> RateResult {
        RateResult {
            rate_cm_per_min,
            percent_change: 0.0,
            valid: true,
        }
    }

    fn full_window(rate: RateResult, rainfall_percent: f64) -> ClassifierInput {
        ClassifierInput {
            rate,
            rainfall_percent,
            humidity: Some(60.0),
            buffer_full: true,
            buffer_fill: 5,
            buffer_capacity: 5,
            sensor_ok: true,
        }
    }

    // --- Priority order -----------------------------------------------------

    #[test]
    fn test_sensor_error_overrides_everything() {
        let mut input = full_window(valid_rate(50.0), 0.0);
        input.sensor_ok = false;
        let c = classify(&input);
        assert_eq!(c.status, Status::SensorError);
        assert!(!c.flood_danger, "a faulted sensor must not raise the flood flag");
    }

    #[test]
    fn test_partial_window_reports_collecting() {
        let mut input = full_window(RateResult::invalid(), 0.0);
        input.buffer_full = false;
        input.buffer_fill = 3;
        let c = classify(&input);
        assert_eq!(c.status, Status::Collecting { filled: 3, capacity: 5 });
        assert_eq!(c.status.to_string(), "Collecting 3/5");
        assert!(!c.flood_danger);
    }

    #[test]
    fn test_full_window_without_rate_is_calc_error() {
        let c = classify(&full_window(RateResult::invalid(), 0.0));
        assert_eq!(c.status, Status::CalcErrTime);
        assert!(!c.flood_danger);
    }

    // --- Thresholds ---------------------------------------------------------

    #[test]
    fn test_threshold_depends_on_rainfall() {
        assert_eq!(flood_threshold(0.0), 2.0);
        assert_eq!(flood_threshold(60.0), 2.0, "60% is not above the rain cut-off");
        assert_eq!(flood_threshold(60.1), 5.0);
        assert_eq!(flood_threshold(100.0), 5.0);
    }

    #[test]
    fn test_fast_rise_in_dry_weather_is_flood() {
        let c = classify(&full_window(valid_rate(4.0), 0.0));
        assert_eq!(c.status, Status::FloodDanger);
        assert!(c.flood_danger);
    }

    #[test]
    fn test_same_rise_during_heavy_rain_is_safe() {
        let c = classify(&full_window(valid_rate(4.0), 70.0));
        assert_eq!(c.status, Status::Safe);
        assert!(!c.flood_danger);
    }

    #[test]
    fn test_very_fast_rise_during_rain_is_still_flood() {
        let c = classify(&full_window(valid_rate(20.0), 70.0));
        assert_eq!(c.status, Status::FloodDanger);
    }

    #[test]
    fn test_rate_equal_to_threshold_is_not_flood() {
        let c = classify(&full_window(valid_rate(2.0), 0.0));
        assert_eq!(c.status, Status::Safe);
    }

    #[test]
    fn test_receding_water() {
        let c = classify(&full_window(valid_rate(-1.6), 0.0));
        assert_eq!(c.status, Status::WaterReceding);
        assert!(!c.flood_danger);
        let c = classify(&full_window(valid_rate(-1.5), 0.0));
        assert_eq!(c.status, Status::Safe, "-1.5 exactly is not below the cut-off");
    }

    // --- Humidity channel ---------------------------------------------------

    #[test]
    fn test_humidity_flag_is_independent_of_flood_status() {
        for (rate, expected) in [(20.0, Status::FloodDanger), (0.0, Status::Safe)] {
            let mut input = full_window(valid_rate(rate), 0.0);
            input.humidity = Some(95.0);
            let c = classify(&input);
            assert!(c.humidity_danger);
            assert_eq!(c.status, expected);
        }
    }

    #[test]
    fn test_humidity_flag_even_while_sensor_faulted() {
        let mut input = full_window(valid_rate(0.0), 0.0);
        input.sensor_ok = false;
        input.humidity = Some(90.0);
        assert!(classify(&input).humidity_danger);
    }

    #[test]
    fn test_missing_humidity_is_not_dangerous() {
        assert!(!is_humidity_danger(None));
        assert!(!is_humidity_danger(Some(89.9)));
        assert!(is_humidity_danger(Some(90.0)));
    }
}
