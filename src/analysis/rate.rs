/// Water-level rate of change over a full sample window.
///
/// Only the oldest and newest samples are used. The window covers about one
/// minute, over which a rising flood is close to monotonic, and a two-point
/// slope is cheap enough to run on the node itself.
///
/// Sign convention: the sensor looks down at the water, so a *shrinking*
/// distance means *rising* water. Both outputs are sign-flipped so that a
/// positive value always points in the danger direction.

use super::window::SampleBuffer;
use crate::model::RateResult;

/// Computes the rate of change for `buffer`.
///
/// Returns an invalid result when the window is not yet full, or when the
/// window spans zero or negative time (samples faster than the tick
/// resolution, or appended out of order). Pure: calling it twice on the
/// same buffer gives identical results.
pub fn compute(buffer: &SampleBuffer) -> RateResult {
    if !buffer.is_full() {
        return RateResult::invalid();
    }
    let (first, last) = match (buffer.first(), buffer.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return RateResult::invalid(),
    };

    let time_span_min = buffer.span_minutes();
    if time_span_min <= 0.0 {
        return RateResult::invalid();
    }

    let delta_distance = last.distance_cm - first.distance_cm;
    let rate_cm_per_min = -delta_distance / time_span_min;
    let percent_change = if first.distance_cm > 0.0 {
        (-delta_distance / first.distance_cm) * 100.0
    } else {
        0.0
    };

    RateResult {
        rate_cm_per_min,
        percent_change,
        valid: true,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
