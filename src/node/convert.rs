/// Raw peripheral values to engineering units.
///
/// The node reads a 10-bit ADC for the raindrop and turbidity probes, an
/// echo pulse width for the ultrasonic ranger and a DHT-style climate
/// sensor. These helpers turn those raw values into the units the detector
/// and the gateway work with, and decide which readings are usable.

use crate::model::SENSOR_OUT_OF_RANGE_CM;

/// Full-scale value of the 10-bit ADC.
pub const ADC_MAX: u16 = 1023;

/// ADC reference voltage with 11 dB attenuation.
pub const ADC_REFERENCE_V: f64 = 3.3;

/// Round-trip microseconds per centimetre of range, at roughly 20 °C.
pub const ECHO_US_PER_CM: f64 = 29.1;

/// Usable ultrasonic range, exclusive on both ends.
pub const MIN_DISTANCE_CM: f64 = 2.0;
pub const MAX_DISTANCE_CM: f64 = 400.0;

/// Turbidity probe voltage below which the water is considered clear.
pub const TURBIDITY_CLEAR_THRESHOLD_V: f64 = 2.5;

/// Raindrop wetness above which it is raining, and above which it pours.
pub const RAINING_PERCENT: f64 = 50.0;
pub const DOWNPOUR_PERCENT: f64 = 80.0;

// ---------------------------------------------------------------------------
// Distance
// ---------------------------------------------------------------------------

/// Converts an echo pulse width to a distance.
///
/// `None` (echo timed out) and out-of-range results both map to
/// [`SENSOR_OUT_OF_RANGE_CM`], which is what the detector treats as a
/// sensor fault.
pub fn echo_to_distance_cm(pulse_us: Option<u32>) -> f64 {
    let Some(pulse_us) = pulse_us else {
        return SENSOR_OUT_OF_RANGE_CM;
    };
    let cm = (pulse_us as f64 / 2.0) / ECHO_US_PER_CM;
    if cm > MIN_DISTANCE_CM && cm < MAX_DISTANCE_CM {
        cm
    } else {
        SENSOR_OUT_OF_RANGE_CM
    }
}

/// True unless `cm` is the out-of-range sentinel or not a number.
pub fn is_valid_distance(cm: f64) -> bool {
    cm.is_finite() && cm != SENSOR_OUT_OF_RANGE_CM
}

// ---------------------------------------------------------------------------
// Analog probes
// ---------------------------------------------------------------------------

/// Raindrop wetness in percent. The probe reads high when dry, so the raw
/// value is inverted before scaling.
pub fn raindrop_percent(raw: u16) -> f64 {
    let wet = ADC_MAX.saturating_sub(raw.min(ADC_MAX));
    wet as f64 / ADC_MAX as f64 * 100.0
}

pub fn turbidity_voltage(raw: u16) -> f64 {
    raw.min(ADC_MAX) as f64 * (ADC_REFERENCE_V / ADC_MAX as f64)
}

pub fn is_water_clear(turbidity_voltage: f64) -> bool {
    turbidity_voltage < TURBIDITY_CLEAR_THRESHOLD_V
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RainIntensity {
    Dry,
    Raining,
    Downpour,
}

impl RainIntensity {
    pub fn from_percent(rainfall_percent: f64) -> Self {
        if rainfall_percent > DOWNPOUR_PERCENT {
            RainIntensity::Downpour
        } else if rainfall_percent > RAINING_PERCENT {
            RainIntensity::Raining
        } else {
            RainIntensity::Dry
        }
    }
}

// ---------------------------------------------------------------------------
// Climate
// ---------------------------------------------------------------------------

/// Accepts a climate reading only if both values are physically plausible
/// for the sensor: -20 < t < 80 °C and 0 ≤ h ≤ 100 %.
pub fn plausible_climate(temperature: f64, humidity: f64) -> bool {
    temperature > -20.0 && temperature < 80.0 && (0.0..=100.0).contains(&humidity)
}

/// Rounds to `decimals` places for the wire payload.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
