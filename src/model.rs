/// Core data types for the river monitoring pipeline.
///
/// This module defines the shared domain model imported by all other modules:
/// samples and the tick clock they are stamped with, the rate result that
/// falls out of the sliding window, the status labels a node reports, and
/// the station / reading records the gateway persists.
///
/// It contains no I/O. The only logic here is label parsing and the
/// wraparound-safe tick arithmetic, both of which are part of the data's
/// own definition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Sensor constants
// ---------------------------------------------------------------------------

/// Distance value reported by the ultrasonic sensor when the echo timed out
/// or the measured distance fell outside the usable range.
pub const SENSOR_OUT_OF_RANGE_CM: f64 = 999.0;

/// Number of samples in the rate window. At one acquisition every
/// `60 / 5 = 12` seconds this spans roughly one minute of real time.
pub const DEFAULT_WINDOW_CAPACITY: usize = 5;

/// Milliseconds per minute, used to convert tick spans.
pub const MS_PER_MINUTE: f64 = 60_000.0;

// ---------------------------------------------------------------------------
// Tick clock
// ---------------------------------------------------------------------------

/// A millisecond uptime counter value.
///
/// Node uptime counters are 32 bits wide and roll over after ~49.7 days,
/// so two ticks must never be compared with plain subtraction. Use
/// [`Tick::diff_ms`], which interprets the wrapped difference as a signed
/// 32-bit quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Tick(pub u32);

impl Tick {
    /// Signed milliseconds from `earlier` to `self`.
    ///
    /// Correct across a single counter rollover. A negative result means
    /// `self` is actually older than `earlier`.
    pub fn diff_ms(self, earlier: Tick) -> i64 {
        self.0.wrapping_sub(earlier.0) as i32 as i64
    }

    /// The tick `ms` milliseconds after this one, wrapping at `u32::MAX`.
    pub fn advanced_by(self, ms: u32) -> Tick {
        Tick(self.0.wrapping_add(ms))
    }
}

// ---------------------------------------------------------------------------
// Window types
// ---------------------------------------------------------------------------

/// A single distance acquisition: sensor-to-water-surface distance in cm,
/// stamped with the node's tick counter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: Tick,
    pub distance_cm: f64,
}

impl Sample {
    pub fn new(timestamp: Tick, distance_cm: f64) -> Self {
        Self {
            timestamp,
            distance_cm,
        }
    }
}

/// Rate of water-level change derived from a full sample window.
///
/// `rate_cm_per_min` is positive when the water is rising (distance to the
/// surface shrinking). When `valid` is false the two numeric fields are zero
/// and must not be displayed or stored as a rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateResult {
    pub rate_cm_per_min: f64,
    pub percent_change: f64,
    pub valid: bool,
}

impl RateResult {
    pub fn invalid() -> Self {
        Self {
            rate_cm_per_min: 0.0,
            percent_change: 0.0,
            valid: false,
        }
    }

    /// The rate, if it was computable.
    pub fn rate(&self) -> Option<f64> {
        self.valid.then_some(self.rate_cm_per_min)
    }

    /// The percent change, if it was computable.
    pub fn percent(&self) -> Option<f64> {
        self.valid.then_some(self.percent_change)
    }
}

// ---------------------------------------------------------------------------
// Status labels
// ---------------------------------------------------------------------------

pub const LABEL_SENSOR_ERROR: &str = "Sensor Error";
pub const LABEL_CALC_ERR_TIME: &str = "Calc Err: Time";
pub const LABEL_FLOOD_DANGER: &str = "Bahaya Banjir!";
pub const LABEL_WATER_RECEDING: &str = "Air Menurun";
pub const LABEL_SAFE: &str = "Aman";
const COLLECTING_PREFIX: &str = "Collecting";

/// Status label attached to every reading.
///
/// The wire form is the human label shown on node displays and dashboards
/// (Indonesian for the flood states). Labels that do not match a known state
/// are kept verbatim in `Other` so that nothing a node sends is lost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Status {
    SensorError,
    Collecting { filled: usize, capacity: usize },
    CalcErrTime,
    FloodDanger,
    WaterReceding,
    Safe,
    Other(String),
}

impl Status {
    /// Parses a wire label. Never fails; unknown labels become `Other`.
    pub fn from_label(label: &str) -> Status {
        match label {
            LABEL_SENSOR_ERROR => Status::SensorError,
            LABEL_CALC_ERR_TIME => Status::CalcErrTime,
            LABEL_FLOOD_DANGER => Status::FloodDanger,
            LABEL_WATER_RECEDING => Status::WaterReceding,
            LABEL_SAFE => Status::Safe,
            other => parse_collecting(other).unwrap_or_else(|| Status::Other(other.to_string())),
        }
    }

    /// True for the warm-up state, including free-form labels that mention it.
    pub fn is_collecting(&self) -> bool {
        match self {
            Status::Collecting { .. } => true,
            Status::Other(label) => label.contains(COLLECTING_PREFIX),
            _ => false,
        }
    }
}

fn parse_collecting(label: &str) -> Option<Status> {
    let rest = label.strip_prefix(COLLECTING_PREFIX)?.trim();
    let (filled, capacity) = rest.split_once('/')?;
    Some(Status::Collecting {
        filled: filled.trim().parse().ok()?,
        capacity: capacity.trim().parse().ok()?,
    })
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::SensorError => write!(f, "{}", LABEL_SENSOR_ERROR),
            Status::Collecting { filled, capacity } => {
                write!(f, "{} {}/{}", COLLECTING_PREFIX, filled, capacity)
            }
            Status::CalcErrTime => write!(f, "{}", LABEL_CALC_ERR_TIME),
            Status::FloodDanger => write!(f, "{}", LABEL_FLOOD_DANGER),
            Status::WaterReceding => write!(f, "{}", LABEL_WATER_RECEDING),
            Status::Safe => write!(f, "{}", LABEL_SAFE),
            Status::Other(label) => write!(f, "{}", label),
        }
    }
}

impl From<Status> for String {
    fn from(status: Status) -> String {
        status.to_string()
    }
}

impl From<String> for Status {
    fn from(label: String) -> Status {
        Status::from_label(&label)
    }
}

// ---------------------------------------------------------------------------
// Stations
// ---------------------------------------------------------------------------

/// Primary key of a station in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationId(pub i64);

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fixed monitoring point on a river.
///
/// Coordinates are optional because registry rows are maintained by hand and
/// some have never been surveyed. Stations without a usable position are
/// skipped by nearest-station matching but can still be the default station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Station {
    /// `(latitude, longitude)` when both are present and finite.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some((lat, lon)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// Primary key assigned to a reading by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReadingId(pub i64);

impl fmt::Display for ReadingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Primary key assigned to a citizen report by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(pub i64);

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One ingested observation, as persisted. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub distance_cm: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub rainfall_percent: Option<f64>,
    pub turbidity_voltage: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub rate_cm_per_min: Option<f64>,
    pub percent_change: Option<f64>,
    pub status: Status,
    pub flood_danger: bool,
    pub humidity_danger: bool,
    pub station_id: Option<StationId>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised by the station registry or the reading and report stores.
#[derive(Debug, PartialEq)]
pub enum StoreError {
    /// The backing database could not be reached.
    Connection(String),
    /// A query or insert was rejected.
    Query(String),
    /// A row came back in a shape we cannot map to the model.
    Corrupt(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Connection(msg) => write!(f, "Connection error: {}", msg),
            StoreError::Query(msg) => write!(f, "Query error: {}", msg),
            StoreError::Corrupt(msg) => write!(f, "Corrupt row: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
