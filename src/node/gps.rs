//! NMEA 0183 position parsing for the node's GPS module.
//!
//! Only the two sentences the module emits with a position are handled:
//! `$GPGGA` (fix data, usable when the fix-quality field is non-zero) and
//! `$GPRMC` (recommended minimum, usable when the status field is `A`).
//! Coordinates arrive as `ddmm.mmmm` / `dddmm.mmmm` plus a hemisphere.

use std::fmt;

/// A position in decimal degrees, south and west negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NmeaError {
    /// Not a sentence we extract positions from.
    Unsupported(String),
    /// Fewer comma-separated fields than a position sentence carries.
    TooShort(usize),
    /// The receiver reports no valid fix yet.
    NoFix,
    /// A coordinate field is empty or not a number.
    BadCoordinate(String),
}

impl fmt::Display for NmeaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NmeaError::Unsupported(kind) => write!(f, "Unsupported sentence: {}", kind),
            NmeaError::TooShort(n) => write!(f, "Sentence has only {} fields", n),
            NmeaError::NoFix => write!(f, "No fix"),
            NmeaError::BadCoordinate(raw) => write!(f, "Bad coordinate: '{}'", raw),
        }
    }
}

impl std::error::Error for NmeaError {}

/// Converts `ddmm.mmmm` with hemisphere `N`/`S`/`E`/`W` to decimal degrees.
pub fn to_decimal_degrees(raw: &str, hemisphere: &str) -> Result<f64, NmeaError> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| NmeaError::BadCoordinate(raw.to_string()))?;
    let degrees = (value / 100.0).trunc();
    let minutes = value - degrees * 100.0;
    let decimal = degrees + minutes / 60.0;
    match hemisphere.trim() {
        "S" | "W" => Ok(-decimal),
        _ => Ok(decimal),
    }
}

/// Parses one NMEA sentence into a fix.
pub fn parse_sentence(line: &str) -> Result<Fix, NmeaError> {
    let line = line.trim();
    let parts: Vec<&str> = line.split(',').collect();
    let kind = parts.first().copied().unwrap_or_default();
    if kind != "$GPGGA" && kind != "$GPRMC" {
        return Err(NmeaError::Unsupported(kind.to_string()));
    }
    if parts.len() < 7 {
        return Err(NmeaError::TooShort(parts.len()));
    }

    // (lat, lat hemisphere, lon, lon hemisphere) field indices
    let (lat_i, has_fix) = if kind == "$GPGGA" {
        (2, parts[6] != "0")
    } else {
        (3, parts[2] == "A")
    };
    if !has_fix {
        return Err(NmeaError::NoFix);
    }
    let fields = &parts[lat_i..lat_i + 4];
    if fields.iter().any(|f| f.is_empty()) {
        return Err(NmeaError::NoFix);
    }

    Ok(Fix {
        latitude: to_decimal_degrees(fields[0], fields[1])?,
        longitude: to_decimal_degrees(fields[2], fields[3])?,
    })
}

/// Latest usable fix in a chunk of UART output, scanning newest line first.
pub fn last_fix(chunk: &str) -> Option<Fix> {
    chunk
        .lines()
        .rev()
        .filter(|line| line.starts_with("$GPGGA") || line.starts_with("$GPRMC"))
        .find_map(|line| parse_sentence(line).ok())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
