//! Node report parsing.
//!
//! Nodes in the field run several firmware generations, so the JSON they
//! post is not uniform: older units use the Indonesian field
//! names (`danger_banjir`, `delta_per_min`, ...) and some send numbers as
//! strings. This module accepts all of that and produces one strongly typed
//! [`SensorPayload`].
//!
//! Coercion rules:
//! - Optional numeric fields take a JSON number or a numeric string. Any
//!   other value is logged as a warning and treated as absent.
//! - Required flags take a boolean, `0`/`1`, or `"true"`/`"false"`.
//! - Required `status` must be a string.
//! - `null` counts as absent everywhere.
//! - An empty body, `null`, `{}` or `[]` is rejected as no payload.

use serde_json::{Map, Value};

use crate::logging::{self, Component};
use crate::model::Status;

use super::IngestError;

/// Canonical name first, then accepted aliases.
const STATUS: &[&str] = &["status"];
const FLOOD_DANGER: &[&str] = &["flood_danger", "danger_banjir"];
const HUMIDITY_DANGER: &[&str] = &["humidity_danger", "danger_humidity"];
const DISTANCE: &[&str] = &["distance", "distance_cm"];
const TEMPERATURE: &[&str] = &["temperature"];
const HUMIDITY: &[&str] = &["humidity"];
const RAINFALL: &[&str] = &["rainfall_percent", "raindrop_percent"];
const TURBIDITY: &[&str] = &["turbidity_voltage", "turbidity"];
const LATITUDE: &[&str] = &["latitude"];
const LONGITUDE: &[&str] = &["longitude"];
const RATE: &[&str] = &["rate_cm_per_min", "delta_per_min"];
const PERCENT_CHANGE: &[&str] = &["percent_change"];

/// One node report after normalisation.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorPayload {
    pub status: Status,
    pub flood_danger: bool,
    pub humidity_danger: bool,
    pub distance_cm: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub rainfall_percent: Option<f64>,
    pub turbidity_voltage: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub rate_cm_per_min: Option<f64>,
    pub percent_change: Option<f64>,
}

/// First non-null value under any of `names`.
fn lookup<'a>(object: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| object.get(*name))
        .find(|value| !value.is_null())
}

fn number(object: &Map<String, Value>, names: &[&'static str]) -> Option<f64> {
    let value = lookup(object, names)?;
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed.filter(|v| v.is_finite()) {
        Some(v) => Some(v),
        None => {
            logging::warn(
                Component::Gateway,
                None,
                &format!("Ignoring non-numeric {}: {}", names[0], value),
            );
            None
        }
    }
}

fn flag(value: &Value, field: &'static str) -> Result<bool, IngestError> {
    let parsed = match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_f64() {
            Some(v) if v == 0.0 => Some(false),
            Some(v) if v == 1.0 => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    };
    parsed.ok_or_else(|| IngestError::InvalidField {
        field,
        reason: format!("must be a boolean, got {}", value),
    })
}

impl SensorPayload {
    /// Parses a raw request body.
    pub fn from_slice(body: &[u8]) -> Result<Self, IngestError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(IngestError::NoPayload);
        }
        let value: Value = serde_json::from_slice(body).map_err(|_| IngestError::NoPayload)?;
        Self::from_json(&value)
    }

    /// Normalises an already-decoded JSON document.
    pub fn from_json(value: &Value) -> Result<Self, IngestError> {
        // A body that parses to nothing usable counts as no payload at all.
        let empty = match value {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            Value::Array(items) => items.is_empty(),
            _ => false,
        };
        if empty {
            return Err(IngestError::NoPayload);
        }
        let object = value.as_object().ok_or(IngestError::NotAnObject)?;

        let status = lookup(object, STATUS);
        let flood = lookup(object, FLOOD_DANGER);
        let humidity_flag = lookup(object, HUMIDITY_DANGER);

        let missing: Vec<&'static str> = [
            (STATUS[0], status.is_none()),
            (FLOOD_DANGER[0], flood.is_none()),
            (HUMIDITY_DANGER[0], humidity_flag.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        let (Some(status), Some(flood), Some(humidity_flag)) = (status, flood, humidity_flag) else {
            return Err(IngestError::MissingFields(missing));
        };

        let status = match status {
            Value::String(label) => Status::from_label(label.trim()),
            other => {
                return Err(IngestError::InvalidField {
                    field: STATUS[0],
                    reason: format!("must be a string, got {}", other),
                });
            }
        };

        Ok(SensorPayload {
            status,
            flood_danger: flag(flood, FLOOD_DANGER[0])?,
            humidity_danger: flag(humidity_flag, HUMIDITY_DANGER[0])?,
            distance_cm: number(object, DISTANCE),
            temperature: number(object, TEMPERATURE),
            humidity: number(object, HUMIDITY),
            rainfall_percent: number(object, RAINFALL),
            turbidity_voltage: number(object, TURBIDITY),
            latitude: number(object, LATITUDE),
            longitude: number(object, LONGITUDE),
            rate_cm_per_min: number(object, RATE),
            percent_change: number(object, PERCENT_CHANGE),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
