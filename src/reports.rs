/// Citizen condition reports.
///
/// Residents can report what they see at a river station (overflow,
/// discoloured water, dead fish, blocked drains, rubbish) with a photo. A
/// report is only accepted from someone standing within 1 km of the
/// station they picked.
///
/// Validation runs in three stages and stops at the first stage that
/// fails, returning every problem found in that stage:
/// 1. station chosen, position available, photo attached
/// 2. station has coordinates and the reporter is close enough
/// 3. name, phone, conditions and rubbish level filled in properly
///
/// Accepted reports go to a [`crate::db::ReportStore`] and show up in the
/// station summaries. The photo itself is not kept.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{Station, StationId};
use crate::stations::{find_by_name, haversine_km};

/// Furthest a reporter may be from the station, in km.
pub const MAX_REPORT_DISTANCE_KM: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiverCondition {
    #[serde(rename = "Aman")]
    Safe,
    #[serde(rename = "Banjir")]
    Flooding,
    #[serde(rename = "Air Meluap")]
    Overflowing,
    #[serde(rename = "Warna Berubah")]
    Discoloured,
    #[serde(rename = "Bau Menyengat")]
    Foul,
    #[serde(rename = "Tumpukan Sampah")]
    RubbishPile,
    #[serde(rename = "Ikan Mati")]
    DeadFish,
    #[serde(rename = "Saluran Tersumbat")]
    BlockedDrain,
    #[serde(rename = "Lainnya")]
    Other,
}

impl RiverCondition {
    pub const ALL: [RiverCondition; 9] = [
        RiverCondition::Safe,
        RiverCondition::Flooding,
        RiverCondition::Overflowing,
        RiverCondition::Discoloured,
        RiverCondition::Foul,
        RiverCondition::RubbishPile,
        RiverCondition::DeadFish,
        RiverCondition::BlockedDrain,
        RiverCondition::Other,
    ];

    /// Label shown to residents and stored in the database.
    pub fn label(self) -> &'static str {
        match self {
            RiverCondition::Safe => "Aman",
            RiverCondition::Flooding => "Banjir",
            RiverCondition::Overflowing => "Air Meluap",
            RiverCondition::Discoloured => "Warna Berubah",
            RiverCondition::Foul => "Bau Menyengat",
            RiverCondition::RubbishPile => "Tumpukan Sampah",
            RiverCondition::DeadFish => "Ikan Mati",
            RiverCondition::BlockedDrain => "Saluran Tersumbat",
            RiverCondition::Other => "Lainnya",
        }
    }

    pub fn from_label(label: &str) -> Option<RiverCondition> {
        Self::ALL.into_iter().find(|c| c.label() == label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RubbishLevel {
    #[serde(rename = "Tidak Ada")]
    None,
    #[serde(rename = "Sedikit")]
    Little,
    #[serde(rename = "Banyak")]
    Lots,
    #[serde(rename = "Sangat Banyak")]
    VeryMuch,
}

impl RubbishLevel {
    pub const ALL: [RubbishLevel; 4] = [
        RubbishLevel::None,
        RubbishLevel::Little,
        RubbishLevel::Lots,
        RubbishLevel::VeryMuch,
    ];

    pub fn label(self) -> &'static str {
        match self {
            RubbishLevel::None => "Tidak Ada",
            RubbishLevel::Little => "Sedikit",
            RubbishLevel::Lots => "Banyak",
            RubbishLevel::VeryMuch => "Sangat Banyak",
        }
    }

    pub fn from_label(label: &str) -> Option<RubbishLevel> {
        Self::ALL.into_iter().find(|l| l.label() == label)
    }
}

/// A report as submitted, before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportDraft {
    pub station_name: Option<String>,
    pub reporter_name: String,
    pub reporter_address: Option<String>,
    pub phone: String,
    /// Reporter position from the device, `(latitude, longitude)`.
    pub position: Option<(f64, f64)>,
    pub conditions: Vec<RiverCondition>,
    pub rubbish_level: Option<RubbishLevel>,
    pub description: Option<String>,
    pub photo: Option<Vec<u8>>,
}

/// Wire form of `POST /report`. The photo travels base64-encoded, with or
/// without a `data:` URL prefix.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportRequest {
    pub station: Option<String>,
    #[serde(default)]
    pub name: String,
    pub address: Option<String>,
    #[serde(default)]
    pub phone: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default)]
    pub conditions: Vec<RiverCondition>,
    pub rubbish_level: Option<RubbishLevel>,
    pub description: Option<String>,
    pub photo_base64: Option<String>,
}

impl ReportRequest {
    /// Decodes the photo and reshapes the request for [`validate`].
    pub fn into_draft(self) -> Result<ReportDraft, ReportError> {
        let photo = match self.photo_base64.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(encoded) => {
                let data = match encoded.strip_prefix("data:") {
                    Some(url) => url.split_once(',').map_or("", |(_, data)| data),
                    None => encoded,
                };
                Some(STANDARD.decode(data).map_err(|_| ReportError::InvalidPhoto)?)
            }
        };
        Ok(ReportDraft {
            station_name: self.station,
            reporter_name: self.name,
            reporter_address: self.address,
            phone: self.phone,
            position: self.latitude.zip(self.longitude),
            conditions: self.conditions,
            rubbish_level: self.rubbish_level,
            description: self.description,
            photo,
        })
    }
}

/// A report that passed validation, ready to store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CitizenReport {
    pub submitted_at: DateTime<Utc>,
    pub station_id: StationId,
    pub reporter_name: String,
    pub reporter_address: Option<String>,
    pub phone: String,
    pub latitude: f64,
    pub longitude: f64,
    pub distance_km: f64,
    pub conditions: Vec<RiverCondition>,
    pub rubbish_level: RubbishLevel,
    pub description: Option<String>,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportError {
    NoStationChosen,
    UnknownStation(String),
    PositionUnavailable,
    MissingPhoto,
    InvalidPhoto,
    StationNotSurveyed(String),
    TooFar { distance_km: f64 },
    MissingName,
    MissingPhone,
    PhoneNotNumeric,
    NoConditions,
    MissingRubbishLevel,
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportError::NoStationChosen => write!(f, "A river station must be chosen"),
            ReportError::UnknownStation(name) => write!(f, "Unknown river station '{}'", name),
            ReportError::PositionUnavailable => write!(f, "Reporter location is unavailable"),
            ReportError::MissingPhoto => write!(f, "A photo of the river is required"),
            ReportError::InvalidPhoto => write!(f, "Photo is not valid base64"),
            ReportError::StationNotSurveyed(name) => {
                write!(f, "Station '{}' has no coordinates to check distance against", name)
            }
            ReportError::TooFar { distance_km } => write!(
                f,
                "Reporter is {:.2} km from the station; reports are accepted within {:.0} km",
                distance_km, MAX_REPORT_DISTANCE_KM
            ),
            ReportError::MissingName => write!(f, "Reporter name is required"),
            ReportError::MissingPhone => write!(f, "Phone number is required"),
            ReportError::PhoneNotNumeric => write!(f, "Phone number must contain digits only"),
            ReportError::NoConditions => write!(f, "At least one river condition must be chosen"),
            ReportError::MissingRubbishLevel => write!(f, "Rubbish level is required"),
        }
    }
}

impl std::error::Error for ReportError {}

/// Validates `draft` against the station list.
pub fn validate(
    draft: &ReportDraft,
    stations: &[Station],
    submitted_at: DateTime<Utc>,
) -> Result<CitizenReport, Vec<ReportError>> {
    // Stage 1
    let mut errors = Vec::new();
    let station = match draft.station_name.as_deref() {
        None | Some("") => {
            errors.push(ReportError::NoStationChosen);
            None
        }
        Some(name) => {
            let found = find_by_name(stations, name);
            if found.is_none() {
                errors.push(ReportError::UnknownStation(name.to_string()));
            }
            found
        }
    };
    let position = draft
        .position
        .filter(|(lat, lon)| lat.is_finite() && lon.is_finite());
    if position.is_none() {
        errors.push(ReportError::PositionUnavailable);
    }
    if draft.photo.as_ref().is_none_or(|p| p.is_empty()) {
        errors.push(ReportError::MissingPhoto);
    }
    let (Some(station), Some((lat, lon)), true) = (station, position, errors.is_empty()) else {
        return Err(errors);
    };

    // Stage 2
    let Some((s_lat, s_lon)) = station.coordinates() else {
        return Err(vec![ReportError::StationNotSurveyed(station.name.clone())]);
    };
    let distance_km = haversine_km(lat, lon, s_lat, s_lon);
    if distance_km.is_nan() || distance_km > MAX_REPORT_DISTANCE_KM {
        return Err(vec![ReportError::TooFar { distance_km }]);
    }

    // Stage 3
    let name = draft.reporter_name.trim();
    let phone = draft.phone.trim();
    if name.is_empty() {
        errors.push(ReportError::MissingName);
    }
    if phone.is_empty() {
        errors.push(ReportError::MissingPhone);
    } else if !phone.chars().all(|c| c.is_ascii_digit()) {
        errors.push(ReportError::PhoneNotNumeric);
    }
    if draft.conditions.is_empty() {
        errors.push(ReportError::NoConditions);
    }
    let Some(rubbish_level) = draft.rubbish_level else {
        errors.push(ReportError::MissingRubbishLevel);
        return Err(errors);
    };
    if !errors.is_empty() {
        return Err(errors);
    }

    let non_empty = |s: &Option<String>| s.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(String::from);
    Ok(CitizenReport {
        submitted_at,
        station_id: station.id,
        reporter_name: name.to_string(),
        reporter_address: non_empty(&draft.reporter_address),
        phone: phone.to_string(),
        latitude: lat,
        longitude: lon,
        distance_km,
        conditions: draft.conditions.clone(),
        rubbish_level,
        description: non_empty(&draft.description),
        verified: false,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stations() -> Vec<Station> {
        vec![
            Station {
                id: StationId(1),
                name: "Sungai Keputih Tegal Timur".to_string(),
                latitude: Some(-7.2906),
                longitude: Some(112.7960),
            },
            Station {
                id: StationId(4),
                name: "Kali Unsurveyed".to_string(),
                latitude: None,
                longitude: None,
            },
        ]
    }

    fn draft() -> ReportDraft {
        ReportDraft {
            station_name: Some("Sungai Keputih Tegal Timur".to_string()),
            reporter_name: "Sari".to_string(),
            reporter_address: Some("  ".to_string()),
            phone: "08123456789".to_string(),
            // ~300 m north of the station
            position: Some((-7.2879, 112.7960)),
            conditions: vec![RiverCondition::RubbishPile],
            rubbish_level: Some(RubbishLevel::Lots),
            description: Some("Sampah menumpuk di pintu air".to_string()),
            photo: Some(vec![0xFF, 0xD8, 0xFF]),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_valid_report() {
        let report = validate(&draft(), &stations(), now()).expect("valid report");
        assert_eq!(report.station_id, StationId(1));
        assert!(report.distance_km < 0.5, "got {} km", report.distance_km);
        assert_eq!(report.reporter_address, None, "blank address is dropped");
        assert!(!report.verified);
    }

    #[test]
    fn test_stage_one_collects_all_problems() {
        let mut d = draft();
        d.position = None;
        d.photo = None;
        d.phone = String::new();
        let errors = validate(&d, &stations(), now()).unwrap_err();
        assert_eq!(errors, vec![ReportError::PositionUnavailable, ReportError::MissingPhoto]);
    }

    #[test]
    fn test_non_finite_position_is_unavailable() {
        for position in [(f64::NAN, f64::NAN), (-7.29, f64::INFINITY)] {
            let mut d = draft();
            d.position = Some(position);
            let errors = validate(&d, &stations(), now()).unwrap_err();
            assert_eq!(errors, vec![ReportError::PositionUnavailable]);
        }
    }

    #[test]
    fn test_unknown_station() {
        let mut d = draft();
        d.station_name = Some("Sungai Brantas".to_string());
        let errors = validate(&d, &stations(), now()).unwrap_err();
        assert_eq!(errors, vec![ReportError::UnknownStation("Sungai Brantas".to_string())]);
    }

    #[test]
    fn test_reporter_too_far_away() {
        let mut d = draft();
        d.position = Some((-7.2459, 112.7378)); // ~8 km away
        let errors = validate(&d, &stations(), now()).unwrap_err();
        assert!(matches!(errors.as_slice(), [ReportError::TooFar { distance_km }] if *distance_km > 5.0));
    }

    #[test]
    fn test_station_without_coordinates_cannot_be_checked() {
        let mut d = draft();
        d.station_name = Some("Kali Unsurveyed".to_string());
        let errors = validate(&d, &stations(), now()).unwrap_err();
        assert_eq!(errors, vec![ReportError::StationNotSurveyed("Kali Unsurveyed".to_string())]);
    }

    #[test]
    fn test_stage_three_checks() {
        let mut d = draft();
        d.reporter_name = " ".to_string();
        d.phone = "0812-3456".to_string();
        d.conditions.clear();
        let errors = validate(&d, &stations(), now()).unwrap_err();
        assert_eq!(
            errors,
            vec![ReportError::MissingName, ReportError::PhoneNotNumeric, ReportError::NoConditions]
        );
    }

    #[test]
    fn test_labels_match_wire_names() {
        for condition in RiverCondition::ALL {
            let json = serde_json::to_string(&condition).unwrap();
            assert_eq!(json, format!("\"{}\"", condition.label()));
            assert_eq!(RiverCondition::from_label(condition.label()), Some(condition));
        }
        for level in RubbishLevel::ALL {
            let json = serde_json::to_string(&level).unwrap();
            assert_eq!(json, format!("\"{}\"", level.label()));
            assert_eq!(RubbishLevel::from_label(level.label()), Some(level));
        }
        assert_eq!(RiverCondition::from_label("Kering"), None);
    }

    #[test]
    fn test_request_into_draft_decodes_photo() {
        let request: ReportRequest = serde_json::from_value(serde_json::json!({
            "station": "Sungai Keputih Tegal Timur",
            "name": "Sari",
            "phone": "08123456789",
            "latitude": -7.2879,
            "longitude": 112.7960,
            "conditions": ["Tumpukan Sampah"],
            "rubbish_level": "Banyak",
            "photo_base64": "data:image/jpeg;base64,/9j/"
        }))
        .unwrap();
        let draft = request.into_draft().expect("photo decodes");
        assert_eq!(draft.photo, Some(vec![0xFF, 0xD8, 0xFF]));
        assert_eq!(draft.position, Some((-7.2879, 112.7960)));
        assert!(validate(&draft, &stations(), now()).is_ok());
    }

    #[test]
    fn test_request_with_garbage_photo() {
        let request = ReportRequest {
            photo_base64: Some("not base64!".to_string()),
            ..ReportRequest::default()
        };
        assert_eq!(request.into_draft().unwrap_err(), ReportError::InvalidPhoto);
    }

    #[test]
    fn test_request_without_longitude_has_no_position() {
        let request = ReportRequest {
            latitude: Some(-7.29),
            ..ReportRequest::default()
        };
        assert_eq!(request.into_draft().unwrap().position, None);
    }

    #[test]
    fn test_condition_labels() {
        let json = serde_json::to_string(&[RiverCondition::Overflowing, RiverCondition::DeadFish]).unwrap();
        assert_eq!(json, "[\"Air Meluap\",\"Ikan Mati\"]");
        let level: RubbishLevel = serde_json::from_str("\"Sangat Banyak\"").unwrap();
        assert_eq!(level, RubbishLevel::VeryMuch);
    }
}
