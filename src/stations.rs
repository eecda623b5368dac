/// Station registry access and nearest-station assignment.
///
/// Every reading that reaches the gateway is attached to exactly one river
/// monitoring station (or to none, when nothing matches). Readings that carry
/// a GPS fix go to the closest station by great-circle distance; readings
/// without one go to the configured default station, looked up by name.
///
/// The station list itself is owned by the registry (the database in
/// production, a TOML file in development). Functions here take a snapshot
/// slice and perform no I/O.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::config::ConfigError;
use crate::model::{Station, StationId, StoreError};

// ---------------------------------------------------------------------------
// Registry access
// ---------------------------------------------------------------------------

/// Read-only source of stations.
pub trait StationRegistry {
    /// Every known station, in registry order. Order matters: it is the
    /// tie-break for stations at exactly equal distance.
    fn list_stations(&self) -> Result<Vec<Station>, StoreError>;

    /// Station with exactly this name, if any.
    fn find_by_name(&self, name: &str) -> Result<Option<Station>, StoreError> {
        Ok(self.list_stations()?.into_iter().find(|s| s.name == name))
    }
}

/// Registry backed by a fixed list, typically loaded from `stations.toml`.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    stations: Vec<Station>,
}

impl StaticRegistry {
    pub fn new(stations: Vec<Station>) -> Self {
        Self { stations }
    }
}

impl StationRegistry for StaticRegistry {
    fn list_stations(&self) -> Result<Vec<Station>, StoreError> {
        Ok(self.stations.clone())
    }
}

#[derive(Debug, Deserialize)]
struct StationFile {
    #[serde(rename = "station", default)]
    stations: Vec<Station>,
}

/// Parses a station list in TOML form:
///
/// ```toml
/// [[station]]
/// id = 1
/// name = "Sungai Keputih Tegal Timur"
/// latitude = -7.2906
/// longitude = 112.7960
/// ```
pub fn parse_stations(text: &str) -> Result<Vec<Station>, ConfigError> {
    let file: StationFile = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
    Ok(file.stations)
}

/// Loads a station list from a TOML file on disk.
pub fn load_stations(path: impl AsRef<Path>) -> Result<Vec<Station>, ConfigError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
    parse_stations(&text)
}

// ---------------------------------------------------------------------------
// Great-circle distance
// ---------------------------------------------------------------------------

/// Mean Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Central angle (radians) between two points given in degrees.
fn central_angle(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Haversine distance in metres. Used for reading-to-station assignment.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    EARTH_RADIUS_M * central_angle(lat1, lon1, lat2, lon2)
}

/// Haversine distance in kilometres. Used for citizen report validation.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    EARTH_RADIUS_KM * central_angle(lat1, lon1, lat2, lon2)
}

// ---------------------------------------------------------------------------
// Assignment
// ---------------------------------------------------------------------------

/// How a reading was matched to a station.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment<'a> {
    /// Closest station to the reading's coordinates.
    Nearest { station: &'a Station, distance_m: f64 },
    /// No coordinates; the named default station was used.
    Default(&'a Station),
    /// Nothing matched. The reading is still stored, unassigned.
    Unassigned,
}

impl<'a> Assignment<'a> {
    pub fn station(&self) -> Option<&'a Station> {
        match self {
            Assignment::Nearest { station, .. } | Assignment::Default(station) => Some(station),
            Assignment::Unassigned => None,
        }
    }

    pub fn station_id(&self) -> Option<StationId> {
        self.station().map(|s| s.id)
    }
}

/// Closest station with valid coordinates, with its distance in metres.
///
/// Strict `<` comparison: on an exact tie the station listed first wins.
/// Returns `None` if no station has coordinates.
pub fn nearest_station(lat: f64, lon: f64, stations: &[Station]) -> Option<(&Station, f64)> {
    let mut best: Option<(&Station, f64)> = None;
    for station in stations {
        let Some((s_lat, s_lon)) = station.coordinates() else {
            continue;
        };
        let distance = haversine_m(lat, lon, s_lat, s_lon);
        if best.is_none_or(|(_, min)| distance < min) {
            best = Some((station, distance));
        }
    }
    best
}

/// Looks up a station by exact name. Returns `None` if not found.
pub fn find_by_name<'a>(stations: &'a [Station], name: &str) -> Option<&'a Station> {
    stations.iter().find(|s| s.name == name)
}

/// Matches a reading position to a station.
///
/// With both coordinates present and finite, the nearest station wins.
/// Otherwise the station named `default_name` is used.
pub fn assign<'a>(
    lat: Option<f64>,
    lon: Option<f64>,
    stations: &'a [Station],
    default_name: &str,
) -> Assignment<'a> {
    match (lat, lon) {
        (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => {
            match nearest_station(lat, lon, stations) {
                Some((station, distance_m)) => Assignment::Nearest {
                    station,
                    distance_m,
                },
                None => Assignment::Unassigned,
            }
        }
        _ => match find_by_name(stations, default_name) {
            Some(station) => Assignment::Default(station),
            None => Assignment::Unassigned,
        },
    }
}

/// Station id for a reading position, or `None` when nothing matches.
pub fn locate(
    lat: Option<f64>,
    lon: Option<f64>,
    stations: &[Station],
    default_name: &str,
) -> Option<StationId> {
    assign(lat, lon, stations, default_name).station_id()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: &str = "Sungai Keputih Tegal Timur";

    fn station(id: i64, name: &str, lat: Option<f64>, lon: Option<f64>) -> Station {
        Station {
            id: StationId(id),
            name: name.to_string(),
            latitude: lat,
            longitude: lon,
        }
    }

    fn surabaya_rivers() -> Vec<Station> {
        vec![
            station(1, DEFAULT, Some(-7.2906), Some(112.7960)),
            station(2, "Sungai Kalimas", Some(-7.2459), Some(112.7378)),
            station(3, "Kali Wonokromo", Some(-7.3005), Some(112.7371)),
            station(4, "Kali Unsurveyed", None, None),
        ]
    }

    // --- Haversine ----------------------------------------------------------

    #[test]
    fn test_haversine_same_point_is_zero() {
        assert_eq!(haversine_m(-7.29, 112.79, -7.29, 112.79), 0.0);
    }

    #[test]
    fn test_haversine_one_degree_on_equator() {
        // 2πR / 360 ≈ 111.195 km
        let km = haversine_km(0.0, 0.0, 0.0, 1.0);
        assert!((km - 111.195).abs() < 0.01, "got {} km", km);
        let m = haversine_m(0.0, 0.0, 0.0, 1.0);
        assert!((m - km * 1000.0).abs() < 1e-6);
    }

    #[test]
    fn test_haversine_is_symmetric() {
        let ab = haversine_m(-7.2906, 112.7960, -7.2459, 112.7378);
        let ba = haversine_m(-7.2459, 112.7378, -7.2906, 112.7960);
        assert!((ab - ba).abs() < 1e-9);
    }

    // --- Nearest match ------------------------------------------------------

    #[test]
    fn test_locate_with_no_stations_is_none() {
        assert_eq!(locate(Some(-7.29), Some(112.79), &[], DEFAULT), None);
        assert_eq!(locate(Some(0.0), Some(0.0), &[], DEFAULT), None);
    }

    #[test]
    fn test_locate_picks_closer_station() {
        let stations = vec![
            station(10, "A", Some(0.0), Some(0.0)),
            station(11, "B", Some(0.0), Some(1.0)),
        ];
        assert_eq!(locate(Some(0.0), Some(0.4), &stations, DEFAULT), Some(StationId(10)));
        assert_eq!(locate(Some(0.0), Some(0.6), &stations, DEFAULT), Some(StationId(11)));
    }

    #[test]
    fn test_exact_tie_goes_to_first_listed() {
        let stations = vec![
            station(10, "A", Some(0.0), Some(0.0)),
            station(11, "B", Some(0.0), Some(1.0)),
        ];
        assert_eq!(locate(Some(0.0), Some(0.5), &stations, DEFAULT), Some(StationId(10)));
    }

    #[test]
    fn test_stations_without_coordinates_are_skipped() {
        let stations = vec![
            station(1, "No position", None, Some(112.0)),
            station(2, "Far away", Some(10.0), Some(120.0)),
        ];
        assert_eq!(locate(Some(-7.0), Some(112.0), &stations, DEFAULT), Some(StationId(2)));
    }

    #[test]
    fn test_no_station_with_coordinates_is_unassigned() {
        let stations = vec![station(4, DEFAULT, None, None)];
        // Coordinates given, so the default-name fallback does not apply.
        assert_eq!(assign(Some(-7.0), Some(112.0), &stations, DEFAULT), Assignment::Unassigned);
    }

    #[test]
    fn test_nearest_reports_distance() {
        let stations = surabaya_rivers();
        match assign(Some(-7.2460), Some(112.7380), &stations, DEFAULT) {
            Assignment::Nearest { station, distance_m } => {
                assert_eq!(station.name, "Sungai Kalimas");
                assert!(distance_m < 50.0, "got {} m", distance_m);
            }
            other => panic!("expected nearest match, got {:?}", other),
        }
    }

    // --- Default fallback ---------------------------------------------------

    #[test]
    fn test_missing_coordinates_use_default_station() {
        let stations = surabaya_rivers();
        assert_eq!(locate(None, None, &stations, DEFAULT), Some(StationId(1)));
        assert_eq!(locate(Some(-7.25), None, &stations, DEFAULT), Some(StationId(1)));
        assert_eq!(locate(None, Some(112.7), &stations, DEFAULT), Some(StationId(1)));
    }

    #[test]
    fn test_non_finite_coordinates_use_default_station() {
        let stations = surabaya_rivers();
        assert_eq!(locate(Some(f64::NAN), Some(112.7), &stations, DEFAULT), Some(StationId(1)));
    }

    #[test]
    fn test_unknown_default_name_is_none() {
        let stations = surabaya_rivers();
        assert_eq!(locate(None, None, &stations, "Sungai Brantas"), None);
    }

    #[test]
    fn test_default_name_match_is_exact() {
        let stations = surabaya_rivers();
        assert_eq!(locate(None, None, &stations, "sungai keputih tegal timur"), None);
    }

    // --- Station files ------------------------------------------------------

    #[test]
    fn test_parse_stations_from_toml() {
        let text = r#"
            [[station]]
            id = 1
            name = "Sungai Keputih Tegal Timur"
            latitude = -7.2906
            longitude = 112.7960

            [[station]]
            id = 2
            name = "Kali Unsurveyed"
        "#;
        let stations = parse_stations(text).expect("valid station file");
        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].coordinates(), Some((-7.2906, 112.7960)));
        assert_eq!(stations[1].coordinates(), None);
    }

    #[test]
    fn test_parse_stations_rejects_garbage() {
        assert!(parse_stations("[[station]]\nid = \"one\"").is_err());
    }

    #[test]
    fn test_static_registry_preserves_order() {
        let registry = StaticRegistry::new(surabaya_rivers());
        let ids: Vec<_> = registry.list_stations().unwrap().iter().map(|s| s.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_registry_find_by_name() {
        let registry = StaticRegistry::new(surabaya_rivers());
        let found = registry.find_by_name("Sungai Kalimas").unwrap();
        assert_eq!(found.map(|s| s.id), Some(StationId(2)));
        assert_eq!(registry.find_by_name("Sungai Brantas").unwrap(), None);
    }
}
