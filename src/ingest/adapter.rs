//! Turns a parsed node report into a stored reading.
//!
//! Per report: apply the status display policy, fetch the station list
//! once, assign the nearest (or default) station, persist. Store failures
//! surface to the caller and are not retried here.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::ReadingStore;
use crate::logging::{self, Component};
use crate::model::{Reading, ReadingId, Status};
use crate::stations::{self, Assignment, StationRegistry};

use super::payload::SensorPayload;
use super::IngestError;

/// Body of a successful `/sensor` response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestResponse {
    pub message: String,
    pub id: String,
    pub assigned_station: String,
}

/// What happened to one report.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReceipt {
    pub id: ReadingId,
    pub assigned_station: Option<String>,
    pub reading: Reading,
}

impl IngestReceipt {
    pub fn to_response(&self) -> IngestResponse {
        IngestResponse {
            message: "Data received and saved".to_string(),
            id: self.id.to_string(),
            assigned_station: self
                .assigned_station
                .clone()
                .unwrap_or_else(|| "N/A".to_string()),
        }
    }
}

/// Stored status for a report.
///
/// A node still filling its window has no rate yet; dashboards show that
/// as "Aman" rather than a progress counter. Any other status without a
/// rate is kept as sent.
pub fn resolve_status(received: Status, rate_cm_per_min: Option<f64>) -> Status {
    if rate_cm_per_min.is_none() && received.is_collecting() {
        Status::Safe
    } else {
        received
    }
}

pub struct IngestionAdapter<'a, R: ?Sized, S: ?Sized> {
    registry: &'a R,
    store: &'a S,
    default_station: &'a str,
}

impl<'a, R, S> IngestionAdapter<'a, R, S>
where
    R: StationRegistry + ?Sized,
    S: ReadingStore + ?Sized,
{
    pub fn new(registry: &'a R, store: &'a S, default_station: &'a str) -> Self {
        Self {
            registry,
            store,
            default_station,
        }
    }

    /// Ingests one report received at `received_at`.
    pub fn ingest(
        &self,
        payload: SensorPayload,
        received_at: DateTime<Utc>,
    ) -> Result<IngestReceipt, IngestError> {
        if payload.rate_cm_per_min.is_none() && !payload.status.is_collecting() {
            logging::warn(
                Component::Gateway,
                None,
                &format!("Report without rate, keeping status '{}'", payload.status),
            );
        }
        let status = resolve_status(payload.status, payload.rate_cm_per_min);

        // A registry outage must not lose the reading: store it unassigned.
        let stations = self.registry.list_stations().unwrap_or_else(|err| {
            logging::log_store_failure(None, "Station lookup", &err);
            Vec::new()
        });

        let assignment = stations::assign(
            payload.latitude,
            payload.longitude,
            &stations,
            self.default_station,
        );
        match &assignment {
            Assignment::Nearest { station, distance_m } => logging::debug(
                Component::Locator,
                Some(&station.name),
                &format!("Nearest station at {:.0} m", distance_m),
            ),
            Assignment::Default(station) => logging::debug(
                Component::Locator,
                Some(&station.name),
                "No coordinates, using default station",
            ),
            Assignment::Unassigned => logging::warn(
                Component::Locator,
                None,
                "No station matched; storing reading unassigned",
            ),
        }

        let reading = Reading {
            timestamp: received_at,
            distance_cm: payload.distance_cm,
            temperature: payload.temperature,
            humidity: payload.humidity,
            rainfall_percent: payload.rainfall_percent,
            turbidity_voltage: payload.turbidity_voltage,
            latitude: payload.latitude,
            longitude: payload.longitude,
            rate_cm_per_min: payload.rate_cm_per_min,
            percent_change: payload.percent_change,
            status,
            flood_danger: payload.flood_danger,
            humidity_danger: payload.humidity_danger,
            station_id: assignment.station_id(),
        };

        let assigned_station = assignment.station().map(|s| s.name.clone());
        let id = self.store.insert(&reading).inspect_err(|err| {
            logging::log_store_failure(assigned_station.as_deref(), "Reading insert", err);
        })?;

        if reading.flood_danger {
            logging::warn(
                Component::Gateway,
                assigned_station.as_deref(),
                &format!("Flood danger reported (reading {})", id),
            );
        }

        Ok(IngestReceipt {
            id,
            assigned_station,
            reading,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::model::{Station, StationId, StoreError};
    use chrono::TimeZone;

    const DEFAULT: &str = "Sungai Keputih Tegal Timur";

    struct DownRegistry;

    impl StationRegistry for DownRegistry {
        fn list_stations(&self) -> Result<Vec<Station>, StoreError> {
            Err(StoreError::Connection("connection refused".to_string()))
        }
    }

    struct FailingStore;

    impl ReadingStore for FailingStore {
        fn insert(&self, _reading: &Reading) -> Result<ReadingId, StoreError> {
            Err(StoreError::Query("relation does not exist".to_string()))
        }

        fn recent(&self, _: StationId, _: DateTime<Utc>) -> Result<Vec<Reading>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn stations() -> Vec<Station> {
        vec![
            Station {
                id: StationId(1),
                name: DEFAULT.to_string(),
                latitude: Some(-7.2906),
                longitude: Some(112.7960),
            },
            Station {
                id: StationId(2),
                name: "Sungai Kalimas".to_string(),
                latitude: Some(-7.2459),
                longitude: Some(112.7378),
            },
        ]
    }

    fn payload(status: Status, rate: Option<f64>) -> SensorPayload {
        SensorPayload {
            status,
            flood_danger: false,
            humidity_danger: false,
            distance_cm: Some(100.0),
            temperature: None,
            humidity: None,
            rainfall_percent: None,
            turbidity_voltage: None,
            latitude: None,
            longitude: None,
            rate_cm_per_min: rate,
            percent_change: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_collecting_without_rate_is_stored_as_safe() {
        let status = resolve_status(Status::Collecting { filled: 2, capacity: 5 }, None);
        assert_eq!(status, Status::Safe);
    }

    #[test]
    fn test_collecting_with_rate_is_kept() {
        let collecting = Status::Collecting { filled: 2, capacity: 5 };
        assert_eq!(resolve_status(collecting.clone(), Some(0.5)), collecting);
    }

    #[test]
    fn test_other_status_without_rate_is_kept() {
        assert_eq!(resolve_status(Status::SensorError, None), Status::SensorError);
        assert_eq!(resolve_status(Status::CalcErrTime, None), Status::CalcErrTime);
    }

    #[test]
    fn test_reading_without_coordinates_goes_to_default_station() {
        let store = MemoryStore::new(stations());
        let adapter = IngestionAdapter::new(&store, &store, DEFAULT);
        let receipt = adapter.ingest(payload(Status::Safe, Some(0.0)), now()).unwrap();
        assert_eq!(receipt.id, ReadingId(1));
        assert_eq!(receipt.assigned_station.as_deref(), Some(DEFAULT));
        assert_eq!(receipt.reading.station_id, Some(StationId(1)));
        assert_eq!(receipt.reading.timestamp, now());
    }

    #[test]
    fn test_reading_with_coordinates_goes_to_nearest_station() {
        let store = MemoryStore::new(stations());
        let adapter = IngestionAdapter::new(&store, &store, DEFAULT);
        let mut p = payload(Status::Safe, Some(0.0));
        p.latitude = Some(-7.2460);
        p.longitude = Some(112.7380);
        let receipt = adapter.ingest(p, now()).unwrap();
        assert_eq!(receipt.reading.station_id, Some(StationId(2)));
        assert_eq!(receipt.to_response().assigned_station, "Sungai Kalimas");
    }

    #[test]
    fn test_unassigned_reading_is_still_stored() {
        let store = MemoryStore::new(Vec::new());
        let adapter = IngestionAdapter::new(&store, &store, DEFAULT);
        let receipt = adapter.ingest(payload(Status::Safe, Some(0.0)), now()).unwrap();
        assert_eq!(receipt.reading.station_id, None);
        assert_eq!(receipt.to_response().assigned_station, "N/A");
        assert_eq!(store.readings().unwrap().len(), 1);
    }

    #[test]
    fn test_registry_outage_stores_unassigned() {
        let store = MemoryStore::default();
        let adapter = IngestionAdapter::new(&DownRegistry, &store, DEFAULT);
        let receipt = adapter.ingest(payload(Status::Safe, Some(0.0)), now()).unwrap();
        assert_eq!(receipt.assigned_station, None);
    }

    #[test]
    fn test_store_failure_is_server_error() {
        let registry = MemoryStore::new(stations());
        let adapter = IngestionAdapter::new(&registry, &FailingStore, DEFAULT);
        let err = adapter.ingest(payload(Status::Safe, Some(0.0)), now()).unwrap_err();
        assert!(matches!(err, IngestError::Store(StoreError::Query(_))));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_response_shape() {
        let store = MemoryStore::new(stations());
        let adapter = IngestionAdapter::new(&store, &store, DEFAULT);
        let receipt = adapter
            .ingest(payload(Status::Collecting { filled: 1, capacity: 5 }, None), now())
            .unwrap();
        let json = serde_json::to_value(receipt.to_response()).unwrap();
        assert_eq!(json["message"], "Data received and saved");
        assert_eq!(json["id"], "1");
        assert_eq!(json["assigned_station"], DEFAULT);
        assert_eq!(receipt.reading.status, Status::Safe);
    }
}
