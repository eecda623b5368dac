/// Reading persistence and the PostgreSQL-backed station registry.
///
/// Two backends implement [`StationRegistry`], [`ReadingStore`] and
/// [`ReportStore`]:
///
/// - [`PgStore`] talks to PostgreSQL through the blocking `postgres` client.
///   The client is not `Sync`, so it sits behind a mutex; async callers
///   must reach it through `tokio::task::spawn_blocking`.
/// - [`MemoryStore`] keeps everything in process. The gateway uses it when
///   no `DATABASE_URL` is configured, and the tests use it everywhere.
///
/// Schema: `sql/001_rivermon.sql`.

use chrono::{DateTime, Utc};
use postgres::types::ToSql;
use postgres::{Client, NoTls, Row};
use std::sync::Mutex;

use crate::model::{Reading, ReadingId, ReportId, Station, StationId, Status, StoreError};
use crate::reports::{CitizenReport, RiverCondition, RubbishLevel};
use crate::stations::StationRegistry;

/// Schema bootstrap applied by [`PgStore::ensure_schema`].
pub const SCHEMA_SQL: &str = include_str!("../sql/001_rivermon.sql");

/// Append-only store of ingested readings.
pub trait ReadingStore {
    /// Persists `reading` and returns its new id.
    fn insert(&self, reading: &Reading) -> Result<ReadingId, StoreError>;

    /// Readings for `station` stamped at or after `since`, newest first.
    fn recent(&self, station: StationId, since: DateTime<Utc>) -> Result<Vec<Reading>, StoreError>;
}

/// Append-only store of accepted citizen reports.
pub trait ReportStore {
    fn insert_report(&self, report: &CitizenReport) -> Result<ReportId, StoreError>;

    /// Reports for `station` submitted at or after `since`, newest first.
    fn recent_reports(
        &self,
        station: StationId,
        since: DateTime<Utc>,
    ) -> Result<Vec<CitizenReport>, StoreError>;
}

// ---------------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------------

pub struct PgStore {
    client: Mutex<Client>,
}

const READING_COLUMNS: &str = "recorded_at, distance_cm, temperature, humidity, rainfall_percent, \
     turbidity_voltage, latitude, longitude, rate_cm_per_min, percent_change, \
     status, flood_danger, humidity_danger, station_id";

const REPORT_COLUMNS: &str = "submitted_at, station_id, reporter_name, reporter_address, phone, \
     latitude, longitude, distance_km, conditions, rubbish_level, description, verified";

impl PgStore {
    /// Opens a connection. Blocking.
    pub fn connect(database_url: &str) -> Result<Self, StoreError> {
        let client = Client::connect(database_url, NoTls)
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self {
            client: Mutex::new(client),
        })
    }

    fn with_client<T>(
        &self,
        f: impl FnOnce(&mut Client) -> Result<T, postgres::Error>,
    ) -> Result<T, StoreError> {
        let mut client = self
            .client
            .lock()
            .map_err(|_| StoreError::Connection("database client lock poisoned".to_string()))?;
        f(&mut *client).map_err(|e| {
            if e.is_closed() {
                StoreError::Connection(e.to_string())
            } else {
                StoreError::Query(e.to_string())
            }
        })
    }

    /// Creates the schema if it does not exist yet.
    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        self.with_client(|client| client.batch_execute(SCHEMA_SQL))
    }

    /// Inserts or updates registry rows, keyed on station id.
    pub fn upsert_stations(&self, stations: &[Station]) -> Result<u64, StoreError> {
        self.with_client(|client| {
            let mut written = 0;
            for station in stations {
                written += client.execute(
                    "INSERT INTO rivermon.stations (id, name, latitude, longitude)
                     VALUES ($1, $2, $3, $4)
                     ON CONFLICT (id) DO UPDATE
                       SET name = EXCLUDED.name,
                           latitude = EXCLUDED.latitude,
                           longitude = EXCLUDED.longitude",
                    &[&station.id.0, &station.name, &station.latitude, &station.longitude],
                )?;
            }
            Ok(written)
        })
    }
}

fn reading_from_row(row: &Row) -> Result<Reading, StoreError> {
    let corrupt = |e: postgres::Error| StoreError::Corrupt(e.to_string());
    let status: String = row.try_get(10).map_err(corrupt)?;
    let station_id: Option<i64> = row.try_get(13).map_err(corrupt)?;
    Ok(Reading {
        timestamp: row.try_get(0).map_err(corrupt)?,
        distance_cm: row.try_get(1).map_err(corrupt)?,
        temperature: row.try_get(2).map_err(corrupt)?,
        humidity: row.try_get(3).map_err(corrupt)?,
        rainfall_percent: row.try_get(4).map_err(corrupt)?,
        turbidity_voltage: row.try_get(5).map_err(corrupt)?,
        latitude: row.try_get(6).map_err(corrupt)?,
        longitude: row.try_get(7).map_err(corrupt)?,
        rate_cm_per_min: row.try_get(8).map_err(corrupt)?,
        percent_change: row.try_get(9).map_err(corrupt)?,
        status: Status::from_label(&status),
        flood_danger: row.try_get(11).map_err(corrupt)?,
        humidity_danger: row.try_get(12).map_err(corrupt)?,
        station_id: station_id.map(StationId),
    })
}

fn report_from_row(row: &Row) -> Result<CitizenReport, StoreError> {
    let corrupt = |e: postgres::Error| StoreError::Corrupt(e.to_string());
    let labels: Vec<String> = row.try_get(8).map_err(corrupt)?;
    let conditions = labels
        .iter()
        .map(|label| {
            RiverCondition::from_label(label)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown river condition '{}'", label)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let level: String = row.try_get(9).map_err(corrupt)?;
    let rubbish_level = RubbishLevel::from_label(&level)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown rubbish level '{}'", level)))?;

    Ok(CitizenReport {
        submitted_at: row.try_get(0).map_err(corrupt)?,
        station_id: StationId(row.try_get(1).map_err(corrupt)?),
        reporter_name: row.try_get(2).map_err(corrupt)?,
        reporter_address: row.try_get(3).map_err(corrupt)?,
        phone: row.try_get(4).map_err(corrupt)?,
        latitude: row.try_get(5).map_err(corrupt)?,
        longitude: row.try_get(6).map_err(corrupt)?,
        distance_km: row.try_get(7).map_err(corrupt)?,
        conditions,
        rubbish_level,
        description: row.try_get(10).map_err(corrupt)?,
        verified: row.try_get(11).map_err(corrupt)?,
    })
}

impl StationRegistry for PgStore {
    fn list_stations(&self) -> Result<Vec<Station>, StoreError> {
        let rows = self.with_client(|client| {
            client.query(
                "SELECT id, name, latitude, longitude FROM rivermon.stations ORDER BY id",
                &[],
            )
        })?;

        rows.iter()
            .map(|row| {
                let corrupt = |e: postgres::Error| StoreError::Corrupt(e.to_string());
                Ok(Station {
                    id: StationId(row.try_get(0).map_err(corrupt)?),
                    name: row.try_get(1).map_err(corrupt)?,
                    latitude: row.try_get(2).map_err(corrupt)?,
                    longitude: row.try_get(3).map_err(corrupt)?,
                })
            })
            .collect()
    }
}

impl ReadingStore for PgStore {
    fn insert(&self, reading: &Reading) -> Result<ReadingId, StoreError> {
        let status = reading.status.to_string();
        let station_id = reading.station_id.map(|s| s.0);
        let params: [&(dyn ToSql + Sync); 14] = [
            &reading.timestamp,
            &reading.distance_cm,
            &reading.temperature,
            &reading.humidity,
            &reading.rainfall_percent,
            &reading.turbidity_voltage,
            &reading.latitude,
            &reading.longitude,
            &reading.rate_cm_per_min,
            &reading.percent_change,
            &status,
            &reading.flood_danger,
            &reading.humidity_danger,
            &station_id,
        ];
        let query = format!(
            "INSERT INTO rivermon.readings ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING id",
            READING_COLUMNS
        );

        let row = self.with_client(|client| client.query_one(query.as_str(), &params))?;
        let id: i64 = row
            .try_get(0)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(ReadingId(id))
    }

    fn recent(&self, station: StationId, since: DateTime<Utc>) -> Result<Vec<Reading>, StoreError> {
        let query = format!(
            "SELECT {} FROM rivermon.readings \
             WHERE station_id = $1 AND recorded_at >= $2 \
             ORDER BY recorded_at DESC",
            READING_COLUMNS
        );
        let rows = self.with_client(|client| client.query(query.as_str(), &[&station.0, &since]))?;
        rows.iter().map(reading_from_row).collect()
    }
}

impl ReportStore for PgStore {
    fn insert_report(&self, report: &CitizenReport) -> Result<ReportId, StoreError> {
        let conditions: Vec<&str> = report.conditions.iter().map(|c| c.label()).collect();
        let rubbish_level = report.rubbish_level.label();
        let query = format!(
            "INSERT INTO rivermon.reports ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING id",
            REPORT_COLUMNS
        );

        let row = self.with_client(|client| {
            client.query_one(
                query.as_str(),
                &[
                    &report.submitted_at,
                    &report.station_id.0,
                    &report.reporter_name,
                    &report.reporter_address,
                    &report.phone,
                    &report.latitude,
                    &report.longitude,
                    &report.distance_km,
                    &conditions,
                    &rubbish_level,
                    &report.description,
                    &report.verified,
                ],
            )
        })?;
        let id: i64 = row
            .try_get(0)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(ReportId(id))
    }

    fn recent_reports(
        &self,
        station: StationId,
        since: DateTime<Utc>,
    ) -> Result<Vec<CitizenReport>, StoreError> {
        let query = format!(
            "SELECT {} FROM rivermon.reports \
             WHERE station_id = $1 AND submitted_at >= $2 \
             ORDER BY submitted_at DESC",
            REPORT_COLUMNS
        );
        let rows = self.with_client(|client| client.query(query.as_str(), &[&station.0, &since]))?;
        rows.iter().map(report_from_row).collect()
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Process-local registry and store. Ids are assigned from 1 upward.
#[derive(Debug, Default)]
pub struct MemoryStore {
    stations: Vec<Station>,
    readings: Mutex<Vec<(ReadingId, Reading)>>,
    reports: Mutex<Vec<(ReportId, CitizenReport)>>,
}

impl MemoryStore {
    pub fn new(stations: Vec<Station>) -> Self {
        Self {
            stations,
            readings: Mutex::new(Vec::new()),
            reports: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<(ReadingId, Reading)>>, StoreError> {
        self.readings
            .lock()
            .map_err(|_| StoreError::Connection("memory store lock poisoned".to_string()))
    }

    fn lock_reports(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, Vec<(ReportId, CitizenReport)>>, StoreError> {
        self.reports
            .lock()
            .map_err(|_| StoreError::Connection("memory store lock poisoned".to_string()))
    }

    /// Every stored reading in insertion order.
    pub fn readings(&self) -> Result<Vec<(ReadingId, Reading)>, StoreError> {
        Ok(self.lock()?.clone())
    }

    /// Every stored report in insertion order.
    pub fn reports(&self) -> Result<Vec<(ReportId, CitizenReport)>, StoreError> {
        Ok(self.lock_reports()?.clone())
    }
}

impl StationRegistry for MemoryStore {
    fn list_stations(&self) -> Result<Vec<Station>, StoreError> {
        Ok(self.stations.clone())
    }
}

impl ReadingStore for MemoryStore {
    fn insert(&self, reading: &Reading) -> Result<ReadingId, StoreError> {
        let mut readings = self.lock()?;
        let id = ReadingId(readings.len() as i64 + 1);
        readings.push((id, reading.clone()));
        Ok(id)
    }

    fn recent(&self, station: StationId, since: DateTime<Utc>) -> Result<Vec<Reading>, StoreError> {
        let mut found: Vec<Reading> = self
            .lock()?
            .iter()
            .filter(|(_, r)| r.station_id == Some(station) && r.timestamp >= since)
            .map(|(_, r)| r.clone())
            .collect();
        found.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(found)
    }
}

impl ReportStore for MemoryStore {
    fn insert_report(&self, report: &CitizenReport) -> Result<ReportId, StoreError> {
        let mut reports = self.lock_reports()?;
        let id = ReportId(reports.len() as i64 + 1);
        reports.push((id, report.clone()));
        Ok(id)
    }

    fn recent_reports(
        &self,
        station: StationId,
        since: DateTime<Utc>,
    ) -> Result<Vec<CitizenReport>, StoreError> {
        let mut found: Vec<CitizenReport> = self
            .lock_reports()?
            .iter()
            .filter(|(_, r)| r.station_id == station && r.submitted_at >= since)
            .map(|(_, r)| r.clone())
            .collect();
        found.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(found)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
