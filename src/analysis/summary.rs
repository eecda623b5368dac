//! Per-station digest of recent readings and citizen reports.
//!
//! Built on demand from whatever the stores return for the look-back
//! window. Averages skip readings where the value is absent; a station with
//! no readings or reports in the window still gets a summary, with every
//! figure empty.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::alert::stalenesses::is_stale_at;
use crate::db::{ReadingStore, ReportStore};
use crate::model::{Reading, Station, StationId, Status, StoreError};
use crate::reports::{CitizenReport, RiverCondition, RubbishLevel};
use crate::stations::StationRegistry;

pub const DEFAULT_LOOKBACK_DAYS: i64 = 7;

/// Rainfall (%) above which a reading counts towards a rainy period.
pub const RAINY_PERIOD_PERCENT: f64 = 50.0;

/// How many of the most reported conditions / rubbish levels to list.
pub const TOP_CONDITIONS: usize = 3;
pub const TOP_RUBBISH_LEVELS: usize = 2;

/// Start of a look-back window of `days` ending at `now`. `None` when
/// `days` is below one or reaches past the representable calendar.
pub fn lookback_start(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    if days < 1 {
        return None;
    }
    Duration::try_days(days).and_then(|span| now.checked_sub_signed(span))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestReading {
    pub timestamp: DateTime<Utc>,
    pub status: Status,
    pub rate_cm_per_min: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub stale: bool,
}

/// A value and how often it was reported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Tally<T> {
    pub value: T,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestReport {
    pub submitted_at: DateTime<Utc>,
    pub conditions: Vec<RiverCondition>,
    pub rubbish_level: RubbishLevel,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ReportDigest {
    pub report_count: usize,
    pub latest: Option<LatestReport>,
    pub top_conditions: Vec<Tally<RiverCondition>>,
    pub top_rubbish_levels: Vec<Tally<RubbishLevel>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationSummary {
    pub station_id: StationId,
    pub station_name: String,
    pub reading_count: usize,
    pub latest: Option<LatestReading>,
    pub avg_rate_cm_per_min: Option<f64>,
    pub max_rate_cm_per_min: Option<f64>,
    pub min_rate_cm_per_min: Option<f64>,
    pub avg_temperature: Option<f64>,
    pub avg_humidity: Option<f64>,
    pub flood_danger_count: usize,
    pub rainy_period: bool,
    pub reports: ReportDigest,
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// The `n` most frequent values, most frequent first. Ties keep the order in
/// which values were first seen.
fn most_common<T: Copy + PartialEq>(values: impl Iterator<Item = T>, n: usize) -> Vec<Tally<T>> {
    let mut tallies: Vec<Tally<T>> = Vec::new();
    for value in values {
        match tallies.iter_mut().find(|t| t.value == value) {
            Some(tally) => tally.count += 1,
            None => tallies.push(Tally { value, count: 1 }),
        }
    }
    tallies.sort_by(|a, b| b.count.cmp(&a.count));
    tallies.truncate(n);
    tallies
}

/// Digest of `reports` (any order).
pub fn digest_reports(reports: &[CitizenReport]) -> ReportDigest {
    let mut newest_first: Vec<&CitizenReport> = reports.iter().collect();
    newest_first.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));

    ReportDigest {
        report_count: reports.len(),
        latest: newest_first.first().map(|r| LatestReport {
            submitted_at: r.submitted_at,
            conditions: r.conditions.clone(),
            rubbish_level: r.rubbish_level,
            description: r.description.clone(),
        }),
        top_conditions: most_common(
            newest_first.iter().flat_map(|r| r.conditions.iter().copied()),
            TOP_CONDITIONS,
        ),
        top_rubbish_levels: most_common(
            newest_first.iter().map(|r| r.rubbish_level),
            TOP_RUBBISH_LEVELS,
        ),
    }
}

/// Summarises `readings` and `reports` (any order) for `station`.
pub fn summarize(
    station: &Station,
    readings: &[Reading],
    reports: &[CitizenReport],
    max_age_minutes: i64,
    now: DateTime<Utc>,
) -> StationSummary {
    let rates = || readings.iter().filter_map(|r| r.rate_cm_per_min);

    let latest = readings.iter().max_by_key(|r| r.timestamp).map(|r| LatestReading {
        timestamp: r.timestamp,
        status: r.status.clone(),
        rate_cm_per_min: r.rate_cm_per_min,
        temperature: r.temperature,
        humidity: r.humidity,
        stale: is_stale_at(r, max_age_minutes, now),
    });

    StationSummary {
        station_id: station.id,
        station_name: station.name.clone(),
        reading_count: readings.len(),
        latest,
        avg_rate_cm_per_min: mean(rates()),
        max_rate_cm_per_min: rates().reduce(f64::max),
        min_rate_cm_per_min: rates().reduce(f64::min),
        avg_temperature: mean(readings.iter().filter_map(|r| r.temperature)),
        avg_humidity: mean(readings.iter().filter_map(|r| r.humidity)),
        flood_danger_count: readings.iter().filter(|r| r.flood_danger).count(),
        rainy_period: readings
            .iter()
            .any(|r| r.rainfall_percent.is_some_and(|p| p > RAINY_PERIOD_PERCENT)),
        reports: digest_reports(reports),
    }
}

/// Summaries for every registered station covering `since..=now`. Use
/// [`lookback_start`] to turn a day count into `since`.
pub fn summarize_all<R, S>(
    registry: &R,
    store: &S,
    since: DateTime<Utc>,
    max_age_minutes: i64,
    now: DateTime<Utc>,
) -> Result<Vec<StationSummary>, StoreError>
where
    R: StationRegistry + ?Sized,
    S: ReadingStore + ReportStore + ?Sized,
{
    registry
        .list_stations()?
        .iter()
        .map(|station| {
            let readings = store.recent(station.id, since)?;
            let reports = store.recent_reports(station.id, since)?;
            Ok(summarize(station, &readings, &reports, max_age_minutes, now))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
