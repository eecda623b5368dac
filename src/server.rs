/// Gateway HTTP endpoint.
///
/// Routes:
/// - `GET /`: liveness text
/// - `POST /sensor`: ingest one node report
/// - `GET /stations`: the station registry
/// - `POST /report`: validate and store one citizen report
/// - `GET /summary?days=N`: per-station digest of the last N days
///
/// Registry and store calls are blocking (the PostgreSQL client is
/// synchronous), so every handler that touches the backend hops onto the
/// blocking pool with `spawn_blocking`.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::alert::stalenesses::DEFAULT_MAX_AGE_MINUTES;
use crate::analysis::summary::{lookback_start, summarize_all, StationSummary, DEFAULT_LOOKBACK_DAYS};
use crate::db::{ReadingStore, ReportStore};
use crate::ingest::adapter::{IngestResponse, IngestionAdapter};
use crate::ingest::payload::SensorPayload;
use crate::ingest::IngestError;
use crate::logging::{self, Component};
use crate::model::{Station, StoreError};
use crate::reports::{self, ReportError, ReportRequest};
use crate::stations::StationRegistry;

/// Anything that can serve as the gateway's registry and stores at once.
pub trait Backend: StationRegistry + ReadingStore + ReportStore + Send + Sync {}

impl<T: StationRegistry + ReadingStore + ReportStore + Send + Sync> Backend for T {}

#[derive(Clone)]
pub struct GatewayState {
    pub backend: Arc<dyn Backend>,
    pub default_station: Arc<str>,
}

impl GatewayState {
    pub fn new(backend: Arc<dyn Backend>, default_station: &str) -> Self {
        Self {
            backend,
            default_station: Arc::from(default_station),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self::new(status, err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        logging::log_store_failure(None, "Gateway query", &err);
        Self::internal(format!("Database error: {}", err))
    }
}

impl From<Vec<ReportError>> for AppError {
    fn from(errors: Vec<ReportError>) -> Self {
        let problems: Vec<String> = errors.iter().map(ToString::to_string).collect();
        Self::new(
            StatusCode::BAD_REQUEST,
            format!("Invalid report: {}", problems.join("; ")),
        )
    }
}

pub type AppResult<T> = Result<T, AppError>;

async fn blocking<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::internal(format!("Worker task failed: {}", e)))?
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn index() -> &'static str {
    "River monitoring gateway is running."
}

async fn receive_sensor_data(
    State(state): State<GatewayState>,
    body: Bytes,
) -> AppResult<Json<IngestResponse>> {
    let payload = SensorPayload::from_slice(&body).inspect_err(|err| {
        logging::warn(Component::Gateway, None, &format!("Rejected report: {}", err));
    })?;

    let receipt = blocking(move || {
        let backend = state.backend.as_ref();
        let adapter = IngestionAdapter::new(backend, backend, &state.default_station);
        Ok(adapter.ingest(payload, Utc::now())?)
    })
    .await?;

    logging::info(
        Component::Gateway,
        receipt.assigned_station.as_deref(),
        &format!("Stored reading {} ({})", receipt.id, receipt.reading.status),
    );
    Ok(Json(receipt.to_response()))
}

async fn list_stations(State(state): State<GatewayState>) -> AppResult<Json<Vec<Station>>> {
    let stations = blocking(move || Ok(state.backend.list_stations()?)).await?;
    Ok(Json(stations))
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub message: String,
    pub id: String,
    pub station: String,
    pub distance_km: f64,
}

async fn receive_report(
    State(state): State<GatewayState>,
    body: Bytes,
) -> AppResult<Json<ReportResponse>> {
    let request: ReportRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::new(StatusCode::BAD_REQUEST, format!("Invalid report: {}", e)))?;
    let draft = request.into_draft().map_err(|e| AppError::from(vec![e]))?;

    let response = blocking(move || {
        let stations = state.backend.list_stations()?;
        let report = reports::validate(&draft, &stations, Utc::now())?;
        let id = state.backend.insert_report(&report)?;
        let station = stations
            .iter()
            .find(|s| s.id == report.station_id)
            .map(|s| s.name.clone())
            .unwrap_or_default();
        Ok(ReportResponse {
            message: "Report received".to_string(),
            id: id.to_string(),
            station,
            distance_km: report.distance_km,
        })
    })
    .await
    .inspect_err(|err| {
        if err.status == StatusCode::BAD_REQUEST {
            logging::warn(Component::Gateway, None, &format!("Rejected report: {}", err.message));
        }
    })?;

    logging::info(
        Component::Gateway,
        Some(&response.station),
        &format!("Stored citizen report {} ({:.2} km away)", response.id, response.distance_km),
    );
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct SummaryParams {
    days: Option<i64>,
}

async fn station_summaries(
    State(state): State<GatewayState>,
    Query(params): Query<SummaryParams>,
) -> AppResult<Json<Vec<StationSummary>>> {
    let days = params.days.unwrap_or(DEFAULT_LOOKBACK_DAYS);
    let now = Utc::now();
    let since = lookback_start(now, days).ok_or_else(|| {
        AppError::new(
            StatusCode::BAD_REQUEST,
            format!("days must be at least 1 and within the calendar, got {}", days),
        )
    })?;
    let summaries = blocking(move || {
        let backend = state.backend.as_ref();
        Ok(summarize_all(backend, backend, since, DEFAULT_MAX_AGE_MINUTES, now)?)
    })
    .await?;
    Ok(Json(summaries))
}

// ---------------------------------------------------------------------------
// Router and serve loop
// ---------------------------------------------------------------------------

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/sensor", post(receive_sensor_data))
        .route("/report", post(receive_report))
        .route("/stations", get(list_stations))
        .route("/summary", get(station_summaries))
        .with_state(state)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        logging::info(Component::System, None, "Shutdown requested");
    }
}

/// Binds `bind` and serves until Ctrl-C.
pub async fn serve(bind: &str, state: GatewayState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    logging::info(
        Component::Gateway,
        None,
        &format!("Listening on {}", listener.local_addr()?),
    );
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}
