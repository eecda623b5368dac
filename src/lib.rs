/// River flood early-warning service.
///
/// Sensor nodes sample the distance from a fixed mount down to the water
/// surface, estimate how fast the level is changing over a short sliding
/// window and classify the result into a flood / no-flood status whose
/// threshold adapts to rainfall. The gateway receives node reports over
/// HTTP, assigns each to the nearest monitoring station and persists it.
///
/// - `model`: shared domain types
/// - `analysis`: sample window, rate estimator, station summaries
/// - `alert`: status classification and staleness
/// - `stations`: registry access and nearest-station assignment
/// - `ingest`: report parsing and the ingestion pipeline
/// - `db`: PostgreSQL and in-memory persistence
/// - `server`: axum HTTP endpoint
/// - `node`: acquisition loop, peripherals, uplink
/// - `reports`: citizen report validation
/// - `config`, `logging`: ambient plumbing

pub mod alert;
pub mod analysis;
pub mod config;
pub mod db;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod node;
pub mod reports;
pub mod server;
pub mod stations;
