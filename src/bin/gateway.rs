/// River monitoring gateway daemon.
///
/// Usage: `rivermon_gateway [config.toml]`
///
/// With `DATABASE_URL` (or `gateway.database_url`) set, readings go to
/// PostgreSQL and the schema is created on start-up. Without it the gateway
/// runs against an in-memory store seeded from `gateway.stations_file`,
/// which is enough for bench testing a node.

use std::env;
use std::error::Error;
use std::sync::Arc;

use rivermon_service::config::{Config, GatewayConfig, DEFAULT_CONFIG_PATH};
use rivermon_service::db::{MemoryStore, PgStore};
use rivermon_service::logging::{self, init_logger, Component};
use rivermon_service::model::Station;
use rivermon_service::server::{serve, Backend, GatewayState};
use rivermon_service::stations::load_stations;

type BoxError = Box<dyn Error + Send + Sync>;

fn seed_stations(gateway: &GatewayConfig) -> Result<Vec<Station>, BoxError> {
    match &gateway.stations_file {
        Some(path) => Ok(load_stations(path)?),
        None => Ok(Vec::new()),
    }
}

async fn open_backend(gateway: &GatewayConfig) -> Result<Arc<dyn Backend>, BoxError> {
    let stations = seed_stations(gateway)?;

    let Some(url) = gateway.database_url.clone() else {
        logging::warn(
            Component::System,
            None,
            &format!("No DATABASE_URL; using in-memory store with {} station(s)", stations.len()),
        );
        return Ok(Arc::new(MemoryStore::new(stations)));
    };

    let store = tokio::task::spawn_blocking(move || -> Result<PgStore, BoxError> {
        let store = PgStore::connect(&url)?;
        store.ensure_schema()?;
        if !stations.is_empty() {
            let written = store.upsert_stations(&stations)?;
            logging::info(Component::Database, None, &format!("Seeded {} station(s)", written));
        }
        Ok(store)
    })
    .await??;

    logging::info(Component::Database, None, "Connected to PostgreSQL");
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let path = env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&path)?;
    init_logger(
        config.logging.min_level()?,
        config.logging.file.as_deref(),
        config.logging.timestamps,
    );
    logging::info(Component::System, None, &format!("Configuration loaded from {}", path));

    let backend = open_backend(&config.gateway).await?;
    let state = GatewayState::new(Arc::clone(&backend), &config.gateway.default_station);
    let result = serve(&config.gateway.bind, state).await;

    // The blocking postgres client owns its own runtime and must not be
    // dropped on an async worker thread.
    tokio::task::spawn_blocking(move || drop(backend)).await?;

    result?;
    logging::info(Component::System, None, "Gateway stopped");
    Ok(())
}
