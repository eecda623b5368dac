/// Configuration for the gateway daemon and sensor nodes.
///
/// Settings come from a TOML file (`rivermon.toml` by default) and can be
/// overridden from the environment, which is itself seeded from `.env`:
///
/// | variable              | overrides                    |
/// |-----------------------|------------------------------|
/// | `DATABASE_URL`        | `gateway.database_url`       |
/// | `RIVERMON_BIND`       | `gateway.bind`               |
/// | `RIVERMON_LOG_LEVEL`  | `logging.level`              |
/// | `RIVERMON_LOG_FILE`   | `logging.file`               |
/// | `RIVERMON_GATEWAY_URL`| `node.gateway_url`           |
///
/// Every section and every key is optional; missing values fall back to
/// the defaults below.

use serde::Deserialize;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::logging::LogLevel;
use crate::model::DEFAULT_WINDOW_CAPACITY;
use crate::node::backoff::ReconnectPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "./rivermon.toml";
pub const DEFAULT_BIND: &str = "0.0.0.0:5001";
pub const DEFAULT_STATION_NAME: &str = "Sungai Keputih Tegal Timur";
pub const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:5001/sensor";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// The file could not be read.
    Io(String),
    /// The file is not valid TOML or has the wrong shape.
    Parse(String),
    /// A value parsed but makes no sense (e.g. an unknown log level).
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "Config read error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Config parse error: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "Invalid config value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address the HTTP endpoint listens on.
    pub bind: String,
    /// PostgreSQL connection string. When unset the gateway runs against an
    /// in-memory store seeded from `stations_file`.
    pub database_url: Option<String>,
    /// Station name used for readings that arrive without coordinates.
    pub default_station: String,
    /// TOML station list for the in-memory store.
    pub stations_file: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            database_url: None,
            default_station: DEFAULT_STATION_NAME.to_string(),
            stations_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct NodeConfig {
    /// Identifier used in logs and the uplink.
    pub node_id: String,
    /// Number of samples in the rate window.
    pub window_capacity: usize,
    /// Where node reports are posted.
    pub gateway_url: String,
    /// Per-request timeout for the uplink, in seconds.
    pub request_timeout_secs: u64,
    /// First retry delay, in milliseconds.
    pub backoff_initial_ms: u64,
    /// Retry delay ceiling, in milliseconds.
    pub backoff_max_ms: u64,
    /// Delivery attempts per report, including the first.
    pub backoff_max_attempts: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "node-001".to_string(),
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            request_timeout_secs: 10,
            backoff_initial_ms: 1_000,
            backoff_max_ms: 60_000,
            backoff_max_attempts: 5,
        }
    }
}

impl NodeConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            Duration::from_millis(self.backoff_initial_ms),
            Duration::from_millis(self.backoff_max_ms),
            self.backoff_max_attempts,
        )
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            timestamps: true,
        }
    }
}

impl LoggingConfig {
    pub fn min_level(&self) -> Result<LogLevel, ConfigError> {
        self.level.parse().map_err(ConfigError::Invalid)
    }
}

/// Whole configuration file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub node: NodeConfig,
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Parses configuration text without consulting the environment.
    pub fn parse(text: &str) -> Result<Config, ConfigError> {
        let config: Config = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `.env`, reads `path` if it exists, then applies environment
    /// overrides. A missing file is not an error: defaults apply.
    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        dotenv::dotenv().ok();

        let path = path.as_ref();
        let mut config = if path.exists() {
            let text = fs::read_to_string(path)
                .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
            Config::parse(&text)?
        } else {
            Config::default()
        };

        config.apply_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Applies environment-style overrides from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("DATABASE_URL") {
            self.gateway.database_url = Some(url);
        }
        if let Some(bind) = lookup("RIVERMON_BIND") {
            self.gateway.bind = bind;
        }
        if let Some(level) = lookup("RIVERMON_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(file) = lookup("RIVERMON_LOG_FILE") {
            self.logging.file = Some(file);
        }
        if let Some(url) = lookup("RIVERMON_GATEWAY_URL") {
            self.node.gateway_url = url;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.logging.min_level()?;
        if self.node.window_capacity < 2 {
            return Err(ConfigError::Invalid(format!(
                "node.window_capacity must be at least 2, got {}",
                self.node.window_capacity
            )));
        }
        if self.node.backoff_max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "node.backoff_max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
