/// Structured logging for the river monitoring pipeline
///
/// Provides context-rich logging with component and station/node
/// identifiers, timestamps, and severity levels. Supports both console
/// output and file-based logging for the gateway daemon.

use chrono::Utc;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::str::FromStr;
use std::sync::Mutex;

use crate::model::StoreError;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// Which part of the pipeline a log line comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Node,
    Gateway,
    Locator,
    Database,
    Uplink,
    System,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Node => write!(f, "NODE"),
            Component::Gateway => write!(f, "GW"),
            Component::Locator => write!(f, "LOC"),
            Component::Database => write!(f, "DB"),
            Component::Uplink => write!(f, "UPLINK"),
            Component::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - e.g. a duplicate insert the caller can ignore
    Expected,
    /// Unexpected failure - indicates service degradation or configuration issue
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Global logger instance
static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

pub struct Logger {
    /// Minimum log level to display
    min_level: LogLevel,
    /// Optional file path for logging
    log_file: Option<String>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
}

impl Logger {
    /// Initialize the global logger. Calling it again replaces the settings.
    pub fn init(min_level: LogLevel, log_file: Option<String>, console_timestamps: bool) {
        let logger = Logger {
            min_level,
            log_file,
            console_timestamps,
        };

        if let Ok(mut slot) = LOGGER.lock() {
            *slot = Some(logger);
        }
    }

    fn log(&self, level: LogLevel, component: Component, site: Option<&str>, message: &str) {
        if level < self.min_level {
            return;
        }

        let log_entry = format_entry(level, component, site, message);
        let site_part = site.map(|s| format!(" [{}]", s)).unwrap_or_default();

        if self.console_timestamps {
            match level {
                LogLevel::Error | LogLevel::Warning => eprintln!("{}", log_entry),
                LogLevel::Info | LogLevel::Debug => println!("{}", log_entry),
            }
        } else {
            match level {
                LogLevel::Error => eprintln!("   ✗ {}{}: {}", component, site_part, message),
                LogLevel::Warning => eprintln!("   ⚠ {}{}: {}", component, site_part, message),
                LogLevel::Info => println!("   {}{}: {}", component, site_part, message),
                LogLevel::Debug => println!("   [DEBUG] {}{}: {}", component, site_part, message),
            }
        }

        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &log_entry) {
                eprintln!("Failed to write to log file {}: {}", path, e);
            }
        }
    }

    fn append_to_file(path: &str, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

/// One log line in the file format:
/// `2025-01-15 08:00:00 UTC WARN GW [Sungai Kalimas]: message`
pub fn format_entry(level: LogLevel, component: Component, site: Option<&str>, message: &str) -> String {
    let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
    let site_part = site.map(|s| format!(" [{}]", s)).unwrap_or_default();
    format!("{} {} {}{}: {}", timestamp, level, component, site_part, message)
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Initialize the global logger
pub fn init_logger(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) {
    Logger::init(min_level, log_file.map(String::from), console_timestamps);
}

fn dispatch(level: LogLevel, component: Component, site: Option<&str>, message: &str) {
    if let Ok(guard) = LOGGER.lock() {
        if let Some(logger) = guard.as_ref() {
            logger.log(level, component, site, message);
        }
    }
}

/// Log a general informational message
pub fn info(component: Component, site: Option<&str>, message: &str) {
    dispatch(LogLevel::Info, component, site, message);
}

/// Log a warning message
pub fn warn(component: Component, site: Option<&str>, message: &str) {
    dispatch(LogLevel::Warning, component, site, message);
}

/// Log an error message
pub fn error(component: Component, site: Option<&str>, message: &str) {
    dispatch(LogLevel::Error, component, site, message);
}

/// Log a debug message
pub fn debug(component: Component, site: Option<&str>, message: &str) {
    dispatch(LogLevel::Debug, component, site, message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a store failure by how worried the operator should be.
pub fn classify_store_failure(err: &StoreError) -> FailureType {
    match err {
        StoreError::Connection(_) => FailureType::Unexpected,
        StoreError::Corrupt(_) => FailureType::Unexpected,
        // Postgres reports unique violations as "duplicate key value"
        StoreError::Query(msg) if msg.contains("duplicate key") => FailureType::Expected,
        StoreError::Query(_) => FailureType::Unknown,
    }
}

/// Log a store failure with automatic classification
pub fn log_store_failure(site: Option<&str>, operation: &str, err: &StoreError) {
    let failure_type = classify_store_failure(err);
    let message = format!("{} failed [{}]: {}", operation, failure_type, err);

    match failure_type {
        FailureType::Expected => debug(Component::Database, site, &message),
        FailureType::Unexpected => error(Component::Database, site, &message),
        FailureType::Unknown => warn(Component::Database, site, &message),
    }
}

// ---------------------------------------------------------------------------
// Uplink Summary Logging
// ---------------------------------------------------------------------------

/// One-line outcome of a delivery, with the final error when it was dropped.
pub fn delivery_summary_message(attempts: u32, delivered: bool, last_error: Option<&str>) -> String {
    match (delivered, last_error) {
        (true, _) => format!("Report delivered after {} attempt(s)", attempts),
        (false, Some(reason)) => format!("Report dropped after {} attempt(s): {}", attempts, reason),
        (false, None) => format!("Report dropped after {} attempt(s)", attempts),
    }
}

/// Log how an uplink delivery went after retries.
pub fn log_delivery_summary(node_id: &str, attempts: u32, delivered: bool, last_error: Option<&str>) {
    let message = delivery_summary_message(attempts, delivered, last_error);

    if !delivered {
        error(Component::Uplink, Some(node_id), &message);
    } else if attempts > 1 {
        warn(Component::Uplink, Some(node_id), &message);
    } else {
        debug(Component::Uplink, Some(node_id), &message);
    }
}
