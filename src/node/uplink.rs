//! Node → gateway delivery.
//!
//! Reports go out as JSON over HTTP POST with the blocking `reqwest`
//! client. A failed delivery is retried under a [`ReconnectPolicy`]; when
//! the policy is exhausted the report is dropped and the loop moves on.

use std::fmt;
use std::time::Duration;

use crate::logging::{self, Component};

use super::backoff::ReconnectPolicy;
use super::NodeReport;

#[derive(Debug, PartialEq)]
pub enum UplinkError {
    /// The HTTP client could not be built.
    Client(String),
    /// No response: connection refused, DNS failure, timeout.
    Transport(String),
    /// The gateway answered with a non-success status.
    Rejected { status: u16, body: String },
}

impl UplinkError {
    /// Transport failures and 5xx answers may succeed later; a 4xx means the
    /// report itself is wrong and resending it cannot help.
    pub fn is_retryable(&self) -> bool {
        match self {
            UplinkError::Client(_) => false,
            UplinkError::Transport(_) => true,
            UplinkError::Rejected { status, .. } => *status >= 500,
        }
    }
}

impl fmt::Display for UplinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UplinkError::Client(msg) => write!(f, "HTTP client error: {}", msg),
            UplinkError::Transport(msg) => write!(f, "Network error: {}", msg),
            UplinkError::Rejected { status, body } => {
                write!(f, "Gateway rejected report (HTTP {}): {}", status, body)
            }
        }
    }
}

impl std::error::Error for UplinkError {}

/// Anything that can carry a report to the gateway.
pub trait Uplink {
    fn send(&mut self, report: &NodeReport) -> Result<(), UplinkError>;
}

pub struct HttpUplink {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpUplink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, UplinkError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UplinkError::Client(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Uplink for HttpUplink {
    fn send(&mut self, report: &NodeReport) -> Result<(), UplinkError> {
        let response = self
            .client
            .post(&self.url)
            .json(report)
            .send()
            .map_err(|e| UplinkError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().unwrap_or_default();
        Err(UplinkError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// How one delivery went.
#[derive(Debug, PartialEq)]
pub struct Delivery {
    pub attempts: u32,
    pub delivered: bool,
    pub last_error: Option<UplinkError>,
}

/// Sends `report`, retrying retryable failures with the policy's delays.
pub fn deliver_with_retry<U: Uplink + ?Sized>(
    uplink: &mut U,
    report: &NodeReport,
    policy: &ReconnectPolicy,
    sleep: &mut dyn FnMut(Duration),
) -> Delivery {
    let mut attempts = 0;
    loop {
        attempts += 1;
        let err = match uplink.send(report) {
            Ok(()) => {
                return Delivery {
                    attempts,
                    delivered: true,
                    last_error: None,
                };
            }
            Err(err) => err,
        };

        if !err.is_retryable() || attempts >= policy.max_attempts() {
            return Delivery {
                attempts,
                delivered: false,
                last_error: Some(err),
            };
        }

        let delay = policy.delay_for_retry(attempts);
        logging::warn(
            Component::Uplink,
            None,
            &format!("{} - retrying in {} ms", err, delay.as_millis()),
        );
        sleep(delay);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
