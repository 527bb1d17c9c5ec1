//! Endpoint probing
//!
//! An [`Endpoint`] is one (target, connection path) pair. A [`Prober`] runs a
//! single connectivity test against it and always yields exactly one
//! [`ProbeOutcome`]; failures are recorded on the outcome, never returned.

mod client;
mod endpoint;
mod executor;
mod headers;

pub use client::{build_client, classify_error, tls_for, Redirects};
pub use endpoint::{enumerate, Endpoint};
pub use executor::{HttpProber, ProbeSettings};
pub use headers::{HeaderProvider, StaticHeaders};

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Why a probe failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ProbeErrorKind {
    /// Connection was not established within the connect deadline
    ConnectionTimeout,
    /// Response did not complete within the response deadline
    ResponseTimeout,
    /// Server answered outside `[200, 400)`
    HttpStatus(u16),
    /// Any other transport failure
    NetworkError(String),
    /// The race no longer needs this probe
    Cancelled,
}

impl fmt::Display for ProbeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeErrorKind::ConnectionTimeout => write!(f, "connection timeout"),
            ProbeErrorKind::ResponseTimeout => write!(f, "response timeout"),
            ProbeErrorKind::HttpStatus(code) => write!(f, "HTTP status {}", code),
            ProbeErrorKind::NetworkError(detail) => write!(f, "network error: {}", detail),
            ProbeErrorKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Result of one probe
#[derive(Debug, Clone, Serialize)]
pub struct ProbeOutcome {
    pub endpoint: Endpoint,
    pub succeeded: bool,
    pub elapsed: Duration,
    pub error: Option<ProbeErrorKind>,
}

impl ProbeOutcome {
    pub fn success(endpoint: Endpoint, elapsed: Duration) -> Self {
        ProbeOutcome {
            endpoint,
            succeeded: true,
            elapsed,
            error: None,
        }
    }

    pub fn failure(endpoint: Endpoint, elapsed: Duration, error: ProbeErrorKind) -> Self {
        ProbeOutcome {
            endpoint,
            succeeded: false,
            elapsed,
            error: Some(error),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.error, Some(ProbeErrorKind::Cancelled))
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            None => write!(f, "{} ok in {}ms", self.endpoint, self.elapsed_ms()),
            Some(e) => write!(f, "{} failed after {}ms: {}", self.endpoint, self.elapsed_ms(), e),
        }
    }
}

/// Runs one connectivity test
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(
        &self,
        endpoint: &Endpoint,
        test_path: &str,
        token: &CancellationToken,
    ) -> ProbeOutcome;
}
