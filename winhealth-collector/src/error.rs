//! Error types for the health collector
//!
//! Three layers, each absorbed by the layer above it:
//! - `TransportError`: the remote execution channel failed
//! - `ProbeError`: one probe produced no samples (transport, exit status or parse)
//! - `HealthCheckError`: run-level failures; only `Configuration` aborts a run

use std::time::Duration;
use thiserror::Error;

use crate::probes::ProbeKind;

/// Failures of the remote execution channel
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("remote execution timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),
    #[error("failed to spawn transport command: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid transport command: {0}")]
    InvalidCommand(String),
    #[error("connection failed: {0}")]
    Connection(String),
}

/// Failure of a single probe against a single host
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("remote script exited with status {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },
    #[error("malformed {probe} response: {message}")]
    Parse { probe: ProbeKind, message: String },
}

impl ProbeError {
    pub fn parse(probe: ProbeKind, message: impl Into<String>) -> Self {
        ProbeError::Parse {
            probe,
            message: message.into(),
        }
    }

    /// Transport and exit-status failures may succeed on a later attempt,
    /// malformed output will not.
    pub fn is_transport(&self) -> bool {
        matches!(self, ProbeError::Transport(_) | ProbeError::NonZeroExit { .. })
    }
}

/// Run-level errors
#[derive(Debug, Error)]
pub enum HealthCheckError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("host {host} exceeded its deadline after {}s", .elapsed.as_secs())]
    HostTimeout { host: String, elapsed: Duration },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HealthCheckError {
    pub fn config(message: impl Into<String>) -> Self {
        HealthCheckError::Configuration(message.into())
    }
}

pub type Result<T> = std::result::Result<T, HealthCheckError>;
