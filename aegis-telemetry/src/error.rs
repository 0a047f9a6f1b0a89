//! Error taxonomy for the telemetry layer
//!
//! Every failure an acquisition cycle can hit maps onto one `ErrorKind`,
//! which is what operators see next to degraded data.

use crate::decoder::DiagnosticFailure;
use crate::request::TimeoutTier;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Sub-kind of a connection-level failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// DNS failure, refused or reset connection
    Network,
    /// Rejected by policy: TLS/certificate validation, redirect policy
    PolicyBlocked,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Network => write!(f, "network"),
            TransportKind::PolicyBlocked => write!(f, "policy-blocked"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("request timed out after {after:?} ({tier} tier)")]
    Timeout { tier: TimeoutTier, after: Duration },

    #[error("transport error ({kind}): {message}")]
    Transport { kind: TransportKind, message: String },

    #[error("backend returned HTTP {status}: {message}")]
    HttpStatus {
        status: u16,
        message: String,
        database_fault: bool,
    },

    #[error("malformed payload: {0}")]
    MalformedPayload(DiagnosticFailure),

    #[error("request cancelled")]
    Cancelled,

    #[error("authentication failed: {0}")]
    Unauthenticated(String),

    #[error("synthetic data generation failed: {0}")]
    Simulation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("http client error: {0}")]
    Client(String),
}

impl TelemetryError {
    /// Outcome-level classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            TelemetryError::Timeout { .. } => ErrorKind::Timeout,
            TelemetryError::Transport { .. }
            | TelemetryError::Cancelled
            | TelemetryError::Client(_) => ErrorKind::Transport,
            TelemetryError::HttpStatus { database_fault, .. } => {
                if *database_fault {
                    ErrorKind::BackendFault
                } else {
                    ErrorKind::HttpStatus
                }
            }
            TelemetryError::Unauthenticated(_) => ErrorKind::HttpStatus,
            TelemetryError::MalformedPayload(_) => ErrorKind::MalformedPayload,
            TelemetryError::Simulation(_) => ErrorKind::Simulation,
            TelemetryError::Config(_) => ErrorKind::Config,
            TelemetryError::InvalidState(_) => ErrorKind::InvalidState,
        }
    }
}

/// Failure classes surfaced alongside degraded or failed outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    Transport,
    HttpStatus,
    /// 5xx whose body points at the database or its connection pool
    BackendFault,
    MalformedPayload,
    Simulation,
    Config,
    /// Operation rejected by the current lifecycle state
    InvalidState,
}

impl ErrorKind {
    /// Operator-facing label
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Transport => "connectivity",
            ErrorKind::HttpStatus => "http status",
            ErrorKind::BackendFault => "backend fault",
            ErrorKind::MalformedPayload => "malformed payload",
            ErrorKind::Simulation => "simulation",
            ErrorKind::Config => "configuration",
            ErrorKind::InvalidState => "invalid state",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
