//! Live/simulated source selection with transparent failover
//!
//! In `Live` mode a cycle is fetch → decode → normalize. Whatever goes wrong
//! on that path is absorbed here: the caller gets synthetic metrics tagged
//! `Degraded` with the reason, never the raw error. Only the simulator
//! itself can produce a `Failure`.

use crate::auth::error_message;
use crate::decoder::{ContentKind, Decoder};
use crate::error::{Result, TelemetryError};
use crate::metrics::{normalize, SchemaVersion, Simulator, StandardizedMetrics};
use crate::outcome::{AcquisitionOutcome, DataSource, DegradedReason};
use crate::request::{Call, RequestEngine};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    Live,
    Simulated,
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceMode::Live => write!(f, "live"),
            SourceMode::Simulated => write!(f, "simulated"),
        }
    }
}

impl FromStr for SourceMode {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(SourceMode::Live),
            "simulated" | "simulation" | "mock" => Ok(SourceMode::Simulated),
            other => Err(TelemetryError::Config(format!("unknown source mode: {}", other))),
        }
    }
}

/// Anything able to run one acquisition cycle
#[async_trait]
pub trait AcquisitionSource: Send + Sync {
    async fn acquire(&self) -> AcquisitionOutcome;
    fn mode(&self) -> SourceMode;
    fn set_mode(&self, mode: SourceMode);
}

pub struct SourceController {
    engine: RequestEngine,
    decoder: Decoder,
    simulator: Simulator,
    mode: RwLock<SourceMode>,
}

impl SourceController {
    pub fn new(engine: RequestEngine, mode: SourceMode) -> Self {
        Self::with_parts(engine, Decoder::default(), Simulator::new(), mode)
    }

    pub fn with_parts(
        engine: RequestEngine,
        decoder: Decoder,
        simulator: Simulator,
        mode: SourceMode,
    ) -> Self {
        Self {
            engine,
            decoder,
            simulator,
            mode: RwLock::new(mode),
        }
    }

    pub fn engine(&self) -> &RequestEngine {
        &self.engine
    }

    /// Fetch, decode and normalize live metrics
    pub async fn fetch_live(&self) -> Result<StandardizedMetrics> {
        let response = self.engine.execute(&Call::metrics()).await?;
        let parsed = self.decoder.decode(&response.body, ContentKind::Structured);

        if !response.is_success() {
            let body = parsed.ok().and_then(|p| p.into_structured());
            let message = body
                .as_ref()
                .and_then(error_message)
                .unwrap_or_else(|| format!("HTTP {}", response.status));
            return Err(TelemetryError::HttpStatus {
                status: response.status,
                database_fault: is_database_fault(response.status, &message, &response.body),
                message,
            });
        }

        let value = parsed
            .map_err(TelemetryError::MalformedPayload)?
            .into_structured()
            .unwrap_or(Value::Null);

        if let Some(err) = embedded_error(&value) {
            return Err(err);
        }

        debug!("Live metrics decoded in {:?}", response.elapsed);
        Ok(normalize(&value, SchemaVersion::Auto))
    }

    fn simulated(&self) -> AcquisitionOutcome {
        match self.simulator.generate() {
            Ok(metrics) => AcquisitionOutcome::Success {
                metrics,
                source: DataSource::Simulated,
            },
            Err(e) => AcquisitionOutcome::Failure {
                kind: e.kind(),
                message: e.to_string(),
            },
        }
    }
}

#[async_trait]
impl AcquisitionSource for SourceController {
    async fn acquire(&self) -> AcquisitionOutcome {
        match self.mode() {
            SourceMode::Simulated => self.simulated(),
            SourceMode::Live => match self.fetch_live().await {
                Ok(metrics) => AcquisitionOutcome::Success {
                    metrics,
                    source: DataSource::Live,
                },
                Err(err) => {
                    let reason = DegradedReason::from_error(&err);
                    warn!("Live acquisition failed, serving simulated data ({})", reason);
                    match self.simulator.generate() {
                        Ok(metrics) => AcquisitionOutcome::Degraded { metrics, reason },
                        Err(e) => AcquisitionOutcome::Failure {
                            kind: e.kind(),
                            message: e.to_string(),
                        },
                    }
                }
            },
        }
    }

    fn mode(&self) -> SourceMode {
        *self.mode.read()
    }

    fn set_mode(&self, mode: SourceMode) {
        *self.mode.write() = mode;
    }
}

/// Error envelope delivered with a 2xx status, or rebuilt by recovery
fn embedded_error(value: &Value) -> Option<TelemetryError> {
    let reconstructed = value.get("reconstructed") == Some(&Value::Bool(true));
    let code = ["code", "status_code"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_u64))
        .filter(|c| (400..600).contains(c));

    if code.is_none() && !reconstructed {
        return None;
    }

    let message = error_message(value).unwrap_or_else(|| "error envelope".into());
    Some(match code {
        Some(code) => {
            let status = code as u16;
            TelemetryError::HttpStatus {
                status,
                database_fault: is_database_fault(status, &message, ""),
                message,
            }
        }
        None => TelemetryError::MalformedPayload(crate::decoder::DiagnosticFailure::new(
            "truncated envelope without status code",
            &value.to_string(),
        )),
    })
}

/// 5xx pointing at the database layer
fn is_database_fault(status: u16, message: &str, body: &str) -> bool {
    if !(500..600).contains(&status) {
        return false;
    }
    let haystack = format!("{} {}", message, body).to_lowercase();
    ["database", "db error", "sql", "connection pool", "psycopg", "deadlock"]
        .iter()
        .any(|needle| haystack.contains(needle))
}
