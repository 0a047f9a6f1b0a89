//! Result of one acquisition cycle

use crate::error::{ErrorKind, TelemetryError};
use crate::metrics::StandardizedMetrics;
use serde::Serialize;
use std::fmt;

/// Where a record's values came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Live,
    Simulated,
}

/// Why live data was replaced by synthetic data
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegradedReason {
    pub kind: ErrorKind,
    pub detail: String,
}

impl DegradedReason {
    pub fn from_error(err: &TelemetryError) -> Self {
        Self {
            kind: err.kind(),
            detail: err.to_string(),
        }
    }
}

impl fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.label(), self.detail)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AcquisitionOutcome {
    Success {
        metrics: StandardizedMetrics,
        source: DataSource,
    },
    /// Live acquisition failed; `metrics` are synthetic
    Degraded {
        metrics: StandardizedMetrics,
        reason: DegradedReason,
    },
    Failure {
        kind: ErrorKind,
        message: String,
    },
}

impl AcquisitionOutcome {
    pub fn metrics(&self) -> Option<&StandardizedMetrics> {
        match self {
            AcquisitionOutcome::Success { metrics, .. }
            | AcquisitionOutcome::Degraded { metrics, .. } => Some(metrics),
            AcquisitionOutcome::Failure { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AcquisitionOutcome::Success { .. })
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, AcquisitionOutcome::Degraded { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            AcquisitionOutcome::Success { .. } => "success",
            AcquisitionOutcome::Degraded { .. } => "degraded",
            AcquisitionOutcome::Failure { .. } => "failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Simulator;
    use crate::request::TimeoutTier;
    use std::time::Duration;

    #[test]
    fn test_degraded_reason_starts_with_label() {
        let err = TelemetryError::Timeout {
            tier: TimeoutTier::BulkMetrics,
            after: Duration::from_millis(250),
        };
        let reason = DegradedReason::from_error(&err);
        assert_eq!(reason.kind, ErrorKind::Timeout);
        assert!(reason.to_string().starts_with("timeout: "));
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let outcome = AcquisitionOutcome::Success {
            metrics: Simulator::seeded(1).generate().unwrap(),
            source: DataSource::Simulated,
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["source"], "simulated");
        assert!(outcome.metrics().is_some());
    }
}
