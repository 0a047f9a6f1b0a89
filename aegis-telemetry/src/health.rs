//! Connection health and backend liveness
//!
//! - `ConnectionHealth` follows the tag of the last delivered outcome
//! - `HealthTracker` keeps cycle counters for display
//! - `HealthProber` pings the liveness endpoint on its own cadence; it is
//!   advisory and the source controller never looks at it

use crate::outcome::AcquisitionOutcome;
use crate::request::{Call, RequestEngine};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ConnectionHealth {
    /// No cycle delivered yet
    Unknown,
    Healthy,
    /// Live acquisition failing, synthetic data on display
    Fallback { reason: String },
    Failed { message: String },
}

impl ConnectionHealth {
    pub fn from_outcome(outcome: &AcquisitionOutcome) -> Self {
        match outcome {
            AcquisitionOutcome::Success { .. } => ConnectionHealth::Healthy,
            AcquisitionOutcome::Degraded { reason, .. } => ConnectionHealth::Fallback {
                reason: reason.to_string(),
            },
            AcquisitionOutcome::Failure { kind, message } => ConnectionHealth::Failed {
                message: format!("{}: {}", kind.label(), message),
            },
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, ConnectionHealth::Healthy)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub cycles: u64,
    pub consecutive_failures: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub connection: ConnectionHealth,
}

/// Counters over delivered outcomes
#[derive(Clone)]
pub struct HealthTracker {
    cycles: Arc<AtomicU64>,
    consecutive_failures: Arc<AtomicU64>,
    last_success_at: Arc<Mutex<Option<DateTime<Utc>>>>,
    connection: Arc<Mutex<ConnectionHealth>>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            cycles: Arc::new(AtomicU64::new(0)),
            consecutive_failures: Arc::new(AtomicU64::new(0)),
            last_success_at: Arc::new(Mutex::new(None)),
            connection: Arc::new(Mutex::new(ConnectionHealth::Unknown)),
        }
    }

    /// Record a delivered outcome and return the resulting health
    pub fn record(&self, outcome: &AcquisitionOutcome) -> ConnectionHealth {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        if outcome.is_success() {
            self.consecutive_failures.store(0, Ordering::Relaxed);
            *self.last_success_at.lock() = Some(Utc::now());
        } else {
            self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        }
        let health = ConnectionHealth::from_outcome(outcome);
        *self.connection.lock() = health.clone();
        health
    }

    pub fn connection(&self) -> ConnectionHealth {
        self.connection.lock().clone()
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            last_success_at: *self.last_success_at.lock(),
            connection: self.connection(),
        }
    }
}

/// Periodic liveness check against the health endpoint
pub struct HealthProber {
    engine: RequestEngine,
    interval: Duration,
    reachable: watch::Sender<bool>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthProber {
    pub fn new(engine: RequestEngine, interval: Duration) -> Self {
        let (reachable, _) = watch::channel(false);
        Self {
            engine,
            interval,
            reachable,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// One probe on the health tier; true on a 2xx answer
    pub async fn probe_once(&self) -> bool {
        let reachable = probe(&self.engine).await;
        self.reachable.send_replace(reachable);
        reachable
    }

    pub fn is_reachable(&self) -> bool {
        *self.reachable.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.reachable.subscribe()
    }

    /// Start probing in the background until `stop()`
    pub fn spawn(self: &Arc<Self>) {
        let mut slot = self.task.lock();
        if slot.is_some() {
            return;
        }

        let prober = Arc::clone(self);
        let cancel = self.cancel.clone();
        *slot = Some(tokio::spawn(async move {
            let mut timer = tokio::time::interval(prober.interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = timer.tick() => {
                        let was = prober.is_reachable();
                        let now = prober.probe_once().await;
                        if was != now {
                            info!("Backend reachability changed: {}", if now { "reachable" } else { "unreachable" });
                        }
                    }
                }
            }
            debug!("Health prober stopped");
        }));
    }

    pub fn stop(&self) {
        self.cancel.cancel();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

async fn probe(engine: &RequestEngine) -> bool {
    match engine.execute(&Call::health()).await {
        Ok(response) => {
            if !response.is_success() {
                debug!("Health probe answered HTTP {}", response.status);
            }
            response.is_success()
        }
        Err(e) => {
            warn!("Health probe failed: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::metrics::Simulator;
    use crate::outcome::{DataSource, DegradedReason};

    fn success() -> AcquisitionOutcome {
        AcquisitionOutcome::Success {
            metrics: Simulator::seeded(5).generate().unwrap(),
            source: DataSource::Live,
        }
    }

    fn degraded() -> AcquisitionOutcome {
        AcquisitionOutcome::Degraded {
            metrics: Simulator::seeded(6).generate().unwrap(),
            reason: DegradedReason {
                kind: ErrorKind::Timeout,
                detail: "request timed out".into(),
            },
        }
    }

    #[test]
    fn test_health_follows_outcome_tag() {
        assert!(ConnectionHealth::from_outcome(&success()).is_healthy());
        match ConnectionHealth::from_outcome(&degraded()) {
            ConnectionHealth::Fallback { reason } => assert!(reason.starts_with("timeout")),
            other => panic!("unexpected {:?}", other),
        }
        let failure = AcquisitionOutcome::Failure {
            kind: ErrorKind::Simulation,
            message: "boom".into(),
        };
        assert!(matches!(
            ConnectionHealth::from_outcome(&failure),
            ConnectionHealth::Failed { .. }
        ));
    }

    #[test]
    fn test_tracker_counters() {
        let tracker = HealthTracker::new();
        assert_eq!(tracker.connection(), ConnectionHealth::Unknown);

        tracker.record(&degraded());
        tracker.record(&degraded());
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.cycles, 2);
        assert_eq!(snapshot.consecutive_failures, 2);
        assert!(snapshot.last_success_at.is_none());

        assert!(tracker.record(&success()).is_healthy());
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.consecutive_failures, 0);
        assert!(snapshot.last_success_at.is_some());
    }
}
