//! Synthetic metrics for simulated mode and live-path fallback
//!
//! Values stay within realistic ranges and hang together: a loaded host
//! reports more threats, critical alerts never outnumber alerts and online
//! nodes never outnumber known nodes.

use super::{normalize, SchemaVersion, StandardizedMetrics};
use crate::error::{Result, TelemetryError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

/// Raw generator output, in the simulator's own schema
#[derive(Debug, Clone, Serialize)]
pub struct SyntheticSample {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
    pub latency_ms: f64,
    pub connections: u64,
    pub bandwidth_mbps: f64,
    pub nodes_online: u64,
    pub nodes_total: u64,
    pub threats: u64,
    pub alerts_total: u64,
    pub alerts_critical: u64,
    pub incidents_open: u64,
    pub blocked_requests: u64,
    pub firewall_alert: bool,
    pub intrusion_alert: bool,
    pub auth_alert: bool,
    pub generated_at: DateTime<Utc>,
}

impl SyntheticSample {
    fn floats(&self) -> [f64; 5] {
        [self.cpu, self.memory, self.disk, self.latency_ms, self.bandwidth_mbps]
    }
}

/// Threat count implied by host load (mean of cpu and memory, percent)
///
/// Monotonic in `load`; `jitter` adds 0..=2 on top.
pub fn threats_for_load(load: f64, jitter: u64) -> u64 {
    let pressure = ((load - 30.0) / 60.0).clamp(0.0, 1.0);
    (pressure * 18.0).round() as u64 + jitter.min(2)
}

pub struct Simulator {
    rng: Mutex<StdRng>,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic generator for tests
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn sample(&self) -> SyntheticSample {
        let mut rng = self.rng.lock();

        let cpu: f64 = rng.gen_range(12.0..92.0);
        // memory follows cpu loosely
        let memory: f64 = (30.0 + cpu * 0.45 + rng.gen_range(-8.0..18.0)).clamp(30.0, 90.0);
        let disk: f64 = rng.gen_range(35.0..85.0);
        let load = (cpu + memory) / 2.0;

        let latency_ms = (rng.gen_range(8.0..60.0) + load * 1.2).min(180.0);
        let connections = rng.gen_range(40..=1200u64);
        let bandwidth_mbps = (connections as f64 * rng.gen_range(0.15..0.8)).clamp(5.0, 950.0);

        let nodes_total = rng.gen_range(3..=48u64);
        let nodes_offline = rng.gen_range(0..=3u64.min(nodes_total - 1));
        let nodes_online = nodes_total - nodes_offline;

        let threats = threats_for_load(load, rng.gen_range(0..=2));
        let alerts_total = threats * 2 + rng.gen_range(0..5u64);
        let alerts_critical = ((threats as f64) * 0.4).round() as u64;
        let alerts_critical = alerts_critical.min(alerts_total);
        let incidents_open = (threats / 3).min(alerts_total);
        let blocked_requests = threats * rng.gen_range(10..40u64) + rng.gen_range(0..50u64);

        SyntheticSample {
            cpu,
            memory,
            disk,
            latency_ms,
            connections,
            bandwidth_mbps,
            nodes_online,
            nodes_total,
            threats,
            alerts_total,
            alerts_critical,
            incidents_open,
            blocked_requests,
            firewall_alert: blocked_requests > 400,
            intrusion_alert: alerts_critical > 0,
            auth_alert: threats > 10,
            generated_at: Utc::now(),
        }
    }

    /// Generate one record through the normalizer's synthetic path
    pub fn generate(&self) -> Result<StandardizedMetrics> {
        let sample = self.sample();
        if sample.floats().iter().any(|v| !v.is_finite()) {
            return Err(TelemetryError::Simulation(format!(
                "non-finite synthetic value in {:?}",
                sample
            )));
        }
        let value = serde_json::to_value(&sample)
            .map_err(|e| TelemetryError::Simulation(e.to_string()))?;
        Ok(normalize(&value, SchemaVersion::Synthetic))
    }
}
