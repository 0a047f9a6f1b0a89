//! Canonical metrics record for dashboard consumers
//!
//! Provides:
//! - `StandardizedMetrics`, the one record every consumer renders
//! - Schema mapping from whatever the backend (or the simulator) produced
//! - Bounded, internally consistent synthetic data for fallback
//!
//! Every numeric field is always present and finite. Fields are private and
//! only the normalizer builds records, so a record never changes after it
//! leaves an acquisition cycle.

pub mod normalizer;
pub mod simulator;

pub use normalizer::{normalize, SchemaVersion};
pub use simulator::{Simulator, SyntheticSample};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Complete, default-filled metrics snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StandardizedMetrics {
    cpu_usage: f64,
    memory_usage: f64,
    disk_usage: f64,
    network_latency: f64,
    active_connections: u64,
    bandwidth_usage: f64,
    online_nodes: u64,
    threat_count: u64,
    timestamp: DateTime<Utc>,
    details: Option<MetricsDetail>,
}

/// Alert counters and per-subsystem alert flags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsDetail {
    pub total_alerts: u64,
    pub critical_alerts: u64,
    pub open_incidents: u64,
    pub total_nodes: u64,
    pub blocked_requests: u64,
    pub firewall_alert: bool,
    pub intrusion_alert: bool,
    pub auth_alert: bool,
}

impl StandardizedMetrics {
    /// CPU usage, percent
    pub fn cpu_usage(&self) -> f64 {
        self.cpu_usage
    }

    /// Memory usage, percent
    pub fn memory_usage(&self) -> f64 {
        self.memory_usage
    }

    /// Disk usage, percent
    pub fn disk_usage(&self) -> f64 {
        self.disk_usage
    }

    /// Round-trip latency, milliseconds
    pub fn network_latency(&self) -> f64 {
        self.network_latency
    }

    pub fn active_connections(&self) -> u64 {
        self.active_connections
    }

    /// Bandwidth usage, Mbps
    pub fn bandwidth_usage(&self) -> f64 {
        self.bandwidth_usage
    }

    pub fn online_nodes(&self) -> u64 {
        self.online_nodes
    }

    pub fn threat_count(&self) -> u64 {
        self.threat_count
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn details(&self) -> Option<&MetricsDetail> {
        self.details.as_ref()
    }

    /// True when every float field is finite
    pub fn is_finite(&self) -> bool {
        [
            self.cpu_usage,
            self.memory_usage,
            self.disk_usage,
            self.network_latency,
            self.bandwidth_usage,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}
