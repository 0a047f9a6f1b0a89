//! Schema mapping into `StandardizedMetrics`
//!
//! Field lookups are table-driven: each schema version lists, per canonical
//! field, the dotted paths where the value may live. Arrays met along a path
//! contribute their largest value (e.g. the fullest disk). Anything missing or
//! non-finite falls back to the defaults below; normalization never fails.

use super::{MetricsDetail, StandardizedMetrics};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default for missing percentages (cpu, memory, disk)
pub const DEFAULT_PERCENT: f64 = 0.0;
/// Default for missing latency, milliseconds
pub const DEFAULT_LATENCY_MS: f64 = 0.0;
/// Default for missing bandwidth, Mbps
pub const DEFAULT_BANDWIDTH_MBPS: f64 = 0.0;
/// Default for missing counters
pub const DEFAULT_COUNT: u64 = 0;

/// Payload schema the decoded value follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVersion {
    /// Detect from the payload shape
    Auto,
    /// Top-level keys, snake_case or camelCase
    Flat,
    /// Agent heartbeat shape: `system.cpu.percent`, `network.*`, `security.*`
    Nested,
    /// Simulator output
    Synthetic,
}

struct FieldPaths {
    cpu: &'static [&'static str],
    memory: &'static [&'static str],
    disk: &'static [&'static str],
    latency: &'static [&'static str],
    connections: &'static [&'static str],
    bandwidth: &'static [&'static str],
    online_nodes: &'static [&'static str],
    threats: &'static [&'static str],
    timestamp: &'static [&'static str],
    total_alerts: &'static [&'static str],
    critical_alerts: &'static [&'static str],
    open_incidents: &'static [&'static str],
    total_nodes: &'static [&'static str],
    blocked_requests: &'static [&'static str],
    firewall_alert: &'static [&'static str],
    intrusion_alert: &'static [&'static str],
    auth_alert: &'static [&'static str],
}

const FLAT: FieldPaths = FieldPaths {
    cpu: &["cpu_usage", "cpuUsage", "cpu_percent", "cpu"],
    memory: &["memory_usage", "memoryUsage", "memory_percent", "memory", "ram"],
    disk: &["disk_usage", "diskUsage", "disk_percent", "disk"],
    latency: &["network_latency", "networkLatency", "latency_ms", "latency"],
    connections: &["active_connections", "activeConnections", "connections"],
    bandwidth: &["bandwidth_usage", "bandwidthUsage", "bandwidth_mbps", "bandwidth"],
    online_nodes: &["online_nodes", "onlineNodes", "nodes_online"],
    threats: &["threat_count", "threatCount", "active_threats", "threats"],
    timestamp: &["timestamp", "collected_at", "ts"],
    total_alerts: &["details.total_alerts", "total_alerts", "totalAlerts"],
    critical_alerts: &["details.critical_alerts", "critical_alerts", "criticalAlerts"],
    open_incidents: &["details.open_incidents", "open_incidents", "openIncidents"],
    total_nodes: &["details.total_nodes", "total_nodes", "totalNodes"],
    blocked_requests: &["details.blocked_requests", "blocked_requests", "blockedRequests"],
    firewall_alert: &["details.firewall_alert", "firewall_alert", "alerts.firewall"],
    intrusion_alert: &[
        "details.intrusion_alert",
        "intrusion_alert",
        "ids_alert",
        "alerts.intrusion",
    ],
    auth_alert: &["details.auth_alert", "auth_alert", "alerts.auth"],
};

const NESTED: FieldPaths = FieldPaths {
    cpu: &["system.cpu.percent", "system.cpu_usage"],
    memory: &["system.memory.percent_used", "system.memory_usage"],
    disk: &["system.disk.percent_used", "system.disk_usage"],
    latency: &["network.latency_ms", "network.latency"],
    connections: &["network.active_connections", "network.connections"],
    bandwidth: &["network.bandwidth_mbps", "network.bandwidth"],
    online_nodes: &["nodes.online"],
    threats: &["security.threats", "security.threat_count"],
    timestamp: &["timestamp", "system.timestamp"],
    total_alerts: &["security.alerts.total"],
    critical_alerts: &["security.alerts.critical"],
    open_incidents: &["security.open_incidents", "security.incidents.open"],
    total_nodes: &["nodes.total"],
    blocked_requests: &["security.blocked_requests", "network.blocked_requests"],
    firewall_alert: &["security.alerts.firewall"],
    intrusion_alert: &["security.alerts.intrusion"],
    auth_alert: &["security.alerts.auth"],
};

const SYNTHETIC: FieldPaths = FieldPaths {
    cpu: &["cpu"],
    memory: &["memory"],
    disk: &["disk"],
    latency: &["latency_ms"],
    connections: &["connections"],
    bandwidth: &["bandwidth_mbps"],
    online_nodes: &["nodes_online"],
    threats: &["threats"],
    timestamp: &["generated_at"],
    total_alerts: &["alerts_total"],
    critical_alerts: &["alerts_critical"],
    open_incidents: &["incidents_open"],
    total_nodes: &["nodes_total"],
    blocked_requests: &["blocked_requests"],
    firewall_alert: &["firewall_alert"],
    intrusion_alert: &["intrusion_alert"],
    auth_alert: &["auth_alert"],
};

impl SchemaVersion {
    /// Resolve `Auto` from the payload shape
    pub fn detect(value: &Value) -> SchemaVersion {
        match value.get("system") {
            Some(Value::Object(_)) => SchemaVersion::Nested,
            _ => SchemaVersion::Flat,
        }
    }

    fn paths(self) -> &'static FieldPaths {
        match self {
            SchemaVersion::Auto | SchemaVersion::Flat => &FLAT,
            SchemaVersion::Nested => &NESTED,
            SchemaVersion::Synthetic => &SYNTHETIC,
        }
    }
}

/// Map a decoded payload onto the canonical record
pub fn normalize(value: &Value, schema: SchemaVersion) -> StandardizedMetrics {
    let payload = unwrap_envelope(value);
    let schema = match schema {
        SchemaVersion::Auto => SchemaVersion::detect(payload),
        other => other,
    };
    let paths = schema.paths();

    let number = |candidates: &[&str]| lookup_number(payload, candidates);
    let percent = |candidates: &[&str]| {
        number(candidates)
            .map(|v| v.clamp(0.0, 100.0))
            .unwrap_or(DEFAULT_PERCENT)
    };
    let non_negative = |candidates: &[&str], default: f64| {
        number(candidates).map(|v| v.max(0.0)).unwrap_or(default)
    };
    let count = |candidates: &[&str]| number(candidates).map(to_count);

    StandardizedMetrics {
        cpu_usage: percent(paths.cpu),
        memory_usage: percent(paths.memory),
        disk_usage: percent(paths.disk),
        network_latency: non_negative(paths.latency, DEFAULT_LATENCY_MS),
        active_connections: count(paths.connections).unwrap_or(DEFAULT_COUNT),
        bandwidth_usage: non_negative(paths.bandwidth, DEFAULT_BANDWIDTH_MBPS),
        online_nodes: count(paths.online_nodes).unwrap_or(DEFAULT_COUNT),
        threat_count: count(paths.threats).unwrap_or(DEFAULT_COUNT),
        timestamp: lookup_timestamp(payload, paths.timestamp).unwrap_or_else(Utc::now),
        details: build_details(payload, paths),
    }
}

fn build_details(payload: &Value, paths: &FieldPaths) -> Option<MetricsDetail> {
    let counters = [
        paths.total_alerts,
        paths.critical_alerts,
        paths.open_incidents,
        paths.total_nodes,
        paths.blocked_requests,
    ]
    .map(|candidates| lookup_number(payload, candidates).map(to_count));
    let flags = [paths.firewall_alert, paths.intrusion_alert, paths.auth_alert]
        .map(|candidates| lookup_bool(payload, candidates));

    if counters.iter().all(Option::is_none) && flags.iter().all(Option::is_none) {
        return None;
    }

    let [total_alerts, critical_alerts, open_incidents, total_nodes, blocked_requests] =
        counters.map(|c| c.unwrap_or(DEFAULT_COUNT));
    let [firewall_alert, intrusion_alert, auth_alert] = flags.map(|f| f.unwrap_or(false));

    Some(MetricsDetail {
        total_alerts,
        critical_alerts,
        open_incidents,
        total_nodes,
        blocked_requests,
        firewall_alert,
        intrusion_alert,
        auth_alert,
    })
}

/// Peel `{"data": ...}` / `{"metrics": ...}` wrappers
fn unwrap_envelope(value: &Value) -> &Value {
    let mut current = value;
    for _ in 0..3 {
        match ["data", "metrics"]
            .iter()
            .find_map(|key| current.get(key).filter(|v| v.is_object()))
        {
            Some(inner) => current = inner,
            None => break,
        }
    }
    current
}

/// All values reachable through a dotted path; arrays fan out
fn resolve<'a>(value: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![value];
    for key in path.split('.') {
        current = current
            .into_iter()
            .flat_map(|v| match v {
                Value::Array(items) => items.iter().filter_map(|i| i.get(key)).collect::<Vec<_>>(),
                other => other.get(key).into_iter().collect::<Vec<_>>(),
            })
            .collect();
        if current.is_empty() {
            break;
        }
    }
    current
}

fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn lookup_number(payload: &Value, candidates: &[&str]) -> Option<f64> {
    candidates.iter().find_map(|path| {
        resolve(payload, path)
            .into_iter()
            .flat_map(|v| match v {
                Value::Array(items) => items.iter().filter_map(as_number).collect::<Vec<_>>(),
                other => as_number(other).into_iter().collect::<Vec<_>>(),
            })
            .reduce(f64::max)
    })
}

fn lookup_bool(payload: &Value, candidates: &[&str]) -> Option<bool> {
    candidates.iter().find_map(|path| {
        resolve(payload, path).into_iter().find_map(|v| match v {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_f64().map(|f| f != 0.0),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" | "active" => Some(true),
                "false" | "no" | "0" | "inactive" => Some(false),
                _ => None,
            },
            _ => None,
        })
    })
}

fn lookup_timestamp(payload: &Value, candidates: &[&str]) -> Option<DateTime<Utc>> {
    candidates.iter().find_map(|path| {
        resolve(payload, path).into_iter().find_map(|v| match v {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Value::Number(n) => n.as_i64().and_then(from_epoch),
            _ => None,
        })
    })
}

fn from_epoch(raw: i64) -> Option<DateTime<Utc>> {
    // values past the year 33658 in seconds are milliseconds
    if raw.abs() >= 1_000_000_000_000 {
        Utc.timestamp_millis_opt(raw).single()
    } else {
        Utc.timestamp_opt(raw, 0).single()
    }
}

fn to_count(value: f64) -> u64 {
    if value <= 0.0 {
        0
    } else {
        value.round() as u64
    }
}
