/*!
Constructeurs de payloads backend

Les formes couvertes correspondent à ce que le normaliseur doit absorber:
- Schéma plat (snake_case ou camelCase)
- Schéma imbriqué façon heartbeat agent
- Corps endommagés: HTML en fin de corps, troncature, BOM
*/

use serde_json::{json, Value};

pub struct PayloadBuilder;

impl PayloadBuilder {
    /// Payload plat minimal
    pub fn flat_metrics(cpu: f64, memory: f64, threats: u64) -> Value {
        json!({
            "cpu_usage": cpu,
            "memory_usage": memory,
            "disk_usage": 41.5,
            "network_latency": 23.0,
            "active_connections": 312,
            "bandwidth_usage": 118.4,
            "online_nodes": 12,
            "threat_count": threats,
            "timestamp": chrono::Utc::now().to_rfc3339()
        })
    }

    /// Payload plat en camelCase avec valeurs texte
    pub fn camel_case_metrics(cpu: &str, memory: &str) -> Value {
        json!({
            "cpuUsage": cpu,
            "memoryUsage": memory,
            "diskUsage": "55",
            "networkLatency": "12.5",
            "activeConnections": "90",
            "onlineNodes": 4,
            "threatCount": 1
        })
    }

    /// Payload imbriqué (system / network / security)
    pub fn nested_metrics(cpu: f64, memory: f64, disks: &[f64]) -> Value {
        let disk: Vec<Value> = disks
            .iter()
            .map(|percent| json!({ "percent_used": percent }))
            .collect();
        json!({
            "system": {
                "cpu": { "percent": cpu },
                "memory": { "percent_used": memory },
                "disk": disk
            },
            "network": {
                "latency_ms": 31.0,
                "active_connections": 77,
                "bandwidth_mbps": 64.0
            },
            "nodes": { "online": 6, "total": 8 },
            "security": {
                "threats": 3,
                "alerts": { "total": 9, "critical": 2 }
            }
        })
    }

    /// Enveloppe `{"data": ...}`
    pub fn enveloped(inner: Value) -> Value {
        json!({ "data": inner })
    }

    /// Enveloppe d'erreur backend
    pub fn error_envelope(code: u16, message: &str) -> Value {
        json!({ "code": code, "message": message })
    }

    /// Corps JSON suivi d'une page d'erreur HTML
    pub fn with_trailing_html(value: &Value) -> String {
        format!(
            "{}<!DOCTYPE html><html><body><h1>502 Bad Gateway</h1></body></html>",
            value
        )
    }

    /// Corps coupé après `keep` octets
    pub fn truncated(value: &Value, keep: usize) -> String {
        let text = value.to_string();
        let mut end = keep.min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text[..end].to_string()
    }

    /// Corps préfixé d'un BOM et de blancs
    pub fn with_bom(value: &Value) -> String {
        format!("\u{FEFF}\n  {}\n", value)
    }

    /// Réponse de login
    pub fn login_response(token: &str, username: &str, role: &str) -> Value {
        json!({
            "access_token": token,
            "token_type": "bearer",
            "user": {
                "id": 1,
                "username": username,
                "role": role,
                "email": format!("{}@soc.local", username)
            }
        })
    }
}
