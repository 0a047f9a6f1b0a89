//! Outbound request engine
//!
//! One call per `execute`:
//! - Endpoint classification picks the timeout tier unless the call names one
//! - Bearer credential attached when the store holds one
//! - The call runs on its own task, cancelled when the tier deadline expires
//! - The body always comes back as text, whatever the status

use crate::config::{BackendConfig, TimeoutConfig};
use crate::credentials::CredentialStore;
use crate::error::{Result, TelemetryError, TransportKind};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Named deadline policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeoutTier {
    Health,
    BulkMetrics,
    Default,
}

impl fmt::Display for TimeoutTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutTier::Health => write!(f, "health"),
            TimeoutTier::BulkMetrics => write!(f, "bulk-metrics"),
            TimeoutTier::Default => write!(f, "default"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub health: Duration,
    pub bulk_metrics: Duration,
    pub default: Duration,
}

impl TimeoutPolicy {
    pub fn deadline(&self, tier: TimeoutTier) -> Duration {
        match tier {
            TimeoutTier::Health => self.health,
            TimeoutTier::BulkMetrics => self.bulk_metrics,
            TimeoutTier::Default => self.default,
        }
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::from(&TimeoutConfig::default())
    }
}

impl From<&TimeoutConfig> for TimeoutPolicy {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            health: Duration::from_millis(config.health_ms),
            bulk_metrics: Duration::from_millis(config.bulk_metrics_ms),
            default: Duration::from_millis(config.default_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Options,
}

impl Method {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Options => reqwest::Method::OPTIONS,
        }
    }
}

/// Endpoint classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Health,
    Metrics,
    Login,
    /// Any other path under the base origin
    Other(String),
}

impl Endpoint {
    pub fn default_tier(&self) -> TimeoutTier {
        match self {
            Endpoint::Health => TimeoutTier::Health,
            Endpoint::Metrics => TimeoutTier::BulkMetrics,
            Endpoint::Login | Endpoint::Other(_) => TimeoutTier::Default,
        }
    }

    fn path<'a>(&'a self, backend: &'a BackendConfig) -> &'a str {
        match self {
            Endpoint::Health => &backend.health_path,
            Endpoint::Metrics => &backend.metrics_path,
            Endpoint::Login => &backend.login_path,
            Endpoint::Other(path) => path,
        }
    }
}

/// One outbound call description
#[derive(Debug, Clone)]
pub struct Call {
    pub endpoint: Endpoint,
    pub method: Method,
    pub tier: Option<TimeoutTier>,
    pub form: Option<Vec<(String, String)>>,
}

impl Call {
    pub fn new(endpoint: Endpoint, method: Method) -> Self {
        Self {
            endpoint,
            method,
            tier: None,
            form: None,
        }
    }

    pub fn metrics() -> Self {
        Self::new(Endpoint::Metrics, Method::Get)
    }

    pub fn health() -> Self {
        Self::new(Endpoint::Health, Method::Get)
    }

    pub fn with_tier(mut self, tier: TimeoutTier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn with_form(mut self, form: Vec<(String, String)>) -> Self {
        self.form = Some(form);
        self
    }

    /// Explicit tier if set, otherwise the endpoint's classification
    pub fn resolved_tier(&self) -> TimeoutTier {
        self.tier.unwrap_or_else(|| self.endpoint.default_tier())
    }
}

/// Raw response, returned for every status code
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
    pub elapsed: Duration,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues calls against the configured backend origin
#[derive(Clone)]
pub struct RequestEngine {
    client: reqwest::Client,
    backend: BackendConfig,
    policy: TimeoutPolicy,
    credentials: Arc<CredentialStore>,
}

impl RequestEngine {
    pub fn new(
        backend: BackendConfig,
        policy: TimeoutPolicy,
        credentials: Arc<CredentialStore>,
    ) -> Result<Self> {
        // deadlines are enforced per call, not client-wide
        let client = reqwest::Client::builder()
            .user_agent(concat!("aegis-telemetry/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TelemetryError::Client(e.to_string()))?;

        Ok(Self {
            client,
            backend,
            policy,
            credentials,
        })
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn policy(&self) -> TimeoutPolicy {
        self.policy
    }

    pub fn url_for(&self, endpoint: &Endpoint) -> String {
        let base = self.backend.base_url.trim_end_matches('/');
        let path = endpoint.path(&self.backend);
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    pub async fn execute(&self, call: &Call) -> Result<RawResponse> {
        self.execute_with_cancel(call, &CancellationToken::new()).await
    }

    /// Execute a call that `cancel` may abort before its deadline
    pub async fn execute_with_cancel(
        &self,
        call: &Call,
        cancel: &CancellationToken,
    ) -> Result<RawResponse> {
        let tier = call.resolved_tier();
        let deadline = self.policy.deadline(tier);
        let url = self.url_for(&call.endpoint);

        let mut builder = self.client.request(call.method.as_reqwest(), &url);
        let sent_bearer = self.credentials.bearer();
        if let Some(token) = &sent_bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(form) = &call.form {
            builder = builder.form(form);
        }

        debug!("{:?} {} ({} tier, {:?})", call.method, url, tier, deadline);

        let token = cancel.child_token();
        let task_token = token.clone();
        let started = Instant::now();
        let mut task = tokio::spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => None,
                result = send_and_read(builder) => Some(result),
            }
        });

        let joined = tokio::select! {
            joined = &mut task => joined,
            _ = tokio::time::sleep(deadline) => {
                token.cancel();
                warn!("{} timed out after {:?} ({} tier)", url, deadline, tier);
                return Err(TelemetryError::Timeout { tier, after: deadline });
            }
            _ = cancel.cancelled() => {
                token.cancel();
                return Err(TelemetryError::Cancelled);
            }
        };

        let (status, content_type, body) = match joined {
            Ok(Some(result)) => result.map_err(|e| classify_error(&e, tier, deadline))?,
            Ok(None) => return Err(TelemetryError::Cancelled),
            Err(e) => return Err(TelemetryError::Client(format!("request task failed: {}", e))),
        };

        // A login 401 rejects the submitted password, not the held token
        if status == StatusCode::UNAUTHORIZED && call.endpoint != Endpoint::Login {
            if let Some(token) = &sent_bearer {
                if self.credentials.invalidate(token) {
                    warn!("Backend rejected the bearer token, credential cleared");
                }
            }
        }

        Ok(RawResponse {
            status: status.as_u16(),
            content_type,
            body,
            elapsed: started.elapsed(),
        })
    }
}

async fn send_and_read(
    builder: reqwest::RequestBuilder,
) -> std::result::Result<(StatusCode, Option<String>, String), reqwest::Error> {
    let response = builder.send().await?;
    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = response.bytes().await?;
    Ok((status, content_type, String::from_utf8_lossy(&bytes).into_owned()))
}

/// Map a reqwest failure onto the error taxonomy
fn classify_error(err: &reqwest::Error, tier: TimeoutTier, deadline: Duration) -> TelemetryError {
    if err.is_timeout() {
        return TelemetryError::Timeout {
            tier,
            after: deadline,
        };
    }

    let message = error_chain(err);
    let lowered = message.to_lowercase();
    let kind = if err.is_redirect()
        || lowered.contains("certificate")
        || lowered.contains("tls")
        || lowered.contains("ssl")
    {
        TransportKind::PolicyBlocked
    } else {
        TransportKind::Network
    };

    TelemetryError::Transport { kind, message }
}

fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(base_url: &str) -> RequestEngine {
        let backend = BackendConfig {
            base_url: base_url.to_string(),
            ..BackendConfig::default()
        };
        RequestEngine::new(
            backend,
            TimeoutPolicy::default(),
            Arc::new(CredentialStore::in_memory()),
        )
        .unwrap()
    }

    #[test]
    fn test_tier_classification() {
        assert_eq!(Call::health().resolved_tier(), TimeoutTier::Health);
        assert_eq!(Call::metrics().resolved_tier(), TimeoutTier::BulkMetrics);
        assert_eq!(
            Call::new(Endpoint::Login, Method::Post).resolved_tier(),
            TimeoutTier::Default
        );
        assert_eq!(
            Call::metrics().with_tier(TimeoutTier::Health).resolved_tier(),
            TimeoutTier::Health
        );
    }

    #[test]
    fn test_default_deadlines() {
        let policy = TimeoutPolicy::default();
        assert_eq!(policy.deadline(TimeoutTier::Health), Duration::from_secs(8));
        assert_eq!(policy.deadline(TimeoutTier::BulkMetrics), Duration::from_secs(30));
        assert_eq!(policy.deadline(TimeoutTier::Default), Duration::from_secs(15));
    }

    #[test]
    fn test_url_join() {
        let engine = engine("http://soc.local:8000/");
        assert_eq!(
            engine.url_for(&Endpoint::Metrics),
            "http://soc.local:8000/api/dashboard/metrics"
        );
        assert_eq!(
            engine.url_for(&Endpoint::Other("api/alerts".into())),
            "http://soc.local:8000/api/alerts"
        );
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // nothing listens on the discard port
        let engine = engine("http://127.0.0.1:9");
        match engine.execute(&Call::health()).await {
            Err(TelemetryError::Transport { kind, .. }) => assert_eq!(kind, TransportKind::Network),
            other => panic!("expected transport error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_external_cancel() {
        let engine = engine("http://10.255.255.1");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = engine.execute_with_cancel(&Call::metrics(), &cancel).await;
        assert!(matches!(
            result,
            Err(TelemetryError::Cancelled) | Err(TelemetryError::Transport { .. })
        ));
    }
}
