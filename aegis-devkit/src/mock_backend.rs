/*!
Backend SOC simulé (wiremock)

Expose les trois routes consommées par la couche télémétrie:
- `GET /health` pour la sonde de disponibilité
- `GET /api/dashboard/metrics` pour la collecte
- `POST /api/auth/login` pour l'authentification

Chaque réponse est scriptée par le test: statut, corps brut, délai.
*/

use aegis_telemetry::config::{BackendConfig, TelemetryConfig};
use serde_json::Value;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

pub const HEALTH_PATH: &str = "/health";
pub const METRICS_PATH: &str = "/api/dashboard/metrics";
pub const LOGIN_PATH: &str = "/api/auth/login";

pub struct MockBackend {
    server: MockServer,
}

impl MockBackend {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        log::info!("🧪 Mock backend listening on {}", server.uri());
        Self { server }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            base_url: self.uri(),
            health_path: HEALTH_PATH.to_string(),
            metrics_path: METRICS_PATH.to_string(),
            login_path: LOGIN_PATH.to_string(),
        }
    }

    /// Config pointant sur ce backend, délais courts, sans trousseau
    pub fn config(&self) -> TelemetryConfig {
        let mut config = TelemetryConfig::default();
        config.backend = self.backend_config();
        config.timeouts.health_ms = 300;
        config.timeouts.bulk_metrics_ms = 300;
        config.timeouts.default_ms = 500;
        config.polling.interval_secs = 1;
        config.prober.interval_secs = 1;
        config.credentials.persist = false;
        config
    }

    /// Métriques JSON, réponse 200 permanente
    pub async fn metrics_ok(&self, body: Value) {
        self.metrics_respond(ResponseTemplate::new(200).set_body_json(body), None)
            .await;
    }

    /// Corps brut avec statut et type de contenu arbitraires
    pub async fn metrics_raw(&self, status: u16, body: impl Into<String>, content_type: &str) {
        let template =
            ResponseTemplate::new(status).set_body_raw(body.into().into_bytes(), content_type);
        self.metrics_respond(template, None).await;
    }

    /// Réponse retardée, servie `times` fois puis retirée
    pub async fn metrics_delayed(&self, body: Value, delay: Duration, times: u64) {
        let template = ResponseTemplate::new(200)
            .set_body_json(body)
            .set_delay(delay);
        self.metrics_respond(template, Some(times)).await;
    }

    /// Statut arbitraire avec délai, réponse permanente
    pub async fn metrics_status_delayed(&self, status: u16, body: Value, delay: Duration) {
        let template = ResponseTemplate::new(status)
            .set_body_json(body)
            .set_delay(delay);
        self.metrics_respond(template, None).await;
    }

    /// Réponse servie `times` fois, prioritaire sur les réponses permanentes
    pub async fn metrics_once(&self, status: u16, body: Value, times: u64) {
        let template = ResponseTemplate::new(status).set_body_json(body);
        self.metrics_respond(template, Some(times)).await;
    }

    async fn metrics_respond(&self, template: ResponseTemplate, times: Option<u64>) {
        let mock = Mock::given(method("GET"))
            .and(path(METRICS_PATH))
            .respond_with(template);
        match times {
            Some(n) => mock.up_to_n_times(n).with_priority(1).mount(&self.server).await,
            None => mock.with_priority(5).mount(&self.server).await,
        }
    }

    pub async fn health(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path(HEALTH_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_json(serde_json::json!({
                "status": if status < 300 { "ok" } else { "down" }
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn health_delayed(&self, delay: Duration) {
        Mock::given(method("GET"))
            .and(path(HEALTH_PATH))
            .respond_with(ResponseTemplate::new(200).set_delay(delay))
            .mount(&self.server)
            .await;
    }

    pub async fn login(&self, status: u16, body: Value) {
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Retire toutes les réponses scriptées et l'historique
    pub async fn reset(&self) {
        self.server.reset().await;
        log::info!("🧹 Mock backend reset");
    }

    pub async fn requests_to(&self, route: &str) -> Vec<Request> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|request| request.url.path() == route)
            .collect()
    }

    /// En-têtes `Authorization` reçus sur une route, dans l'ordre d'arrivée
    pub async fn authorization_headers(&self, route: &str) -> Vec<Option<String>> {
        self.requests_to(route)
            .await
            .iter()
            .map(|request| {
                request
                    .headers
                    .get("authorization")
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string)
            })
            .collect()
    }
}
