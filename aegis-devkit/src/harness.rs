/*!
Test Harness pour la couche télémétrie

Facilite l'écriture de scénarios bout-en-bout avec:
- Démarrage automatique du backend simulé
- Pile complète (identifiants, moteur, source, ordonnanceur) câblée dessus
- Attente de livraisons avec délai maximal
*/

use crate::mock_backend::MockBackend;
use aegis_telemetry::decoder::Decoder;
use aegis_telemetry::{
    AcquisitionSource, CredentialStore, Delivery, HealthProber, PollingConfig, PollingScheduler,
    RequestEngine, Simulator, SourceController, SourceMode, TelemetryConfig, TimeoutPolicy,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Harness de test complet contre un backend simulé
pub struct TestHarness {
    pub backend: MockBackend,
    pub config: TelemetryConfig,
    pub credentials: Arc<CredentialStore>,
    pub engine: RequestEngine,
}

impl TestHarness {
    /// Démarre le backend et construit le moteur de requêtes
    pub async fn new() -> Result<Self> {
        // Les événements tracing de la bibliothèque passent par `log` (feature "log")
        env_logger::try_init().ok();

        let backend = MockBackend::start().await;
        let config = backend.config();
        let credentials = Arc::new(CredentialStore::in_memory());
        let engine = RequestEngine::new(
            config.backend.clone(),
            TimeoutPolicy::from(&config.timeouts),
            Arc::clone(&credentials),
        )
        .context("Failed to build request engine")?;

        Ok(Self {
            backend,
            config,
            credentials,
            engine,
        })
    }

    /// Reconstruit le moteur avec un autre délai bulk-metrics
    pub fn with_bulk_timeout(mut self, timeout_ms: u64) -> Result<Self> {
        self.config.timeouts.bulk_metrics_ms = timeout_ms;
        self.engine = RequestEngine::new(
            self.config.backend.clone(),
            TimeoutPolicy::from(&self.config.timeouts),
            Arc::clone(&self.credentials),
        )
        .context("Failed to rebuild request engine")?;
        Ok(self)
    }

    /// Source avec simulateur déterministe
    pub fn source(&self, mode: SourceMode) -> Arc<SourceController> {
        Arc::new(SourceController::with_parts(
            self.engine.clone(),
            Decoder::default(),
            Simulator::seeded(42),
            mode,
        ))
    }

    pub fn scheduler(&self, mode: SourceMode, interval: Duration) -> PollingScheduler {
        let source: Arc<dyn AcquisitionSource> = self.source(mode);
        PollingScheduler::new(
            source,
            PollingConfig {
                mode,
                interval,
                enabled: true,
            },
        )
    }

    pub fn prober(&self, interval: Duration) -> Arc<HealthProber> {
        Arc::new(HealthProber::new(self.engine.clone(), interval))
    }

    /// Attend une livraison de séquence strictement supérieure à `after`
    pub async fn wait_for_delivery(
        &self,
        scheduler: &PollingScheduler,
        after: u64,
        timeout_ms: u64,
    ) -> Result<Option<Delivery>> {
        let start = Instant::now();

        while start.elapsed() < Duration::from_millis(timeout_ms) {
            if let Some(delivery) = scheduler.latest().filter(|d| d.sequence > after) {
                log::info!(
                    "✅ Delivery #{} received ({})",
                    delivery.sequence,
                    delivery.outcome.label()
                );
                return Ok(Some(delivery));
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        log::warn!("⏰ Timeout waiting for delivery after #{}", after);
        Ok(None)
    }

    /// Comme `wait_for_delivery`, mais échoue si rien n'arrive
    pub async fn expect_delivery(
        &self,
        scheduler: &PollingScheduler,
        after: u64,
        timeout_ms: u64,
    ) -> Result<Delivery> {
        match self.wait_for_delivery(scheduler, after, timeout_ms).await? {
            Some(delivery) => Ok(delivery),
            None => anyhow::bail!("No delivery after #{} within {}ms", after, timeout_ms),
        }
    }
}
