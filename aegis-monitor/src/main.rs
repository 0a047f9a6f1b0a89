//! Aegis Monitor - telemetry supervisor for the SOC dashboard
//!
//! Composition root for the acquisition layer:
//! - Loads configuration (TOML file, `.env`, environment overrides)
//! - Restores or acquires the bearer credential
//! - Runs the polling scheduler and the health prober
//! - Logs every delivered outcome until Ctrl-C

use aegis_telemetry::auth;
use aegis_telemetry::{
    AcquisitionOutcome, AcquisitionSource, CredentialStore, Delivery, HealthProber, KeyringVault,
    MemoryVault, PollingConfig, PollingScheduler, RequestEngine, SourceController,
    TelemetryConfig, TimeoutPolicy, TokenVault,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

fn credential_store(config: &TelemetryConfig) -> Arc<CredentialStore> {
    let vault: Box<dyn TokenVault> = if config.credentials.persist {
        Box::new(KeyringVault::new(
            config.credentials.keyring_service.clone(),
            config.credentials.keyring_key.clone(),
        ))
    } else {
        Box::new(MemoryVault::new())
    };
    let store = CredentialStore::new(vault);
    store.restore();
    Arc::new(store)
}

/// Log in with `AEGIS_USERNAME` / `AEGIS_PASSWORD` when both are set
async fn login_from_env(engine: &RequestEngine) {
    let (Ok(username), Ok(password)) = (
        std::env::var("AEGIS_USERNAME"),
        std::env::var("AEGIS_PASSWORD"),
    ) else {
        return;
    };

    match auth::authenticate(engine, &username, &password).await {
        Ok(session) => info!(
            "Logged in as {} ({})",
            session.user.username,
            session.user.role.as_deref().unwrap_or("no role")
        ),
        Err(e) => warn!("Login failed, continuing without credential: {}", e),
    }
}

fn report(delivery: &Delivery) {
    match delivery.outcome.as_ref() {
        AcquisitionOutcome::Success { metrics, source } => info!(
            "#{} {:?}: cpu {:.1}% mem {:.1}% disk {:.1}% latency {:.0}ms nodes {} threats {}",
            delivery.sequence,
            source,
            metrics.cpu_usage(),
            metrics.memory_usage(),
            metrics.disk_usage(),
            metrics.network_latency(),
            metrics.online_nodes(),
            metrics.threat_count()
        ),
        AcquisitionOutcome::Degraded { metrics, reason } => warn!(
            "#{} degraded ({}), showing simulated data: cpu {:.1}% threats {}",
            delivery.sequence,
            reason,
            metrics.cpu_usage(),
            metrics.threat_count()
        ),
        AcquisitionOutcome::Failure { kind, message } => {
            error!("#{} failed ({}): {}", delivery.sequence, kind, message)
        }
    }

    if let Ok(json) = serde_json::to_string(delivery.outcome.as_ref()) {
        debug!("Outcome payload: {}", json);
    }
}

async fn run(config: TelemetryConfig) -> Result<()> {
    let credentials = credential_store(&config);
    let engine = RequestEngine::new(
        config.backend.clone(),
        TimeoutPolicy::from(&config.timeouts),
        credentials,
    )
    .context("Failed to build request engine")?;

    login_from_env(&engine).await;

    let prober = Arc::new(HealthProber::new(engine.clone(), config.prober.interval()));
    if config.prober.enabled {
        prober.spawn();
    }
    let mut reachability = prober.subscribe();

    let source: Arc<dyn AcquisitionSource> =
        Arc::new(SourceController::new(engine, config.polling.mode));
    let scheduler = PollingScheduler::new(source, PollingConfig::from(&config.polling));
    let mut deliveries = scheduler.subscribe();
    scheduler.start().context("Failed to start polling")?;

    loop {
        tokio::select! {
            changed = deliveries.changed() => {
                if changed.is_err() {
                    break;
                }
                let latest = deliveries.borrow_and_update().clone();
                if let Some(delivery) = latest {
                    report(&delivery);
                }
            }
            changed = reachability.changed() => {
                if changed.is_err() {
                    break;
                }
                let reachable = *reachability.borrow_and_update();
                debug!("Backend reachable: {}", reachable);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    scheduler.stop();
    prober.stop();
    scheduler.join().await;

    let snapshot = scheduler.health_snapshot();
    info!(
        "Delivered {} cycles, {} consecutive failures at exit",
        snapshot.cycles, snapshot.consecutive_failures
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("aegis_monitor=info,aegis_telemetry=info")),
        )
        .init();

    info!("Aegis Monitor starting...");

    let config = TelemetryConfig::load()
        .await
        .context("Failed to load configuration")?;
    info!(
        "Backend {} in {} mode, polling every {}s",
        config.backend.base_url, config.polling.mode, config.polling.interval_secs
    );

    run(config).await.context("Monitor execution failed")
}
