//! Liveness probing, independent from acquisition

use aegis_devkit::TestHarness;
use std::time::Duration;

#[tokio::test]
async fn test_probe_reachable_on_2xx() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    harness.backend.health(200).await;

    let prober = harness.prober(Duration::from_secs(30));
    assert!(!prober.is_reachable());
    assert!(prober.probe_once().await);
    assert!(prober.is_reachable());
    Ok(())
}

#[tokio::test]
async fn test_probe_unreachable_on_error_status() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    harness.backend.health(503).await;

    let prober = harness.prober(Duration::from_secs(30));
    assert!(!prober.probe_once().await);
    Ok(())
}

#[tokio::test]
async fn test_probe_unreachable_on_timeout() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    // health tier is 300ms in the harness config
    harness.backend.health_delayed(Duration::from_secs(2)).await;

    let prober = harness.prober(Duration::from_secs(30));
    let started = std::time::Instant::now();
    assert!(!prober.probe_once().await);
    assert!(started.elapsed() < Duration::from_secs(1));
    Ok(())
}

#[tokio::test]
async fn test_spawned_prober_publishes_reachability() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    harness.backend.health(200).await;

    let prober = harness.prober(Duration::from_millis(200));
    let mut reachable = prober.subscribe();
    prober.spawn();

    tokio::time::timeout(Duration::from_secs(2), reachable.wait_for(|r| *r)).await??;
    assert!(prober.is_reachable());

    harness.backend.reset().await;
    harness.backend.health(503).await;
    tokio::time::timeout(Duration::from_secs(2), reachable.wait_for(|r| !*r)).await??;

    prober.stop();
    Ok(())
}
