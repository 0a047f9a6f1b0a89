//! Periodic acquisition driver
//!
//! `Idle -> Running -> Stopped`. One timer task runs cycles back to back at a
//! fixed cadence; `refresh()` and `set_mode()` add out-of-band cycles.
//!
//! Delivery rules, all checked under the same lock that `stop()` takes:
//! - nothing is delivered once `stop()` has returned
//! - a cycle started before a mode switch is discarded
//! - a cycle finishing after a later-started one is discarded, so results
//!   arrive in the order cycles were started

use crate::config::PollingSettings;
use crate::error::{Result, TelemetryError};
use crate::health::{ConnectionHealth, HealthSnapshot, HealthTracker};
use crate::outcome::AcquisitionOutcome;
use crate::source::{AcquisitionSource, SourceMode};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

/// Settings handed over by the UI layer
#[derive(Debug, Clone, PartialEq)]
pub struct PollingConfig {
    pub mode: SourceMode,
    pub interval: Duration,
    pub enabled: bool,
}

impl From<&PollingSettings> for PollingConfig {
    fn from(settings: &PollingSettings) -> Self {
        Self {
            mode: settings.mode,
            interval: settings.interval(),
            enabled: settings.enabled,
        }
    }
}

/// One delivered cycle result
#[derive(Debug, Clone)]
pub struct Delivery {
    pub sequence: u64,
    pub mode: SourceMode,
    pub outcome: Arc<AcquisitionOutcome>,
    pub health: ConnectionHealth,
}

struct Gate {
    state: SchedulerState,
    /// Bumped on every mode switch
    epoch: u64,
    next_sequence: u64,
    last_delivered: u64,
}

struct Inner {
    source: Arc<dyn AcquisitionSource>,
    gate: Mutex<Gate>,
    tracker: HealthTracker,
    deliveries: watch::Sender<Option<Delivery>>,
    cancel: CancellationToken,
}

pub struct PollingScheduler {
    inner: Arc<Inner>,
    config: PollingConfig,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl PollingScheduler {
    pub fn new(source: Arc<dyn AcquisitionSource>, config: PollingConfig) -> Self {
        source.set_mode(config.mode);
        let (deliveries, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                source,
                gate: Mutex::new(Gate {
                    state: SchedulerState::Idle,
                    epoch: 0,
                    next_sequence: 0,
                    last_delivered: 0,
                }),
                tracker: HealthTracker::new(),
                deliveries,
                cancel: CancellationToken::new(),
            }),
            config,
            timer: Mutex::new(None),
        }
    }

    /// Run one cycle now, then one per interval
    pub fn start(&self) -> Result<()> {
        {
            let mut gate = self.inner.gate.lock();
            match gate.state {
                SchedulerState::Running => return Ok(()),
                SchedulerState::Stopped => {
                    return Err(TelemetryError::InvalidState("scheduler already stopped"))
                }
                SchedulerState::Idle => {}
            }
            if !self.config.enabled {
                info!("Polling disabled, scheduler stays idle");
                return Ok(());
            }
            gate.state = SchedulerState::Running;
        }

        info!(
            "Starting polling scheduler ({} mode, every {:?})",
            self.inner.source.mode(),
            self.config.interval
        );

        let inner = Arc::clone(&self.inner);
        let interval = self.config.interval;
        *self.timer.lock() = Some(tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = inner.cancel.cancelled() => break,
                    _ = timer.tick() => {
                        // periodic cycles never overlap each other
                        run_cycle(Arc::clone(&inner), inner.cancel.clone()).await;
                    }
                }
            }
            debug!("Polling timer stopped");
        }));
        Ok(())
    }

    /// Stop the timer; any cycle still in flight completes but is discarded
    pub fn stop(&self) {
        {
            let mut gate = self.inner.gate.lock();
            if gate.state == SchedulerState::Stopped {
                return;
            }
            gate.state = SchedulerState::Stopped;
        }
        self.inner.cancel.cancel();
        info!("Polling scheduler stopped");
    }

    /// Wait for the timer task to wind down after `stop()`
    pub async fn join(&self) {
        let handle = self.timer.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Out-of-band cycle; the periodic schedule is left as is
    ///
    /// The handle resolves to whether the result was delivered.
    pub fn refresh(&self) -> Result<JoinHandle<bool>> {
        if self.state() != SchedulerState::Running {
            return Err(TelemetryError::InvalidState("scheduler is not running"));
        }
        debug!("Manual refresh requested");
        Ok(self.spawn_cycle())
    }

    /// Switch source mode and re-acquire immediately
    ///
    /// Results of cycles started under the previous mode are discarded.
    /// Returns the re-acquisition handle when the scheduler is running.
    pub fn set_mode(&self, mode: SourceMode) -> Option<JoinHandle<bool>> {
        self.inner.source.set_mode(mode);
        let running = {
            let mut gate = self.inner.gate.lock();
            gate.epoch += 1;
            gate.state == SchedulerState::Running
        };
        info!("Source mode set to {}", mode);
        running.then(|| self.spawn_cycle())
    }

    fn spawn_cycle(&self) -> JoinHandle<bool> {
        let cancel = self.inner.cancel.clone();
        tokio::spawn(run_cycle(Arc::clone(&self.inner), cancel))
    }

    pub fn mode(&self) -> SourceMode {
        self.inner.source.mode()
    }

    pub fn state(&self) -> SchedulerState {
        self.inner.gate.lock().state
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Delivery>> {
        self.inner.deliveries.subscribe()
    }

    pub fn latest(&self) -> Option<Delivery> {
        self.inner.deliveries.borrow().clone()
    }

    pub fn health(&self) -> ConnectionHealth {
        self.inner.tracker.connection()
    }

    pub fn is_healthy(&self) -> bool {
        self.health().is_healthy()
    }

    pub fn health_snapshot(&self) -> HealthSnapshot {
        self.inner.tracker.snapshot()
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Acquire once and hand the result to the gate
async fn run_cycle(inner: Arc<Inner>, cancel: CancellationToken) -> bool {
    let (sequence, epoch) = {
        let mut gate = inner.gate.lock();
        if gate.state != SchedulerState::Running {
            return false;
        }
        gate.next_sequence += 1;
        (gate.next_sequence, gate.epoch)
    };

    let mode = inner.source.mode();
    debug!("Cycle {} started ({} mode)", sequence, mode);
    let outcome = inner.source.acquire().await;
    inner.deliver(sequence, epoch, mode, outcome, &cancel)
}

impl Inner {
    fn deliver(
        &self,
        sequence: u64,
        epoch: u64,
        mode: SourceMode,
        outcome: AcquisitionOutcome,
        cancel: &CancellationToken,
    ) -> bool {
        let mut gate = self.gate.lock();
        if gate.state != SchedulerState::Running || cancel.is_cancelled() {
            debug!("Cycle {} finished after stop, result discarded", sequence);
            return false;
        }
        if epoch != gate.epoch {
            debug!("Cycle {} started before a mode switch, result discarded", sequence);
            return false;
        }
        if sequence <= gate.last_delivered {
            debug!("Cycle {} overtaken by a later cycle, result discarded", sequence);
            return false;
        }
        gate.last_delivered = sequence;

        let health = self.tracker.record(&outcome);
        debug!("Cycle {} delivered: {}", sequence, outcome.label());
        self.deliveries.send_replace(Some(Delivery {
            sequence,
            mode,
            outcome: Arc::new(outcome),
            health,
        }));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Simulator;
    use crate::outcome::DataSource;
    use async_trait::async_trait;
    use parking_lot::RwLock;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Source with scripted per-call delays
    struct ScriptedSource {
        mode: RwLock<SourceMode>,
        calls: AtomicUsize,
        delays: Mutex<VecDeque<Duration>>,
        live_delay: Duration,
        simulator: Simulator,
    }

    impl ScriptedSource {
        fn new(live_delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                mode: RwLock::new(SourceMode::Live),
                calls: AtomicUsize::new(0),
                delays: Mutex::new(VecDeque::new()),
                live_delay,
                simulator: Simulator::seeded(99),
            })
        }

        fn with_delays(delays: &[u64]) -> Arc<Self> {
            let source = Self::new(Duration::ZERO);
            source
                .delays
                .lock()
                .extend(delays.iter().map(|ms| Duration::from_millis(*ms)));
            source
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AcquisitionSource for ScriptedSource {
        async fn acquire(&self) -> AcquisitionOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mode = self.mode();
            let delay = self.delays.lock().pop_front().unwrap_or(match mode {
                SourceMode::Live => self.live_delay,
                SourceMode::Simulated => Duration::ZERO,
            });
            tokio::time::sleep(delay).await;
            AcquisitionOutcome::Success {
                metrics: self.simulator.generate().unwrap(),
                source: match mode {
                    SourceMode::Live => DataSource::Live,
                    SourceMode::Simulated => DataSource::Simulated,
                },
            }
        }

        fn mode(&self) -> SourceMode {
            *self.mode.read()
        }

        fn set_mode(&self, mode: SourceMode) {
            *self.mode.write() = mode;
        }
    }

    fn config(interval_secs: u64) -> PollingConfig {
        PollingConfig {
            mode: SourceMode::Live,
            interval: Duration::from_secs(interval_secs),
            enabled: true,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_runs_immediately_then_on_cadence() {
        let source = ScriptedSource::new(Duration::ZERO);
        let scheduler = PollingScheduler::new(source.clone(), config(5));
        let mut rx = scheduler.subscribe();

        scheduler.start().unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref().unwrap().sequence, 1);
        assert_eq!(source.calls(), 1);
        assert!(scheduler.is_healthy());

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(source.calls(), 3);
        assert_eq!(scheduler.latest().unwrap().sequence, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_delivery_after_stop() {
        let source = ScriptedSource::new(Duration::from_secs(2));
        let scheduler = PollingScheduler::new(source.clone(), config(5));

        scheduler.start().unwrap();
        settle().await;
        assert_eq!(source.calls(), 1);

        scheduler.stop();
        assert_eq!(scheduler.state(), SchedulerState::Stopped);

        tokio::time::sleep(Duration::from_secs(12)).await;
        scheduler.join().await;
        assert!(scheduler.latest().is_none());
        assert_eq!(source.calls(), 1);
        assert_eq!(scheduler.health(), ConnectionHealth::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mode_switch_triggers_one_cycle_and_drops_stale() {
        let source = ScriptedSource::new(Duration::from_secs(1));
        let scheduler = PollingScheduler::new(source.clone(), config(30));

        scheduler.start().unwrap();
        settle().await;
        assert_eq!(source.calls(), 1);

        let handle = scheduler.set_mode(SourceMode::Simulated).unwrap();
        assert!(handle.await.unwrap());
        assert_eq!(source.calls(), 2);

        let delivery = scheduler.latest().unwrap();
        assert_eq!(delivery.mode, SourceMode::Simulated);
        assert_eq!(delivery.sequence, 2);

        // the live cycle finishes now and must not overwrite the simulated result
        tokio::time::sleep(Duration::from_secs(2)).await;
        let delivery = scheduler.latest().unwrap();
        assert_eq!(delivery.sequence, 2);
        assert_eq!(delivery.mode, SourceMode::Simulated);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_keeps_schedule() {
        let source = ScriptedSource::new(Duration::ZERO);
        let scheduler = PollingScheduler::new(source.clone(), config(5));

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(scheduler.refresh().unwrap().await.unwrap());
        assert_eq!(source.calls(), 2);

        // the periodic tick still lands at t=5s
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_delivered_in_start_order() {
        // start cycle immediate, first refresh slow, second refresh fast
        let source = ScriptedSource::with_delays(&[0, 3_000, 0]);
        let scheduler = PollingScheduler::new(source.clone(), config(60));

        scheduler.start().unwrap();
        settle().await;
        let slow = scheduler.refresh().unwrap();
        settle().await;
        let fast = scheduler.refresh().unwrap();

        assert!(fast.await.unwrap());
        assert!(!slow.await.unwrap());
        assert_eq!(scheduler.latest().unwrap().sequence, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_scheduler_stays_idle() {
        let source = ScriptedSource::new(Duration::ZERO);
        let mut cfg = config(5);
        cfg.enabled = false;
        let scheduler = PollingScheduler::new(source.clone(), cfg);

        scheduler.start().unwrap();
        settle().await;
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(source.calls(), 0);
        assert!(scheduler.refresh().is_err());
        assert!(scheduler.set_mode(SourceMode::Simulated).is_none());
        assert_eq!(scheduler.mode(), SourceMode::Simulated);
    }

    #[tokio::test]
    async fn test_restart_after_stop_is_rejected() {
        let scheduler = PollingScheduler::new(ScriptedSource::new(Duration::ZERO), config(5));
        scheduler.start().unwrap();
        scheduler.stop();
        assert!(matches!(
            scheduler.start(),
            Err(TelemetryError::InvalidState(_))
        ));
    }
}
