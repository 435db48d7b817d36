//! Auto-probe timer.
//!
//! The timer fires every `auto_probe_interval_minutes` for the life of the
//! process. Whether a fire does anything is decided by the
//! `auto_probe_enabled` flag at that moment: when set, the status check runs
//! through the same cooldown gate as interactive checks and the result is
//! broadcast to every subscriber.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::Monitor;
use crate::models::{BroadcastReport, CheckOutcome};

pub const AUTO_PREFIX: &str = "Automatic status:";

#[derive(Debug, Default)]
pub struct SchedulerStats {
    ticks: AtomicU64,
    broadcasts: AtomicU64,
}

impl SchedulerStats {
    /// Timer fires, enabled or not.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn broadcasts(&self) -> u64 {
        self.broadcasts.load(Ordering::Relaxed)
    }
}

pub struct AutoProbeScheduler {
    monitor: Arc<Monitor>,
    period: Duration,
}

impl AutoProbeScheduler {
    pub fn new(monitor: Arc<Monitor>) -> Self {
        let period = monitor.settings().snapshot().auto_probe_interval();
        Self::with_period(monitor, period)
    }

    pub fn with_period(monitor: Arc<Monitor>, period: Duration) -> Self {
        Self { monitor, period }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period_secs = self.period.as_secs(), "Auto-probe timer started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Auto-probe timer shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            info!("Auto-probe timer shutting down mid-tick");
                            break;
                        }
                        _ = self.on_tick(&cancel) => {}
                    }
                }
            }
        }
    }

    /// One timer fire. Returns the broadcast report when something was sent.
    pub async fn on_tick(&self, cancel: &CancellationToken) -> Option<BroadcastReport> {
        let stats = self.monitor.scheduler_stats();
        stats.ticks.fetch_add(1, Ordering::Relaxed);

        if !self.monitor.settings().auto_probe_enabled() {
            debug!("Auto-probe disabled, tick ignored");
            return None;
        }

        let outcome = match self.monitor.check_status().await {
            CheckOutcome::Cooldown { wait_seconds } => {
                debug!("Auto-probe waiting {}s for the cooldown", wait_seconds);
                tokio::select! {
                    _ = cancel.cancelled() => return None,
                    _ = tokio::time::sleep(Duration::from_secs(wait_seconds)) => {}
                }
                self.monitor.check_status().await
            }
            outcome => outcome,
        };

        let CheckOutcome::Probed(verdict) = outcome else {
            info!("Auto-probe skipped, cooldown still active");
            return None;
        };

        let message = format!("{} {}", AUTO_PREFIX, verdict.status().message());
        let report = self.monitor.subscribers().broadcast(self.monitor.notifier(), &message).await;
        stats.broadcasts.fetch_add(1, Ordering::Relaxed);
        info!(delivered = report.delivered, failed = report.failed, "Auto-probe broadcast sent");
        Some(report)
    }
}
