use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::SharedSettings;
use crate::models::{CheckOutcome, StatusSnapshot, Verdict};
use crate::notifier::Notifier;
use crate::probe::Prober;
use crate::scheduler::SchedulerStats;
use crate::statuslog::StatusLog;
use crate::subscribers::SubscriberRegistry;

/// Shared context for the command listener, the auto-probe timer and the
/// status endpoint.
pub struct Monitor {
    settings: SharedSettings,
    prober: Arc<dyn Prober>,
    notifier: Arc<dyn Notifier>,
    subscribers: SubscriberRegistry,
    status_log: Arc<StatusLog>,
    /// Cooldown gate. Held for the whole probe, so checks run one at a time.
    last_probe: Mutex<Option<Instant>>,
    last_verdict: RwLock<Option<Verdict>>,
    scheduler_stats: SchedulerStats,
}

/// Whole seconds left before another probe is admitted, if any.
pub fn cooldown_remaining(last_probe: Option<Instant>, now: Instant, interval: Duration) -> Option<u64> {
    let elapsed = now.saturating_duration_since(last_probe?);
    if elapsed >= interval {
        return None;
    }
    Some(interval.as_secs() - elapsed.as_secs())
}

impl Monitor {
    pub fn new(
        settings: SharedSettings,
        prober: Arc<dyn Prober>,
        notifier: Arc<dyn Notifier>,
        status_log: Arc<StatusLog>,
    ) -> Self {
        Self {
            settings,
            prober,
            notifier,
            subscribers: SubscriberRegistry::new(),
            status_log,
            last_probe: Mutex::new(None),
            last_verdict: RwLock::new(None),
            scheduler_stats: SchedulerStats::default(),
        }
    }

    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    pub fn subscribers(&self) -> &SubscriberRegistry {
        &self.subscribers
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub fn scheduler_stats(&self) -> &SchedulerStats {
        &self.scheduler_stats
    }

    /// Rate-limited status check. Callers queue on the gate; whoever gets
    /// in second within the interval is told how long to wait.
    pub async fn check_status(&self) -> CheckOutcome {
        let gate = self.last_probe.lock().await;
        self.admit(gate, Instant::now()).await
    }

    #[cfg(test)]
    pub async fn check_status_at(&self, now: Instant) -> CheckOutcome {
        let gate = self.last_probe.lock().await;
        self.admit(gate, now).await
    }

    async fn admit(&self, mut gate: MutexGuard<'_, Option<Instant>>, now: Instant) -> CheckOutcome {
        if let Some(wait_seconds) = cooldown_remaining(*gate, now, self.settings.probe_interval()) {
            debug!("Status check refused, {}s of cooldown left", wait_seconds);
            return CheckOutcome::Cooldown { wait_seconds };
        }
        *gate = Some(now);

        let settings = self.settings.snapshot();
        let reachable = self.prober.probe(&settings.target_address, settings.probe_timeout()).await;
        let verdict = Verdict::now(reachable);
        drop(gate);

        info!("{} is {}", settings.target_address, verdict.status());
        self.status_log.append(verdict.status().message()).await;
        *self.last_verdict.write().await = Some(verdict);
        CheckOutcome::Probed(verdict)
    }

    pub async fn last_verdict(&self) -> Option<Verdict> {
        *self.last_verdict.read().await
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        let settings = self.settings.snapshot();
        StatusSnapshot {
            target_address: settings.target_address,
            auto_probe_enabled: settings.auto_probe_enabled,
            subscribers: self.subscribers.len().await,
            scheduler_ticks: self.scheduler_stats.ticks(),
            scheduler_broadcasts: self.scheduler_stats.broadcasts(),
            last_verdict: self.last_verdict().await,
        }
    }
}
