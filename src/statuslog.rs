//! Per-day status log files and their retention.
//!
//! Every status check appends one line to `DD-MM-YYYY.log` in the log
//! directory. A separate daily pass deletes files whose modification time is
//! strictly older than the retention window.

use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const PURGE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

const LINE_TIMESTAMP: &str = "%Y/%m/%d %H:%M:%S";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub removed: usize,
    pub kept: usize,
    pub failed: usize,
}

pub struct StatusLog {
    dir: PathBuf,
    retention: Duration,
}

impl StatusLog {
    pub fn new(dir: impl Into<PathBuf>, retention_days: u64) -> Self {
        Self {
            dir: dir.into(),
            retention: Duration::from_secs(retention_days.saturating_mul(24 * 60 * 60)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(date: NaiveDate) -> String {
        format!("{}.log", date.format("%d-%m-%Y"))
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(Self::file_name(date))
    }

    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Appends a line to today's file. Failures are logged and swallowed.
    pub async fn append(&self, status: &str) {
        self.append_at(Local::now(), status).await;
    }

    pub async fn append_at(&self, now: DateTime<Local>, status: &str) {
        let path = self.path_for(now.date_naive());
        let line = format!("{} {}\n", now.format(LINE_TIMESTAMP), status);
        if let Err(e) = write_line(&path, &line).await {
            warn!("Failed to write status log {}: {}", path.display(), e);
        }
    }

    /// Strictly older than the retention window; future mtimes never expire.
    pub fn is_expired(&self, modified: SystemTime, now: SystemTime) -> bool {
        match now.duration_since(modified) {
            Ok(age) => age > self.retention,
            Err(_) => false,
        }
    }

    pub async fn purge(&self) -> PurgeReport {
        self.purge_at(SystemTime::now()).await
    }

    pub async fn purge_at(&self, now: SystemTime) -> PurgeReport {
        let mut report = PurgeReport::default();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot read log directory {}: {}", self.dir.display(), e);
                return report;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Log directory listing interrupted: {}", e);
                    report.failed += 1;
                    break;
                }
            };
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Cannot stat {}: {}", path.display(), e);
                    report.failed += 1;
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }
            let modified = match metadata.modified() {
                Ok(modified) => modified,
                Err(e) => {
                    warn!("No modification time for {}: {}", path.display(), e);
                    report.failed += 1;
                    continue;
                }
            };
            if !self.is_expired(modified, now) {
                report.kept += 1;
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    info!("Removed expired log {}", path.display());
                    report.removed += 1;
                }
                Err(e) => {
                    warn!("Failed to remove {}: {}", path.display(), e);
                    report.failed += 1;
                }
            }
        }

        debug!(removed = report.removed, kept = report.kept, failed = report.failed, "Log purge pass done");
        report
    }
}

async fn write_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}

/// Purges every [`PURGE_INTERVAL`], first one interval after start.
pub fn spawn_purge_task(log: Arc<StatusLog>, cancel: CancellationToken) -> JoinHandle<()> {
    spawn_purge_task_every(log, PURGE_INTERVAL, cancel)
}

pub fn spawn_purge_task_every(
    log: Arc<StatusLog>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            dir = %log.dir().display(),
            retention_days = log.retention.as_secs() / 86_400,
            "Log purge task started"
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Log purge task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    log.purge().await;
                }
            }
        }
    })
}
