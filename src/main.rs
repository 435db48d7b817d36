use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod dispatch;
mod engine;
mod models;
mod notifier;
mod probe;
mod scheduler;
mod statuslog;
mod subscribers;
mod telegram;

use crate::config::{JsonFileStore, SharedSettings, DEFAULT_CONFIG_PATH};
use crate::engine::Monitor;
use crate::models::Inbound;
use crate::probe::IcmpProber;
use crate::scheduler::AutoProbeScheduler;
use crate::statuslog::StatusLog;
use crate::telegram::TelegramBot;

const CONFIG_ENV: &str = "VPN_PULSE_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(true)
        .init();

    let config_path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let store = JsonFileStore::new(&config_path);
    let settings = config::load_or_create(&store)
        .with_context(|| format!("Failed to load settings from {}", config_path))?;
    if !settings.has_bot_token() {
        bail!("Set telegram_bot_token in {} before starting", config_path);
    }

    let status_log = Arc::new(StatusLog::new(&settings.log_directory, settings.log_retention_days));
    status_log
        .ensure_dir()
        .await
        .with_context(|| format!("Failed to create log directory {}", settings.log_directory.display()))?;

    let bot = Arc::new(TelegramBot::new(&settings.telegram_bot_token)?);
    let me = bot.get_me().await.context("Telegram bot authorization failed")?;
    info!("Authorized as @{} ({})", me.username.as_deref().unwrap_or("unknown"), me.id);

    info!(
        target_address = %settings.target_address,
        probe_interval_secs = settings.probe_interval_seconds,
        auto_probe = settings.auto_probe_enabled,
        "VPN Pulse starting"
    );
    let status_port = settings.status_port;
    let monitor = Arc::new(Monitor::new(
        SharedSettings::new(settings, Box::new(store)),
        Arc::new(IcmpProber::new()),
        bot.clone(),
        status_log.clone(),
    ));

    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    let (tx, mut rx) = mpsc::channel::<Inbound>(64);
    let poll_bot = bot.clone();
    let poll_cancel = cancel.clone();
    tasks.push(tokio::spawn(async move { poll_bot.poll(tx, poll_cancel).await }));

    let dispatcher = monitor.clone();
    tasks.push(tokio::spawn(async move {
        while let Some(inbound) = rx.recv().await {
            let monitor = dispatcher.clone();
            tokio::spawn(async move {
                monitor.handle(inbound).await;
            });
        }
    }));

    tasks.push(AutoProbeScheduler::new(monitor.clone()).spawn(cancel.clone()));
    tasks.push(statuslog::spawn_purge_task(status_log, cancel.clone()));

    if let Some(port) = status_port {
        let api_monitor = monitor.clone();
        let api_cancel = cancel.clone();
        tasks.push(tokio::spawn(async move { api::start_server(port, api_monitor, api_cancel).await }));
    }

    signal::ctrl_c().await?;
    info!("Shutdown signal received. Stopping VPN Pulse...");
    cancel.cancel();

    for task in tasks {
        if let Err(e) = task.await {
            warn!("Background task ended abnormally: {}", e);
        }
    }
    Ok(())
}
