//! Reminder daemon.
//!
//! Loads the config, opens the SQLite task store, and runs one scheduler per
//! enabled channel until Ctrl-C. Logs go to stderr.
//!
//! Usage: `reminderd [--check] [CONFIG_PATH]`

use anyhow::Context;
use reminder_engine::channels::{CloudWhatsAppAdapter, FcmPushAdapter};
use reminder_engine::config::{ConfigSeverity, validate_config};
use reminder_engine::store::SqliteStore;
use reminder_engine::{CycleDeps, ReminderConfig, ReminderService, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("reminder_engine=info,reminderd=info")),
        )
        .init();

    let mut check_only = false;
    let mut config_path = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--check" => check_only = true,
            other => config_path = Some(PathBuf::from(other)),
        }
    }
    let config_path = config_path.unwrap_or_else(ReminderConfig::default_config_path);

    let config = ReminderConfig::load(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    let mut blocking = 0usize;
    for issue in validate_config(&config) {
        match issue.severity {
            ConfigSeverity::Error => {
                blocking += 1;
                tracing::error!(id = %issue.id, "{}: {}", issue.title, issue.summary);
            }
            ConfigSeverity::Warning => {
                tracing::warn!(id = %issue.id, "{}: {}", issue.title, issue.summary);
            }
        }
    }
    if blocking > 0 {
        anyhow::bail!("{blocking} blocking config issue(s) in {}", config_path.display());
    }
    if check_only {
        tracing::info!("config at {} is valid", config_path.display());
        return Ok(());
    }

    let store = Arc::new(
        SqliteStore::open(&config.store.db_path)
            .with_context(|| format!("opening {}", config.store.db_path.display()))?,
    );
    tracing::info!(
        path = %config.store.db_path.display(),
        schema_version = ?store.schema_version()?,
        "task store opened"
    );
    let deps = CycleDeps {
        tasks: store.clone(),
        users: store,
        push: Arc::new(FcmPushAdapter::new(&config.push)?),
        whatsapp: Arc::new(CloudWhatsAppAdapter::new(&config.whatsapp)?),
        clock: Arc::new(SystemClock),
    };

    let mut service = ReminderService::from_config(&config, deps)?;
    service.start().await?;
    tracing::info!(channels = ?service.channels(), "reminderd started");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    tracing::info!("shutdown requested, waiting for in-flight cycles");
    service.stop().await;
    tracing::info!("reminderd shut down cleanly");
    Ok(())
}
