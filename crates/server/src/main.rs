mod bootstrap;
mod health;
pub mod notifier;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use opsboard_core::config::{AppConfig, LoadOptions};
use opsboard_core::Role;
use opsboard_db::repositories::SqlApprovalRequestRepository;

use crate::notifier::PendingCountNotifier;

fn init_logging(config: &AppConfig) {
    use opsboard_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await?;

    // Full-queue depth notifier; per-session notifiers are scoped to the
    // resolver's own role when sessions attach.
    let requests = Arc::new(SqlApprovalRequestRepository::new(app.db_pool.clone()));
    let notifier = PendingCountNotifier::new(
        requests,
        Role::Admin,
        Duration::from_secs(app.config.notifier.refresh_interval_secs),
    );
    let mut notifier_handle = notifier.start().await;
    let mut pending_counts = notifier_handle.subscribe();
    tokio::spawn(async move {
        while pending_counts.changed().await.is_ok() {
            let pending = *pending_counts.borrow();
            tracing::info!(event_name = "system.pending_queue_depth", pending);
        }
    });

    tracing::info!(event_name = "system.server.started", "opsboard-server started");
    wait_for_shutdown().await?;
    notifier_handle.stop();
    tracing::info!(event_name = "system.server.stopping", "opsboard-server stopping");

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
