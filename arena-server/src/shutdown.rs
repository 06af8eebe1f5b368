//! Signal handling for graceful shutdown and config reload.

use crate::config::ConfigLoader;
use arena_core::config::{ConfigStore, RewardTable};
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::Notify;

/// Creates a future that completes when a shutdown signal is received.
///
/// Listens for SIGTERM and SIGINT (Ctrl+C).
pub async fn shutdown_signal() {
    let handlers = signal(SignalKind::terminate())
        .and_then(|sigterm| signal(SignalKind::interrupt()).map(|sigint| (sigterm, sigint)));
    let (mut sigterm, mut sigint) = match handlers {
        Ok(handlers) => handlers,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install signal handlers, falling back to Ctrl+C");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
}

/// Spawns a task that listens for SIGHUP and reloads the reward table.
///
/// Only `[rewards]` is applied at runtime; other sections need a restart.
/// Returns a Notify that stops the task.
pub fn spawn_config_reload_handler(
    config_loader: Arc<ConfigLoader>,
    rewards: ConfigStore<RewardTable>,
) -> Arc<Notify> {
    let shutdown_notify = Arc::new(Notify::new());
    let shutdown_notify_clone = shutdown_notify.clone();

    tokio::spawn(async move {
        let mut sighup = match signal(SignalKind::hangup()) {
            Ok(sighup) => sighup,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGHUP handler, config reload disabled");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    tracing::info!("Received SIGHUP, reloading configuration");
                    match config_loader.reload() {
                        Ok(loaded_config) => {
                            rewards.update(loaded_config.rewards.table).await;
                            tracing::info!(
                                version = rewards.version(),
                                "Reward table reloaded"
                            );
                        }
                        Err(e) => {
                            tracing::error!("Failed to reload configuration: {}", e);
                        }
                    }
                }
                _ = shutdown_notify_clone.notified() => {
                    tracing::debug!("Config reload handler shutting down");
                    break;
                }
            }
        }
    });

    shutdown_notify
}
