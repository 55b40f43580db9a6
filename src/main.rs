//! autosleepd - inactivity-driven game server shutdown daemon.
//!
//! Polls a game server through an external rcon binary and shuts it down
//! once nobody has been online for the configured idle window, warning
//! connected players first and backing off the moment anyone returns.

mod bus;
mod config;
mod error;
mod monitor;
mod rcon;

use crate::bus::EventBus;
use crate::config::Config;
use crate::monitor::Monitor;
use crate::rcon::{CommandChannel, RconProcess};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("configuration is invalid ({} error(s))", errors.len());
    }

    info!(
        rcon_path = %config.rcon.path.display(),
        watch_interval_secs = config.monitor.watch_interval_secs,
        shutdown_timeout_secs = config.monitor.shutdown_timeout_secs,
        "Starting autosleepd"
    );

    let channel: Arc<dyn CommandChannel> = Arc::new(RconProcess::new(config.rcon.path.clone()));
    let bus = Arc::new(EventBus::new());

    // Log the server header once at startup. The server may simply not be
    // up yet, so a failure here is not fatal.
    match channel.get_info().await {
        Ok(header) => info!(header = %header.trim(), "Server header"),
        Err(e) => warn!(error = %e, "Server not reachable yet"),
    }

    // Notifier: reflect monitor events into the log. External consumers
    // (status displays, alert hooks) subscribe the same way.
    {
        let mut player_counts = bus.player_count_changed.subscribe();
        let mut shutdowns = bus.auto_shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(count) = player_counts.recv() => {
                        info!(count, "Players online");
                    }
                    Some(()) = shutdowns.recv() => {
                        info!("Server was shut down for inactivity");
                    }
                    else => break,
                }
            }
        });
    }

    let monitor = Arc::new(Monitor::new(channel, bus, &config.monitor));
    let token = CancellationToken::new();
    let monitor_task = tokio::spawn(Arc::clone(&monitor).run(token.clone()));

    tokio::signal::ctrl_c().await?;
    info!("Received ctrl-c, shutting down");
    token.cancel();
    monitor_task.await?;

    Ok(())
}
