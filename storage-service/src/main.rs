// SPDX-License-Identifier: GPL-3.0-only

//! COSMIC Ext Storage mount daemon
//!
//! Owns one [`DiskMountManager`] backed by UDisks2 and logs every lifecycle
//! event it reports until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use storage_mounts::DiskMountManager;
use storage_udisks::UdisksDiskService;

mod config;
mod logging;
mod observer;

use config::ServiceConfig;
use observer::LoggingObserver;

#[derive(Debug, Parser)]
#[command(version, about = "Disk and mount lifecycle daemon")]
struct Args {
    /// Configuration file (default: $XDG_CONFIG_HOME/cosmic-ext-storage/mountd.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = args.config.or_else(config::default_path);
    let config = match &config_path {
        Some(path) => ServiceConfig::load(path)?,
        None => ServiceConfig::default(),
    };

    logging::init(&config.logging);

    tracing::info!(
        "Starting COSMIC Ext Storage mount daemon v{}",
        env!("CARGO_PKG_VERSION")
    );
    if let Some(path) = &config_path {
        tracing::debug!(path = %path.display(), "configuration source");
    }

    let (service, signals) = UdisksDiskService::connect()
        .await
        .context("connecting to UDisks2")?;
    tracing::info!("Connected to UDisks2 on the system bus");

    let manager = DiskMountManager::new(service.clone(), config.manager);
    let _observer = manager.add_observer(Arc::new(LoggingObserver));
    manager.start(signals);

    if !manager.config().refresh_on_start
        && !manager.ensure_mount_info_refreshed(false).await
    {
        tracing::warn!("Initial registry refresh failed; will retry on next request");
    }
    tracing::info!(
        disks = manager.disks().len(),
        mount_points = manager.mount_points().len(),
        "Mount daemon ready"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal");

    manager.shutdown();
    service.stop_watching();

    tracing::info!("COSMIC Ext Storage mount daemon shutting down");
    Ok(())
}
