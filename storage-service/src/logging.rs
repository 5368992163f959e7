// SPDX-License-Identifier: GPL-3.0-only

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const DEFAULT_LOG_PREFIX: &str = "cosmic-ext-storage-mountd.log";
const KEEP_DAYS: u64 = 7;

fn default_directives(config: &LoggingConfig) -> String {
    let level = config.level.as_directive();
    // zbus is noisy at debug.
    format!("warn,storage_service={level},storage_mounts={level},storage_udisks={level},zbus=warn")
}

pub(crate) fn init(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(config)));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    if !config.log_to_disk {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
        return;
    }

    match file_writer(config) {
        Ok((writer, guard)) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();

            // Keep the background logging worker alive for the duration of the process.
            let _ = LOG_GUARD.set(guard);
        }
        Err(e) => {
            eprintln!("cosmic-ext-storage-mountd: failed to initialize file logging: {e:#}");
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .init();
        }
    }
}

fn file_writer(
    config: &LoggingConfig,
) -> anyhow::Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let dir = config.directory.clone().unwrap_or_else(default_log_dir);
    let prefix = OsString::from(DEFAULT_LOG_PREFIX);

    if let Err(e) = fs::create_dir_all(&dir) {
        return Err(anyhow::anyhow!(
            "create log directory failed: {} ({})",
            dir.display(),
            e
        ));
    }

    cleanup_old_logs(&dir, &prefix);

    let appender = tracing_appender::rolling::daily(&dir, &prefix);
    Ok(tracing_appender::non_blocking(appender))
}

fn default_log_dir() -> PathBuf {
    if let Some(xdg_state) = std::env::var_os("XDG_STATE_HOME") {
        return PathBuf::from(xdg_state)
            .join("cosmic-ext-storage")
            .join("logs");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("state")
            .join("cosmic-ext-storage")
            .join("logs");
    }

    PathBuf::from("/tmp")
        .join("cosmic-ext-storage")
        .join("logs")
}

fn cleanup_old_logs(dir: &Path, prefix: &OsString) {
    let cutoff = SystemTime::now().checked_sub(Duration::from_secs(KEEP_DAYS * 24 * 60 * 60));
    let Some(cutoff) = cutoff else { return };

    let prefix = prefix.to_string_lossy();

    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }

        // Only touch files created by our rolling appender.
        if !entry.file_name().to_string_lossy().starts_with(prefix.as_ref()) {
            continue;
        }

        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        if modified < cutoff {
            let _ = fs::remove_file(entry.path());
        }
    }
}
