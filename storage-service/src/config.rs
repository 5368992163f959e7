// SPDX-License-Identifier: GPL-3.0-only

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use storage_mounts::ManagerConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LoggingLevel {
    pub fn as_directive(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LoggingLevel,
    pub log_to_disk: bool,
    /// Log directory; `$XDG_STATE_HOME/cosmic-ext-storage/logs` when unset.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LoggingLevel::Info,
            log_to_disk: true,
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub logging: LoggingConfig,
    pub manager: ManagerConfig,
}

impl ServiceConfig {
    /// Read `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        match fs::read_to_string(path) {
            Ok(raw) => Self::parse(&raw)
                .with_context(|| format!("invalid configuration in {}", path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

pub fn default_path() -> Option<PathBuf> {
    let base = match std::env::var_os("XDG_CONFIG_HOME") {
        Some(dir) => PathBuf::from(dir),
        None => PathBuf::from(std::env::var_os("HOME")?).join(".config"),
    };
    Some(base.join("cosmic-ext-storage").join("mountd.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = ServiceConfig::parse("").unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert!(config.logging.log_to_disk);
        assert!(!config.manager.refresh_on_start);
    }

    #[test]
    fn both_tables_are_read() {
        let config = ServiceConfig::parse(
            r#"
            [logging]
            level = "debug"
            log_to_disk = false
            directory = "/var/log/mountd"

            [manager]
            default_mount_options = ["nosuid", "nodev"]
            refresh_on_start = true
            "#,
        )
        .unwrap();

        assert_eq!(config.logging.level, LoggingLevel::Debug);
        assert!(!config.logging.log_to_disk);
        assert_eq!(
            config.logging.directory.as_deref(),
            Some(Path::new("/var/log/mountd"))
        );
        assert_eq!(config.manager.default_mount_options, ["nosuid", "nodev"]);
        assert!(config.manager.refresh_on_start);
    }

    #[test]
    fn unknown_level_is_rejected() {
        assert!(ServiceConfig::parse("[logging]\nlevel = \"loud\"").is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("cosmic-ext-storage-mountd-missing.toml");
        let _ = fs::remove_file(&path);
        assert_eq!(ServiceConfig::load(&path).unwrap(), ServiceConfig::default());
    }
}
