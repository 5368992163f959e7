//! Filesystem models used by format and rename operations

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Filesystems a removable device can be formatted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatFileSystemType {
    Vfat,
    Exfat,
    Ntfs,
}

impl FormatFileSystemType {
    /// Name understood by the disk service and mkfs tooling
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vfat => "vfat",
            Self::Exfat => "exfat",
            Self::Ntfs => "ntfs",
        }
    }
}

impl fmt::Display for FormatFileSystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatFileSystemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vfat" | "fat" | "fat32" => Ok(Self::Vfat),
            "exfat" => Ok(Self::Exfat),
            "ntfs" => Ok(Self::Ntfs),
            other => Err(format!("unsupported format filesystem: {other}")),
        }
    }
}

/// Disk property change applied only if the format or rename succeeds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChange {
    /// New filesystem type (None for a rename)
    pub file_system_type: Option<String>,
    pub label: String,
}
