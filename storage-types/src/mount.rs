//! Mount data models

use serde::{Deserialize, Serialize};

use crate::MountError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountType {
    #[default]
    Device,
    Archive,
    NetworkStorage,
}

/// Why a mount point exists despite a failed mount.
///
/// Devices with an unreadable filesystem are still registered so they can be
/// offered for formatting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountCondition {
    #[default]
    None,
    UnknownFilesystem,
    UnsupportedFilesystem,
}

impl MountCondition {
    pub fn from_mount_error(mount_type: MountType, error: MountError) -> Self {
        if mount_type != MountType::Device {
            return Self::None;
        }

        match error {
            MountError::UnknownFilesystem => Self::UnknownFilesystem,
            MountError::UnsupportedFilesystem => Self::UnsupportedFilesystem,
            _ => Self::None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountAccessMode {
    #[default]
    ReadWrite,
    ReadOnly,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemountOption {
    #[default]
    MountNewDevice,
    RemountExistingDevice,
}

/// A mount completion as reported by the disk service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountEntry {
    pub source_path: String,
    pub mount_path: String,
    pub mount_type: MountType,
    pub error: MountError,
}

impl MountEntry {
    pub fn new(
        source_path: impl Into<String>,
        mount_path: impl Into<String>,
        mount_type: MountType,
        error: MountError,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            mount_path: mount_path.into(),
            mount_type,
            error,
        }
    }
}

/// One active mount (registry key: `mount_path`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountPoint {
    pub source_path: String,
    pub mount_path: String,
    pub mount_type: MountType,
    pub mount_condition: MountCondition,
    pub read_only: bool,
}

impl MountPoint {
    pub fn new(
        source_path: impl Into<String>,
        mount_path: impl Into<String>,
        mount_type: MountType,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            mount_path: mount_path.into(),
            mount_type,
            mount_condition: MountCondition::None,
            read_only: false,
        }
    }

    /// Last path component of the mount path, used as the label on remount.
    pub fn base_name(&self) -> &str {
        self.mount_path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }
}

/// Arguments of a `Mount` call to the disk service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountRequest {
    pub source_path: String,
    pub source_format: String,
    pub mount_label: String,
    pub options: Vec<String>,
    pub mount_type: MountType,
    pub access_mode: MountAccessMode,
    pub remount: RemountOption,
}

/// Result delivered to the caller of a mount request.
///
/// `mount_point` is populated even on failure; with a `MountCondition` it is
/// also registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountCompletion {
    pub error: MountError,
    pub mount_point: MountPoint,
}

impl MountCompletion {
    pub fn new(error: MountError, mount_point: MountPoint) -> Self {
        Self { error, mount_point }
    }

    pub fn into_result(self) -> Result<MountPoint, MountError> {
        if self.error.is_success() {
            Ok(self.mount_point)
        } else {
            Err(self.error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_only_applies_to_devices() {
        assert_eq!(
            MountCondition::from_mount_error(MountType::Device, MountError::UnknownFilesystem),
            MountCondition::UnknownFilesystem
        );
        assert_eq!(
            MountCondition::from_mount_error(MountType::Device, MountError::UnsupportedFilesystem),
            MountCondition::UnsupportedFilesystem
        );
        assert_eq!(
            MountCondition::from_mount_error(MountType::Archive, MountError::UnknownFilesystem),
            MountCondition::None
        );
        assert_eq!(
            MountCondition::from_mount_error(MountType::Device, MountError::Busy),
            MountCondition::None
        );
    }

    #[test]
    fn base_name_strips_trailing_slash() {
        let mp = MountPoint::new("/dev/sdb1", "/media/removable/USB DRIVE/", MountType::Device);
        assert_eq!(mp.base_name(), "USB DRIVE");
    }

    #[test]
    fn completion_into_result() {
        let mp = MountPoint::new("/dev/sdb1", "/media/removable/sdb1", MountType::Device);

        let ok = MountCompletion::new(MountError::Success, mp.clone());
        assert_eq!(ok.into_result(), Ok(mp.clone()));

        let failed = MountCompletion::new(MountError::Busy, mp);
        assert_eq!(failed.into_result(), Err(MountError::Busy));
    }
}
