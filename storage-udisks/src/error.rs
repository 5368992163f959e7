// SPDX-License-Identifier: GPL-3.0-only

//! Adapter errors and UDisks2 error name normalization

use storage_contracts::{StorageError, StorageErrorKind};
use storage_types::{FormatError, MountError, PartitionError, RenameError};
use thiserror::Error;
use zbus::DBusError;

#[derive(Error, Debug)]
pub enum DiskError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Mount point not found: {0}")]
    MountPointNotFound(String),

    #[error("D-Bus error: {0}")]
    DBusError(String),

    #[error("Zbus Error")]
    ZbusError(#[from] zbus::Error),
}

impl From<DiskError> for StorageError {
    fn from(err: DiskError) -> Self {
        let kind = match &err {
            DiskError::ConnectionFailed(_) => StorageErrorKind::Unavailable,
            DiskError::DeviceNotFound(_) | DiskError::MountPointNotFound(_) => {
                StorageErrorKind::NotFound
            }
            DiskError::ZbusError(inner) => match dbus_error_parts(inner) {
                Some((name, _)) if name.ends_with(".NotAuthorized") => {
                    StorageErrorKind::PermissionDenied
                }
                Some((name, _)) if name.ends_with(".ServiceUnknown") => {
                    StorageErrorKind::Unavailable
                }
                _ => StorageErrorKind::Internal,
            },
            DiskError::DBusError(_) => StorageErrorKind::Internal,
        };
        StorageError::new(kind, err.to_string())
    }
}

const UDISKS_ERROR: &str = "org.freedesktop.UDisks2.Error.";

/// Error name and message of a D-Bus method error.
pub(crate) fn dbus_error_parts(err: &zbus::Error) -> Option<(String, String)> {
    match err {
        zbus::Error::MethodError(name, detail, _) => Some((
            name.as_str().to_string(),
            detail.clone().unwrap_or_default(),
        )),
        zbus::Error::FDO(fdo) => Some((
            fdo.name().as_str().to_string(),
            fdo.description().unwrap_or_default().to_string(),
        )),
        _ => None,
    }
}

/// The part after `org.freedesktop.UDisks2.Error.`, or the full name for
/// errors from other services.
fn short_name(name: &str) -> &str {
    name.strip_prefix(UDISKS_ERROR).unwrap_or(name)
}

fn is_not_authorized(name: &str) -> bool {
    short_name(name).starts_with("NotAuthorized")
}

fn is_unknown_object(name: &str) -> bool {
    matches!(
        name,
        "org.freedesktop.DBus.Error.UnknownObject" | "org.freedesktop.DBus.Error.UnknownInterface"
    )
}

/// Map a UDisks2 mount / unmount failure.
pub fn mount_error_from_name(name: &str, message: &str) -> MountError {
    if is_not_authorized(name) {
        return MountError::InsufficientPermissions;
    }
    if is_unknown_object(name) {
        return MountError::InvalidDevicePath;
    }

    let message = message.to_ascii_lowercase();
    match short_name(name) {
        "AlreadyMounted" => MountError::PathAlreadyMounted,
        "NotMounted" => MountError::PathNotMounted,
        "OptionNotPermitted" => MountError::InvalidMountOptions,
        "DeviceBusy" | "AlreadyUnmounting" => MountError::Busy,
        "Cancelled" | "AlreadyCancelled" => MountError::Cancelled,
        "MountedByOtherUser" => MountError::InsufficientPermissions,
        "NotSupported" => MountError::UnsupportedFilesystem,
        "Failed" if message.contains("unknown filesystem") || message.contains("wrong fs type") => {
            MountError::UnknownFilesystem
        }
        "Failed" if message.contains("not supported") => MountError::UnsupportedFilesystem,
        "Failed" if message.contains("busy") => MountError::Busy,
        "Failed" if message.contains("error creating mount point") => {
            MountError::DirectoryCreationFailed
        }
        "Failed" => MountError::MountProgramFailed,
        _ => MountError::Unknown,
    }
}

pub fn format_error_from_name(name: &str, message: &str) -> FormatError {
    if is_unknown_object(name) {
        return FormatError::InvalidDevicePath;
    }

    let message = message.to_ascii_lowercase();
    match short_name(name) {
        n if n.starts_with("NotAuthorized") => FormatError::DeviceNotAllowed,
        "DeviceBusy" => FormatError::DeviceBeingFormatted,
        "NotSupported" => FormatError::UnsupportedFilesystem,
        "OptionNotPermitted" => FormatError::InvalidOptions,
        "Failed" if message.contains("not found") || message.contains("no such file") => {
            FormatError::FormatProgramNotFound
        }
        "Failed" => FormatError::FormatProgramFailed,
        _ => FormatError::Unknown,
    }
}

pub fn rename_error_from_name(name: &str, message: &str) -> RenameError {
    if is_unknown_object(name) {
        return RenameError::InvalidDevicePath;
    }

    let message = message.to_ascii_lowercase();
    match short_name(name) {
        n if n.starts_with("NotAuthorized") => RenameError::DeviceNotAllowed,
        "DeviceBusy" => RenameError::DeviceBeingRenamed,
        "NotSupported" => RenameError::UnsupportedFilesystem,
        "Failed" if message.contains("too long") => RenameError::LongName,
        "Failed" if message.contains("not found") || message.contains("no such file") => {
            RenameError::RenameProgramNotFound
        }
        "Failed" => RenameError::RenameProgramFailed,
        _ => RenameError::Unknown,
    }
}

pub fn partition_error_from_name(name: &str, message: &str) -> PartitionError {
    if is_unknown_object(name) {
        return PartitionError::InvalidDevicePath;
    }

    let message = message.to_ascii_lowercase();
    match short_name(name) {
        n if n.starts_with("NotAuthorized") => PartitionError::DeviceNotAllowed,
        "DeviceBusy" => PartitionError::DeviceBeingPartitioned,
        "Failed" if message.contains("not found") || message.contains("no such file") => {
            PartitionError::ProgramNotFound
        }
        "Failed" => PartitionError::ProgramFailed,
        _ => PartitionError::Unknown,
    }
}

pub fn mount_error_from_dbus(err: &zbus::Error) -> MountError {
    dbus_error_parts(err)
        .map(|(name, message)| mount_error_from_name(&name, &message))
        .unwrap_or(MountError::Unknown)
}

pub fn format_error_from_dbus(err: &zbus::Error) -> FormatError {
    dbus_error_parts(err)
        .map(|(name, message)| format_error_from_name(&name, &message))
        .unwrap_or(FormatError::Unknown)
}

pub fn rename_error_from_dbus(err: &zbus::Error) -> RenameError {
    dbus_error_parts(err)
        .map(|(name, message)| rename_error_from_name(&name, &message))
        .unwrap_or(RenameError::Unknown)
}

pub fn partition_error_from_dbus(err: &zbus::Error) -> PartitionError {
    dbus_error_parts(err)
        .map(|(name, message)| partition_error_from_name(&name, &message))
        .unwrap_or(PartitionError::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn udisks(short: &str) -> String {
        format!("{UDISKS_ERROR}{short}")
    }

    #[test]
    fn mount_errors_follow_udisks_names() {
        assert_eq!(
            mount_error_from_name(&udisks("AlreadyMounted"), ""),
            MountError::PathAlreadyMounted
        );
        assert_eq!(
            mount_error_from_name(&udisks("NotMounted"), ""),
            MountError::PathNotMounted
        );
        assert_eq!(
            mount_error_from_name(&udisks("NotAuthorizedCanObtain"), ""),
            MountError::InsufficientPermissions
        );
        assert_eq!(
            mount_error_from_name(&udisks("DeviceBusy"), ""),
            MountError::Busy
        );
        assert_eq!(
            mount_error_from_name("org.freedesktop.DBus.Error.UnknownObject", ""),
            MountError::InvalidDevicePath
        );
        assert_eq!(
            mount_error_from_name("org.example.Other", ""),
            MountError::Unknown
        );
    }

    #[test]
    fn generic_mount_failure_is_refined_by_message() {
        let failed = udisks("Failed");
        assert_eq!(
            mount_error_from_name(
                &failed,
                "Error mounting /dev/sdb1: wrong fs type, bad option, bad superblock"
            ),
            MountError::UnknownFilesystem
        );
        assert_eq!(
            mount_error_from_name(&failed, "Error creating mount point `/media/x`"),
            MountError::DirectoryCreationFailed
        );
        assert_eq!(
            mount_error_from_name(&failed, "mount exited with status 32"),
            MountError::MountProgramFailed
        );
    }

    #[test]
    fn format_and_rename_map_permissions_to_not_allowed() {
        assert_eq!(
            format_error_from_name(&udisks("NotAuthorized"), ""),
            FormatError::DeviceNotAllowed
        );
        assert_eq!(
            rename_error_from_name(&udisks("NotAuthorizedDismissed"), ""),
            RenameError::DeviceNotAllowed
        );
        assert_eq!(
            partition_error_from_name(&udisks("NotAuthorized"), ""),
            PartitionError::DeviceNotAllowed
        );
    }

    #[test]
    fn busy_devices_report_the_operation_in_progress() {
        assert_eq!(
            format_error_from_name(&udisks("DeviceBusy"), ""),
            FormatError::DeviceBeingFormatted
        );
        assert_eq!(
            rename_error_from_name(&udisks("DeviceBusy"), ""),
            RenameError::DeviceBeingRenamed
        );
        assert_eq!(
            partition_error_from_name(&udisks("DeviceBusy"), ""),
            PartitionError::DeviceBeingPartitioned
        );
    }

    #[test]
    fn missing_tools_are_detected() {
        let failed = udisks("Failed");
        assert_eq!(
            format_error_from_name(&failed, "mkfs.exfat: command not found"),
            FormatError::FormatProgramNotFound
        );
        assert_eq!(
            rename_error_from_name(&failed, "Label is too long"),
            RenameError::LongName
        );
        assert_eq!(
            partition_error_from_name(&failed, "Error wiping device"),
            PartitionError::ProgramFailed
        );
    }

    #[test]
    fn disk_errors_convert_to_storage_errors() {
        let err: StorageError = DiskError::DeviceNotFound("/dev/sdz".to_string()).into();
        assert_eq!(err.kind, StorageErrorKind::NotFound);
        assert!(err.message.contains("/dev/sdz"));
    }
}
