// SPDX-License-Identifier: GPL-3.0-only

use storage_contracts::DiskMountObserver;
use storage_types::{
    DeviceEvent, Disk, DiskEvent, FormatError, FormatEvent, MountError, MountEvent, MountPoint,
    PartitionError, PartitionEvent, RenameError, RenameEvent,
};
use tracing::{info, warn};

/// Logs every manager notification.
pub struct LoggingObserver;

impl DiskMountObserver for LoggingObserver {
    fn on_auto_mountable_disk_event(&self, event: DiskEvent, disk: &Disk) {
        info!(?event, device = %disk.device_path, name = %disk.display_name(), "removable disk");
    }

    fn on_boot_device_disk_event(&self, event: DiskEvent, disk: &Disk) {
        info!(?event, device = %disk.device_path, name = %disk.display_name(), "boot device disk");
    }

    fn on_device_event(&self, event: DeviceEvent, device_path: &str) {
        info!(?event, device = device_path, "device");
    }

    fn on_mount_event(&self, event: MountEvent, error: MountError, mount_point: &MountPoint) {
        if error.is_success() {
            info!(
                ?event,
                source = %mount_point.source_path,
                mount_path = %mount_point.mount_path,
                read_only = mount_point.read_only,
                "mount"
            );
        } else {
            warn!(?event, %error, source = %mount_point.source_path, "mount failed");
        }
    }

    fn on_format_event(
        &self,
        event: FormatEvent,
        error: FormatError,
        device_path: &str,
        device_label: &str,
    ) {
        if error.is_success() {
            info!(?event, device = device_path, label = device_label, "format");
        } else {
            warn!(?event, %error, device = device_path, "format failed");
        }
    }

    fn on_partition_event(
        &self,
        event: PartitionEvent,
        error: PartitionError,
        device_path: &str,
        device_label: &str,
    ) {
        if error.is_success() {
            info!(?event, device = device_path, label = device_label, "partition");
        } else {
            warn!(?event, %error, device = device_path, "partition failed");
        }
    }

    fn on_rename_event(
        &self,
        event: RenameEvent,
        error: RenameError,
        device_path: &str,
        device_label: &str,
    ) {
        if error.is_success() {
            info!(?event, device = device_path, label = device_label, "rename");
        } else {
            warn!(?event, %error, device = device_path, "rename failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use storage_types::DiskInfo;

    use super::*;

    #[test]
    fn disk_events_log_the_display_name() {
        let disk = Disk::from_info(
            DiskInfo {
                device_path: "/dev/sdb1".to_string(),
                product_name: "DataTraveler".to_string(),
                ..Default::default()
            },
            false,
            false,
        );
        assert_eq!(disk.display_name(), "DataTraveler");

        LoggingObserver.on_auto_mountable_disk_event(DiskEvent::Added, &disk);
        LoggingObserver.on_boot_device_disk_event(DiskEvent::Removed, &disk);
    }
}
