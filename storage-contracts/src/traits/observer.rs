// SPDX-License-Identifier: GPL-3.0-only

use storage_types::{
    DeviceEvent, Disk, DiskEvent, FormatError, FormatEvent, MountError, MountEvent, MountPoint,
    PartitionError, PartitionEvent, RenameError, RenameEvent,
};

/// Receives mount manager notifications.
///
/// Callbacks run after the registries reflect the event, never while the
/// manager's state is locked, so an observer may query the manager.
pub trait DiskMountObserver: Send + Sync {
    /// Disk events for disks the system may mount automatically.
    fn on_auto_mountable_disk_event(&self, _event: DiskEvent, _disk: &Disk) {}

    /// Disk events for fixed / boot device disks.
    fn on_boot_device_disk_event(&self, _event: DiskEvent, _disk: &Disk) {}

    fn on_device_event(&self, _event: DeviceEvent, _device_path: &str) {}

    fn on_mount_event(&self, _event: MountEvent, _error: MountError, _mount_point: &MountPoint) {}

    fn on_format_event(
        &self,
        _event: FormatEvent,
        _error: FormatError,
        _device_path: &str,
        _device_label: &str,
    ) {
    }

    fn on_partition_event(
        &self,
        _event: PartitionEvent,
        _error: PartitionError,
        _device_path: &str,
        _device_label: &str,
    ) {
    }

    fn on_rename_event(
        &self,
        _event: RenameEvent,
        _error: RenameError,
        _device_path: &str,
        _device_label: &str,
    ) {
    }
}
