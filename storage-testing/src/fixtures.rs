//! Builders for common disk layouts

use storage_types::{DeviceType, Disk, DiskInfo, MountPoint, MountType};

/// A USB stick partition at `device_path`, on the drive `storage_device_path`.
pub fn usb_partition(device_path: &str, storage_device_path: &str) -> DiskInfo {
    let base = device_path.rsplit('/').next().unwrap_or(device_path);
    DiskInfo {
        device_path: device_path.to_string(),
        storage_device_path: storage_device_path.to_string(),
        has_media: true,
        on_removable_device: true,
        is_auto_mountable: true,
        device_label: base.to_uppercase(),
        file_system_type: "vfat".to_string(),
        uuid: format!("uuid-{base}"),
        vendor_name: "Acme".to_string(),
        product_name: "Flash Drive".to_string(),
        total_size_in_bytes: 16 * 1024 * 1024 * 1024,
        device_type: DeviceType::Usb,
        ..Default::default()
    }
}

/// The whole-drive block device backing `usb_partition` children.
pub fn usb_parent(device_path: &str, storage_device_path: &str) -> DiskInfo {
    DiskInfo {
        is_parent: true,
        device_label: String::new(),
        file_system_type: String::new(),
        uuid: String::new(),
        ..usb_partition(device_path, storage_device_path)
    }
}

/// An internal, non auto-mountable partition on the boot device.
pub fn boot_partition(device_path: &str) -> DiskInfo {
    DiskInfo {
        device_path: device_path.to_string(),
        storage_device_path: "/org/freedesktop/UDisks2/drives/internal".to_string(),
        has_media: true,
        on_boot_device: true,
        file_system_type: "ext4".to_string(),
        uuid: format!("uuid-boot-{}", device_path.rsplit('/').next().unwrap_or_default()),
        device_type: DeviceType::Unknown,
        ..Default::default()
    }
}

/// Registry record for `info`, unmounted and writable.
pub fn disk(info: &DiskInfo) -> Disk {
    Disk::from_info(info.clone(), false, false)
}

pub fn read_only_disk(info: &DiskInfo) -> Disk {
    Disk {
        is_read_only_hardware: true,
        ..disk(info)
    }
}

pub fn device_mount_point(source_path: &str, mount_path: &str) -> MountPoint {
    MountPoint::new(source_path, mount_path, MountType::Device)
}
