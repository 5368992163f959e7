//! Disk data models
//!
//! `DiskInfo` is what the disk service reports for a block device. `Disk` is the
//! record the mount manager keeps for it, enriched with local mount state.

use serde::{Deserialize, Serialize};

/// Broad class of the physical device backing a disk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    #[default]
    Unknown,
    Usb,
    Sd,
    Optical,
    Mobile,
    Loop,
}

impl DeviceType {
    /// Infer the device type from a UDisks-style connection bus and media hints.
    pub fn from_connection_bus(bus: &str, optical: bool) -> Self {
        if optical {
            return Self::Optical;
        }

        match bus.to_lowercase().as_str() {
            "usb" => Self::Usb,
            "sdio" | "mmc" => Self::Sd,
            "loop" => Self::Loop,
            _ => Self::Unknown,
        }
    }
}

/// Device properties as reported by the disk service
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiskInfo {
    // === Identity ===
    /// Device path (e.g., "/dev/sdb1")
    pub device_path: String,

    /// Path shared by a whole device and all of its partitions
    pub storage_device_path: String,

    /// Mount path as seen by the service (empty if unmounted)
    pub mount_path: String,

    // === Topology ===
    /// Whole device rather than a partition
    pub is_parent: bool,

    /// Not backed by physical hardware (ignored by the manager)
    pub is_virtual: bool,

    // === Media ===
    pub is_read_only_hardware: bool,
    pub has_media: bool,
    pub on_boot_device: bool,
    pub on_removable_device: bool,

    // === Presentation hints ===
    pub is_hidden: bool,
    pub is_auto_mountable: bool,

    // === Filesystem ===
    pub device_label: String,
    pub file_system_type: String,
    pub uuid: String,

    // === Hardware ===
    pub vendor_name: String,
    pub product_name: String,
    pub total_size_in_bytes: u64,
    pub device_type: DeviceType,
}

/// One block device or partition known to the mount manager
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Disk {
    /// Registry key (e.g., "/dev/sdb1")
    pub device_path: String,

    /// Current mount path, empty if unmounted
    pub mount_path: String,

    pub storage_device_path: String,
    pub is_parent: bool,
    pub is_read_only_hardware: bool,

    /// Set when the last mount of this device was requested read-only
    pub write_disabled_by_policy: bool,

    pub has_media: bool,
    pub mounted: bool,

    /// The filesystem UUID has not been seen mounted during this session
    pub is_first_mount: bool,

    pub device_label: String,
    pub file_system_type: String,
    pub uuid: String,
    pub hidden: bool,
    pub is_auto_mountable: bool,
    pub on_boot_device: bool,
    pub on_removable_device: bool,
    pub vendor_name: String,
    pub product_name: String,
    pub total_size_in_bytes: u64,
    pub device_type: DeviceType,
}

impl Disk {
    /// Build a registry record from service properties.
    ///
    /// Mount state is not taken from `info`; the manager derives it from its
    /// own mount point registry.
    pub fn from_info(info: DiskInfo, write_disabled_by_policy: bool, is_first_mount: bool) -> Self {
        Self {
            device_path: info.device_path,
            mount_path: String::new(),
            storage_device_path: info.storage_device_path,
            is_parent: info.is_parent,
            is_read_only_hardware: info.is_read_only_hardware,
            write_disabled_by_policy,
            has_media: info.has_media,
            mounted: false,
            is_first_mount,
            device_label: info.device_label,
            file_system_type: info.file_system_type,
            uuid: info.uuid,
            hidden: info.is_hidden,
            is_auto_mountable: info.is_auto_mountable,
            on_boot_device: info.on_boot_device,
            on_removable_device: info.on_removable_device,
            vendor_name: info.vendor_name,
            product_name: info.product_name,
            total_size_in_bytes: info.total_size_in_bytes,
            device_type: info.device_type,
        }
    }

    /// Effective read-only state: hardware lock or policy.
    pub fn is_read_only(&self) -> bool {
        self.is_read_only_hardware || self.write_disabled_by_policy
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn set_mount_path(&mut self, mount_path: impl Into<String>) {
        self.mount_path = mount_path.into();
        self.mounted = !self.mount_path.is_empty();
    }

    pub fn clear_mount_path(&mut self) {
        self.mount_path.clear();
        self.mounted = false;
    }

    /// Get a human-readable display name for the disk
    pub fn display_name(&self) -> String {
        if !self.device_label.is_empty() {
            self.device_label.clone()
        } else if !self.product_name.is_empty() {
            self.product_name.clone()
        } else {
            self.device_path
                .split('/')
                .next_back()
                .unwrap_or(&self.device_path)
                .to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usb_info() -> DiskInfo {
        DiskInfo {
            device_path: "/dev/sdb1".to_string(),
            storage_device_path: "/org/freedesktop/UDisks2/drives/Kingston".to_string(),
            mount_path: "/media/removable/STICK".to_string(),
            has_media: true,
            on_removable_device: true,
            is_auto_mountable: true,
            device_label: "STICK".to_string(),
            file_system_type: "vfat".to_string(),
            uuid: "1234-ABCD".to_string(),
            product_name: "DataTraveler".to_string(),
            device_type: DeviceType::Usb,
            ..Default::default()
        }
    }

    #[test]
    fn from_info_ignores_service_mount_path() {
        let disk = Disk::from_info(usb_info(), false, true);

        assert_eq!(disk.device_path, "/dev/sdb1");
        assert!(disk.mount_path.is_empty());
        assert!(!disk.is_mounted());
        assert!(disk.is_first_mount);
        assert_eq!(disk.device_type, DeviceType::Usb);
    }

    #[test]
    fn read_only_combines_hardware_and_policy() {
        let mut disk = Disk::from_info(usb_info(), false, false);
        assert!(!disk.is_read_only());

        disk.write_disabled_by_policy = true;
        assert!(disk.is_read_only());

        disk.write_disabled_by_policy = false;
        disk.is_read_only_hardware = true;
        assert!(disk.is_read_only());
    }

    #[test]
    fn mount_path_drives_mounted_flag() {
        let mut disk = Disk::from_info(usb_info(), false, false);

        disk.set_mount_path("/media/removable/STICK");
        assert!(disk.is_mounted());

        disk.clear_mount_path();
        assert!(!disk.is_mounted());
        assert!(disk.mount_path.is_empty());
    }

    #[test]
    fn display_name_prefers_label_then_product() {
        let mut disk = Disk::from_info(usb_info(), false, false);
        assert_eq!(disk.display_name(), "STICK");

        disk.device_label.clear();
        assert_eq!(disk.display_name(), "DataTraveler");

        disk.product_name.clear();
        assert_eq!(disk.display_name(), "sdb1");
    }

    #[test]
    fn device_type_from_bus() {
        assert_eq!(DeviceType::from_connection_bus("usb", false), DeviceType::Usb);
        assert_eq!(DeviceType::from_connection_bus("sdio", false), DeviceType::Sd);
        assert_eq!(DeviceType::from_connection_bus("usb", true), DeviceType::Optical);
        assert_eq!(DeviceType::from_connection_bus("", false), DeviceType::Unknown);
    }

    #[test]
    fn test_disk_info_serialization() {
        let info = usb_info();
        let json = serde_json::to_string(&info).unwrap();
        let deserialized: DiskInfo = serde_json::from_str(&json).unwrap();

        assert_eq!(info, deserialized);
    }
}
