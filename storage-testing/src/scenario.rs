//! Declarative device layouts for the fake disk service
//!
//! Scenarios live as TOML files under `scenarios/` in this crate:
//!
//! ```toml
//! name = "usb-stick"
//!
//! [[devices]]
//! device_path = "/dev/sdb1"
//! storage_device_path = "/drives/usb1"
//! file_system_type = "vfat"
//!
//! [[mounts]]
//! source_path = "/dev/sdb1"
//! mount_path = "/media/removable/USB"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use storage_types::{DeviceType, DiskInfo, MountEntry, MountError, MountType};

use crate::errors::{Result, TestingError};
use crate::fake_service::FakeDiskService;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,
    #[serde(default)]
    pub mounts: Vec<MountSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub device_path: String,
    #[serde(default)]
    pub storage_device_path: String,
    #[serde(default)]
    pub parent: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default = "default_true")]
    pub auto_mountable: bool,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub file_system_type: String,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub device_type: DeviceType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountSpec {
    pub source_path: String,
    pub mount_path: String,
}

fn default_true() -> bool {
    true
}

impl DeviceSpec {
    pub fn to_info(&self) -> DiskInfo {
        DiskInfo {
            device_path: self.device_path.clone(),
            storage_device_path: self.storage_device_path.clone(),
            is_parent: self.parent,
            is_read_only_hardware: self.read_only,
            has_media: true,
            on_removable_device: self.auto_mountable,
            on_boot_device: !self.auto_mountable,
            is_auto_mountable: self.auto_mountable,
            device_label: self.label.clone(),
            file_system_type: self.file_system_type.clone(),
            uuid: self.uuid.clone(),
            device_type: self.device_type,
            ..Default::default()
        }
    }
}

impl Scenario {
    pub fn from_toml_str(name: &str, raw: &str) -> Result<Self> {
        let scenario: Self = toml::from_str(raw).map_err(|error| TestingError::ScenarioInvalid {
            name: name.to_string(),
            reason: error.to_string(),
        })?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn validate(&self) -> Result<()> {
        for mount in &self.mounts {
            if !self
                .devices
                .iter()
                .any(|device| device.device_path == mount.source_path)
            {
                return Err(TestingError::ScenarioInvalid {
                    name: self.name.clone(),
                    reason: format!("mount source {} is not a device", mount.source_path),
                });
            }
        }
        Ok(())
    }

    /// Publish the scenario's devices and mounts on `service`.
    pub fn install(&self, service: &FakeDiskService) {
        for device in &self.devices {
            service.add_device(device.to_info());
        }
        for mount in &self.mounts {
            service.add_mount_entry(MountEntry::new(
                &mount.source_path,
                &mount.mount_path,
                MountType::Device,
                MountError::Success,
            ));
        }
    }
}

pub fn scenarios_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios")
}

pub fn load_by_name(name: &str) -> Result<Scenario> {
    let dir = scenarios_root();
    let path = dir.join(format!("{name}.toml"));
    if !path.exists() {
        return Err(TestingError::ScenarioNotFound {
            name: name.to_string(),
            dir,
        });
    }

    let raw = fs::read_to_string(&path).map_err(|error| TestingError::ScenarioInvalid {
        name: name.to_string(),
        reason: error.to_string(),
    })?;
    Scenario::from_toml_str(name, &raw)
}
