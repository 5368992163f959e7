// SPDX-License-Identifier: GPL-3.0-only

//! Resolve device paths and mount points to UDisks2 block objects

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use udisks2::block::BlockProxy;
use udisks2::filesystem::FilesystemProxy;
use zbus::Connection;
use zbus::zvariant::OwnedObjectPath;

use crate::dbus::{decode_c_string, decode_mount_points};
use crate::error::DiskError;
use crate::manager::UDisks2ManagerProxy;

/// Device path of every block object seen, so removals can be reported by
/// device path after the object is gone.
#[derive(Debug, Default)]
pub struct BlockIndex {
    devices: HashMap<OwnedObjectPath, String>,
}

impl BlockIndex {
    pub fn insert(&mut self, object_path: OwnedObjectPath, device_path: String) {
        self.devices.insert(object_path, device_path);
    }

    pub fn remove(&mut self, object_path: &OwnedObjectPath) -> Option<String> {
        self.devices.remove(object_path)
    }

    pub fn device_for_object(&self, object_path: &OwnedObjectPath) -> Option<String> {
        self.devices.get(object_path).cloned()
    }

    pub fn object_for_device(&self, device_path: &str) -> Option<OwnedObjectPath> {
        self.devices
            .iter()
            .find(|(_, device)| device.as_str() == device_path)
            .map(|(object, _)| object.clone())
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

pub type SharedBlockIndex = std::sync::Arc<Mutex<BlockIndex>>;

pub(crate) fn lock(index: &Mutex<BlockIndex>) -> std::sync::MutexGuard<'_, BlockIndex> {
    index.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Preferred device of a block object, falling back to its kernel device.
pub async fn block_device_path(
    connection: &Connection,
    object_path: &OwnedObjectPath,
) -> Result<String, DiskError> {
    let proxy = BlockProxy::builder(connection)
        .path(object_path)?
        .build()
        .await?;

    let preferred = decode_c_string(&proxy.preferred_device().await?);
    if !preferred.is_empty() {
        return Ok(preferred);
    }
    Ok(decode_c_string(&proxy.device().await?))
}

/// All block objects with their device paths; also refreshes `index`.
pub async fn list_block_devices(
    connection: &Connection,
    index: &Mutex<BlockIndex>,
) -> Result<Vec<(OwnedObjectPath, String)>, DiskError> {
    let manager = UDisks2ManagerProxy::new(connection)
        .await
        .map_err(|e| DiskError::ConnectionFailed(e.to_string()))?;
    let objects = manager.get_block_devices(HashMap::new()).await?;

    let mut devices = Vec::with_capacity(objects.len());
    for object in objects {
        match block_device_path(connection, &object).await {
            Ok(device) if !device.is_empty() => devices.push((object, device)),
            Ok(_) => {}
            Err(e) => tracing::debug!(object = %object.as_str(), error = %e, "skipping block object"),
        }
    }

    let mut index = lock(index);
    for (object, device) in &devices {
        index.insert(object.clone(), device.clone());
    }
    Ok(devices)
}

/// Resolve a device path (e.g. "/dev/sdb1") to its block object.
pub async fn block_object_path_for_device(
    connection: &Connection,
    index: &Mutex<BlockIndex>,
    device_path: &str,
) -> Result<OwnedObjectPath, DiskError> {
    if let Some(object) = lock(index).object_for_device(device_path) {
        return Ok(object);
    }

    list_block_devices(connection, index)
        .await?
        .into_iter()
        .find(|(_, device)| device == device_path)
        .map(|(object, _)| object)
        .ok_or_else(|| DiskError::DeviceNotFound(device_path.to_string()))
}

/// Mount points of a block object; empty if it carries no filesystem.
pub async fn mount_points_of(
    connection: &Connection,
    object_path: &OwnedObjectPath,
) -> Result<Vec<String>, DiskError> {
    let proxy = FilesystemProxy::builder(connection)
        .path(object_path)?
        .build()
        .await?;
    match proxy.mount_points().await {
        Ok(raw) => Ok(decode_mount_points(raw)),
        // No Filesystem interface on this object.
        Err(_) => Ok(Vec::new()),
    }
}

/// Resolve a mount path to the block object mounted there and its device path.
pub async fn block_object_path_for_mount_point(
    connection: &Connection,
    index: &Mutex<BlockIndex>,
    mount_path: &str,
) -> Result<(OwnedObjectPath, String), DiskError> {
    for (object, device) in list_block_devices(connection, index).await? {
        if mount_points_of(connection, &object)
            .await?
            .iter()
            .any(|mp| mp == mount_path)
        {
            return Ok((object, device));
        }
    }
    Err(DiskError::MountPointNotFound(mount_path.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(path: &str) -> OwnedObjectPath {
        OwnedObjectPath::try_from(path.to_string()).unwrap()
    }

    #[test]
    fn index_resolves_both_directions() {
        let mut index = BlockIndex::default();
        index.insert(
            object("/org/freedesktop/UDisks2/block_devices/sdb1"),
            "/dev/sdb1".to_string(),
        );

        assert_eq!(
            index.object_for_device("/dev/sdb1"),
            Some(object("/org/freedesktop/UDisks2/block_devices/sdb1"))
        );
        assert_eq!(
            index.remove(&object("/org/freedesktop/UDisks2/block_devices/sdb1")),
            Some("/dev/sdb1".to_string())
        );
        assert!(index.is_empty());
    }
}
