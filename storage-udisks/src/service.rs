// SPDX-License-Identifier: GPL-3.0-only

//! [`ExternalDiskService`] over the UDisks2 system service

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use storage_contracts::{
    ExternalDiskService, ServiceSignal, SignalSender, SignalStream, StorageError, signal_channel,
};
use storage_types::{
    DiskInfo, FormatError, MountAccessMode, MountEntry, MountError, MountRequest, MountType,
    PartitionError, RemountOption, RenameError,
};
use tokio::task::JoinHandle;
use udisks2::block::BlockProxy;
use udisks2::filesystem::FilesystemProxy;
use udisks2::partitiontable::PartitionTableProxy;
use zbus::Connection;
use zbus::zvariant::{OwnedObjectPath, Value};

use crate::error::{
    DiskError, format_error_from_dbus, mount_error_from_dbus, partition_error_from_dbus,
    rename_error_from_dbus,
};
use crate::label::check_label;
use crate::properties::disk_info;
use crate::resolve::{
    BlockIndex, SharedBlockIndex, block_object_path_for_device, block_object_path_for_mount_point,
    list_block_devices, mount_points_of,
};
use crate::watcher;

/// Offset of the single partition created by `single_partition_format`.
const PARTITION_OFFSET: u64 = 1024 * 1024;
/// MBR type for FAT32 with LBA addressing.
const PARTITION_TYPE: &str = "0x0c";

#[derive(Clone)]
pub struct UdisksDiskService {
    connection: Connection,
    signals: SignalSender,
    index: SharedBlockIndex,
    watcher: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl std::fmt::Debug for UdisksDiskService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdisksDiskService")
            .field("known_blocks", &crate::resolve::lock(&self.index).len())
            .finish()
    }
}

impl UdisksDiskService {
    /// Connect to the system bus and start watching UDisks2 objects.
    pub async fn connect() -> Result<(Arc<Self>, SignalStream), DiskError> {
        let connection = Connection::system()
            .await
            .map_err(|e| DiskError::ConnectionFailed(e.to_string()))?;
        Self::with_connection(connection).await
    }

    pub async fn with_connection(
        connection: Connection,
    ) -> Result<(Arc<Self>, SignalStream), DiskError> {
        let (signals, stream) = signal_channel();
        let index: SharedBlockIndex = Arc::new(Mutex::new(BlockIndex::default()));

        // Seed the index so early removals can still be named.
        let known = list_block_devices(&connection, &index).await?;
        tracing::debug!(blocks = known.len(), "UDisks2 block index seeded");

        let watcher = watcher::spawn(connection.clone(), index.clone(), signals.clone()).await?;

        let service = Arc::new(Self {
            connection,
            signals,
            index,
            watcher: Arc::new(Mutex::new(Some(watcher))),
        });
        Ok((service, stream))
    }

    /// Stop forwarding UDisks2 object signals.
    pub fn stop_watching(&self) {
        let handle = self
            .watcher
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    async fn filesystem(
        &self,
        object: &OwnedObjectPath,
    ) -> Result<FilesystemProxy<'static>, DiskError> {
        Ok(FilesystemProxy::builder(&self.connection)
            .path(object.clone())?
            .build()
            .await?)
    }

    async fn block(&self, object: &OwnedObjectPath) -> Result<BlockProxy<'static>, DiskError> {
        Ok(BlockProxy::builder(&self.connection)
            .path(object.clone())?
            .build()
            .await?)
    }

    async fn mount_object(&self, object: &OwnedObjectPath, request: &MountRequest) -> MountEntry {
        let failed = |error| {
            MountEntry::new(
                request.source_path.as_str(),
                "",
                request.mount_type,
                error,
            )
        };

        let filesystem = match self.filesystem(object).await {
            Ok(proxy) => proxy,
            Err(e) => {
                tracing::warn!(device = %request.source_path, error = %e, "no filesystem proxy");
                return failed(MountError::InvalidDevicePath);
            }
        };

        if request.remount == RemountOption::RemountExistingDevice
            && let Err(e) = filesystem.unmount(HashMap::new()).await
        {
            let error = mount_error_from_dbus(&e);
            if error != MountError::PathNotMounted {
                tracing::warn!(device = %request.source_path, error = %e, "unmount before remount failed");
                return failed(error);
            }
        }

        let options = mount_options(request);
        let mut opts: HashMap<&str, Value<'_>> = HashMap::new();
        if let Some(options) = options.as_deref() {
            opts.insert("options", Value::from(options));
        }
        if !request.source_format.is_empty() {
            opts.insert("fstype", Value::from(request.source_format.as_str()));
        }

        match filesystem.mount(opts).await {
            Ok(mount_path) => MountEntry::new(
                request.source_path.as_str(),
                mount_path,
                request.mount_type,
                MountError::Success,
            ),
            Err(e) => {
                tracing::warn!(device = %request.source_path, error = %e, "mount failed");
                failed(mount_error_from_dbus(&e))
            }
        }
    }

    async fn format_object(
        &self,
        object: &OwnedObjectPath,
        filesystem: &str,
        label: &str,
    ) -> FormatError {
        if let Err(problem) = check_label(filesystem, label) {
            return problem.into();
        }

        let block = match self.block(object).await {
            Ok(block) => block,
            Err(e) => {
                tracing::warn!(error = %e, "no block proxy");
                return FormatError::InvalidDevicePath;
            }
        };

        let mut options: HashMap<&str, Value<'_>> = HashMap::new();
        if !label.is_empty() {
            options.insert("label", Value::from(label));
        }
        options.insert("update-partition-type", Value::from(true));

        match block.format(filesystem, options).await {
            Ok(()) => FormatError::Success,
            Err(e) => {
                tracing::warn!(object = %object.as_str(), error = %e, "format failed");
                format_error_from_dbus(&e)
            }
        }
    }

    async fn rename_object(&self, object: &OwnedObjectPath, volume_name: &str) -> RenameError {
        let filesystem_type = match self.block(object).await {
            Ok(block) => block.id_type().await.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "no block proxy");
                return RenameError::InvalidDevicePath;
            }
        };
        if let Err(problem) = check_label(&filesystem_type, volume_name) {
            return problem.into();
        }

        let filesystem = match self.filesystem(object).await {
            Ok(proxy) => proxy,
            Err(_) => return RenameError::InvalidDevicePath,
        };
        match filesystem.set_label(volume_name, HashMap::new()).await {
            Ok(()) => RenameError::Success,
            Err(e) => {
                tracing::warn!(object = %object.as_str(), error = %e, "set label failed");
                rename_error_from_dbus(&e)
            }
        }
    }

    async fn partition_object(&self, object: &OwnedObjectPath) -> Result<(), zbus::Error> {
        let block = BlockProxy::builder(&self.connection)
            .path(object)?
            .build()
            .await?;
        block.format("dos", HashMap::new()).await?;

        let table = PartitionTableProxy::builder(&self.connection)
            .path(object)?
            .build()
            .await?;
        let partition = table
            .create_partition(PARTITION_OFFSET, 0, PARTITION_TYPE, "", HashMap::new())
            .await?;
        tracing::debug!(partition = %partition.as_str(), "created partition");
        Ok(())
    }
}

/// Value of the `options` mount option, if any.
fn mount_options(request: &MountRequest) -> Option<String> {
    let mut options: Vec<&str> = request
        .options
        .iter()
        .map(String::as_str)
        .filter(|o| !o.is_empty())
        .collect();
    if request.access_mode == MountAccessMode::ReadOnly && !options.contains(&"ro") {
        options.push("ro");
    }
    (!options.is_empty()).then(|| options.join(","))
}

#[async_trait]
impl ExternalDiskService for UdisksDiskService {
    async fn mount(&self, request: MountRequest) -> bool {
        // UDisks2 only mounts block devices.
        if request.mount_type != MountType::Device {
            return false;
        }

        let object =
            match block_object_path_for_device(&self.connection, &self.index, &request.source_path)
                .await
            {
                Ok(object) => object,
                Err(e) => {
                    tracing::warn!(device = %request.source_path, error = %e, "mount rejected");
                    return false;
                }
            };

        let service = self.clone();
        tokio::spawn(async move {
            let entry = service.mount_object(&object, &request).await;
            service.signals.emit(ServiceSignal::MountCompleted(entry));
        });
        true
    }

    async fn unmount(&self, mount_path: &str) -> MountError {
        let (object, device) =
            match block_object_path_for_mount_point(&self.connection, &self.index, mount_path)
                .await
            {
                Ok(found) => found,
                Err(DiskError::MountPointNotFound(_)) => return MountError::PathNotMounted,
                Err(e) => {
                    tracing::warn!(mount_path, error = %e, "unmount lookup failed");
                    return MountError::Unknown;
                }
            };

        let filesystem = match self.filesystem(&object).await {
            Ok(proxy) => proxy,
            Err(_) => return MountError::InvalidDevicePath,
        };
        match filesystem.unmount(HashMap::new()).await {
            Ok(()) => MountError::Success,
            Err(e) => {
                tracing::warn!(device = %device, mount_path, error = %e, "unmount failed");
                mount_error_from_dbus(&e)
            }
        }
    }

    async fn enumerate_devices(&self) -> Result<Vec<String>, StorageError> {
        Ok(list_block_devices(&self.connection, &self.index)
            .await?
            .into_iter()
            .map(|(_, device)| device)
            .collect())
    }

    async fn enumerate_mount_entries(&self) -> Result<Vec<MountEntry>, StorageError> {
        let mut entries = Vec::new();
        for (object, device) in list_block_devices(&self.connection, &self.index).await? {
            for mount_path in mount_points_of(&self.connection, &object).await? {
                entries.push(MountEntry::new(
                    device.as_str(),
                    mount_path,
                    MountType::Device,
                    MountError::Success,
                ));
            }
        }
        Ok(entries)
    }

    async fn get_device_properties(&self, device_path: &str) -> Result<DiskInfo, StorageError> {
        let object = block_object_path_for_device(&self.connection, &self.index, device_path).await?;
        Ok(disk_info(&self.connection, &object).await?)
    }

    async fn format(&self, device_path: &str, filesystem: &str, label: &str) -> bool {
        let object =
            match block_object_path_for_device(&self.connection, &self.index, device_path).await {
                Ok(object) => object,
                Err(e) => {
                    tracing::warn!(device = device_path, error = %e, "format rejected");
                    return false;
                }
            };

        let service = self.clone();
        let device_path = device_path.to_string();
        let filesystem = filesystem.to_string();
        let label = label.to_string();
        tokio::spawn(async move {
            let error = service.format_object(&object, &filesystem, &label).await;
            service
                .signals
                .emit(ServiceSignal::FormatCompleted { device_path, error });
        });
        true
    }

    async fn single_partition_format(&self, device_path: &str) -> PartitionError {
        let object =
            match block_object_path_for_device(&self.connection, &self.index, device_path).await {
                Ok(object) => object,
                Err(_) => return PartitionError::InvalidDevicePath,
            };

        match self.partition_object(&object).await {
            Ok(()) => PartitionError::Success,
            Err(e) => {
                tracing::warn!(device = device_path, error = %e, "partitioning failed");
                partition_error_from_dbus(&e)
            }
        }
    }

    async fn rename(&self, device_path: &str, volume_name: &str) -> bool {
        let object =
            match block_object_path_for_device(&self.connection, &self.index, device_path).await {
                Ok(object) => object,
                Err(e) => {
                    tracing::warn!(device = device_path, error = %e, "rename rejected");
                    return false;
                }
            };

        let service = self.clone();
        let device_path = device_path.to_string();
        let volume_name = volume_name.to_string();
        tokio::spawn(async move {
            let error = service.rename_object(&object, &volume_name).await;
            service
                .signals
                .emit(ServiceSignal::RenameCompleted { device_path, error });
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(options: &[&str], access_mode: MountAccessMode) -> MountRequest {
        MountRequest {
            source_path: "/dev/sdb1".to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
            access_mode,
            ..Default::default()
        }
    }

    #[test]
    fn read_only_access_adds_ro_once() {
        assert_eq!(
            mount_options(&request(&["nosuid"], MountAccessMode::ReadOnly)).as_deref(),
            Some("nosuid,ro")
        );
        assert_eq!(
            mount_options(&request(&["ro"], MountAccessMode::ReadOnly)).as_deref(),
            Some("ro")
        );
    }

    #[test]
    fn no_options_means_no_options_key() {
        assert_eq!(mount_options(&request(&[], MountAccessMode::ReadWrite)), None);
        assert_eq!(
            mount_options(&request(&[""], MountAccessMode::ReadWrite)),
            None
        );
    }
}
