// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;

use storage_types::{DiskInfo, MountEntry, MountError, MountRequest, PartitionError};

use crate::StorageError;

/// The out-of-process service that performs mounts and reports hardware changes.
///
/// Calls returning `bool` are acknowledgements only: `true` means the request
/// was accepted and its outcome will arrive later as a
/// [`ServiceSignal`](crate::ServiceSignal) on the stream paired with the
/// service.
#[async_trait]
pub trait ExternalDiskService: Send + Sync {
    /// Outcome: `ServiceSignal::MountCompleted`.
    async fn mount(&self, request: MountRequest) -> bool;

    async fn unmount(&self, mount_path: &str) -> MountError;

    async fn enumerate_devices(&self) -> Result<Vec<String>, StorageError>;

    async fn enumerate_mount_entries(&self) -> Result<Vec<MountEntry>, StorageError>;

    async fn get_device_properties(&self, device_path: &str) -> Result<DiskInfo, StorageError>;

    /// Outcome: `ServiceSignal::FormatCompleted`.
    async fn format(&self, device_path: &str, filesystem: &str, label: &str) -> bool;

    /// Replace the partition table of `device_path` with a single partition.
    async fn single_partition_format(&self, device_path: &str) -> PartitionError;

    /// Outcome: `ServiceSignal::RenameCompleted`.
    async fn rename(&self, device_path: &str, volume_name: &str) -> bool;
}
