// SPDX-License-Identifier: GPL-3.0-only

use storage_types::{FormatFileSystemType, PartitionError, PartitionEvent};
use tracing::{info, warn};

use super::DiskMountManager;

impl DiskMountManager {
    /// Replace the partition table of `device_path` with a single partition
    /// and format it with `filesystem` and `label`.
    ///
    /// Disk events for the device and its children are suppressed while the
    /// table is rewritten. The returned code covers the partitioning step;
    /// the follow-up format reports through format events.
    pub async fn single_partition_format_device(
        &self,
        device_path: &str,
        filesystem: FormatFileSystemType,
        label: &str,
    ) -> PartitionError {
        let checked = {
            let state = self.state();
            match state.disks.get(device_path) {
                None => Err(PartitionError::InvalidDevicePath),
                Some(disk) if disk.is_read_only() => Err(PartitionError::DeviceNotAllowed),
                Some(_) => Ok(()),
            }
        };
        if let Err(error) = checked {
            warn!(device = %device_path, %error, "cannot partition");
            self.notify_partition(PartitionEvent::Completed, error, device_path, label);
            return error;
        }

        let unmounted = self.unmount_device_recursively(device_path).await;
        if !unmounted.is_success() || !self.state().disks.contains(device_path) {
            warn!(device = %device_path, error = %unmounted, "unmount before partitioning failed");
            self.notify_partition(
                PartitionEvent::Completed,
                PartitionError::Unknown,
                device_path,
                label,
            );
            return PartitionError::Unknown;
        }

        self.with_state(|state, queue| {
            state.pending_partitioning.insert(device_path.to_string());
            queue.partition(
                PartitionEvent::Started,
                PartitionError::Success,
                device_path,
                label,
            );
        });

        info!(device = %device_path, "writing single partition table");
        let mut error = self.service().single_partition_format(device_path).await;
        if error.is_success() && !self.state().disks.contains(device_path) {
            error = PartitionError::InvalidDevicePath;
        }
        if !error.is_success() {
            warn!(device = %device_path, %error, "partitioning failed");
            self.finish_partition(device_path, error, label);
            return error;
        }

        if !self.ensure_mount_info_refreshed(true).await {
            warn!(device = %device_path, "refresh after partitioning failed");
        }

        let partition = {
            let state = self.state();
            state.disks.get(device_path).and_then(|parent| {
                state
                    .disks
                    .iter()
                    .find(|candidate| {
                        !candidate.is_parent
                            && !candidate.storage_device_path.is_empty()
                            && candidate.storage_device_path == parent.storage_device_path
                    })
                    .map(|candidate| candidate.device_path.clone())
            })
        };

        let Some(partition) = partition else {
            warn!(device = %device_path, "new partition not found after refresh");
            self.finish_partition(device_path, PartitionError::InvalidDevicePath, label);
            return PartitionError::InvalidDevicePath;
        };

        self.finish_partition(device_path, PartitionError::Success, label);

        let formatted = self
            .format_unmounted_device(&partition, filesystem, label)
            .await;
        info!(device = %device_path, partition = %partition, format = %formatted, "partition pipeline finished");
        PartitionError::Success
    }

    fn finish_partition(&self, device_path: &str, error: PartitionError, label: &str) {
        self.with_state(|state, queue| {
            state.pending_partitioning.remove(device_path);
            queue.partition(PartitionEvent::Completed, error, device_path, label);
        });
    }

    fn notify_partition(
        &self,
        event: PartitionEvent,
        error: PartitionError,
        device_path: &str,
        label: &str,
    ) {
        self.with_state(|_, queue| queue.partition(event, error, device_path, label));
    }
}
