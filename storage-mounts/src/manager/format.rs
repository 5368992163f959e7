// SPDX-License-Identifier: GPL-3.0-only

use storage_types::{FormatError, FormatEvent, FormatFileSystemType, PendingChange};
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use super::{DiskMountManager, OperationWaiter};

impl DiskMountManager {
    /// Unmount the device behind `mount_path` and format it.
    ///
    /// The result arrives once the service reports completion and the
    /// registry has been refreshed and updated with the new label and
    /// filesystem.
    pub async fn format_mounted_device(
        &self,
        mount_path: &str,
        filesystem: FormatFileSystemType,
        label: &str,
    ) -> FormatError {
        let target = {
            let state = self.state();
            match state.mount_points.get(mount_path) {
                None => Err((FormatError::Unknown, mount_path.to_string())),
                Some(mount_point) => match state.disks.get(&mount_point.source_path) {
                    None => Err((FormatError::Unknown, mount_point.source_path.clone())),
                    Some(disk) if disk.is_read_only() => {
                        Err((FormatError::DeviceNotAllowed, disk.device_path.clone()))
                    }
                    Some(disk) => Ok((disk.device_path.clone(), disk.mount_path.clone())),
                },
            }
        };

        let (device_path, disk_mount_path) = match target {
            Ok(target) => target,
            Err((error, path)) => {
                warn!(mount_path = %mount_path, %error, "cannot format");
                self.notify_format(FormatEvent::Completed, error, &path, label);
                return error;
            }
        };

        let unmounted = self.unmount_path(&disk_mount_path).await;
        if !unmounted.is_success() || !self.state().disks.contains(&device_path) {
            warn!(device = %device_path, error = %unmounted, "unmount before format failed");
            self.notify_format(FormatEvent::Completed, FormatError::Unknown, &device_path, label);
            return FormatError::Unknown;
        }

        self.format_unmounted_device(&device_path, filesystem, label)
            .await
    }

    pub(crate) async fn format_unmounted_device(
        &self,
        device_path: &str,
        filesystem: FormatFileSystemType,
        label: &str,
    ) -> FormatError {
        let receiver = self.with_state(|state, _| {
            if !state.disks.contains(device_path) {
                return Err(FormatError::Unknown);
            }
            if state.format_waiters.contains_key(device_path) {
                return Err(FormatError::DeviceBeingFormatted);
            }
            state.pending_changes.insert(
                device_path.to_string(),
                PendingChange {
                    file_system_type: Some(filesystem.as_str().to_string()),
                    label: label.to_string(),
                },
            );
            let (sender, receiver) = oneshot::channel();
            state
                .format_waiters
                .insert(device_path.to_string(), OperationWaiter::new(sender));
            Ok(receiver)
        });

        let receiver = match receiver {
            Ok(receiver) => receiver,
            Err(FormatError::DeviceBeingFormatted) => {
                warn!(device = %device_path, "format already in progress");
                return FormatError::DeviceBeingFormatted;
            }
            Err(error) => {
                error!(device = %device_path, "disk disappeared before format");
                self.notify_format(FormatEvent::Completed, error, device_path, label);
                return error;
            }
        };

        info!(device = %device_path, %filesystem, label, "formatting");
        if !self
            .service()
            .format(device_path, filesystem.as_str(), label)
            .await
        {
            warn!(device = %device_path, "disk service rejected format request");
            let _waiter = self.with_state(|state, queue| {
                state.pending_changes.remove(device_path);
                queue.format(
                    FormatEvent::Completed,
                    FormatError::Unknown,
                    device_path,
                    label,
                );
                state.format_waiters.remove(device_path)
            });
            return FormatError::Unknown;
        }

        self.with_state(|state, queue| {
            if let Some(waiter) = state.format_waiters.get_mut(device_path)
                && !waiter.started
            {
                waiter.started = true;
                queue.format(FormatEvent::Started, FormatError::Success, device_path, label);
            }
        });
        receiver.await.unwrap_or(FormatError::Unknown)
    }

    /// Handle `FormatCompleted`: refresh, apply the pending change, notify, then
    /// release the waiting caller.
    pub(crate) async fn complete_format(&self, device_path: String, error: FormatError) {
        if !self.ensure_mount_info_refreshed(true).await {
            warn!(device = %device_path, "refresh after format failed");
        }

        let waiter = self.with_state(|state, queue| {
            let change = state.pending_changes.remove(&device_path);
            let label = change
                .as_ref()
                .map(|change| change.label.clone())
                .unwrap_or_default();

            let mut error = error;
            if error.is_success() {
                match state.disks.get_mut(&device_path) {
                    Some(disk) => {
                        if let Some(change) = change {
                            disk.device_label = change.label;
                            if let Some(file_system_type) = change.file_system_type {
                                disk.file_system_type = file_system_type;
                            }
                        }
                    }
                    None => {
                        warn!(device = %device_path, "formatted disk is gone");
                        error = FormatError::InvalidDevicePath;
                    }
                }
            }

            let waiter = state.format_waiters.remove(&device_path);
            if waiter.as_ref().is_some_and(|waiter| !waiter.started) {
                queue.format(FormatEvent::Started, FormatError::Success, &device_path, &label);
            }

            info!(device = %device_path, %error, "format completed");
            queue.format(FormatEvent::Completed, error, &device_path, &label);
            waiter.map(|waiter| (waiter.sender, error))
        });

        if let Some((waiter, error)) = waiter {
            let _ = waiter.send(error);
        }
    }

    fn notify_format(&self, event: FormatEvent, error: FormatError, device_path: &str, label: &str) {
        self.with_state(|_, queue| queue.format(event, error, device_path, label));
    }
}
