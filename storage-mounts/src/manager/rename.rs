// SPDX-License-Identifier: GPL-3.0-only

use storage_types::{PendingChange, RenameError, RenameEvent};
use tokio::sync::oneshot;
use tracing::{info, warn};

use super::{DiskMountManager, OperationWaiter};

impl DiskMountManager {
    /// Unmount the device behind `mount_path` and set its volume label.
    pub async fn rename_mounted_device(&self, mount_path: &str, volume_name: &str) -> RenameError {
        let target = {
            let state = self.state();
            match state.mount_points.get(mount_path) {
                None => Err((RenameError::Unknown, mount_path.to_string())),
                Some(mount_point) => match state.disks.get(&mount_point.source_path) {
                    None => Err((RenameError::Unknown, mount_point.source_path.clone())),
                    Some(disk) if disk.is_read_only() => {
                        Err((RenameError::DeviceNotAllowed, disk.device_path.clone()))
                    }
                    Some(disk) => Ok((disk.device_path.clone(), disk.mount_path.clone())),
                },
            }
        };

        let (device_path, disk_mount_path) = match target {
            Ok(target) => target,
            Err((error, path)) => {
                warn!(mount_path = %mount_path, %error, "cannot rename");
                self.notify_rename(RenameEvent::Completed, error, &path, volume_name);
                return error;
            }
        };

        let unmounted = self.unmount_path(&disk_mount_path).await;
        if !unmounted.is_success() || !self.state().disks.contains(&device_path) {
            warn!(device = %device_path, error = %unmounted, "unmount before rename failed");
            self.notify_rename(
                RenameEvent::Completed,
                RenameError::Unknown,
                &device_path,
                volume_name,
            );
            return RenameError::Unknown;
        }

        let receiver = self.with_state(|state, _| {
            if state.rename_waiters.contains_key(&device_path) {
                return None;
            }
            state.pending_changes.insert(
                device_path.clone(),
                PendingChange {
                    file_system_type: None,
                    label: volume_name.to_string(),
                },
            );
            let (sender, receiver) = oneshot::channel();
            state
                .rename_waiters
                .insert(device_path.clone(), OperationWaiter::new(sender));
            Some(receiver)
        });
        let Some(receiver) = receiver else {
            warn!(device = %device_path, "rename already in progress");
            return RenameError::DeviceBeingRenamed;
        };

        info!(device = %device_path, volume_name, "renaming");
        if !self.service().rename(&device_path, volume_name).await {
            warn!(device = %device_path, "disk service rejected rename request");
            let _waiter = self.with_state(|state, queue| {
                state.pending_changes.remove(&device_path);
                queue.rename(
                    RenameEvent::Completed,
                    RenameError::Unknown,
                    &device_path,
                    volume_name,
                );
                state.rename_waiters.remove(&device_path)
            });
            return RenameError::Unknown;
        }

        self.with_state(|state, queue| {
            if let Some(waiter) = state.rename_waiters.get_mut(&device_path)
                && !waiter.started
            {
                waiter.started = true;
                queue.rename(
                    RenameEvent::Started,
                    RenameError::Success,
                    &device_path,
                    volume_name,
                );
            }
        });
        receiver.await.unwrap_or(RenameError::Unknown)
    }

    /// Handle `RenameCompleted`. No refresh is needed: only the label changed.
    pub(crate) fn complete_rename(&self, device_path: &str, error: RenameError) {
        let waiter = self.with_state(|state, queue| {
            let change = state.pending_changes.remove(device_path);
            let label = change.map(|change| change.label).unwrap_or_default();

            let mut error = error;
            if error.is_success() {
                match state.disks.get_mut(device_path) {
                    Some(disk) => disk.device_label = label.clone(),
                    None => {
                        warn!(device = %device_path, "renamed disk is gone");
                        error = RenameError::InvalidDevicePath;
                    }
                }
            }

            let waiter = state.rename_waiters.remove(device_path);
            if waiter.as_ref().is_some_and(|waiter| !waiter.started) {
                queue.rename(RenameEvent::Started, RenameError::Success, device_path, &label);
            }

            info!(device = %device_path, %error, "rename completed");
            queue.rename(RenameEvent::Completed, error, device_path, &label);
            waiter.map(|waiter| (waiter.sender, error))
        });

        if let Some((waiter, error)) = waiter {
            let _ = waiter.send(error);
        }
    }

    fn notify_rename(
        &self,
        event: RenameEvent,
        error: RenameError,
        device_path: &str,
        label: &str,
    ) {
        self.with_state(|_, queue| queue.rename(event, error, device_path, label));
    }
}
