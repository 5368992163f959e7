// SPDX-License-Identifier: GPL-3.0-only

use futures::stream::{FuturesUnordered, StreamExt};
use storage_types::{MountError, MountEvent, MountType};
use tracing::{debug, info, warn};

use super::DiskMountManager;

impl DiskMountManager {
    /// Unmount `mount_path`. An already unmounted path reports success.
    pub async fn unmount_path(&self, mount_path: &str) -> MountError {
        info!(mount_path = %mount_path, "unmounting");
        let error = self.service().unmount(mount_path).await.normalized_for_unmount();
        self.finish_unmount(mount_path, error);
        error
    }

    /// Unmount every mount point whose source lives under `device_path`.
    ///
    /// All unmounts run concurrently. The result is the last failure to
    /// complete, or `Success`.
    pub async fn unmount_device_recursively(&self, device_path: &str) -> MountError {
        let mount_paths = {
            let state = self.state();
            let mount_paths = state.mount_points.mount_paths_with_source_prefix(device_path);
            if mount_paths.is_empty() {
                return if state.disks.contains(device_path) {
                    MountError::Success
                } else {
                    warn!(device = %device_path, "recursive unmount of unknown device");
                    MountError::InvalidDevicePath
                };
            }
            mount_paths
        };

        info!(device = %device_path, count = mount_paths.len(), "unmounting recursively");
        let mut unmounts: FuturesUnordered<_> = mount_paths
            .into_iter()
            .map(|mount_path| {
                let service = self.service().clone();
                async move {
                    let error = service.unmount(&mount_path).await.normalized_for_unmount();
                    (mount_path, error)
                }
            })
            .collect();

        let mut result = MountError::Success;
        while let Some((mount_path, error)) = unmounts.next().await {
            self.finish_unmount(&mount_path, error);
            if !error.is_success() {
                result = error;
            }
        }
        result
    }

    fn finish_unmount(&self, mount_path: &str, error: MountError) {
        self.with_state(|state, queue| {
            let Some(mount_point) = state.mount_points.get(mount_path).cloned() else {
                debug!(mount_path = %mount_path, "unmount of unknown mount path");
                return;
            };

            if error.is_success() {
                state.mount_points.remove(mount_path);
                if mount_point.mount_type == MountType::Device {
                    if let Some(disk) = state.disks.get_mut(&mount_point.source_path)
                        && disk.mount_path == mount_path
                    {
                        disk.clear_mount_path();
                    }
                    state.access_modes.remove(&mount_point.source_path);
                }
            } else {
                warn!(mount_path = %mount_path, %error, "unmount failed");
            }

            queue.mount(MountEvent::Unmounting, error, mount_point);
        });
    }
}
