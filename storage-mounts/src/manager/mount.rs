// SPDX-License-Identifier: GPL-3.0-only

use storage_types::{
    MountAccessMode, MountCompletion, MountCondition, MountEntry, MountError, MountEvent,
    MountPoint, MountRequest, MountType, RemountOption,
};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::DiskMountManager;

impl DiskMountManager {
    /// Mount `source_path` and wait for the service to report the outcome.
    ///
    /// Device sources must be known, visible disks. A second request for a
    /// source whose mount is still in flight completes with
    /// `PathAlreadyMounted` without reaching the service.
    pub async fn mount_path(
        &self,
        source_path: &str,
        source_format: &str,
        mount_label: &str,
        options: &[String],
        mount_type: MountType,
        access_mode: MountAccessMode,
    ) -> MountCompletion {
        let placeholder = MountPoint::new(source_path, "", mount_type);

        let receiver = {
            let mut state = self.state();
            if state.mount_callbacks.contains_key(source_path) {
                warn!(source = %source_path, "mount already in progress");
                return MountCompletion::new(MountError::PathAlreadyMounted, placeholder);
            }

            if mount_type == MountType::Device {
                match state.disks.get(source_path) {
                    None => {
                        warn!(source = %source_path, "refusing to mount unknown disk");
                        return MountCompletion::new(MountError::Internal, placeholder);
                    }
                    Some(disk) if disk.hidden => {
                        warn!(source = %source_path, "refusing to mount hidden disk");
                        return MountCompletion::new(MountError::Internal, placeholder);
                    }
                    Some(_) => {}
                }
            }

            let (sender, receiver) = oneshot::channel();
            state
                .mount_callbacks
                .insert(source_path.to_string(), sender);
            state
                .access_modes
                .insert(source_path.to_string(), access_mode);
            receiver
        };

        let request = MountRequest {
            source_path: source_path.to_string(),
            source_format: source_format.to_string(),
            mount_label: mount_label.to_string(),
            options: self.config().merge_mount_options(options),
            mount_type,
            access_mode,
            remount: RemountOption::MountNewDevice,
        };

        info!(source = %source_path, ?mount_type, ?access_mode, "mounting");
        if !self.service().mount(request).await {
            warn!(source = %source_path, "disk service rejected mount request");
            self.handle_mount_completed(MountEntry::new(
                source_path,
                "",
                mount_type,
                MountError::Internal,
            ));
        }

        receiver
            .await
            .unwrap_or_else(|_| MountCompletion::new(MountError::Cancelled, placeholder))
    }

    /// Remount every mounted, writable-hardware disk with `access_mode`.
    ///
    /// Outcomes arrive as mount events only; no caller waits on them.
    pub async fn remount_all_removable_drives(&self, access_mode: MountAccessMode) {
        let targets: Vec<MountPoint> = {
            let mut state = self.state();
            let targets: Vec<MountPoint> = state
                .disks
                .iter()
                .filter(|disk| disk.is_mounted() && !disk.is_read_only_hardware)
                .filter_map(|disk| state.mount_points.get(&disk.mount_path).cloned())
                .collect();
            for target in &targets {
                state
                    .access_modes
                    .insert(target.source_path.clone(), access_mode);
            }
            targets
        };

        info!(count = targets.len(), ?access_mode, "remounting removable drives");
        for target in targets {
            let request = MountRequest {
                source_path: target.source_path.clone(),
                source_format: String::new(),
                mount_label: target.base_name().to_string(),
                options: self.config().merge_mount_options(&[]),
                mount_type: target.mount_type,
                access_mode,
                remount: RemountOption::RemountExistingDevice,
            };

            if !self.service().mount(request).await {
                warn!(source = %target.source_path, "disk service rejected remount request");
                self.handle_mount_completed(MountEntry::new(
                    target.source_path,
                    "",
                    target.mount_type,
                    MountError::Internal,
                ));
            }
        }
    }

    /// Apply a mount completion, unless it has to wait for its disk's properties.
    pub(crate) fn handle_mount_completed(&self, entry: MountEntry) {
        let resolved = self.with_state(|state, queue| {
            let entry = match state.discovery.defer(entry) {
                Some(entry) => entry,
                None => {
                    debug!("mount completion deferred until disk properties arrive");
                    return None;
                }
            };

            let condition = MountCondition::from_mount_error(entry.mount_type, entry.error);
            let is_device = entry.mount_type == MountType::Device;
            let policy_read_only =
                state.access_modes.get(&entry.source_path) == Some(&MountAccessMode::ReadOnly);
            let hardware_read_only = is_device
                && state
                    .disks
                    .get(&entry.source_path)
                    .is_some_and(|disk| disk.is_read_only_hardware);

            let mount_point = MountPoint {
                source_path: entry.source_path.clone(),
                mount_path: entry.mount_path.clone(),
                mount_type: entry.mount_type,
                mount_condition: condition,
                read_only: policy_read_only || hardware_read_only,
            };

            let registers = entry.error.is_success() || condition != MountCondition::None;
            if registers && !entry.mount_path.is_empty() {
                if is_device
                    && let Some(disk) = state.disks.get(&entry.source_path)
                    && disk.is_mounted()
                    && disk.mount_path != entry.mount_path
                {
                    let stale = disk.mount_path.clone();
                    state.mount_points.remove(&stale);
                }

                state.mount_points.upsert(mount_point.clone());

                if is_device {
                    match state.disks.get_mut(&entry.source_path) {
                        Some(disk) => {
                            disk.set_mount_path(entry.mount_path.clone());
                            disk.write_disabled_by_policy = policy_read_only;
                            if entry.error.is_success() && !disk.uuid.is_empty() {
                                state.seen_uuids.insert(disk.uuid.clone());
                            }
                        }
                        None => debug!(source = %entry.source_path, "mounted source has no disk record"),
                    }
                }
                info!(
                    source = %entry.source_path,
                    mount_path = %entry.mount_path,
                    ?condition,
                    "mount point registered"
                );
            } else {
                if registers {
                    warn!(source = %entry.source_path, "mount completed without a mount path");
                }
                let still_mounted = state
                    .disks
                    .get(&entry.source_path)
                    .is_some_and(|disk| disk.is_mounted());
                if !still_mounted {
                    state.access_modes.remove(&entry.source_path);
                }
            }

            queue.mount(MountEvent::Mounting, entry.error, mount_point.clone());

            state
                .mount_callbacks
                .remove(&entry.source_path)
                .map(|callback| (callback, MountCompletion::new(entry.error, mount_point)))
        });

        if let Some((callback, completion)) = resolved {
            // The caller may have stopped waiting.
            let _ = callback.send(completion);
        }
    }
}
