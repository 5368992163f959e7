// SPDX-License-Identifier: GPL-3.0-only

//! Coalesced registry refresh against the disk service
//!
//! Concurrent callers share one enumeration pass. A non-forced request after
//! a successful pass returns immediately.

use std::collections::HashSet;

use storage_contracts::StorageErrorKind;
use storage_types::{MountEntry, MountType};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::manager::{DiskMountManager, apply_device_properties};

#[derive(Debug, Default)]
pub(crate) struct RefreshState {
    pub(crate) already_refreshed: bool,
    pub(crate) waiters: Vec<oneshot::Sender<bool>>,
}

impl DiskMountManager {
    /// Make the registries match the service.
    ///
    /// Resolves to true when the enumeration pass succeeded. Joining callers
    /// observe the result of the pass already running.
    pub async fn ensure_mount_info_refreshed(&self, force: bool) -> bool {
        let (receiver, starts_pass) = {
            let mut state = self.state();
            if state.refresh.already_refreshed && !force {
                return true;
            }
            let (sender, receiver) = oneshot::channel();
            state.refresh.waiters.push(sender);
            (receiver, state.refresh.waiters.len() == 1)
        };

        if starts_pass {
            let manager = self.clone();
            tokio::spawn(async move { manager.refresh_pass().await });
        } else {
            debug!("joining refresh already in progress");
        }

        receiver.await.unwrap_or(false)
    }

    async fn refresh_pass(self) {
        let success = self.enumerate_and_reconcile().await;

        let waiters = {
            let mut state = self.state();
            if success {
                state.refresh.already_refreshed = true;
            }
            std::mem::take(&mut state.refresh.waiters)
        };

        info!(success, waiters = waiters.len(), "mount info refresh finished");
        for waiter in waiters {
            let _ = waiter.send(success);
        }
    }

    async fn enumerate_and_reconcile(&self) -> bool {
        let devices = match self.service().enumerate_devices().await {
            Ok(devices) => devices,
            Err(err) => {
                warn!(error = %err, "failed to enumerate devices");
                return false;
            }
        };

        let buffered = self.prune_missing_disks(&devices);
        // Callers waiting on these mounts must still be answered.
        self.replay(buffered);

        for device_path in &devices {
            match self.service().get_device_properties(device_path).await {
                Ok(info) => self.with_state(|state, queue| {
                    apply_device_properties(state, queue, info);
                }),
                // Devices can vanish between enumeration and the property fetch.
                Err(err) if err.kind == StorageErrorKind::NotFound => {
                    debug!(device = %device_path, "device vanished during refresh");
                }
                Err(err) => {
                    warn!(device = %device_path, kind = ?err.kind, error = %err, "skipping device without properties");
                }
            }
        }

        let entries = match self.service().enumerate_mount_entries().await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "failed to enumerate mount entries");
                return false;
            }
        };

        debug!(count = entries.len(), "applying enumerated mount entries");
        for entry in entries {
            self.handle_mount_completed(entry);
        }
        true
    }

    /// Drop disks the service no longer reports, with their device mount points.
    ///
    /// Returns mount completions that were buffered for the dropped disks.
    fn prune_missing_disks(&self, devices: &[String]) -> Vec<MountEntry> {
        let present: HashSet<&str> = devices.iter().map(String::as_str).collect();

        let mut state = self.state();
        let pruned = state
            .disks
            .retain(|disk| present.contains(disk.device_path.as_str()));
        if pruned.is_empty() {
            return Vec::new();
        }

        let pruned_paths: HashSet<&str> = pruned.iter().map(|d| d.device_path.as_str()).collect();
        let orphans = state.mount_points.retain(|mp| {
            mp.mount_type != MountType::Device || !pruned_paths.contains(mp.source_path.as_str())
        });

        let mut buffered = Vec::new();
        for disk in &pruned {
            buffered.extend(state.discovery.forget(&disk.device_path));
            state.access_modes.remove(&disk.device_path);
        }

        info!(
            disks = pruned.len(),
            mount_points = orphans.len(),
            buffered = buffered.len(),
            "pruned devices no longer reported"
        );
        buffered
    }
}
