// SPDX-License-Identifier: GPL-3.0-only

//! The disk mount manager: registry owner and signal handler

mod format;
mod mount;
mod partition;
mod rename;
mod unmount;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use storage_contracts::{
    DiskMountObserver, ExternalDiskService, ServiceSignal, SignalStream, StorageErrorKind,
};
use storage_types::{
    DeviceEvent, Disk, DiskEvent, DiskInfo, FormatError, MountAccessMode, MountCompletion,
    MountPoint, MountType, PendingChange, RenameError,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ManagerConfig;
use crate::deferred::DeferredEventBuffer;
use crate::dispatcher::{EventDispatcher, NotificationQueue, ObserverHandle};
use crate::refresh::RefreshState;
use crate::registry::{DiskRegistry, MountPointRegistry};

/// Everything guarded by the manager lock.
#[derive(Default)]
pub(crate) struct ManagerState {
    pub(crate) disks: DiskRegistry,
    pub(crate) mount_points: MountPointRegistry,
    pub(crate) discovery: DeferredEventBuffer,
    /// At most one in-flight mount per source path.
    pub(crate) mount_callbacks: HashMap<String, oneshot::Sender<MountCompletion>>,
    /// Requested access mode per source path, kept while the source is mounted.
    pub(crate) access_modes: HashMap<String, MountAccessMode>,
    pub(crate) pending_changes: HashMap<String, PendingChange>,
    /// At most one in-flight format and one in-flight rename per device path.
    pub(crate) format_waiters: HashMap<String, OperationWaiter<FormatError>>,
    pub(crate) rename_waiters: HashMap<String, OperationWaiter<RenameError>>,
    pub(crate) pending_partitioning: BTreeSet<String>,
    pub(crate) refresh: RefreshState,
    /// Filesystem UUIDs mounted successfully at least once.
    pub(crate) seen_uuids: HashSet<String>,
    pub(crate) system_path_prefixes: BTreeSet<String>,
}

/// Caller awaiting a format or rename completion signal.
pub(crate) struct OperationWaiter<E> {
    pub(crate) sender: oneshot::Sender<E>,
    /// `Started` was delivered. The completion signal may be handled before
    /// the service ack returns, in which case the completion delivers it.
    pub(crate) started: bool,
}

impl<E> OperationWaiter<E> {
    pub(crate) fn new(sender: oneshot::Sender<E>) -> Self {
        Self {
            sender,
            started: false,
        }
    }
}

struct Inner {
    service: Arc<dyn ExternalDiskService>,
    config: ManagerConfig,
    state: Mutex<ManagerState>,
    dispatcher: EventDispatcher,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

/// Cheaply cloneable handle to the mount manager.
#[derive(Clone)]
pub struct DiskMountManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for DiskMountManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("DiskMountManager")
            .field("disks", &state.disks.len())
            .field("mount_points", &state.mount_points.len())
            .field("observers", &self.inner.dispatcher.observer_count())
            .finish()
    }
}

impl DiskMountManager {
    pub fn new(service: Arc<dyn ExternalDiskService>, config: ManagerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                service,
                config,
                state: Mutex::new(ManagerState::default()),
                dispatcher: EventDispatcher::default(),
                event_loop: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn add_observer(&self, observer: Arc<dyn DiskMountObserver>) -> ObserverHandle {
        self.inner.dispatcher.subscribe(observer)
    }

    /// Consume `signals` on a background task until the stream ends or
    /// [`shutdown`](Self::shutdown) is called.
    pub fn start(&self, signals: SignalStream) {
        let manager = self.clone();
        let handle = tokio::spawn(async move { manager.run(signals).await });

        let previous = self
            .inner
            .event_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            warn!("mount manager restarted; aborting previous event loop");
            previous.abort();
        }

        if self.inner.config.refresh_on_start {
            let manager = self.clone();
            tokio::spawn(async move {
                if !manager.ensure_mount_info_refreshed(false).await {
                    warn!("initial mount info refresh failed");
                }
            });
        }
    }

    /// Handle signals in arrival order until the stream closes.
    pub async fn run(&self, mut signals: SignalStream) {
        info!("mount manager event loop started");
        while let Some(signal) = signals.next().await {
            self.handle_signal(signal);
        }
        info!("disk service signal stream closed");
    }

    /// Stop the event loop and release every waiting caller.
    ///
    /// Pending mounts complete with `Cancelled`, pending format, rename and
    /// partition requests with `Unknown`, and pending refreshes with `false`.
    pub fn shutdown(&self) {
        if let Some(handle) = self
            .inner
            .event_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }

        let mut state = self.state();
        let released = state.mount_callbacks.len()
            + state.format_waiters.len()
            + state.rename_waiters.len()
            + state.refresh.waiters.len();
        state.mount_callbacks.clear();
        state.format_waiters.clear();
        state.rename_waiters.clear();
        state.refresh.waiters.clear();
        info!(released, "mount manager shut down");
    }

    /// Apply one service signal.
    pub fn handle_signal(&self, signal: ServiceSignal) {
        debug!(?signal, "service signal");
        match signal {
            ServiceSignal::MountCompleted(entry) => self.handle_mount_completed(entry),
            ServiceSignal::FormatCompleted { device_path, error } => {
                let manager = self.clone();
                tokio::spawn(async move { manager.complete_format(device_path, error).await });
            }
            ServiceSignal::RenameCompleted { device_path, error } => {
                self.complete_rename(&device_path, error)
            }
            ServiceSignal::DiskAdded(device_path) => self.on_disk_added(device_path),
            ServiceSignal::DiskRemoved(device_path) => self.on_disk_removed(&device_path),
            ServiceSignal::DeviceAdded(device_path) => self.with_state(|state, queue| {
                state.system_path_prefixes.insert(device_path.clone());
                queue.device(DeviceEvent::Added, &device_path);
            }),
            ServiceSignal::DeviceRemoved(device_path) => self.with_state(|state, queue| {
                state.system_path_prefixes.remove(&device_path);
                queue.device(DeviceEvent::Removed, &device_path);
            }),
            ServiceSignal::DeviceScanned(device_path) => self.with_state(|_, queue| {
                queue.device(DeviceEvent::Scanned, &device_path);
            }),
        }
    }

    pub fn disks(&self) -> Vec<Disk> {
        self.state().disks.to_vec()
    }

    pub fn mount_points(&self) -> Vec<MountPoint> {
        self.state().mount_points.to_vec()
    }

    pub fn find_disk_by_source_path(&self, source_path: &str) -> Option<Disk> {
        self.state().disks.get(source_path).cloned()
    }

    pub fn find_mount_point(&self, mount_path: &str) -> Option<MountPoint> {
        self.state().mount_points.get(mount_path).cloned()
    }

    pub fn system_path_prefixes(&self) -> Vec<String> {
        self.state().system_path_prefixes.iter().cloned().collect()
    }

    /// Format and rename changes awaiting their completion signal.
    pub fn pending_changes(&self) -> Vec<(String, PendingChange)> {
        let state = self.state();
        let mut changes: Vec<_> = state
            .pending_changes
            .iter()
            .map(|(path, change)| (path.clone(), change.clone()))
            .collect();
        changes.sort_by(|a, b| a.0.cmp(&b.0));
        changes
    }

    pub fn is_pending_partitioning(&self, device_path: &str) -> bool {
        crate::dispatcher::is_pending_partitioning(&self.state().pending_partitioning, device_path)
    }

    /// Seed a disk. Fails if one with the same device path exists.
    pub fn add_disk_for_test(&self, disk: Disk) -> bool {
        self.state().disks.insert(disk)
    }

    /// Seed a mount point.
    ///
    /// Fails on a duplicate mount path, and for device mounts unless the
    /// source disk exists and is not mounted elsewhere.
    pub fn add_mount_point_for_test(&self, mount_point: MountPoint) -> bool {
        let mut state = self.state();
        if state.mount_points.contains(&mount_point.mount_path) {
            return false;
        }

        if mount_point.mount_type == MountType::Device {
            let Some(disk) = state.disks.get_mut(&mount_point.source_path) else {
                return false;
            };
            if disk.is_mounted() && disk.mount_path != mount_point.mount_path {
                return false;
            }
            disk.set_mount_path(mount_point.mount_path.clone());
        }

        state.mount_points.insert(mount_point)
    }

    pub(crate) fn service(&self) -> &Arc<dyn ExternalDiskService> {
        &self.inner.service
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutate state under the lock, then deliver what was queued.
    pub(crate) fn with_state<R>(
        &self,
        f: impl FnOnce(&mut ManagerState, &mut NotificationQueue) -> R,
    ) -> R {
        let mut queue = NotificationQueue::default();
        let result = {
            let mut state = self.state();
            f(&mut state, &mut queue)
        };
        self.inner.dispatcher.dispatch(queue);
        result
    }

    fn on_disk_added(&self, device_path: String) {
        self.state().discovery.reserve(&device_path);

        let manager = self.clone();
        tokio::spawn(async move {
            let buffered = match manager.service().get_device_properties(&device_path).await {
                Ok(info) => manager.with_state(|state, queue| {
                    apply_device_properties(state, queue, info);
                    state.discovery.resolve(&device_path)
                }),
                Err(err) if err.kind == StorageErrorKind::NotFound => {
                    debug!(device = %device_path, "device gone before its properties were read");
                    manager.state().discovery.forget(&device_path)
                }
                Err(err) => {
                    warn!(device = %device_path, kind = ?err.kind, error = %err, "failed to get device properties");
                    manager.state().discovery.forget(&device_path)
                }
            };

            manager.replay(buffered);
        });
    }

    fn on_disk_removed(&self, device_path: &str) {
        let buffered = self.with_state(|state, queue| {
            let buffered = state.discovery.forget(device_path);
            match state.disks.remove(device_path) {
                Some(disk) => queue.disk(DiskEvent::Removed, disk, &state.pending_partitioning),
                None => debug!(device = %device_path, "removal of unknown disk"),
            }
            buffered
        });

        self.replay(buffered);
    }

    pub(crate) fn replay(&self, entries: Vec<storage_types::MountEntry>) {
        for entry in entries {
            self.handle_mount_completed(entry);
        }
    }
}

/// Insert or replace the disk described by `info`.
///
/// Mount state comes from the mount point registry, not from the service.
pub(crate) fn apply_device_properties(
    state: &mut ManagerState,
    queue: &mut NotificationQueue,
    info: DiskInfo,
) {
    if info.is_virtual {
        debug!(device = %info.device_path, "ignoring virtual device");
        return;
    }

    let device_path = info.device_path.clone();
    let write_disabled =
        state.access_modes.get(&device_path) == Some(&MountAccessMode::ReadOnly);
    let is_first_mount = !info.uuid.is_empty() && !state.seen_uuids.contains(&info.uuid);

    let mut disk = Disk::from_info(info, write_disabled, is_first_mount);
    if let Some(mount_point) = state.mount_points.find_device_mount(&device_path) {
        disk.set_mount_path(mount_point.mount_path.clone());
    }

    let event = match state.disks.upsert(disk.clone()) {
        Some(_) => DiskEvent::Changed,
        None => DiskEvent::Added,
    };
    state.discovery.mark_known(&device_path);
    queue.disk(event, disk, &state.pending_partitioning);
}
