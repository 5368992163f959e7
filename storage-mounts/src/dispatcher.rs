// SPDX-License-Identifier: GPL-3.0-only

//! Observer subscription and ordered notification delivery

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use storage_contracts::DiskMountObserver;
use storage_types::{
    DeviceEvent, Disk, DiskEvent, FormatError, FormatEvent, MountError, MountEvent, MountPoint,
    PartitionError, PartitionEvent, RenameError, RenameEvent,
};
use tracing::debug;

/// A notification recorded while the manager state is locked and delivered
/// once it is released.
#[derive(Debug, Clone)]
pub(crate) enum Notification {
    Disk(DiskEvent, Disk),
    Device(DeviceEvent, String),
    Mount(MountEvent, MountError, MountPoint),
    Format(FormatEvent, FormatError, String, String),
    Partition(PartitionEvent, PartitionError, String, String),
    Rename(RenameEvent, RenameError, String, String),
}

#[derive(Debug, Default)]
pub(crate) struct NotificationQueue {
    items: Vec<Notification>,
}

impl NotificationQueue {
    /// Queue a disk event unless the disk belongs to a device being repartitioned.
    pub(crate) fn disk(
        &mut self,
        event: DiskEvent,
        disk: Disk,
        pending_partitioning: &BTreeSet<String>,
    ) {
        if is_pending_partitioning(pending_partitioning, &disk.device_path) {
            debug!(device = %disk.device_path, ?event, "suppressing disk event during partitioning");
            return;
        }
        self.items.push(Notification::Disk(event, disk));
    }

    pub(crate) fn device(&mut self, event: DeviceEvent, device_path: &str) {
        self.items
            .push(Notification::Device(event, device_path.to_string()));
    }

    pub(crate) fn mount(&mut self, event: MountEvent, error: MountError, mount_point: MountPoint) {
        self.items
            .push(Notification::Mount(event, error, mount_point));
    }

    pub(crate) fn format(
        &mut self,
        event: FormatEvent,
        error: FormatError,
        device_path: &str,
        label: &str,
    ) {
        self.items.push(Notification::Format(
            event,
            error,
            device_path.to_string(),
            label.to_string(),
        ));
    }

    pub(crate) fn partition(
        &mut self,
        event: PartitionEvent,
        error: PartitionError,
        device_path: &str,
        label: &str,
    ) {
        self.items.push(Notification::Partition(
            event,
            error,
            device_path.to_string(),
            label.to_string(),
        ));
    }

    pub(crate) fn rename(
        &mut self,
        event: RenameEvent,
        error: RenameError,
        device_path: &str,
        label: &str,
    ) {
        self.items.push(Notification::Rename(
            event,
            error,
            device_path.to_string(),
            label.to_string(),
        ));
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// True if `device_path` is, or lives under, a device being repartitioned.
pub(crate) fn is_pending_partitioning(pending: &BTreeSet<String>, device_path: &str) -> bool {
    pending
        .iter()
        .any(|parent| device_path.starts_with(parent.as_str()))
}

#[derive(Default)]
struct ObserverSet {
    next_id: u64,
    observers: BTreeMap<u64, Arc<dyn DiskMountObserver>>,
}

/// Subscribed observers, notified in subscription order.
#[derive(Clone, Default)]
pub(crate) struct EventDispatcher {
    set: Arc<Mutex<ObserverSet>>,
}

impl EventDispatcher {
    pub(crate) fn subscribe(&self, observer: Arc<dyn DiskMountObserver>) -> ObserverHandle {
        let mut set = self.set.lock().unwrap_or_else(PoisonError::into_inner);
        let id = set.next_id;
        set.next_id += 1;
        set.observers.insert(id, observer);

        debug!(observer = id, "observer subscribed");
        ObserverHandle {
            id,
            set: Arc::downgrade(&self.set),
        }
    }

    pub(crate) fn observer_count(&self) -> usize {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observers
            .len()
    }

    pub(crate) fn dispatch(&self, queue: NotificationQueue) {
        if queue.is_empty() {
            return;
        }

        // Snapshot so observers may subscribe or unsubscribe from a callback.
        let observers: Vec<Arc<dyn DiskMountObserver>> = self
            .set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observers
            .values()
            .cloned()
            .collect();

        for notification in &queue.items {
            for observer in &observers {
                deliver(observer.as_ref(), notification);
            }
        }
    }
}

fn deliver(observer: &dyn DiskMountObserver, notification: &Notification) {
    match notification {
        Notification::Disk(event, disk) if disk.is_auto_mountable => {
            observer.on_auto_mountable_disk_event(*event, disk)
        }
        Notification::Disk(event, disk) => observer.on_boot_device_disk_event(*event, disk),
        Notification::Device(event, path) => observer.on_device_event(*event, path),
        Notification::Mount(event, error, mount_point) => {
            observer.on_mount_event(*event, *error, mount_point)
        }
        Notification::Format(event, error, path, label) => {
            observer.on_format_event(*event, *error, path, label)
        }
        Notification::Partition(event, error, path, label) => {
            observer.on_partition_event(*event, *error, path, label)
        }
        Notification::Rename(event, error, path, label) => {
            observer.on_rename_event(*event, *error, path, label)
        }
    }
}

/// Keeps an observer subscribed; dropping it unsubscribes.
#[must_use = "the observer is unsubscribed when the handle is dropped"]
pub struct ObserverHandle {
    id: u64,
    set: Weak<Mutex<ObserverSet>>,
}

impl ObserverHandle {
    /// Unsubscribe now. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {}
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        if let Some(set) = self.set.upgrade() {
            set.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .observers
                .remove(&self.id);
            debug!(observer = self.id, "observer unsubscribed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        auto: AtomicUsize,
        boot: AtomicUsize,
        device: AtomicUsize,
    }

    impl DiskMountObserver for Counter {
        fn on_auto_mountable_disk_event(&self, _event: DiskEvent, _disk: &Disk) {
            self.auto.fetch_add(1, Ordering::SeqCst);
        }

        fn on_boot_device_disk_event(&self, _event: DiskEvent, _disk: &Disk) {
            self.boot.fetch_add(1, Ordering::SeqCst);
        }

        fn on_device_event(&self, _event: DeviceEvent, _device_path: &str) {
            self.device.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn disk(path: &str, auto_mountable: bool) -> Disk {
        Disk {
            device_path: path.to_string(),
            is_auto_mountable: auto_mountable,
            ..Default::default()
        }
    }

    #[test]
    fn disk_events_route_by_auto_mountable_flag() {
        let dispatcher = EventDispatcher::default();
        let counter = Arc::new(Counter::default());
        let _handle = dispatcher.subscribe(counter.clone());

        let mut queue = NotificationQueue::default();
        let pending = BTreeSet::new();
        queue.disk(DiskEvent::Added, disk("/dev/sdb1", true), &pending);
        queue.disk(DiskEvent::Added, disk("/dev/sda1", false), &pending);
        queue.device(DeviceEvent::Scanned, "/dev/sdb");
        dispatcher.dispatch(queue);

        assert_eq!(counter.auto.load(Ordering::SeqCst), 1);
        assert_eq!(counter.boot.load(Ordering::SeqCst), 1);
        assert_eq!(counter.device.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn partitioning_prefix_suppresses_child_disk_events() {
        let pending = BTreeSet::from(["/dev/sdb".to_string()]);
        assert!(is_pending_partitioning(&pending, "/dev/sdb"));
        assert!(is_pending_partitioning(&pending, "/dev/sdb1"));
        assert!(!is_pending_partitioning(&pending, "/dev/sdc1"));

        let mut queue = NotificationQueue::default();
        queue.disk(DiskEvent::Changed, disk("/dev/sdb1", true), &pending);
        assert!(queue.is_empty());
    }

    #[test]
    fn dropping_the_handle_unsubscribes() {
        let dispatcher = EventDispatcher::default();
        let counter = Arc::new(Counter::default());
        let handle = dispatcher.subscribe(counter.clone());
        assert_eq!(dispatcher.observer_count(), 1);

        drop(handle);
        assert_eq!(dispatcher.observer_count(), 0);

        let mut queue = NotificationQueue::default();
        queue.device(DeviceEvent::Added, "/dev/sdb");
        dispatcher.dispatch(queue);
        assert_eq!(counter.device.load(Ordering::SeqCst), 0);
    }
}
