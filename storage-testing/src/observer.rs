//! Observer that records every notification for later assertions

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use storage_contracts::DiskMountObserver;
use storage_types::{
    DeviceEvent, Disk, DiskEvent, FormatError, FormatEvent, MountError, MountEvent, MountPoint,
    PartitionError, PartitionEvent, RenameError, RenameEvent,
};
use tokio::sync::Notify;

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedEvent {
    Disk {
        event: DiskEvent,
        device_path: String,
        auto_mountable: bool,
        disk: Box<Disk>,
    },
    Device {
        event: DeviceEvent,
        device_path: String,
    },
    Mount {
        event: MountEvent,
        error: MountError,
        mount_point: MountPoint,
    },
    Format {
        event: FormatEvent,
        error: FormatError,
        device_path: String,
        label: String,
    },
    Partition {
        event: PartitionEvent,
        error: PartitionError,
        device_path: String,
        label: String,
    },
    Rename {
        event: RenameEvent,
        error: RenameError,
        device_path: String,
        label: String,
    },
}

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
    recorded: Notify,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ObservedEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, event: ObservedEvent) {
        self.lock().push(event);
        self.recorded.notify_waiters();
    }

    pub fn events(&self) -> Vec<ObservedEvent> {
        self.lock().clone()
    }

    pub fn take_events(&self) -> Vec<ObservedEvent> {
        std::mem::take(&mut *self.lock())
    }

    pub fn count(&self, matches: impl Fn(&ObservedEvent) -> bool) -> usize {
        self.lock().iter().filter(|event| matches(event)).count()
    }

    /// Position of the first recorded event matching `matches`.
    pub fn position(&self, matches: impl Fn(&ObservedEvent) -> bool) -> Option<usize> {
        self.lock().iter().position(matches)
    }

    /// Wait until an event matching `matches` has been recorded.
    ///
    /// Panics after a few seconds so a missing event fails the test instead of
    /// hanging it.
    pub async fn wait_for(&self, matches: impl Fn(&ObservedEvent) -> bool) -> ObservedEvent {
        let waiting = async {
            loop {
                let recorded = self.recorded.notified();
                if let Some(event) = self.lock().iter().find(|event| matches(event)).cloned() {
                    return event;
                }
                recorded.await;
            }
        };

        match tokio::time::timeout(WAIT_TIMEOUT, waiting).await {
            Ok(event) => event,
            Err(_) => panic!("expected event not observed; recorded: {:#?}", self.events()),
        }
    }
}

impl DiskMountObserver for RecordingObserver {
    fn on_auto_mountable_disk_event(&self, event: DiskEvent, disk: &Disk) {
        self.record(ObservedEvent::Disk {
            event,
            device_path: disk.device_path.clone(),
            auto_mountable: true,
            disk: Box::new(disk.clone()),
        });
    }

    fn on_boot_device_disk_event(&self, event: DiskEvent, disk: &Disk) {
        self.record(ObservedEvent::Disk {
            event,
            device_path: disk.device_path.clone(),
            auto_mountable: false,
            disk: Box::new(disk.clone()),
        });
    }

    fn on_device_event(&self, event: DeviceEvent, device_path: &str) {
        self.record(ObservedEvent::Device {
            event,
            device_path: device_path.to_string(),
        });
    }

    fn on_mount_event(&self, event: MountEvent, error: MountError, mount_point: &MountPoint) {
        self.record(ObservedEvent::Mount {
            event,
            error,
            mount_point: mount_point.clone(),
        });
    }

    fn on_format_event(
        &self,
        event: FormatEvent,
        error: FormatError,
        device_path: &str,
        device_label: &str,
    ) {
        self.record(ObservedEvent::Format {
            event,
            error,
            device_path: device_path.to_string(),
            label: device_label.to_string(),
        });
    }

    fn on_partition_event(
        &self,
        event: PartitionEvent,
        error: PartitionError,
        device_path: &str,
        device_label: &str,
    ) {
        self.record(ObservedEvent::Partition {
            event,
            error,
            device_path: device_path.to_string(),
            label: device_label.to_string(),
        });
    }

    fn on_rename_event(
        &self,
        event: RenameEvent,
        error: RenameError,
        device_path: &str,
        device_label: &str,
    ) {
        self.record(ObservedEvent::Rename {
            event,
            error,
            device_path: device_path.to_string(),
            label: device_label.to_string(),
        });
    }
}
