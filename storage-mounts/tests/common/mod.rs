#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use storage_mounts::{DiskMountManager, ManagerConfig, ObserverHandle};
use storage_testing::{FakeDiskService, RecordingObserver, ServiceCall, device_mount_entry, fixtures};
use storage_types::{Disk, DiskInfo, MountAccessMode, MountCompletion, MountType};

pub struct Harness {
    pub manager: DiskMountManager,
    pub service: Arc<FakeDiskService>,
    pub observer: Arc<RecordingObserver>,
    pub handle: ObserverHandle,
}

/// A started manager wired to a fresh fake service.
pub fn harness() -> Harness {
    harness_with(ManagerConfig::default())
}

pub fn harness_with(config: ManagerConfig) -> Harness {
    let (service, signals) = FakeDiskService::new();
    let manager = DiskMountManager::new(service.clone(), config);
    let observer = Arc::new(RecordingObserver::new());
    let handle = manager.add_observer(observer.clone());
    manager.start(signals);

    Harness {
        manager,
        service,
        observer,
        handle,
    }
}

impl Harness {
    /// Publish `info` on the service and register it with the manager.
    pub fn seed_disk(&self, info: DiskInfo) {
        self.seed_disk_record(info.clone(), fixtures::disk(&info));
    }

    pub fn seed_disk_record(&self, info: DiskInfo, disk: Disk) {
        self.service.add_device(info);
        assert!(self.manager.add_disk_for_test(disk));
    }

    /// Seed `info` as mounted where the fake would mount it; returns the mount path.
    pub fn seed_mounted(&self, info: DiskInfo) -> String {
        let entry = device_mount_entry(&info.device_path);
        self.seed_disk(info);
        self.service.add_mount_entry(entry.clone());
        assert!(
            self.manager
                .add_mount_point_for_test(fixtures::device_mount_point(
                    &entry.source_path,
                    &entry.mount_path,
                ))
        );
        entry.mount_path
    }

    pub async fn mount_device(&self, source_path: &str) -> MountCompletion {
        self.mount_device_with(source_path, MountAccessMode::ReadWrite)
            .await
    }

    pub async fn mount_device_with(
        &self,
        source_path: &str,
        access_mode: MountAccessMode,
    ) -> MountCompletion {
        self.manager
            .mount_path(source_path, "", "", &[], MountType::Device, access_mode)
            .await
    }

    pub fn calls_of(&self, matches: impl Fn(&ServiceCall) -> bool) -> usize {
        self.service.count_calls(matches)
    }
}

/// Yield to spawned tasks until `condition` holds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub fn is_mount_call(call: &ServiceCall) -> bool {
    matches!(call, ServiceCall::Mount(_))
}

pub fn is_unmount_call(call: &ServiceCall) -> bool {
    matches!(call, ServiceCall::Unmount(_))
}

pub fn is_enumerate_call(call: &ServiceCall) -> bool {
    matches!(call, ServiceCall::EnumerateDevices)
}
