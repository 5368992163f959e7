mod common;

use common::{harness, harness_with, is_mount_call, is_unmount_call, wait_until};
use storage_mounts::ManagerConfig;
use storage_testing::{FakeDiskService, ObservedEvent, ServiceCall, fixtures};
use storage_types::{
    Disk, MountAccessMode, MountCondition, MountError, MountEvent, MountPoint, MountType,
    RemountOption,
};

fn mount_events(observer: &storage_testing::RecordingObserver, event: MountEvent) -> usize {
    observer.count(|e| matches!(e, ObservedEvent::Mount { event: ev, .. } if *ev == event))
}

#[tokio::test]
async fn mount_then_unmount_round_trip() {
    let h = harness();
    h.seed_disk(fixtures::usb_partition("/dev/sdb1", "/drives/usb1"));

    let completion = h.mount_device("/dev/sdb1").await;
    assert_eq!(completion.error, MountError::Success);
    assert_eq!(completion.mount_point.mount_path, "/media/removable/sdb1");

    let disk = h.manager.find_disk_by_source_path("/dev/sdb1").unwrap();
    assert!(disk.is_mounted());
    assert_eq!(disk.mount_path, "/media/removable/sdb1");
    assert!(h.manager.find_mount_point("/media/removable/sdb1").is_some());
    assert_eq!(mount_events(&h.observer, MountEvent::Mounting), 1);

    assert_eq!(
        h.manager.unmount_path("/media/removable/sdb1").await,
        MountError::Success
    );
    assert!(h.manager.mount_points().is_empty());
    assert!(!h.manager.find_disk_by_source_path("/dev/sdb1").unwrap().is_mounted());
    assert_eq!(mount_events(&h.observer, MountEvent::Unmounting), 1);
}

#[tokio::test]
async fn unmounting_an_unmounted_path_succeeds_quietly() {
    let h = harness();
    let mount_path = h.seed_mounted(fixtures::usb_partition("/dev/sdb1", "/drives/usb1"));

    assert_eq!(h.manager.unmount_path(&mount_path).await, MountError::Success);
    // The service now answers PathNotMounted, which is not a failure.
    assert_eq!(h.manager.unmount_path(&mount_path).await, MountError::Success);

    assert_eq!(h.calls_of(is_unmount_call), 2);
    assert_eq!(mount_events(&h.observer, MountEvent::Unmounting), 1);
}

#[tokio::test]
async fn unknown_device_is_rejected_before_the_service() {
    let h = harness();

    let completion = h.mount_device("/dev/sdz1").await;

    assert_eq!(completion.error, MountError::Internal);
    assert_eq!(h.calls_of(is_mount_call), 0);
    assert!(h.observer.events().is_empty());
}

#[tokio::test]
async fn hidden_disk_is_not_mounted() {
    let h = harness();
    let info = fixtures::usb_partition("/dev/sdb1", "/drives/usb1");
    let disk = Disk {
        hidden: true,
        ..fixtures::disk(&info)
    };
    h.seed_disk_record(info, disk);

    assert_eq!(h.mount_device("/dev/sdb1").await.error, MountError::Internal);
    assert_eq!(h.calls_of(is_mount_call), 0);
}

#[tokio::test]
async fn second_mount_while_in_flight_is_refused() {
    let h = harness();
    h.seed_disk(fixtures::usb_partition("/dev/sdb1", "/drives/usb1"));
    h.service.hold_mount_completions(true);

    let manager = h.manager.clone();
    let first = tokio::spawn(async move {
        manager
            .mount_path("/dev/sdb1", "", "", &[], MountType::Device, MountAccessMode::ReadWrite)
            .await
    });
    wait_until(|| h.calls_of(is_mount_call) == 1).await;

    let second = h.mount_device("/dev/sdb1").await;
    assert_eq!(second.error, MountError::PathAlreadyMounted);

    assert_eq!(h.service.release_mount_completions(), 1);
    let first = first.await.unwrap();
    assert_eq!(first.error, MountError::Success);
    assert_eq!(h.calls_of(is_mount_call), 1);
}

#[tokio::test]
async fn rejected_mount_completes_through_the_completion_path() {
    let h = harness();
    h.seed_disk(fixtures::usb_partition("/dev/sdb1", "/drives/usb1"));
    h.service.reject_mounts(true);

    let completion = h.mount_device("/dev/sdb1").await;
    assert_eq!(completion.error, MountError::Internal);
    assert!(h.manager.mount_points().is_empty());
    assert!(h.observer.count(|e| matches!(
        e,
        ObservedEvent::Mount { event: MountEvent::Mounting, error: MountError::Internal, .. }
    )) == 1);

    // The in-flight slot was released.
    h.service.reject_mounts(false);
    assert_eq!(h.mount_device("/dev/sdb1").await.error, MountError::Success);
}

#[tokio::test]
async fn unknown_filesystem_still_registers_a_mount_point() {
    let h = harness();
    h.seed_disk(fixtures::usb_partition("/dev/sdb1", "/drives/usb1"));
    h.service
        .set_mount_result("/dev/sdb1", MountError::UnknownFilesystem);

    let completion = h.mount_device("/dev/sdb1").await;
    assert_eq!(completion.error, MountError::UnknownFilesystem);

    let mount_point = h.manager.find_mount_point("/media/removable/sdb1").unwrap();
    assert_eq!(mount_point.mount_condition, MountCondition::UnknownFilesystem);
    assert!(h.manager.find_disk_by_source_path("/dev/sdb1").unwrap().is_mounted());
}

#[tokio::test]
async fn failed_mount_registers_nothing() {
    let h = harness();
    h.seed_disk(fixtures::usb_partition("/dev/sdb1", "/drives/usb1"));
    h.service
        .set_mount_result("/dev/sdb1", MountError::MountProgramFailed);

    let completion = h.mount_device("/dev/sdb1").await;

    assert_eq!(completion.error, MountError::MountProgramFailed);
    assert!(completion.mount_point.mount_path.is_empty());
    assert!(h.manager.mount_points().is_empty());
    assert!(!h.manager.find_disk_by_source_path("/dev/sdb1").unwrap().is_mounted());
}

#[tokio::test]
async fn read_only_mount_sets_policy_and_merges_default_options() {
    let h = harness_with(ManagerConfig {
        default_mount_options: vec!["nosuid".to_string(), "nodev".to_string()],
        refresh_on_start: false,
    });
    h.seed_disk(fixtures::usb_partition("/dev/sdb1", "/drives/usb1"));

    let completion = h
        .mount_device_with("/dev/sdb1", MountAccessMode::ReadOnly)
        .await;
    assert!(completion.mount_point.read_only);

    let disk = h.manager.find_disk_by_source_path("/dev/sdb1").unwrap();
    assert!(disk.write_disabled_by_policy);
    assert!(disk.is_read_only());

    let request = h
        .service
        .calls()
        .into_iter()
        .find_map(|call| match call {
            ServiceCall::Mount(request) => Some(request),
            _ => None,
        })
        .unwrap();
    assert_eq!(request.options, vec!["nosuid", "nodev"]);
    assert_eq!(request.access_mode, MountAccessMode::ReadOnly);
    assert_eq!(request.remount, RemountOption::MountNewDevice);
}

#[tokio::test]
async fn remount_skips_hardware_read_only_disks() {
    let h = harness();
    let writable = h.seed_mounted(fixtures::usb_partition("/dev/sdb1", "/drives/usb1"));

    let locked = fixtures::usb_partition("/dev/sdc1", "/drives/usb2");
    h.seed_disk_record(locked.clone(), fixtures::read_only_disk(&locked));
    assert!(h.manager.add_mount_point_for_test(fixtures::device_mount_point(
        "/dev/sdc1",
        &FakeDiskService::mount_path_for("/dev/sdc1"),
    )));

    h.manager
        .remount_all_removable_drives(MountAccessMode::ReadOnly)
        .await;

    let requests: Vec<_> = h
        .service
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            ServiceCall::Mount(request) => Some(request),
            _ => None,
        })
        .collect();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].source_path, "/dev/sdb1");
    assert_eq!(requests[0].mount_label, "sdb1");
    assert_eq!(requests[0].remount, RemountOption::RemountExistingDevice);

    h.observer
        .wait_for(|e| matches!(e, ObservedEvent::Mount { event: MountEvent::Mounting, .. }))
        .await;
    assert!(h.manager.find_mount_point(&writable).unwrap().read_only);
    assert!(
        h.manager
            .find_disk_by_source_path("/dev/sdb1")
            .unwrap()
            .write_disabled_by_policy
    );
}

#[tokio::test]
async fn seeding_enforces_registry_invariants() {
    let h = harness();
    let info = fixtures::usb_partition("/dev/sdb1", "/drives/usb1");
    assert!(h.manager.add_disk_for_test(fixtures::disk(&info)));
    assert!(!h.manager.add_disk_for_test(fixtures::disk(&info)));

    // Device mount points need their disk.
    assert!(!h.manager.add_mount_point_for_test(fixtures::device_mount_point(
        "/dev/sdz1",
        "/media/removable/Z"
    )));

    assert!(h.manager.add_mount_point_for_test(fixtures::device_mount_point(
        "/dev/sdb1",
        "/media/removable/A"
    )));
    assert!(!h.manager.add_mount_point_for_test(fixtures::device_mount_point(
        "/dev/sdb1",
        "/media/removable/A"
    )));
    // One mount point per disk.
    assert!(!h.manager.add_mount_point_for_test(fixtures::device_mount_point(
        "/dev/sdb1",
        "/media/removable/B"
    )));

    assert!(h.manager.add_mount_point_for_test(MountPoint::new(
        "/home/user/file.zip",
        "/media/archive/file.zip",
        MountType::Archive,
    )));
    assert_eq!(h.manager.mount_points().len(), 2);
}
