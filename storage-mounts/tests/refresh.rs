mod common;

use std::time::Duration;

use common::{harness, harness_with, is_enumerate_call, is_mount_call, wait_until};
use storage_contracts::{ServiceSignal, StorageError};
use storage_mounts::ManagerConfig;
use storage_testing::{ServiceCall, device_mount_entry, fixtures};
use storage_types::{MountAccessMode, MountError, MountType};

#[tokio::test]
async fn concurrent_refreshes_share_one_pass() {
    let h = harness();
    h.service
        .add_device(fixtures::usb_partition("/dev/sdb1", "/drives/usb1"));

    let (first, second) = tokio::join!(
        h.manager.ensure_mount_info_refreshed(false),
        h.manager.ensure_mount_info_refreshed(false),
    );

    assert!(first && second);
    assert_eq!(h.calls_of(is_enumerate_call), 1);
    assert_eq!(h.manager.disks().len(), 1);
}

#[tokio::test]
async fn only_forced_refreshes_repeat_the_pass() {
    let h = harness();

    assert!(h.manager.ensure_mount_info_refreshed(false).await);
    assert!(h.manager.ensure_mount_info_refreshed(false).await);
    assert_eq!(h.calls_of(is_enumerate_call), 1);

    assert!(h.manager.ensure_mount_info_refreshed(true).await);
    assert_eq!(h.calls_of(is_enumerate_call), 2);
}

#[tokio::test]
async fn refresh_prunes_vanished_disks_and_applies_mount_entries() {
    let h = harness();
    // Known to the manager only.
    let stale = fixtures::usb_partition("/dev/sdc1", "/drives/usb2");
    assert!(h.manager.add_disk_for_test(fixtures::disk(&stale)));
    assert!(h.manager.add_mount_point_for_test(fixtures::device_mount_point(
        "/dev/sdc1",
        "/media/removable/sdc1"
    )));

    h.service
        .add_device(fixtures::usb_partition("/dev/sdb1", "/drives/usb1"));
    h.service.add_mount_entry(device_mount_entry("/dev/sdb1"));

    assert!(h.manager.ensure_mount_info_refreshed(false).await);

    assert!(h.manager.find_disk_by_source_path("/dev/sdc1").is_none());
    assert!(h.manager.find_mount_point("/media/removable/sdc1").is_none());

    let disk = h.manager.find_disk_by_source_path("/dev/sdb1").unwrap();
    assert!(disk.is_mounted());
    assert_eq!(disk.mount_path, "/media/removable/sdb1");
    assert!(h.manager.find_mount_point("/media/removable/sdb1").is_some());
}

#[tokio::test]
async fn failed_enumeration_is_retried_by_the_next_caller() {
    let h = harness();
    h.service
        .fail_enumeration(Some(StorageError::unavailable("udisks is not running")));

    assert!(!h.manager.ensure_mount_info_refreshed(false).await);

    h.service.fail_enumeration(None);
    assert!(h.manager.ensure_mount_info_refreshed(false).await);
    assert_eq!(h.calls_of(is_enumerate_call), 2);
}

#[tokio::test]
async fn refresh_on_start_runs_one_pass() {
    let h = harness_with(ManagerConfig {
        refresh_on_start: true,
        ..Default::default()
    });
    h.service
        .add_device(fixtures::usb_partition("/dev/sdb1", "/drives/usb1"));

    wait_until(|| h.manager.find_disk_by_source_path("/dev/sdb1").is_some()).await;
    assert!(h.manager.ensure_mount_info_refreshed(false).await);
    assert_eq!(h.calls_of(is_enumerate_call), 1);
}

#[tokio::test]
async fn pruning_a_disk_answers_its_buffered_mount() {
    let h = harness();
    h.seed_disk(fixtures::usb_partition("/dev/sdb1", "/drives/usb1"));
    h.service
        .set_mount_result("/dev/sdb1", MountError::MountProgramFailed);
    h.service.pause_properties("/dev/sdb1");

    h.manager
        .handle_signal(ServiceSignal::DiskAdded("/dev/sdb1".to_string()));
    wait_until(|| {
        h.calls_of(|call| matches!(call, ServiceCall::GetDeviceProperties(_))) == 1
    })
    .await;

    let manager = h.manager.clone();
    let mount = tokio::spawn(async move {
        manager
            .mount_path(
                "/dev/sdb1",
                "",
                "",
                &[],
                MountType::Device,
                MountAccessMode::ReadWrite,
            )
            .await
    });
    wait_until(|| h.calls_of(is_mount_call) == 1).await;
    // Let the event loop buffer the completion behind the pending fetch.
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!mount.is_finished());

    h.service.remove_device("/dev/sdb1");
    assert!(h.manager.ensure_mount_info_refreshed(true).await);

    let completion = tokio::time::timeout(Duration::from_secs(5), mount)
        .await
        .expect("mount caller was never answered")
        .unwrap();
    assert_eq!(completion.error, MountError::MountProgramFailed);
    assert!(h.manager.find_disk_by_source_path("/dev/sdb1").is_none());
    assert!(h.manager.mount_points().is_empty());

    h.service.resume_properties("/dev/sdb1");
}

#[tokio::test]
async fn device_vanishing_mid_refresh_is_skipped() {
    let h = harness();
    h.service
        .add_device(fixtures::usb_partition("/dev/sdb1", "/drives/usb1"));
    h.service
        .add_device(fixtures::usb_partition("/dev/sdc1", "/drives/usb2"));
    h.service.pause_properties("/dev/sdb1");

    let manager = h.manager.clone();
    let refresh = tokio::spawn(async move { manager.ensure_mount_info_refreshed(false).await });
    wait_until(|| {
        h.calls_of(|c| matches!(c, ServiceCall::GetDeviceProperties(p) if p == "/dev/sdb1")) == 1
    })
    .await;
    h.service.remove_device("/dev/sdb1");
    h.service.resume_properties("/dev/sdb1");

    assert!(refresh.await.unwrap());
    assert!(h.manager.find_disk_by_source_path("/dev/sdb1").is_none());
    assert!(h.manager.find_disk_by_source_path("/dev/sdc1").is_some());
}
