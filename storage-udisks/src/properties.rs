// SPDX-License-Identifier: GPL-3.0-only

//! Build `DiskInfo` from the Block, Drive, Partition and Filesystem interfaces

use storage_types::{DeviceType, DiskInfo};
use udisks2::block::BlockProxy;
use udisks2::drive::DriveProxy;
use udisks2::partition::PartitionProxy;
use udisks2::partitiontable::PartitionTableProxy;
use zbus::Connection;
use zbus::zvariant::OwnedObjectPath;

use crate::dbus::decode_c_string;
use crate::error::DiskError;
use crate::resolve::mount_points_of;

#[derive(Debug, Default)]
struct DriveFacts {
    vendor: String,
    model: String,
    removable: bool,
    media_available: bool,
    connection_bus: String,
    optical: bool,
}

async fn drive_facts(
    connection: &Connection,
    drive_path: &OwnedObjectPath,
) -> Result<DriveFacts, DiskError> {
    let drive = DriveProxy::builder(connection)
        .path(drive_path)?
        .build()
        .await?;

    Ok(DriveFacts {
        vendor: drive.vendor().await?,
        model: drive.model().await?,
        removable: drive.removable().await? || drive.media_removable().await?,
        media_available: drive.media_available().await?,
        connection_bus: drive.connection_bus().await?,
        optical: drive.optical().await?,
    })
}

async fn is_loop_device(connection: &Connection, object_path: &OwnedObjectPath) -> bool {
    let Ok(proxy) = zbus::Proxy::new(
        connection,
        "org.freedesktop.UDisks2",
        object_path.as_str(),
        "org.freedesktop.UDisks2.Loop",
    )
    .await
    else {
        return false;
    };

    proxy
        .get_property::<Vec<u8>>("BackingFile")
        .await
        .map(|bytes| !decode_c_string(&bytes).is_empty())
        .unwrap_or(false)
}

async fn has_partition_table(connection: &Connection, object_path: &OwnedObjectPath) -> bool {
    let Ok(builder) = PartitionTableProxy::builder(connection).path(object_path) else {
        return false;
    };
    match builder.build().await {
        Ok(table) => table.type_().await.is_ok(),
        Err(_) => false,
    }
}

async fn is_partition(connection: &Connection, object_path: &OwnedObjectPath) -> bool {
    let Ok(builder) = PartitionProxy::builder(connection).path(object_path) else {
        return false;
    };
    match builder.build().await {
        Ok(partition) => partition.table().await.is_ok(),
        Err(_) => false,
    }
}

/// Properties of the block object at `object_path`.
pub async fn disk_info(
    connection: &Connection,
    object_path: &OwnedObjectPath,
) -> Result<DiskInfo, DiskError> {
    let block = BlockProxy::builder(connection)
        .path(object_path)?
        .build()
        .await?;

    let preferred = decode_c_string(&block.preferred_device().await?);
    let device_path = if preferred.is_empty() {
        decode_c_string(&block.device().await?)
    } else {
        preferred
    };

    let drive_path = block.drive().await?;
    let has_drive = drive_path.as_str() != "/";
    let drive = if has_drive {
        drive_facts(connection, &drive_path).await?
    } else {
        DriveFacts::default()
    };

    let is_loop = !has_drive && is_loop_device(connection, object_path).await;
    let hint_system = block.hint_system().await?;
    let hint_ignore = block.hint_ignore().await?;
    let is_parent = !is_partition(connection, object_path).await
        && (has_partition_table(connection, object_path).await || has_drive);

    let device_type = if is_loop {
        DeviceType::Loop
    } else {
        DeviceType::from_connection_bus(&drive.connection_bus, drive.optical)
    };

    let on_boot_device = hint_system && !drive.removable;
    let mount_path = mount_points_of(connection, object_path)
        .await?
        .into_iter()
        .next()
        .unwrap_or_default();

    Ok(DiskInfo {
        device_path,
        storage_device_path: if has_drive {
            drive_path.as_str().to_string()
        } else {
            object_path.as_str().to_string()
        },
        mount_path,
        is_parent,
        is_virtual: !has_drive && !is_loop,
        is_read_only_hardware: block.read_only().await?,
        has_media: !has_drive || drive.media_available,
        on_boot_device,
        on_removable_device: drive.removable,
        is_hidden: hint_ignore,
        is_auto_mountable: !on_boot_device && !hint_ignore && (drive.removable || is_loop),
        device_label: block.id_label().await?,
        file_system_type: block.id_type().await?,
        uuid: block.id_uuid().await?,
        vendor_name: drive.vendor,
        product_name: drive.model,
        total_size_in_bytes: block.size().await?,
        device_type,
    })
}
