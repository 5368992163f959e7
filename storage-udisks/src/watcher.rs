// SPDX-License-Identifier: GPL-3.0-only

//! Forward UDisks2 ObjectManager signals as service signals

use futures::StreamExt;
use storage_contracts::{ServiceSignal, SignalSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use zbus::Connection;
use zbus::zvariant::OwnedObjectPath;

use crate::error::DiskError;
use crate::manager::{BLOCK_IFACE, DRIVE_IFACE, FILESYSTEM_IFACE, UDisks2ObjectManagerProxy};
use crate::resolve::{SharedBlockIndex, block_device_path, lock};

/// Interfaces of interest named in an ObjectManager signal
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceSet {
    pub block: bool,
    pub filesystem: bool,
    pub drive: bool,
}

impl InterfaceSet {
    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut set = Self::default();
        for name in names {
            match name {
                BLOCK_IFACE => set.block = true,
                FILESYSTEM_IFACE => set.filesystem = true,
                DRIVE_IFACE => set.drive = true,
                _ => {}
            }
        }
        set
    }
}

/// Subscribe to the ObjectManager and forward changes until the bus or the
/// manager goes away.
///
/// Subscriptions are made before returning so no signal is missed between
/// the initial block enumeration and the watch loop.
pub async fn spawn(
    connection: Connection,
    index: SharedBlockIndex,
    signals: SignalSender,
) -> Result<JoinHandle<()>, DiskError> {
    let object_manager = UDisks2ObjectManagerProxy::new(&connection)
        .await
        .map_err(|e| DiskError::ConnectionFailed(e.to_string()))?;
    let mut added_stream = object_manager.receive_interfaces_added().await?;
    let mut removed_stream = object_manager.receive_interfaces_removed().await?;

    Ok(tokio::spawn(async move {
        loop {
            let forwarded = tokio::select! {
                maybe_added = added_stream.next() => {
                    let Some(signal) = maybe_added else {
                        break;
                    };
                    match signal.args() {
                        Ok(args) => {
                            let interfaces = InterfaceSet::from_names(
                                args.interfaces_and_properties.keys().map(String::as_str),
                            );
                            on_added(&connection, &index, &signals, &args.object_path, interfaces)
                                .await
                        }
                        Err(e) => {
                            warn!("Failed to parse InterfacesAdded signal args: {e}");
                            true
                        }
                    }
                }
                maybe_removed = removed_stream.next() => {
                    let Some(signal) = maybe_removed else {
                        break;
                    };
                    match signal.args() {
                        Ok(args) => {
                            let interfaces = InterfaceSet::from_names(
                                args.interfaces.iter().map(String::as_str),
                            );
                            on_removed(&index, &signals, &args.object_path, interfaces)
                        }
                        Err(e) => {
                            warn!("Failed to parse InterfacesRemoved signal args: {e}");
                            true
                        }
                    }
                }
            };

            if !forwarded {
                debug!("Signal receiver dropped, stopping UDisks2 watcher");
                break;
            }
        }
    }))
}

async fn on_added(
    connection: &Connection,
    index: &SharedBlockIndex,
    signals: &SignalSender,
    object_path: &OwnedObjectPath,
    interfaces: InterfaceSet,
) -> bool {
    if interfaces.drive {
        return signals.emit(ServiceSignal::DeviceAdded(object_path.as_str().to_string()));
    }

    let known = lock(index).device_for_object(object_path);
    let device = match known {
        // A new filesystem on a known block changes its properties.
        Some(device) if interfaces.filesystem => device,
        Some(_) => return true,
        None if interfaces.block => match block_device_path(connection, object_path).await {
            Ok(device) if !device.is_empty() => {
                lock(index).insert(object_path.clone(), device.clone());
                device
            }
            Ok(_) => return true,
            Err(e) => {
                warn!(object = %object_path.as_str(), error = %e, "new block object unreadable");
                return true;
            }
        },
        None => return true,
    };

    signals.emit(ServiceSignal::DiskAdded(device))
}

fn on_removed(
    index: &SharedBlockIndex,
    signals: &SignalSender,
    object_path: &OwnedObjectPath,
    interfaces: InterfaceSet,
) -> bool {
    if interfaces.drive {
        return signals.emit(ServiceSignal::DeviceRemoved(object_path.as_str().to_string()));
    }

    if interfaces.block {
        return match lock(index).remove(object_path) {
            Some(device) => signals.emit(ServiceSignal::DiskRemoved(device)),
            None => true,
        };
    }

    // Filesystem wiped: report the block for a property refresh.
    let known = lock(index).device_for_object(object_path);
    match known {
        Some(device) if interfaces.filesystem => signals.emit(ServiceSignal::DiskAdded(device)),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use storage_contracts::signal_channel;

    use crate::resolve::BlockIndex;

    fn object(path: &str) -> OwnedObjectPath {
        OwnedObjectPath::try_from(path.to_string()).unwrap()
    }

    #[test]
    fn interface_names_are_classified() {
        let set = InterfaceSet::from_names([
            "org.freedesktop.UDisks2.Block",
            "org.freedesktop.UDisks2.Partition",
            "org.freedesktop.UDisks2.Filesystem",
        ]);
        assert_eq!(
            set,
            InterfaceSet {
                block: true,
                filesystem: true,
                drive: false
            }
        );
    }

    #[tokio::test]
    async fn removed_block_is_reported_by_device_path() {
        let (signals, mut stream) = signal_channel();
        let index: SharedBlockIndex = Arc::new(Mutex::new(BlockIndex::default()));
        let sdb1 = object("/org/freedesktop/UDisks2/block_devices/sdb1");
        lock(&index).insert(sdb1.clone(), "/dev/sdb1".to_string());

        assert!(on_removed(
            &index,
            &signals,
            &sdb1,
            InterfaceSet::from_names([BLOCK_IFACE, FILESYSTEM_IFACE]),
        ));

        assert_eq!(
            stream.recv().await,
            Some(ServiceSignal::DiskRemoved("/dev/sdb1".to_string()))
        );
        assert!(lock(&index).is_empty());
    }

    #[tokio::test]
    async fn wiped_filesystem_requests_a_property_refresh() {
        let (signals, mut stream) = signal_channel();
        let index: SharedBlockIndex = Arc::new(Mutex::new(BlockIndex::default()));
        let sdb1 = object("/org/freedesktop/UDisks2/block_devices/sdb1");
        lock(&index).insert(sdb1.clone(), "/dev/sdb1".to_string());

        assert!(on_removed(
            &index,
            &signals,
            &sdb1,
            InterfaceSet::from_names([FILESYSTEM_IFACE]),
        ));

        assert_eq!(
            stream.recv().await,
            Some(ServiceSignal::DiskAdded("/dev/sdb1".to_string()))
        );
        assert_eq!(lock(&index).len(), 1);
    }

    #[tokio::test]
    async fn removed_drive_is_a_device_event() {
        let (signals, mut stream) = signal_channel();
        let index: SharedBlockIndex = Arc::new(Mutex::new(BlockIndex::default()));
        let drive = object("/org/freedesktop/UDisks2/drives/Kingston_DT_1234");

        assert!(on_removed(
            &index,
            &signals,
            &drive,
            InterfaceSet::from_names([DRIVE_IFACE]),
        ));

        assert_eq!(
            stream.recv().await,
            Some(ServiceSignal::DeviceRemoved(
                "/org/freedesktop/UDisks2/drives/Kingston_DT_1234".to_string()
            ))
        );
    }
}
