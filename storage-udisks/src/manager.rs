// SPDX-License-Identifier: GPL-3.0-only

//! Proxies for UDisks2 objects not covered by the `udisks2` crate

use std::collections::HashMap;

use zbus::zvariant::{self, Value};

pub const BLOCK_IFACE: &str = "org.freedesktop.UDisks2.Block";
pub const DRIVE_IFACE: &str = "org.freedesktop.UDisks2.Drive";
pub const FILESYSTEM_IFACE: &str = "org.freedesktop.UDisks2.Filesystem";

#[zbus::proxy(
    default_service = "org.freedesktop.UDisks2",
    default_path = "/org/freedesktop/UDisks2/Manager",
    interface = "org.freedesktop.UDisks2.Manager"
)]
pub trait UDisks2Manager {
    fn get_block_devices(
        &self,
        options: HashMap<String, Value<'_>>,
    ) -> zbus::Result<Vec<zvariant::OwnedObjectPath>>;
}

#[zbus::proxy(
    default_service = "org.freedesktop.UDisks2",
    default_path = "/org/freedesktop/UDisks2",
    interface = "org.freedesktop.DBus.ObjectManager"
)]
pub trait UDisks2ObjectManager {
    #[zbus(signal)]
    fn interfaces_added(
        &self,
        object_path: zvariant::OwnedObjectPath,
        interfaces_and_properties: HashMap<String, HashMap<String, zvariant::OwnedValue>>,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    fn interfaces_removed(
        &self,
        object_path: zvariant::OwnedObjectPath,
        interfaces: Vec<String>,
    ) -> zbus::Result<()>;
}
