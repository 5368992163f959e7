// SPDX-License-Identifier: GPL-3.0-only

//! UDisks2 implementation of the disk service
//!
//! [`UdisksDiskService`] answers the mount manager's calls over the system
//! bus and turns `org.freedesktop.DBus.ObjectManager` signals on the UDisks2
//! root object into [`ServiceSignal`](storage_contracts::ServiceSignal)s.

mod dbus;

pub mod error;
pub mod label;
pub mod manager;
pub mod properties;
pub mod resolve;
pub mod service;
pub mod watcher;

pub use error::{
    DiskError, format_error_from_dbus, mount_error_from_dbus, partition_error_from_dbus,
    rename_error_from_dbus,
};
pub use service::UdisksDiskService;
