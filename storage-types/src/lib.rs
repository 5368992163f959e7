// SPDX-License-Identifier: GPL-3.0-only

//! Canonical domain models for the COSMIC Ext Storage mount manager
//!
//! This crate defines the single source of truth for the records the mount
//! manager keeps and the codes it reports. The models are used throughout the
//! stack:
//!
//! - **storage-udisks**: Builds `DiskInfo` and `MountEntry` values from UDisks2
//! - **storage-mounts**: Keeps `Disk` and `MountPoint` registries consistent
//! - **storage-service**: Logs and serializes events for clients
//!
//! ## Records
//!
//! - `DiskInfo` → properties as reported by the disk service
//! - `Disk` → registry record built from `DiskInfo` plus local mount state
//! - `MountEntry` → a mount completion as reported by the disk service
//! - `MountPoint` → registry record of an active mount
//!
//! ## Status codes
//!
//! `MountError`, `FormatError`, `PartitionError` and `RenameError` are closed
//! enumerations carrying a `Success` variant, so the same value travels to
//! callers and observers.

pub mod disk;
pub mod event;
pub mod filesystem;
pub mod mount;
pub mod status;

pub use disk::{DeviceType, Disk, DiskInfo};
pub use event::{DeviceEvent, DiskEvent, FormatEvent, MountEvent, PartitionEvent, RenameEvent};
pub use filesystem::{FormatFileSystemType, PendingChange};
pub use mount::{
    MountAccessMode, MountCompletion, MountCondition, MountEntry, MountPoint, MountRequest,
    MountType, RemountOption,
};
pub use status::{FormatError, MountError, PartitionError, RenameError};
