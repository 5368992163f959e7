// SPDX-License-Identifier: GPL-3.0-only

//! Disk and mount point lifecycle manager
//!
//! [`DiskMountManager`] keeps an in-memory registry of removable disks and the
//! mount points created from them, reconciles it against signals from an
//! [`ExternalDiskService`](storage_contracts::ExternalDiskService), and
//! notifies subscribed observers.
//!
//! ## Pipelines
//!
//! - mount / unmount / recursive unmount of a device
//! - format a mounted device (unmount → format → refresh → apply)
//! - single partition format (recursive unmount → repartition → refresh → format)
//! - rename a mounted device (unmount → rename → apply)
//!
//! Callers await a status code for each pipeline; observers see the same code
//! through [`DiskMountObserver`](storage_contracts::DiskMountObserver) after the
//! registries already reflect it.

pub mod config;
pub mod deferred;
pub mod dispatcher;
pub mod manager;
pub mod refresh;
pub mod registry;

pub use config::ManagerConfig;
pub use dispatcher::ObserverHandle;
pub use manager::DiskMountManager;
pub use registry::{DiskRegistry, MountPointRegistry};
