// SPDX-License-Identifier: GPL-3.0-only

pub mod observer;
pub mod service;

pub use observer::DiskMountObserver;
pub use service::ExternalDiskService;
