//! Test support for the mount manager
//!
//! - [`FakeDiskService`]: scripted in-memory disk service with a call ledger
//! - [`RecordingObserver`]: collects notifications and awaits specific ones
//! - [`fixtures`]: builders for common disk layouts
//! - [`scenario`]: TOML device layouts installed onto the fake service

pub mod errors;
pub mod fake_service;
pub mod fixtures;
pub mod observer;
pub mod scenario;

pub use fake_service::{FakeDiskService, ServiceCall, device_mount_entry};
pub use observer::{ObservedEvent, RecordingObserver};
