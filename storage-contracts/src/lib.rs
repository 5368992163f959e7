// SPDX-License-Identifier: GPL-3.0-only

pub mod protocol;
pub mod traits;

pub use protocol::{
    ServiceSignal, SignalSender, SignalStream, StorageError, StorageErrorKind, signal_channel,
};
pub use traits::{DiskMountObserver, ExternalDiskService};
