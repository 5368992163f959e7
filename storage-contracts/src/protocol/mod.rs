// SPDX-License-Identifier: GPL-3.0-only

pub mod error;
pub mod signal;

pub use error::{StorageError, StorageErrorKind};
pub use signal::{ServiceSignal, SignalSender, SignalStream, signal_channel};
