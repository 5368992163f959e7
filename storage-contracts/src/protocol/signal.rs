// SPDX-License-Identifier: GPL-3.0-only

//! Asynchronous signals emitted by the disk service

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use storage_types::{FormatError, MountEntry, RenameError};
use tokio::sync::mpsc;

/// A signal not delivered as the direct reply to a call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "signal", content = "payload")]
pub enum ServiceSignal {
    /// Completion of a previously acknowledged `Mount` call
    MountCompleted(MountEntry),
    FormatCompleted {
        device_path: String,
        error: FormatError,
    },
    RenameCompleted {
        device_path: String,
        error: RenameError,
    },
    DiskAdded(String),
    DiskRemoved(String),
    DeviceAdded(String),
    DeviceRemoved(String),
    DeviceScanned(String),
}

/// Sending half handed to a disk service implementation
#[derive(Debug, Clone)]
pub struct SignalSender {
    sender: mpsc::UnboundedSender<ServiceSignal>,
}

impl SignalSender {
    /// Returns false once the receiving manager has gone away.
    pub fn emit(&self, signal: ServiceSignal) -> bool {
        self.sender.send(signal).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Ordered stream of service signals consumed by the mount manager
pub struct SignalStream {
    receiver: mpsc::UnboundedReceiver<ServiceSignal>,
}

impl SignalStream {
    pub async fn recv(&mut self) -> Option<ServiceSignal> {
        self.receiver.recv().await
    }
}

impl Stream for SignalStream {
    type Item = ServiceSignal;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

pub fn signal_channel() -> (SignalSender, SignalStream) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (SignalSender { sender }, SignalStream { receiver })
}
