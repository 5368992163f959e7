// SPDX-License-Identifier: GPL-3.0-only

//! Mount completions held back until their disk's properties have arrived

use std::collections::HashMap;

use storage_types::MountEntry;

/// What the manager knows about a device path it has been told about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DiscoveryState {
    #[default]
    NotSeen,
    /// A `DiskAdded` is being resolved; completions are buffered in arrival order.
    PendingProperties(Vec<MountEntry>),
    Known,
}

#[derive(Debug, Default)]
pub struct DeferredEventBuffer {
    devices: HashMap<String, DiscoveryState>,
}

impl DeferredEventBuffer {
    /// Start buffering completions for `device_path`.
    ///
    /// A second reservation while one is live keeps the already buffered
    /// entries.
    pub fn reserve(&mut self, device_path: &str) {
        let state = self.devices.entry(device_path.to_string()).or_default();
        if !matches!(state, DiscoveryState::PendingProperties(_)) {
            *state = DiscoveryState::PendingProperties(Vec::new());
        }
    }

    /// Buffer `entry` if its source has a live reservation, otherwise hand it back.
    pub fn defer(&mut self, entry: MountEntry) -> Option<MountEntry> {
        match self.devices.get_mut(&entry.source_path) {
            Some(DiscoveryState::PendingProperties(buffered)) => {
                buffered.push(entry);
                None
            }
            _ => Some(entry),
        }
    }

    /// Properties arrived: mark the device known and return what was buffered.
    pub fn resolve(&mut self, device_path: &str) -> Vec<MountEntry> {
        match self
            .devices
            .insert(device_path.to_string(), DiscoveryState::Known)
        {
            Some(DiscoveryState::PendingProperties(buffered)) => buffered,
            _ => Vec::new(),
        }
    }

    /// Mark a device known without touching a live reservation.
    pub fn mark_known(&mut self, device_path: &str) {
        let state = self.devices.entry(device_path.to_string()).or_default();
        if *state == DiscoveryState::NotSeen {
            *state = DiscoveryState::Known;
        }
    }

    /// Drop all knowledge of `device_path`, returning anything still buffered.
    pub fn forget(&mut self, device_path: &str) -> Vec<MountEntry> {
        match self.devices.remove(device_path) {
            Some(DiscoveryState::PendingProperties(buffered)) => buffered,
            _ => Vec::new(),
        }
    }

    pub fn state(&self, device_path: &str) -> DiscoveryState {
        self.devices.get(device_path).cloned().unwrap_or_default()
    }

    pub fn is_pending(&self, device_path: &str) -> bool {
        matches!(
            self.devices.get(device_path),
            Some(DiscoveryState::PendingProperties(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage_types::{MountError, MountType};

    fn entry(source: &str, mount: &str) -> MountEntry {
        MountEntry::new(source, mount, MountType::Device, MountError::Success)
    }

    #[test]
    fn entries_pass_through_without_a_reservation() {
        let mut buffer = DeferredEventBuffer::default();
        assert!(buffer.defer(entry("/dev/sdb1", "/media/removable/A")).is_some());

        buffer.mark_known("/dev/sdb1");
        assert!(buffer.defer(entry("/dev/sdb1", "/media/removable/A")).is_some());
        assert_eq!(buffer.state("/dev/sdb1"), DiscoveryState::Known);
    }

    #[test]
    fn reserved_entries_replay_in_arrival_order() {
        let mut buffer = DeferredEventBuffer::default();
        buffer.reserve("/dev/sdb1");

        assert!(buffer.defer(entry("/dev/sdb1", "/media/removable/A")).is_none());
        assert!(buffer.defer(entry("/dev/sdb1", "/media/removable/B")).is_none());
        assert!(buffer.defer(entry("/dev/sdc1", "/media/removable/C")).is_some());

        let replay = buffer.resolve("/dev/sdb1");
        let paths: Vec<_> = replay.iter().map(|e| e.mount_path.as_str()).collect();
        assert_eq!(paths, vec!["/media/removable/A", "/media/removable/B"]);
        assert_eq!(buffer.state("/dev/sdb1"), DiscoveryState::Known);
    }

    #[test]
    fn mark_known_leaves_live_reservation_alone() {
        let mut buffer = DeferredEventBuffer::default();
        buffer.reserve("/dev/sdb1");
        buffer.defer(entry("/dev/sdb1", "/media/removable/A"));

        buffer.mark_known("/dev/sdb1");
        buffer.reserve("/dev/sdb1");

        assert!(buffer.is_pending("/dev/sdb1"));
        assert_eq!(buffer.forget("/dev/sdb1").len(), 1);
        assert_eq!(buffer.state("/dev/sdb1"), DiscoveryState::NotSeen);
    }
}
