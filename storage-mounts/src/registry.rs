// SPDX-License-Identifier: GPL-3.0-only

//! Keyed registries of disks and mount points

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use storage_types::{Disk, MountPoint, MountType};

/// A record addressed by a unique path.
pub trait RegistryRecord: Clone {
    fn key(&self) -> &str;
}

impl RegistryRecord for Disk {
    fn key(&self) -> &str {
        &self.device_path
    }
}

impl RegistryRecord for MountPoint {
    fn key(&self) -> &str {
        &self.mount_path
    }
}

/// Records ordered by key, at most one per key.
#[derive(Debug, Clone)]
pub struct Registry<R> {
    records: BTreeMap<String, R>,
}

impl<R> Default for Registry<R> {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
        }
    }
}

/// Disks keyed by device path
pub type DiskRegistry = Registry<Disk>;

/// Mount points keyed by mount path
pub type MountPointRegistry = Registry<MountPoint>;

impl<R: RegistryRecord> Registry<R> {
    /// Insert a new record. Returns false, leaving the registry untouched, if
    /// the key is already taken.
    pub fn insert(&mut self, record: R) -> bool {
        match self.records.entry(record.key().to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    /// Insert or replace, returning the previous record.
    pub fn upsert(&mut self, record: R) -> Option<R> {
        self.records.insert(record.key().to_string(), record)
    }

    pub fn get(&self, key: &str) -> Option<&R> {
        self.records.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut R> {
        self.records.get_mut(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<R> {
        self.records.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.records.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Snapshot of all records in key order.
    pub fn to_vec(&self) -> Vec<R> {
        self.records.values().cloned().collect()
    }

    /// Keep records matching `keep`; the dropped ones are returned.
    pub fn retain(&mut self, mut keep: impl FnMut(&R) -> bool) -> Vec<R> {
        let dropped: Vec<String> = self
            .records
            .iter()
            .filter(|(_, record)| !keep(record))
            .map(|(key, _)| key.clone())
            .collect();

        dropped
            .iter()
            .filter_map(|key| self.records.remove(key))
            .collect()
    }
}

impl Registry<MountPoint> {
    /// The device mount point created from `source_path`, if any.
    pub fn find_device_mount(&self, source_path: &str) -> Option<&MountPoint> {
        self.iter()
            .find(|mp| mp.mount_type == MountType::Device && mp.source_path == source_path)
    }

    /// Mount paths whose source path starts with `prefix`.
    pub fn mount_paths_with_source_prefix(&self, prefix: &str) -> Vec<String> {
        self.iter()
            .filter(|mp| mp.source_path.starts_with(prefix))
            .map(|mp| mp.mount_path.clone())
            .collect()
    }
}
