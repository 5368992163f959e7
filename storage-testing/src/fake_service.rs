//! In-memory disk service with scripted outcomes

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use storage_contracts::{
    ExternalDiskService, ServiceSignal, SignalSender, SignalStream, StorageError, signal_channel,
};
use storage_types::{
    DiskInfo, FormatError, MountEntry, MountError, MountRequest, MountType, PartitionError,
    RenameError,
};
use tokio::sync::Notify;

/// One call the manager made into the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    Mount(MountRequest),
    Unmount(String),
    EnumerateDevices,
    EnumerateMountEntries,
    GetDeviceProperties(String),
    Format {
        device_path: String,
        filesystem: String,
        label: String,
    },
    SinglePartitionFormat(String),
    Rename {
        device_path: String,
        volume_name: String,
    },
}

#[derive(Default)]
struct FakeState {
    calls: Vec<ServiceCall>,
    devices: BTreeMap<String, DiskInfo>,
    /// Active mounts keyed by mount path.
    mounted: BTreeMap<String, MountEntry>,
    reject_mounts: bool,
    hold_mount_completions: bool,
    held_completions: Vec<MountEntry>,
    mount_results: HashMap<String, MountError>,
    unmount_results: HashMap<String, MountError>,
    reject_formats: bool,
    format_results: HashMap<String, FormatError>,
    reject_renames: bool,
    rename_results: HashMap<String, RenameError>,
    partition_results: HashMap<String, PartitionError>,
    /// Devices published when a parent is partitioned.
    partition_layouts: HashMap<String, Vec<DiskInfo>>,
    enumerate_error: Option<StorageError>,
    property_gates: HashMap<String, Arc<Notify>>,
    /// Pause before returning format and rename acknowledgements.
    ack_delay: Option<Duration>,
    hold_operation_completions: bool,
    held_operation_completions: Vec<ServiceSignal>,
}

/// A scripted [`ExternalDiskService`].
///
/// Devices and mounts live in memory. Acknowledged requests emit their
/// completion signal synchronously on the paired stream, unless mount
/// completions are held.
pub struct FakeDiskService {
    signals: SignalSender,
    state: Mutex<FakeState>,
}

impl FakeDiskService {
    pub fn new() -> (Arc<Self>, SignalStream) {
        let (signals, stream) = signal_channel();
        let service = Arc::new(Self {
            signals,
            state: Mutex::new(FakeState::default()),
        });
        (service, stream)
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mount path the fake assigns to `source_path`.
    pub fn mount_path_for(source_path: &str) -> String {
        let base = source_path.rsplit('/').next().unwrap_or(source_path);
        format!("/media/removable/{base}")
    }

    pub fn emit(&self, signal: ServiceSignal) -> bool {
        self.signals.emit(signal)
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.state().calls.clone()
    }

    pub fn take_calls(&self) -> Vec<ServiceCall> {
        std::mem::take(&mut self.state().calls)
    }

    pub fn count_calls(&self, matches: impl Fn(&ServiceCall) -> bool) -> usize {
        self.state().calls.iter().filter(|call| matches(call)).count()
    }

    pub fn add_device(&self, info: DiskInfo) {
        self.state().devices.insert(info.device_path.clone(), info);
    }

    pub fn remove_device(&self, device_path: &str) -> Option<DiskInfo> {
        self.state().devices.remove(device_path)
    }

    pub fn device(&self, device_path: &str) -> Option<DiskInfo> {
        self.state().devices.get(device_path).cloned()
    }

    /// Record an existing mount, reported by `enumerate_mount_entries`.
    pub fn add_mount_entry(&self, entry: MountEntry) {
        self.state().mounted.insert(entry.mount_path.clone(), entry);
    }

    pub fn is_mounted(&self, mount_path: &str) -> bool {
        self.state().mounted.contains_key(mount_path)
    }

    pub fn reject_mounts(&self, reject: bool) {
        self.state().reject_mounts = reject;
    }

    /// Acknowledge mounts but keep their completions until released.
    pub fn hold_mount_completions(&self, hold: bool) {
        self.state().hold_mount_completions = hold;
    }

    pub fn release_mount_completions(&self) -> usize {
        let held = std::mem::take(&mut self.state().held_completions);
        let count = held.len();
        for entry in held {
            self.signals.emit(ServiceSignal::MountCompleted(entry));
        }
        count
    }

    pub fn set_mount_result(&self, source_path: &str, error: MountError) {
        self.state()
            .mount_results
            .insert(source_path.to_string(), error);
    }

    pub fn set_unmount_result(&self, mount_path: &str, error: MountError) {
        self.state()
            .unmount_results
            .insert(mount_path.to_string(), error);
    }

    pub fn reject_formats(&self, reject: bool) {
        self.state().reject_formats = reject;
    }

    pub fn set_format_result(&self, device_path: &str, error: FormatError) {
        self.state()
            .format_results
            .insert(device_path.to_string(), error);
    }

    pub fn reject_renames(&self, reject: bool) {
        self.state().reject_renames = reject;
    }

    /// Keep format and rename completion signals until released.
    pub fn hold_operation_completions(&self, hold: bool) {
        self.state().hold_operation_completions = hold;
    }

    pub fn release_operation_completions(&self) -> usize {
        let held = std::mem::take(&mut self.state().held_operation_completions);
        let count = held.len();
        for signal in held {
            self.signals.emit(signal);
        }
        count
    }

    fn complete_operation(&self, state: &mut FakeState, signal: ServiceSignal) {
        if state.hold_operation_completions {
            state.held_operation_completions.push(signal);
        } else {
            self.signals.emit(signal);
        }
    }

    /// Return format and rename acks only after `delay`, with the completion
    /// signal already emitted.
    pub fn delay_acks(&self, delay: Option<Duration>) {
        self.state().ack_delay = delay;
    }

    pub fn set_rename_result(&self, device_path: &str, error: RenameError) {
        self.state()
            .rename_results
            .insert(device_path.to_string(), error);
    }

    pub fn set_partition_result(&self, device_path: &str, error: PartitionError) {
        self.state()
            .partition_results
            .insert(device_path.to_string(), error);
    }

    /// Devices that replace the children of `parent` once it is partitioned.
    pub fn set_partition_layout(&self, parent: &str, children: Vec<DiskInfo>) {
        self.state()
            .partition_layouts
            .insert(parent.to_string(), children);
    }

    pub fn fail_enumeration(&self, error: Option<StorageError>) {
        self.state().enumerate_error = error;
    }

    /// Block property requests for `device_path` until resumed.
    pub fn pause_properties(&self, device_path: &str) {
        self.state()
            .property_gates
            .insert(device_path.to_string(), Arc::new(Notify::new()));
    }

    pub fn resume_properties(&self, device_path: &str) {
        if let Some(gate) = self.state().property_gates.remove(device_path) {
            gate.notify_one();
        }
    }
}

#[async_trait]
impl ExternalDiskService for FakeDiskService {
    async fn mount(&self, request: MountRequest) -> bool {
        let mut state = self.state();
        state.calls.push(ServiceCall::Mount(request.clone()));
        if state.reject_mounts {
            return false;
        }

        let error = state
            .mount_results
            .get(&request.source_path)
            .copied()
            .unwrap_or_default();
        let keeps_mount_path = matches!(
            error,
            MountError::Success | MountError::UnknownFilesystem | MountError::UnsupportedFilesystem
        );
        let mount_path = if keeps_mount_path {
            Self::mount_path_for(&request.source_path)
        } else {
            String::new()
        };

        let entry = MountEntry::new(&request.source_path, mount_path, request.mount_type, error);
        if error.is_success() {
            state.mounted.insert(entry.mount_path.clone(), entry.clone());
        }

        if state.hold_mount_completions {
            state.held_completions.push(entry);
        } else {
            self.signals.emit(ServiceSignal::MountCompleted(entry));
        }
        true
    }

    async fn unmount(&self, mount_path: &str) -> MountError {
        let mut state = self.state();
        state.calls.push(ServiceCall::Unmount(mount_path.to_string()));
        if let Some(error) = state.unmount_results.get(mount_path).copied() {
            return error;
        }

        match state.mounted.remove(mount_path) {
            Some(_) => MountError::Success,
            None => MountError::PathNotMounted,
        }
    }

    async fn enumerate_devices(&self) -> Result<Vec<String>, StorageError> {
        let mut state = self.state();
        state.calls.push(ServiceCall::EnumerateDevices);
        if let Some(error) = state.enumerate_error.clone() {
            return Err(error);
        }
        Ok(state.devices.keys().cloned().collect())
    }

    async fn enumerate_mount_entries(&self) -> Result<Vec<MountEntry>, StorageError> {
        let mut state = self.state();
        state.calls.push(ServiceCall::EnumerateMountEntries);
        Ok(state.mounted.values().cloned().collect())
    }

    async fn get_device_properties(&self, device_path: &str) -> Result<DiskInfo, StorageError> {
        let gate = {
            let mut state = self.state();
            state
                .calls
                .push(ServiceCall::GetDeviceProperties(device_path.to_string()));
            state.property_gates.get(device_path).cloned()
        };

        if let Some(gate) = gate {
            gate.notified().await;
        }

        self.state()
            .devices
            .get(device_path)
            .cloned()
            .ok_or_else(|| StorageError::not_found(format!("no such device: {device_path}")))
    }

    async fn format(&self, device_path: &str, filesystem: &str, label: &str) -> bool {
        let delay = {
            let mut state = self.state();
            state.calls.push(ServiceCall::Format {
                device_path: device_path.to_string(),
                filesystem: filesystem.to_string(),
                label: label.to_string(),
            });
            if state.reject_formats {
                return false;
            }

            let error = state
                .format_results
                .get(device_path)
                .copied()
                .unwrap_or_default();
            if error.is_success()
                && let Some(info) = state.devices.get_mut(device_path)
            {
                info.file_system_type = filesystem.to_string();
                info.device_label = label.to_string();
            }

            self.complete_operation(
                &mut state,
                ServiceSignal::FormatCompleted {
                    device_path: device_path.to_string(),
                    error,
                },
            );
            state.ack_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        true
    }

    async fn single_partition_format(&self, device_path: &str) -> PartitionError {
        let mut state = self.state();
        state
            .calls
            .push(ServiceCall::SinglePartitionFormat(device_path.to_string()));

        let error = state
            .partition_results
            .get(device_path)
            .copied()
            .unwrap_or_default();
        if error.is_success()
            && let Some(children) = state.partition_layouts.get(device_path).cloned()
        {
            state
                .devices
                .retain(|path, _| path == device_path || !path.starts_with(device_path));
            for child in children {
                state.devices.insert(child.device_path.clone(), child);
            }
        }
        error
    }

    async fn rename(&self, device_path: &str, volume_name: &str) -> bool {
        let delay = {
            let mut state = self.state();
            state.calls.push(ServiceCall::Rename {
                device_path: device_path.to_string(),
                volume_name: volume_name.to_string(),
            });
            if state.reject_renames {
                return false;
            }

            let error = state
                .rename_results
                .get(device_path)
                .copied()
                .unwrap_or_default();
            if error.is_success()
                && let Some(info) = state.devices.get_mut(device_path)
            {
                info.device_label = volume_name.to_string();
            }

            self.complete_operation(
                &mut state,
                ServiceSignal::RenameCompleted {
                    device_path: device_path.to_string(),
                    error,
                },
            );
            state.ack_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        true
    }
}

/// Build a mount entry the way the fake reports a successful device mount.
pub fn device_mount_entry(source_path: &str) -> MountEntry {
    MountEntry::new(
        source_path,
        FakeDiskService::mount_path_for(source_path),
        MountType::Device,
        MountError::Success,
    )
}
