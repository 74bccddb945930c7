//! Mock implementations for testing
//!
//! Provides an in-process Fabric Manager daemon that speaks the same
//! encoded structures as libnvfm, for unit testing without a fabric.

use crate::domain::{NvlinkFailedDevices, Partition, PartitionId, PciDevice, UnsupportedPartition};
use crate::error::FabricError;
use crate::fabric::codec::{
    decode_activated_list, decode_connect_params, decode_pci_devices, encode_nvlink_failed_devices,
    encode_partition_list, encode_unsupported_partition_list, version_tag, ConnectParams,
    WireBuffer, FABRIC_PARTITION_LIST, FM_MAX_FABRIC_PARTITIONS, FM_MAX_NUM_GPUS,
    NVLINK_FAILED_DEVICES, UNSUPPORTED_PARTITION_LIST,
};
use crate::fabric::traits::{FabricApi, RawHandle};
use crate::status::{RawStatus, StatusCode};

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// One-shot misbehavior for the next matching call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Next call of any kind returns this status
    Status(StatusCode),
    /// Next filled response carries a newer revision in its version tag
    RevisionSkew,
    /// Next filled response claims one element more than it can hold
    CountOverflow,
}

#[derive(Debug)]
struct DaemonState {
    partitions: Vec<Partition>,
    vfs: HashMap<PartitionId, Vec<PciDevice>>,
    nvlink_failures: NvlinkFailedDevices,
    unsupported: Vec<UnsupportedPartition>,
    reachable: bool,
    init_count: usize,
    init_failure: Option<StatusCode>,
    handles: HashSet<usize>,
    next_handle: usize,
    connects: Vec<ConnectParams>,
    calls: HashMap<&'static str, usize>,
    fault: Option<Fault>,
}

impl DaemonState {
    fn record(&mut self, call: &'static str) {
        *self.calls.entry(call).or_default() += 1;
    }

    fn take_status_fault(&mut self) -> Option<RawStatus> {
        match self.fault {
            Some(Fault::Status(code)) => {
                self.fault = None;
                Some(code.as_raw())
            }
            _ => None,
        }
    }

    fn take_layout_fault(&mut self) -> Option<Fault> {
        match self.fault {
            Some(Fault::RevisionSkew | Fault::CountOverflow) => self.fault.take(),
            _ => None,
        }
    }

    /// Common preamble: count the call, validate the handle, fire status faults
    fn enter(&mut self, call: &'static str, handle: RawHandle) -> Result<(), RawStatus> {
        self.record(call);
        if !self.handles.contains(&handle.0) {
            return Err(StatusCode::ConnectionNotValid.as_raw());
        }
        match self.take_status_fault() {
            Some(code) => Err(code),
            None => Ok(()),
        }
    }

    fn index_of(&self, id: PartitionId) -> Option<usize> {
        self.partitions.iter().position(|p| p.id == id)
    }

    /// Whether any GPU of `idx` belongs to another active partition
    fn overlaps_active(&self, idx: usize) -> bool {
        let gpus: HashSet<u32> = self.partitions[idx].gpus.iter().map(|g| g.physical_id).collect();
        self.partitions
            .iter()
            .enumerate()
            .filter(|(i, p)| *i != idx && p.is_active)
            .any(|(_, p)| p.gpus.iter().any(|g| gpus.contains(&g.physical_id)))
    }

    fn activate(&mut self, id: PartitionId) -> Result<usize, RawStatus> {
        let idx = self
            .index_of(id)
            .ok_or(StatusCode::PartitionIdNotInUse.as_raw())?;
        if self.partitions[idx].is_active {
            return Err(StatusCode::PartitionIdInUse.as_raw());
        }
        if self.overlaps_active(idx) {
            return Err(StatusCode::ResourceInUse.as_raw());
        }
        self.partitions[idx].is_active = true;
        Ok(idx)
    }
}

fn status_of(err: FabricError) -> RawStatus {
    err.fm_error()
        .map(|e| e.code())
        .unwrap_or(StatusCode::BadParam.as_raw())
}

fn to_status(result: Result<(), RawStatus>) -> RawStatus {
    result.err().unwrap_or(StatusCode::Success.as_raw())
}

/// Corrupt a filled response the way a misbehaving daemon would
fn apply_layout_fault(buf: &mut WireBuffer, fault: Fault, size: usize, revision: u32, capacity: usize) {
    match fault {
        Fault::RevisionSkew => buf.put_u32(0, version_tag(size as u32, revision + 1)),
        Fault::CountOverflow => buf.put_u32(4, capacity as u32 + 1),
        Fault::Status(_) => {}
    }
}

/// Mock Fabric Manager daemon for testing
#[derive(Debug)]
pub struct MockFabric {
    state: Mutex<DaemonState>,
}

impl MockFabric {
    /// Create a reachable daemon with no partitions
    pub fn new() -> Self {
        Self::with_partitions(Vec::new())
    }

    /// Create a reachable daemon serving these partitions
    pub fn with_partitions(partitions: Vec<Partition>) -> Self {
        Self {
            state: Mutex::new(DaemonState {
                partitions,
                vfs: HashMap::new(),
                nvlink_failures: NvlinkFailedDevices::default(),
                unsupported: Vec::new(),
                reachable: true,
                init_count: 0,
                init_failure: None,
                handles: HashSet::new(),
                next_handle: 0x1000,
                connects: Vec::new(),
                calls: HashMap::new(),
                fault: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, DaemonState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make connects fail as if nothing were listening
    pub fn set_reachable(&self, reachable: bool) {
        self.state().reachable = reachable;
    }

    /// Make the next lib_init fail
    pub fn fail_init(&self, code: StatusCode) {
        self.state().init_failure = Some(code);
    }

    pub fn set_nvlink_failures(&self, report: NvlinkFailedDevices) {
        self.state().nvlink_failures = report;
    }

    pub fn set_unsupported(&self, partitions: Vec<UnsupportedPartition>) {
        self.state().unsupported = partitions;
    }

    /// Arm a one-shot fault
    pub fn inject(&self, fault: Fault) {
        self.state().fault = Some(fault);
    }

    pub fn init_count(&self) -> usize {
        self.state().init_count
    }

    /// Successful connects so far
    pub fn connect_count(&self) -> usize {
        self.state().connects.len()
    }

    pub fn last_connect_params(&self) -> Option<ConnectParams> {
        self.state().connects.last().cloned()
    }

    /// Handles issued and not yet disconnected
    pub fn open_handles(&self) -> usize {
        self.state().handles.len()
    }

    /// Times an entry point was invoked, e.g. `"activate_partition"`
    pub fn call_count(&self, call: &str) -> usize {
        self.state().calls.get(call).copied().unwrap_or(0)
    }

    /// Virtual functions attached when a partition was activated
    pub fn partition_vfs(&self, id: PartitionId) -> Vec<PciDevice> {
        self.state().vfs.get(&id).cloned().unwrap_or_default()
    }

    /// Snapshot of the daemon's partition table
    pub fn partitions(&self) -> Vec<Partition> {
        self.state().partitions.clone()
    }
}

impl Default for MockFabric {
    fn default() -> Self {
        Self::new()
    }
}

impl FabricApi for MockFabric {
    fn lib_init(&self) -> RawStatus {
        let mut s = self.state();
        s.record("lib_init");
        if let Some(code) = s.init_failure.take() {
            return code.as_raw();
        }
        s.init_count += 1;
        StatusCode::Success.as_raw()
    }

    fn lib_shutdown(&self) -> RawStatus {
        self.state().record("lib_shutdown");
        StatusCode::Success.as_raw()
    }

    fn connect(&self, params: &mut WireBuffer, handle: &mut RawHandle) -> RawStatus {
        let mut s = self.state();
        s.record("connect");
        if let Some(code) = s.take_status_fault() {
            return code;
        }
        let params = match decode_connect_params(params) {
            Ok(params) => params,
            Err(e) => return status_of(e),
        };
        if params.timeout_ms == 0 {
            return StatusCode::BadParam.as_raw();
        }
        if !s.reachable {
            return StatusCode::ConnectionNotValid.as_raw();
        }
        s.next_handle += 1;
        let issued = s.next_handle;
        s.handles.insert(issued);
        s.connects.push(params);
        *handle = RawHandle(issued);
        StatusCode::Success.as_raw()
    }

    fn disconnect(&self, handle: RawHandle) -> RawStatus {
        let mut s = self.state();
        s.record("disconnect");
        if s.handles.remove(&handle.0) {
            StatusCode::Success.as_raw()
        } else {
            StatusCode::ConnectionNotValid.as_raw()
        }
    }

    fn get_supported_partitions(&self, handle: RawHandle, list: &mut WireBuffer) -> RawStatus {
        let mut s = self.state();
        if let Err(code) = s.enter("get_supported_partitions", handle) {
            return code;
        }
        if let Err(e) = encode_partition_list(list, &s.partitions) {
            return status_of(e);
        }
        if let Some(fault) = s.take_layout_fault() {
            let layout = FABRIC_PARTITION_LIST;
            apply_layout_fault(list, fault, layout.size, layout.revision, FM_MAX_FABRIC_PARTITIONS);
        }
        StatusCode::Success.as_raw()
    }

    fn activate_partition(&self, handle: RawHandle, id: PartitionId) -> RawStatus {
        let mut s = self.state();
        if let Err(code) = s.enter("activate_partition", handle) {
            return code;
        }
        to_status(s.activate(id).map(|_| ()))
    }

    fn activate_partition_with_vfs(
        &self,
        handle: RawHandle,
        id: PartitionId,
        vfs: &mut WireBuffer,
        num_vfs: u32,
    ) -> RawStatus {
        let mut s = self.state();
        if let Err(code) = s.enter("activate_partition_with_vfs", handle) {
            return code;
        }
        let devices = match decode_pci_devices(vfs, num_vfs as usize) {
            Ok(devices) => devices,
            Err(_) => return StatusCode::BadParam.as_raw(),
        };
        match s.activate(id) {
            Ok(_) => {
                s.vfs.insert(id, devices);
                StatusCode::Success.as_raw()
            }
            Err(code) => code,
        }
    }

    fn deactivate_partition(&self, handle: RawHandle, id: PartitionId) -> RawStatus {
        let mut s = self.state();
        if let Err(code) = s.enter("deactivate_partition", handle) {
            return code;
        }
        match s.index_of(id) {
            Some(idx) if s.partitions[idx].is_active => {
                s.partitions[idx].is_active = false;
                s.vfs.remove(&id);
                StatusCode::Success.as_raw()
            }
            _ => StatusCode::PartitionIdNotInUse.as_raw(),
        }
    }

    fn set_activated_partitions(&self, handle: RawHandle, list: &mut WireBuffer) -> RawStatus {
        let mut s = self.state();
        if let Err(code) = s.enter("set_activated_partitions", handle) {
            return code;
        }
        let ids = match decode_activated_list(list) {
            Ok(ids) => ids,
            Err(e) => return status_of(e),
        };

        let mut seen = HashSet::new();
        let mut gpus = HashSet::new();
        for id in &ids {
            if !seen.insert(*id) {
                return StatusCode::BadParam.as_raw();
            }
            let Some(idx) = s.index_of(*id) else {
                return StatusCode::PartitionIdNotInUse.as_raw();
            };
            for gpu in &s.partitions[idx].gpus {
                if !gpus.insert(gpu.physical_id) {
                    return StatusCode::ResourceInUse.as_raw();
                }
            }
        }

        for partition in s.partitions.iter_mut() {
            partition.is_active = seen.contains(&partition.id);
        }
        s.vfs.retain(|id, _| seen.contains(id));
        StatusCode::Success.as_raw()
    }

    fn get_nvlink_failed_devices(
        &self,
        handle: RawHandle,
        devices: &mut WireBuffer,
    ) -> RawStatus {
        let mut s = self.state();
        if let Err(code) = s.enter("get_nvlink_failed_devices", handle) {
            return code;
        }
        if let Err(e) = encode_nvlink_failed_devices(devices, &s.nvlink_failures) {
            return status_of(e);
        }
        if let Some(fault) = s.take_layout_fault() {
            let layout = NVLINK_FAILED_DEVICES;
            apply_layout_fault(devices, fault, layout.size, layout.revision, FM_MAX_NUM_GPUS);
        }
        StatusCode::Success.as_raw()
    }

    fn get_unsupported_partitions(&self, handle: RawHandle, list: &mut WireBuffer) -> RawStatus {
        let mut s = self.state();
        if let Err(code) = s.enter("get_unsupported_partitions", handle) {
            return code;
        }
        if let Err(e) = encode_unsupported_partition_list(list, &s.unsupported) {
            return status_of(e);
        }
        if let Some(fault) = s.take_layout_fault() {
            let layout = UNSUPPORTED_PARTITION_LIST;
            apply_layout_fault(list, fault, layout.size, layout.revision, FM_MAX_FABRIC_PARTITIONS);
        }
        StatusCode::Success.as_raw()
    }
}
