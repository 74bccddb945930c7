//! Trait definitions for the Fabric Manager API
//!
//! One method per entry point of the daemon's client library. Methods take
//! encoded structures and return the raw status so that decoding and error
//! mapping stay in one place. This abstracts over libnvfm to enable testing
//! with an in-process mock daemon.

use crate::domain::PartitionId;
use crate::fabric::codec::WireBuffer;
use crate::status::RawStatus;

/// Opaque connection handle issued by `connect`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(pub usize);

/// Raw Fabric Manager entry points
///
/// Implementations must be callable from any thread. Calls that share a
/// handle are serialized by the session that owns it.
pub trait FabricApi: Send + Sync {
    /// fmLibInit
    fn lib_init(&self) -> RawStatus;

    /// fmLibShutdown
    fn lib_shutdown(&self) -> RawStatus;

    /// fmConnect; `params` holds an encoded fmConnectParams
    fn connect(&self, params: &mut WireBuffer, handle: &mut RawHandle) -> RawStatus;

    /// fmDisconnect
    fn disconnect(&self, handle: RawHandle) -> RawStatus;

    /// fmGetSupportedFabricPartitions
    fn get_supported_partitions(&self, handle: RawHandle, list: &mut WireBuffer) -> RawStatus;

    /// fmActivateFabricPartition
    fn activate_partition(&self, handle: RawHandle, id: PartitionId) -> RawStatus;

    /// fmActivateFabricPartitionWithVFs; `vfs` holds `num_vfs` fmPciDevice records
    fn activate_partition_with_vfs(
        &self,
        handle: RawHandle,
        id: PartitionId,
        vfs: &mut WireBuffer,
        num_vfs: u32,
    ) -> RawStatus;

    /// fmDeactivateFabricPartition
    fn deactivate_partition(&self, handle: RawHandle, id: PartitionId) -> RawStatus;

    /// fmSetActivatedFabricPartitions
    fn set_activated_partitions(&self, handle: RawHandle, list: &mut WireBuffer) -> RawStatus;

    /// fmGetNvlinkFailedDevices
    fn get_nvlink_failed_devices(&self, handle: RawHandle, devices: &mut WireBuffer)
        -> RawStatus;

    /// fmGetUnsupportedFabricPartitions
    fn get_unsupported_partitions(&self, handle: RawHandle, list: &mut WireBuffer) -> RawStatus;
}
