//! Domain models for fmpm
//!
//! Read-only snapshots of Fabric Manager state, decoded from daemon
//! responses.

pub mod nvlink;
pub mod partition;

pub use nvlink::{NvlinkFailedDeviceInfo, NvlinkFailedDevices};
pub use partition::{
    Partition, PartitionGpuInfo, PartitionId, PciDevice, UnsupportedPartition,
};
