//! Fabric partition domain types
//!
//! Snapshots of the partitions the Fabric Manager reports. Values are built
//! fresh from each response and never refer back to the session.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fabric partition identifier
pub type PartitionId = u32;

/// A GPU that belongs to a fabric partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionGpuInfo {
    /// Physical GPU ID, unique within the partition
    pub physical_id: u32,
    /// Stable device identity assigned by the daemon
    pub uuid: String,
    /// PCI bus ID (e.g., "00000000:07:00.0")
    pub pci_bus_id: String,
    /// NVLinks currently usable
    pub num_nvlinks_available: u32,
    /// NVLinks the GPU could have
    pub max_num_nvlinks: u32,
    /// Per-link line rate in MB/s
    pub nvlink_line_rate_mbps: u32,
}

impl PartitionGpuInfo {
    /// Create GPU info with no NVLink counts or line rate set
    pub fn new(physical_id: u32, uuid: impl Into<String>, pci_bus_id: impl Into<String>) -> Self {
        Self {
            physical_id,
            uuid: uuid.into(),
            pci_bus_id: pci_bus_id.into(),
            num_nvlinks_available: 0,
            max_num_nvlinks: 0,
            nvlink_line_rate_mbps: 0,
        }
    }

    /// Set available and maximum NVLink counts
    pub fn with_nvlinks(mut self, available: u32, max: u32) -> Self {
        self.num_nvlinks_available = available;
        self.max_num_nvlinks = max;
        self
    }

    /// Set the NVLink line rate
    pub fn with_line_rate(mut self, mbps: u32) -> Self {
        self.nvlink_line_rate_mbps = mbps;
        self
    }

    /// True when some NVLinks are missing
    pub fn is_degraded(&self) -> bool {
        self.num_nvlinks_available < self.max_num_nvlinks
    }
}

impl fmt::Display for PartitionGpuInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GPU {} ({}, NVLinks {}/{})",
            self.physical_id, self.uuid, self.num_nvlinks_available, self.max_num_nvlinks
        )
    }
}

/// A fabric partition as reported by the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// Partition ID
    pub id: PartitionId,
    /// Whether the partition is currently activated
    pub is_active: bool,
    /// Number of GPUs, always equal to `gpus.len()`
    pub num_gpus: u32,
    /// Member GPUs in daemon order
    pub gpus: Vec<PartitionGpuInfo>,
}

impl Partition {
    /// Create a partition; the GPU count follows the list
    pub fn new(id: PartitionId, is_active: bool, gpus: Vec<PartitionGpuInfo>) -> Self {
        Self {
            id,
            is_active,
            num_gpus: gpus.len() as u32,
            gpus,
        }
    }

    /// "Active" or "Inactive"
    pub fn status_label(&self) -> &'static str {
        if self.is_active {
            "Active"
        } else {
            "Inactive"
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Partition {} ({}, {} GPUs)",
            self.id,
            self.status_label(),
            self.num_gpus
        )
    }
}

/// A partition topology the daemon knows but cannot currently support
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsupportedPartition {
    pub id: PartitionId,
    /// Always equal to `gpu_physical_ids.len()`
    pub num_gpus: u32,
    pub gpu_physical_ids: Vec<u32>,
}

impl UnsupportedPartition {
    pub fn new(id: PartitionId, gpu_physical_ids: Vec<u32>) -> Self {
        Self {
            id,
            num_gpus: gpu_physical_ids.len() as u32,
            gpu_physical_ids,
        }
    }
}

/// PCI address of a virtual function passed along with an activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PciDevice {
    pub domain: u32,
    pub bus: u32,
    pub device: u32,
    pub function: u32,
}

impl PciDevice {
    pub fn new(domain: u32, bus: u32, device: u32, function: u32) -> Self {
        Self {
            domain,
            bus,
            device,
            function,
        }
    }
}

impl fmt::Display for PciDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.device, self.function
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_counts_gpus() {
        let partition = Partition::new(
            1,
            true,
            vec![
                PartitionGpuInfo::new(0, "GPU-aaa", "00000000:07:00.0"),
                PartitionGpuInfo::new(1, "GPU-bbb", "00000000:0F:00.0"),
            ],
        );
        assert_eq!(partition.num_gpus, 2);
        assert_eq!(partition.to_string(), "Partition 1 (Active, 2 GPUs)");
    }

    #[test]
    fn test_gpu_degraded() {
        let healthy = PartitionGpuInfo::new(0, "GPU-aaa", "").with_nvlinks(12, 12);
        let degraded = PartitionGpuInfo::new(1, "GPU-bbb", "").with_nvlinks(10, 12);
        assert!(!healthy.is_degraded());
        assert!(degraded.is_degraded());
    }

    #[test]
    fn test_pci_device_display() {
        let vf = PciDevice::new(0, 0x3b, 0, 4);
        assert_eq!(vf.to_string(), "00000000:3b:00.4");
    }

    #[test]
    fn test_unsupported_partition_counts() {
        let p = UnsupportedPartition::new(7, vec![0, 1, 2, 3]);
        assert_eq!(p.num_gpus, 4);
    }
}
