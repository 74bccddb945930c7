//! NVLink failure report types

use serde::{Deserialize, Serialize};

/// A GPU or NVSwitch with failed NVLink ports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NvlinkFailedDeviceInfo {
    pub uuid: String,
    pub pci_bus_id: String,
    /// Always equal to `port_nums.len()`
    pub num_ports: u32,
    /// Failed port numbers in daemon order
    pub port_nums: Vec<u32>,
}

impl NvlinkFailedDeviceInfo {
    pub fn new(uuid: impl Into<String>, pci_bus_id: impl Into<String>, port_nums: Vec<u32>) -> Self {
        Self {
            uuid: uuid.into(),
            pci_bus_id: pci_bus_id.into(),
            num_ports: port_nums.len() as u32,
            port_nums,
        }
    }
}

/// Snapshot of all devices with failed NVLinks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NvlinkFailedDevices {
    pub num_gpus: u32,
    pub num_switches: u32,
    pub gpu_info: Vec<NvlinkFailedDeviceInfo>,
    pub switch_info: Vec<NvlinkFailedDeviceInfo>,
}

impl NvlinkFailedDevices {
    pub fn new(
        gpu_info: Vec<NvlinkFailedDeviceInfo>,
        switch_info: Vec<NvlinkFailedDeviceInfo>,
    ) -> Self {
        Self {
            num_gpus: gpu_info.len() as u32,
            num_switches: switch_info.len() as u32,
            gpu_info,
            switch_info,
        }
    }

    /// An empty report means every link is up
    pub fn is_healthy(&self) -> bool {
        self.gpu_info.is_empty() && self.switch_info.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_is_healthy() {
        assert!(NvlinkFailedDevices::default().is_healthy());
    }

    #[test]
    fn test_report_counts() {
        let report = NvlinkFailedDevices::new(
            vec![NvlinkFailedDeviceInfo::new("GPU-aaa", "00000000:07:00.0", vec![3, 7])],
            vec![],
        );
        assert_eq!(report.num_gpus, 1);
        assert_eq!(report.num_switches, 0);
        assert_eq!(report.gpu_info[0].num_ports, 2);
        assert!(!report.is_healthy());
    }
}
