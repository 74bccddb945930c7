//! Output formatting utilities
//!
//! Provides table and JSON output formatting for CLI commands.

use crate::cli::args::OutputFormat;
use crate::domain::{NvlinkFailedDeviceInfo, NvlinkFailedDevices, Partition, PartitionId, UnsupportedPartition};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// Format output into any writer
pub fn write_output<W: Write, T: Serialize + TableDisplay>(
    out: &mut W,
    data: &T,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Table => {
            writeln!(out, "{}", data.to_table().trim_end())?;
        }
        OutputFormat::Json => {
            writeln!(out, "{}", serde_json::to_string_pretty(data)?)?;
        }
        OutputFormat::Compact => {
            writeln!(out, "{}", data.to_compact())?;
        }
    }

    Ok(())
}

/// Trait for types that can be displayed as a table
pub trait TableDisplay {
    /// Format as a table string
    fn to_table(&self) -> String;

    /// Format as a compact single line
    fn to_compact(&self) -> String {
        self.to_table().trim_end().replace('\n', " | ")
    }
}

fn join_ids(ids: &[u32]) -> String {
    ids.iter().map(u32::to_string).collect::<Vec<_>>().join(", ")
}

/// Supported partitions for display
#[derive(Debug, Clone, Serialize)]
pub struct PartitionList {
    pub count: usize,
    pub partitions: Vec<Partition>,
}

impl From<Vec<Partition>> for PartitionList {
    fn from(partitions: Vec<Partition>) -> Self {
        Self {
            count: partitions.len(),
            partitions,
        }
    }
}

impl TableDisplay for Partition {
    fn to_table(&self) -> String {
        let mut output = format!("Partition ID: {}\n", self.id);
        output.push_str(&format!("  Status: {}\n", self.status_label()));
        output.push_str(&format!("  GPUs: {}\n", self.num_gpus));

        if !self.gpus.is_empty() {
            output.push_str("  GPU Details:\n");
            for gpu in &self.gpus {
                output.push_str(&format!("    Physical ID: {}\n", gpu.physical_id));
                output.push_str(&format!("    UUID: {}\n", gpu.uuid));
                output.push_str(&format!("    PCI Bus ID: {}\n", gpu.pci_bus_id));
                output.push_str(&format!(
                    "    NVLinks Available: {}/{}{}\n",
                    gpu.num_nvlinks_available,
                    gpu.max_num_nvlinks,
                    if gpu.is_degraded() { " (degraded)" } else { "" }
                ));
                output.push_str(&format!("    Line Rate: {} MB/s\n\n", gpu.nvlink_line_rate_mbps));
            }
        }

        output
    }

    fn to_compact(&self) -> String {
        format!("{}:{}({} GPUs)", self.id, self.status_label(), self.num_gpus)
    }
}

impl TableDisplay for PartitionList {
    fn to_table(&self) -> String {
        if self.partitions.is_empty() {
            return "No partitions found".to_string();
        }

        let mut output = format!("Found {} partition(s):\n\n", self.count);
        for partition in &self.partitions {
            output.push_str(&partition.to_table());
            output.push('\n');
        }
        output
    }

    fn to_compact(&self) -> String {
        self.partitions
            .iter()
            .map(|p| p.to_compact())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Unsupported partitions for display
#[derive(Debug, Clone, Serialize)]
pub struct UnsupportedPartitionList {
    pub count: usize,
    pub partitions: Vec<UnsupportedPartition>,
}

impl From<Vec<UnsupportedPartition>> for UnsupportedPartitionList {
    fn from(partitions: Vec<UnsupportedPartition>) -> Self {
        Self {
            count: partitions.len(),
            partitions,
        }
    }
}

impl TableDisplay for UnsupportedPartitionList {
    fn to_table(&self) -> String {
        if self.partitions.is_empty() {
            return "No unsupported partitions found".to_string();
        }

        let mut output = format!("Found {} unsupported partition(s):\n\n", self.count);
        for partition in &self.partitions {
            output.push_str(&format!("Partition ID: {}\n", partition.id));
            output.push_str(&format!("  GPUs: {}\n", partition.num_gpus));
            if !partition.gpu_physical_ids.is_empty() {
                output.push_str(&format!(
                    "  GPU Physical IDs: {}\n",
                    join_ids(&partition.gpu_physical_ids)
                ));
            }
            output.push('\n');
        }
        output
    }

    fn to_compact(&self) -> String {
        self.partitions
            .iter()
            .map(|p| format!("{}:[{}]", p.id, join_ids(&p.gpu_physical_ids)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn failed_device_lines(output: &mut String, heading: &str, devices: &[NvlinkFailedDeviceInfo]) {
    if devices.is_empty() {
        return;
    }
    output.push_str(heading);
    output.push('\n');
    for (i, device) in devices.iter().enumerate() {
        output.push_str(&format!("  {}. UUID: {}\n", i + 1, device.uuid));
        output.push_str(&format!("     PCI Bus ID: {}\n", device.pci_bus_id));
        output.push_str(&format!("     Failed Ports: {}\n", device.num_ports));
        if !device.port_nums.is_empty() {
            output.push_str(&format!("     Port Numbers: {}\n", join_ids(&device.port_nums)));
        }
        output.push('\n');
    }
}

impl TableDisplay for NvlinkFailedDevices {
    fn to_table(&self) -> String {
        let mut output = String::from("NVLink Failed Devices Report:\n\n");
        output.push_str(&format!("GPUs with failed NVLinks: {}\n", self.num_gpus));
        output.push_str(&format!("NVSwitches with failed NVLinks: {}\n\n", self.num_switches));

        failed_device_lines(&mut output, "Failed GPUs:", &self.gpu_info);
        failed_device_lines(&mut output, "Failed NVSwitches:", &self.switch_info);

        if self.is_healthy() {
            output.push_str("No NVLink failures detected\n");
        }
        output
    }

    fn to_compact(&self) -> String {
        if self.is_healthy() {
            "No NVLink failures".to_string()
        } else {
            format!(
                "{} GPU(s), {} NVSwitch(es) with failed NVLinks",
                self.num_gpus, self.num_switches
            )
        }
    }
}

/// Simple message output
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub message: String,
    pub success: bool,
}

impl Message {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: true,
        }
    }
}

impl TableDisplay for Message {
    fn to_table(&self) -> String {
        if self.success {
            format!("✓ {}", self.message)
        } else {
            format!("✗ {}", self.message)
        }
    }
}

/// Result of replacing the activated partition set
#[derive(Debug, Clone, Serialize)]
pub struct ActivatedSet {
    pub activated: Vec<PartitionId>,
}

impl TableDisplay for ActivatedSet {
    fn to_table(&self) -> String {
        if self.activated.is_empty() {
            "✓ Successfully set activated partitions: none".to_string()
        } else {
            format!(
                "✓ Successfully set activated partitions: {}",
                join_ids(&self.activated)
            )
        }
    }

    fn to_compact(&self) -> String {
        join_ids(&self.activated)
    }
}

/// Version output
#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    pub name: &'static str,
    pub version: &'static str,
}

impl TableDisplay for VersionInfo {
    fn to_table(&self) -> String {
        format!("{} version {}", self.name, self.version)
    }
}
