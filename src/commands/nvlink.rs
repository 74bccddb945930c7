//! NVLink failure report

use crate::cli::args::OutputFormat;
use crate::cli::output::write_output;
use crate::error::{AppError, Result};
use crate::fabric::Session;

use std::io::Write;

/// Execute the nvlink-failed command
pub fn run_nvlink_failed<W: Write>(session: &Session, format: OutputFormat, out: &mut W) -> Result<()> {
    let report = session
        .nvlink_failed_devices()
        .map_err(|source| AppError::Operation {
            action: "get NVLink failed devices".to_string(),
            source,
        })?;

    if !report.is_healthy() {
        log::debug!(
            "{} GPU(s) and {} NVSwitch(es) report failed NVLinks",
            report.num_gpus,
            report.num_switches
        );
    }

    write_output(out, &report, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing;
    use crate::domain::{NvlinkFailedDeviceInfo, NvlinkFailedDevices};

    #[test]
    fn test_nvlink_report() {
        let (mock, _library, session) = testing::session();
        mock.set_nvlink_failures(NvlinkFailedDevices::new(
            Vec::new(),
            vec![NvlinkFailedDeviceInfo::new("", "00000000:c1:00.0", vec![12, 13, 14])],
        ));

        let mut out = Vec::new();
        run_nvlink_failed(&session, OutputFormat::Table, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("NVSwitches with failed NVLinks: 1"));
        assert!(text.contains("Failed NVSwitches:"));
        assert!(text.contains("Port Numbers: 12, 13, 14"));
    }
}
