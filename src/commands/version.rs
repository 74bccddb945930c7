//! Version command implementation

use crate::cli::args::OutputFormat;
use crate::cli::output::{write_output, VersionInfo};
use crate::error::Result;

use std::io::Write;

/// Execute the version command
pub fn run_version<W: Write>(format: OutputFormat, out: &mut W) -> Result<()> {
    let info = VersionInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    };
    write_output(out, &info, format)
}
