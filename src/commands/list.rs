//! List command implementation
//!
//! Lists supported and unsupported fabric partitions.

use crate::cli::args::OutputFormat;
use crate::cli::output::{write_output, PartitionList, UnsupportedPartitionList};
use crate::error::{AppError, Result};
use crate::fabric::Session;

use std::io::Write;

/// Execute the list command
pub fn run_list<W: Write>(session: &Session, format: OutputFormat, out: &mut W) -> Result<()> {
    let partitions = session
        .supported_partitions()
        .map_err(|source| AppError::Operation {
            action: "get partitions".to_string(),
            source,
        })?;

    write_output(out, &PartitionList::from(partitions), format)
}

/// Execute the unsupported command
pub fn run_unsupported<W: Write>(session: &Session, format: OutputFormat, out: &mut W) -> Result<()> {
    let partitions = session
        .unsupported_partitions()
        .map_err(|source| AppError::Operation {
            action: "get unsupported partitions".to_string(),
            source,
        })?;

    write_output(out, &UnsupportedPartitionList::from(partitions), format)
}
