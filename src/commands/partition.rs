//! Partition activation commands

use crate::cli::args::OutputFormat;
use crate::cli::output::{write_output, ActivatedSet, Message};
use crate::domain::PartitionId;
use crate::error::{AppError, Result};
use crate::fabric::Session;

use std::io::Write;

/// Parse a comma-separated partition ID list
///
/// Whitespace around IDs and empty entries are ignored, so `""` yields an
/// empty list.
pub fn parse_partition_ids(list: &str) -> Result<Vec<PartitionId>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<PartitionId>()
                .map_err(|_| AppError::InvalidPartitionId(s.to_string()))
        })
        .collect()
}

/// Execute the activate command
pub fn run_activate<W: Write>(
    session: &Session,
    id: PartitionId,
    format: OutputFormat,
    out: &mut W,
) -> Result<()> {
    session
        .activate_partition(id)
        .map_err(|source| AppError::Operation {
            action: format!("activate partition {}", id),
            source,
        })?;

    write_output(out, &Message::success(format!("Successfully activated partition {}", id)), format)
}

/// Execute the deactivate command
pub fn run_deactivate<W: Write>(
    session: &Session,
    id: PartitionId,
    format: OutputFormat,
    out: &mut W,
) -> Result<()> {
    session
        .deactivate_partition(id)
        .map_err(|source| AppError::Operation {
            action: format!("deactivate partition {}", id),
            source,
        })?;

    write_output(
        out,
        &Message::success(format!("Successfully deactivated partition {}", id)),
        format,
    )
}

/// Execute the set-activated command
pub fn run_set_activated<W: Write>(
    session: &Session,
    list: &str,
    format: OutputFormat,
    out: &mut W,
) -> Result<()> {
    let ids = parse_partition_ids(list)?;

    session
        .set_activated_partitions(&ids)
        .map_err(|source| AppError::Operation {
            action: "set activated partitions".to_string(),
            source,
        })?;

    write_output(out, &ActivatedSet { activated: ids }, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing;
    use crate::status::ErrorCategory;

    #[test]
    fn test_parse_partition_ids() {
        assert_eq!(parse_partition_ids("1,2,3").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_partition_ids(" 4 , ,5,").unwrap(), vec![4, 5]);
        assert!(parse_partition_ids("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_partition_ids_invalid() {
        let err = parse_partition_ids("1,x2").unwrap_err();
        assert!(matches!(err, AppError::InvalidPartitionId(ref s) if s == "x2"));
        assert!(parse_partition_ids("-1").is_err());
        assert!(parse_partition_ids("4294967296").is_err());
    }

    #[test]
    fn test_activate_then_deactivate() {
        let (mock, _library, session) = testing::session();
        let mut out = Vec::new();

        run_activate(&session, 0, OutputFormat::Table, &mut out).unwrap();
        run_deactivate(&session, 0, OutputFormat::Table, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "✓ Successfully activated partition 0\n✓ Successfully deactivated partition 0\n"
        );
        assert!(mock.partitions().iter().all(|p| !p.is_active));
    }

    #[test]
    fn test_deactivate_inactive_reports_partition_error() {
        let (_mock, _library, session) = testing::session();
        let mut out = Vec::new();
        let err = run_deactivate(&session, 1, OutputFormat::Table, &mut out).unwrap_err();
        assert!(err.to_string().starts_with("failed to deactivate partition 1: "));
        assert_eq!(err.fm_error().unwrap().category(), ErrorCategory::Partition);
    }

    #[test]
    fn test_set_activated_empty_deactivates_all() {
        let (mock, _library, session) = testing::session();
        session.activate_partition(0).unwrap();
        session.activate_partition(1).unwrap();

        let mut out = Vec::new();
        run_set_activated(&session, "", OutputFormat::Compact, &mut out).unwrap();
        assert!(mock.partitions().iter().all(|p| !p.is_active));
    }

    #[test]
    fn test_set_activated_invalid_id_sends_nothing() {
        let (mock, _library, session) = testing::session();
        let mut out = Vec::new();
        assert!(run_set_activated(&session, "0,zero", OutputFormat::Table, &mut out).is_err());
        assert_eq!(mock.call_count("set_activated_partitions"), 0);
    }
}
