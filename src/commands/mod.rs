//! Command handlers
//!
//! Each command handler orchestrates the execution of a CLI command against
//! an open [`Session`].

pub mod list;
pub mod nvlink;
pub mod partition;
pub mod version;

pub use list::{run_list, run_unsupported};
pub use nvlink::run_nvlink_failed;
pub use partition::{parse_partition_ids, run_activate, run_deactivate, run_set_activated};
pub use version::run_version;

use crate::cli::args::{Commands, OutputFormat};
use crate::config::ConnectionConfig;
use crate::error::{AppError, Result};
use crate::fabric::{Library, Session};

use std::io::Write;
use std::sync::Arc;

/// Open a session at the configured address
pub fn connect(library: &Arc<Library>, config: &ConnectionConfig) -> Result<Session> {
    let address = config.address();
    log::debug!("Resolved Fabric Manager address {}", address);
    library
        .connect_to(address.clone(), config.timeout_ms)
        .map_err(|source| AppError::Connect {
            address: address.to_string(),
            source,
        })
}

/// Run a command that needs a session
pub fn execute<W: Write>(
    session: &Session,
    command: &Commands,
    format: OutputFormat,
    out: &mut W,
) -> Result<()> {
    match command {
        Commands::List => run_list(session, format, out),

        Commands::Activate { partition_id } => run_activate(session, *partition_id, format, out),

        Commands::Deactivate { partition_id } => {
            run_deactivate(session, *partition_id, format, out)
        }

        Commands::NvlinkFailed => run_nvlink_failed(session, format, out),

        Commands::Unsupported => run_unsupported(session, format, out),

        Commands::SetActivated { partition_ids } => {
            run_set_activated(session, partition_ids, format, out)
        }

        Commands::Version => run_version(format, out),

        Commands::Completions { .. } => Ok(()),
    }
}
