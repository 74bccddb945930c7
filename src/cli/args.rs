//! CLI argument definitions using clap derive
//!
//! Defines all command-line arguments and subcommands.

use crate::domain::PartitionId;
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};

/// NVIDIA Fabric Manager partition manager
///
/// Lists, activates and deactivates GPU partitions of a Fabric Manager
/// running in Shared NVSwitch mode.
#[derive(Parser, Debug)]
#[command(name = "fmpm")]
#[command(author, version, about, long_about = None)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Output format [default: table]
    #[arg(long, global = true, value_enum)]
    pub format: Option<OutputFormat>,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "FMPM_CONFIG")]
    pub config: Option<String>,

    /// Hostname or IP address (TCP socket) of Fabric Manager [default: 127.0.0.1]
    #[arg(long, global = true, value_name = "HOST[:PORT]")]
    pub hostname: Option<String>,

    /// UNIX domain socket path for Fabric Manager connection
    #[arg(long, global = true, value_name = "PATH")]
    pub unix_domain_socket: Option<String>,

    /// Connection timeout in milliseconds [default: 5000]
    #[arg(long, global = true, value_name = "MS")]
    pub timeout: Option<u32>,

    #[command(flatten)]
    pub legacy: LegacyArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// List all supported fabric partitions
    List,

    /// Activate a fabric partition
    Activate {
        /// Partition ID
        partition_id: PartitionId,
    },

    /// Deactivate a fabric partition
    Deactivate {
        /// Partition ID
        partition_id: PartitionId,
    },

    /// Query all GPUs and NVSwitches with failed NVLinks
    NvlinkFailed,

    /// List unsupported fabric partitions
    Unsupported,

    /// Set the list of currently activated partitions
    ///
    /// Used after a Fabric Manager restart to restore partition state.
    SetActivated {
        /// Comma-separated partition IDs; an empty string deactivates all
        partition_ids: String,
    },

    /// Show version information
    Version,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Commands {
    /// Whether the command talks to the Fabric Manager
    pub fn needs_fabric(&self) -> bool {
        !matches!(self, Commands::Version | Commands::Completions { .. })
    }
}

/// Single-flag forms of the subcommands
#[derive(Args, Debug, Default)]
pub struct LegacyArgs {
    /// List partitions (legacy flag)
    #[arg(short = 'l', long = "list")]
    pub list: bool,

    /// Activate partition ID (legacy flag)
    #[arg(short = 'a', long = "activate", value_name = "ID")]
    pub activate: Option<PartitionId>,

    /// Deactivate partition ID (legacy flag)
    #[arg(short = 'd', long = "deactivate", value_name = "ID")]
    pub deactivate: Option<PartitionId>,

    /// Query all NVLink failed devices (legacy flag)
    #[arg(long)]
    pub get_nvlink_failed_devices: bool,

    /// Query all unsupported fabric partitions (legacy flag)
    #[arg(long)]
    pub list_unsupported_partitions: bool,

    /// Set activated partition list (legacy flag)
    #[arg(long, value_name = "IDS")]
    pub set_activated_list: Option<String>,

    /// Show version (legacy flag)
    #[arg(short = 'v', long = "version")]
    pub version: bool,
}

impl LegacyArgs {
    /// The command selected by the first legacy flag set, in flag order
    pub fn command(&self) -> Option<Commands> {
        if self.list {
            return Some(Commands::List);
        }
        if let Some(partition_id) = self.activate {
            return Some(Commands::Activate { partition_id });
        }
        if let Some(partition_id) = self.deactivate {
            return Some(Commands::Deactivate { partition_id });
        }
        if self.get_nvlink_failed_devices {
            return Some(Commands::NvlinkFailed);
        }
        if self.list_unsupported_partitions {
            return Some(Commands::Unsupported);
        }
        if let Some(ids) = &self.set_activated_list {
            return Some(Commands::SetActivated {
                partition_ids: ids.clone(),
            });
        }
        if self.version {
            return Some(Commands::Version);
        }
        None
    }
}

impl Cli {
    /// The subcommand, or the command named by a legacy flag
    pub fn resolved_command(&self) -> Option<Commands> {
        self.command.clone().or_else(|| self.legacy.command())
    }
}

/// Output format
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format for machine parsing
    Json,
    /// Compact single-line format
    Compact,
}

/// Generate shell completions and print to stdout
pub fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
}

/// Print help to stdout
pub fn print_help() -> std::io::Result<()> {
    Cli::command().print_help()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_list() {
        let args = Cli::try_parse_from(["fmpm", "list"]).unwrap();
        assert_eq!(args.resolved_command(), Some(Commands::List));
    }

    #[test]
    fn test_cli_parse_activate() {
        let args = Cli::try_parse_from(["fmpm", "activate", "3"]).unwrap();
        assert_eq!(
            args.resolved_command(),
            Some(Commands::Activate { partition_id: 3 })
        );
    }

    #[test]
    fn test_cli_activate_requires_number() {
        assert!(Cli::try_parse_from(["fmpm", "activate", "three"]).is_err());
        assert!(Cli::try_parse_from(["fmpm", "activate", "-1"]).is_err());
    }

    #[test]
    fn test_cli_parse_connection_flags() {
        let args = Cli::try_parse_from([
            "fmpm",
            "--hostname",
            "10.0.0.2",
            "--timeout",
            "250",
            "list",
        ])
        .unwrap();
        assert_eq!(args.hostname.as_deref(), Some("10.0.0.2"));
        assert_eq!(args.timeout, Some(250));
        assert!(args.unix_domain_socket.is_none());
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let args =
            Cli::try_parse_from(["fmpm", "list", "--unix-domain-socket", "/run/fm.sock", "--verbose"])
                .unwrap();
        assert_eq!(args.unix_domain_socket.as_deref(), Some("/run/fm.sock"));
        assert!(args.verbose);
    }

    #[test]
    fn test_cli_parse_set_activated_empty() {
        let args = Cli::try_parse_from(["fmpm", "set-activated", ""]).unwrap();
        assert_eq!(
            args.resolved_command(),
            Some(Commands::SetActivated {
                partition_ids: String::new()
            })
        );
    }

    #[test]
    fn test_legacy_flags() {
        let cases: [(&[&str], Commands); 6] = [
            (&["fmpm", "-l"], Commands::List),
            (&["fmpm", "-a", "0"], Commands::Activate { partition_id: 0 }),
            (&["fmpm", "--deactivate", "5"], Commands::Deactivate { partition_id: 5 }),
            (&["fmpm", "--get-nvlink-failed-devices"], Commands::NvlinkFailed),
            (&["fmpm", "--list-unsupported-partitions"], Commands::Unsupported),
            (&["fmpm", "-v"], Commands::Version),
        ];
        for (argv, expected) in cases {
            let args = Cli::try_parse_from(argv).unwrap();
            assert_eq!(args.resolved_command(), Some(expected), "{:?}", argv);
        }
    }

    #[test]
    fn test_legacy_set_activated_list() {
        let args = Cli::try_parse_from(["fmpm", "--set-activated-list", "1,2"]).unwrap();
        assert_eq!(
            args.resolved_command(),
            Some(Commands::SetActivated {
                partition_ids: "1,2".to_string()
            })
        );
    }

    #[test]
    fn test_no_command() {
        let args = Cli::try_parse_from(["fmpm"]).unwrap();
        assert_eq!(args.resolved_command(), None);
    }

    #[test]
    fn test_needs_fabric() {
        assert!(Commands::List.needs_fabric());
        assert!(!Commands::Version.needs_fabric());
    }
}
