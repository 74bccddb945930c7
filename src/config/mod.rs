//! Configuration system
//!
//! Handles TOML config file parsing and CLI argument merging.

pub mod builder;
pub mod file;

pub use builder::ConfigBuilder;
pub use file::ConfigFile;

use crate::cli::args::OutputFormat;
use crate::error::ConfigError;
use crate::fabric::{FabricAddress, FM_CMD_PORT_NUMBER};
use serde::{Deserialize, Serialize};

/// Default connect timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u32 = 5000;

/// Default Fabric Manager host
pub const DEFAULT_HOSTNAME: &str = "127.0.0.1";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// How to reach the Fabric Manager
    pub connection: ConnectionConfig,
}

impl Config {
    /// Reject values that cannot produce a usable connection
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.connection.validate()
    }
}

/// General configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,
    /// Output format
    pub format: OutputFormat,
}

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Host running the Fabric Manager, optionally with `:port`
    pub hostname: String,
    /// Port used when `hostname` carries none
    pub port: u16,
    /// UNIX domain socket; takes precedence over `hostname`
    pub unix_domain_socket: Option<String>,
    /// Connect timeout in milliseconds
    pub timeout_ms: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            hostname: DEFAULT_HOSTNAME.to_string(),
            port: FM_CMD_PORT_NUMBER,
            unix_domain_socket: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl ConnectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "connection.timeout_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        let socket_set = self.unix_domain_socket.as_deref().is_some_and(|s| !s.is_empty());
        if !socket_set && self.hostname.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "connection.hostname".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Resolved daemon address
    pub fn address(&self) -> FabricAddress {
        if let Some(socket) = self.unix_domain_socket.as_deref().filter(|s| !s.is_empty()) {
            return FabricAddress::unix_socket(socket);
        }
        let hostname = self.hostname.trim();
        if has_explicit_port(hostname) {
            return FabricAddress::parse(hostname);
        }
        let parsed = FabricAddress::parse(hostname);
        if parsed.is_unix_socket() {
            return parsed;
        }
        let host = hostname.trim_start_matches('[').trim_end_matches(']');
        FabricAddress::network(host, self.port)
    }
}

fn has_explicit_port(hostname: &str) -> bool {
    let hostname = hostname.trim();
    if let Some(rest) = hostname.strip_prefix('[') {
        return rest.split_once("]:").is_some();
    }
    matches!(hostname.rsplit_once(':'), Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok())
}
