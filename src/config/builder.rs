//! Configuration builder
//!
//! Merges configuration from files and CLI arguments.

use crate::cli::args::OutputFormat;
use crate::config::{Config, ConfigFile};
use crate::error::ConfigError;

/// Builder for merging configuration sources
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Load configuration from a file, or the default locations if `None`
    pub fn with_file(mut self, path: Option<&str>) -> Result<Self, ConfigError> {
        let file_config = match path {
            Some(path) => Some(ConfigFile::load(path)?),
            None => ConfigFile::load_default()?,
        };

        if let Some(cfg) = file_config {
            self.config = cfg;
        }

        Ok(self)
    }

    /// Override with CLI verbose flag
    pub fn with_verbose(mut self, verbose: Option<bool>) -> Self {
        if let Some(v) = verbose {
            self.config.general.verbose = v;
        }
        self
    }

    /// Override with CLI output format
    pub fn with_format(mut self, format: Option<OutputFormat>) -> Self {
        if let Some(f) = format {
            self.config.general.format = f;
        }
        self
    }

    /// Override with CLI hostname
    pub fn with_hostname(mut self, hostname: Option<String>) -> Self {
        if let Some(h) = hostname {
            self.config.connection.hostname = h;
        }
        self
    }

    /// Override with CLI socket path
    pub fn with_unix_domain_socket(mut self, socket: Option<String>) -> Self {
        if let Some(s) = socket {
            self.config.connection.unix_domain_socket = Some(s);
        }
        self
    }

    /// Override with CLI timeout
    pub fn with_timeout(mut self, timeout_ms: Option<u32>) -> Self {
        if let Some(t) = timeout_ms {
            self.config.connection.timeout_ms = t;
        }
        self
    }

    /// Build the final configuration
    pub fn build(self) -> Result<Config, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
