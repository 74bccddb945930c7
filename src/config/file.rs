//! Configuration file loading
//!
//! Handles loading configuration from TOML files.

use crate::config::Config;
use crate::error::ConfigError;

use std::path::{Path, PathBuf};

/// Configuration file handler
pub struct ConfigFile;

impl ConfigFile {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the first default location that exists
    ///
    /// A file that exists but fails to parse is an error rather than being
    /// skipped.
    pub fn load_default() -> Result<Option<Config>, ConfigError> {
        for path in Self::default_paths() {
            if path.exists() {
                let config = Self::load(&path)?;
                log::info!("Loaded config from {}", path.display());
                return Ok(Some(config));
            }
        }
        Ok(None)
    }

    /// Get default configuration file paths
    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // System-wide config
        paths.push(PathBuf::from("/etc/fmpm/config.toml"));

        // User config
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("fmpm/config.toml"));
        }

        // Current directory
        paths.push(PathBuf::from("fmpm.toml"));

        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_paths_not_empty() {
        let paths = ConfigFile::default_paths();
        assert_eq!(paths[0], PathBuf::from("/etc/fmpm/config.toml"));
        assert_eq!(paths.last(), Some(&PathBuf::from("fmpm.toml")));
    }

    #[test]
    fn test_load_missing_file() {
        let result = ConfigFile::load("/nonexistent/path/config.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[connection]\nunix_domain_socket = \"/run/nvidia-fabricmanager/fm.sock\"\ntimeout_ms = 1500"
        )
        .unwrap();

        let config = ConfigFile::load(file.path()).unwrap();
        assert_eq!(config.connection.timeout_ms, 1500);
        assert!(config.connection.address().is_unix_socket());
    }

    #[test]
    fn test_load_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[connection\nhostname = ").unwrap();
        assert!(matches!(
            ConfigFile::load(file.path()),
            Err(ConfigError::TomlError(_))
        ));
    }

    #[test]
    fn test_load_rejects_zero_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fmpm.toml");
        std::fs::write(&path, "[connection]\ntimeout_ms = 0\n").unwrap();
        assert!(matches!(
            ConfigFile::load(&path),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
