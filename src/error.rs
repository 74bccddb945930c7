//! Unified error types for fmpm
//!
//! This module defines all error types used throughout the library and CLI.
//! Uses thiserror for ergonomic error definitions.

use crate::status::{self, ErrorCategory, RawStatus, StatusCode};
use thiserror::Error;

/// Error reported by the Fabric Manager for a non-success status
///
/// Constructed at the protocol boundary; carries the original code so
/// callers can classify it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("FabricManager error {code}: {message}")]
pub struct FmError {
    code: RawStatus,
    message: String,
}

impl FmError {
    /// Build an error with an explicit message
    pub fn new(code: RawStatus, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Build an error from a raw status using the standard message
    pub fn from_raw(code: RawStatus) -> Self {
        Self::new(code, status::message_for(code))
    }

    /// `Ok(())` for success, the wrapped error otherwise
    pub fn check(code: RawStatus) -> std::result::Result<(), FmError> {
        if code == StatusCode::Success.as_raw() {
            Ok(())
        } else {
            Err(Self::from_raw(code))
        }
    }

    pub fn code(&self) -> RawStatus {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Decoded status, if the code is in the defined space
    pub fn status(&self) -> Option<StatusCode> {
        StatusCode::from_raw(self.code)
    }

    pub fn category(&self) -> ErrorCategory {
        status::category_for(self.code)
    }

    pub fn is_connection_error(&self) -> bool {
        self.category() == ErrorCategory::Connection
    }

    pub fn is_resource_error(&self) -> bool {
        self.category() == ErrorCategory::Resource
    }

    pub fn is_partition_error(&self) -> bool {
        self.category() == ErrorCategory::Partition
    }

    /// Whether retrying after backoff or reconnecting can succeed
    pub fn is_retryable(&self) -> bool {
        self.is_connection_error()
    }
}

impl From<StatusCode> for FmError {
    fn from(code: StatusCode) -> Self {
        Self::new(code.as_raw(), code.message())
    }
}

/// Find an `FmError` in an error or anywhere in its source chain
///
/// Transparent wrappers forward `source()` past the wrapped value, so the
/// crate's own wrapper types are unpacked explicitly.
pub fn find_fm_error<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a FmError> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(fm) = e.downcast_ref::<FmError>() {
            return Some(fm);
        }
        if let Some(fm) = e.downcast_ref::<FabricError>().and_then(FabricError::fm_error) {
            return Some(fm);
        }
        if let Some(fm) = e.downcast_ref::<AppError>().and_then(AppError::fm_error) {
            return Some(fm);
        }
        current = e.source();
    }
    None
}

/// True if the error carries a Connection-category status
pub fn is_connection_error(err: &(dyn std::error::Error + 'static)) -> bool {
    find_fm_error(err).is_some_and(FmError::is_connection_error)
}

/// True if the error carries a Resource-category status
pub fn is_resource_error(err: &(dyn std::error::Error + 'static)) -> bool {
    find_fm_error(err).is_some_and(FmError::is_resource_error)
}

/// True if the error carries a Partition-category status
pub fn is_partition_error(err: &(dyn std::error::Error + 'static)) -> bool {
    find_fm_error(err).is_some_and(FmError::is_partition_error)
}

/// Violations of the fixed-layout message contract
///
/// These mean the daemon (or the caller) broke the wire format and are
/// never recoverable by retrying.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// An element count larger than the structure can hold
    #[error("{field} count {count} exceeds capacity {capacity}")]
    CapacityExceeded {
        field: &'static str,
        count: usize,
        capacity: usize,
    },

    /// A buffer shorter than the structure it should contain
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// A field value outside the range the structure allows
    #[error("{field} value {value} out of range (bound {bound})")]
    InvalidField {
        field: &'static str,
        value: u32,
        bound: u32,
    },
}

/// Errors from the fabric client layer
#[derive(Error, Debug)]
pub enum FabricError {
    /// Non-success status from the Fabric Manager
    #[error(transparent)]
    Fm(#[from] FmError),

    /// Wire contract violation
    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    /// Fabric Manager client library not found
    #[error("Fabric Manager library not found: {0}. Is the nvidia-fabricmanager package installed?")]
    LibraryNotFound(String),

    /// Client library lacks an entry point
    #[error("Fabric Manager function not available: {0}")]
    SymbolNotFound(String),

    /// `init` called while the library is already initialized
    #[error("Fabric Manager library is already initialized")]
    AlreadyInitialized,
}

impl From<StatusCode> for FabricError {
    fn from(code: StatusCode) -> Self {
        FabricError::Fm(code.into())
    }
}

impl FabricError {
    /// The daemon status, if this error carries one
    pub fn fm_error(&self) -> Option<&FmError> {
        match self {
            FabricError::Fm(e) => Some(e),
            _ => None,
        }
    }

    /// Category of the underlying status; uncategorized otherwise
    pub fn category(&self) -> ErrorCategory {
        self.fm_error()
            .map(FmError::category)
            .unwrap_or(ErrorCategory::Uncategorized)
    }
}

/// Errors from configuration parsing and validation
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    /// Invalid config value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from the fabric client
    #[error(transparent)]
    Fabric(#[from] FabricError),

    /// Error from configuration parsing/validation
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Could not reach the Fabric Manager at the resolved address
    #[error("failed to connect to FabricManager at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: FabricError,
    },

    /// A partition operation failed
    #[error("failed to {action}: {source}")]
    Operation {
        action: String,
        #[source]
        source: FabricError,
    },

    /// Malformed partition ID argument
    #[error("invalid partition ID '{0}'")]
    InvalidPartitionId(String),

    /// IO error (output)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<FmError> for AppError {
    fn from(err: FmError) -> Self {
        AppError::Fabric(err.into())
    }
}

impl AppError {
    /// The daemon status behind this error, if any
    pub fn fm_error(&self) -> Option<&FmError> {
        match self {
            AppError::Fabric(e)
            | AppError::Connect { source: e, .. }
            | AppError::Operation { source: e, .. } => e.fm_error(),
            _ => None,
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
