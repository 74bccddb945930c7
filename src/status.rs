//! Fabric Manager status codes
//!
//! Every entry point of the Fabric Manager API answers with an integer
//! status. Zero is success, every defined negative value names a specific
//! failure. This module maps those integers to a closed enum, a stable
//! message, and one of the categories callers use to pick a retry policy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw status value as returned across the C ABI
pub type RawStatus = i32;

/// Status codes defined by the Fabric Manager API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum StatusCode {
    Success = 0,
    BadParam = -1,
    GenericError = -2,
    NotSupported = -3,
    Uninitialized = -4,
    Timeout = -5,
    VersionMismatch = -6,
    InUse = -7,
    NotConfigured = -8,
    ConnectionNotValid = -9,
    NvlinkError = -10,
    ResourceBad = -11,
    ResourceInUse = -12,
    ResourceNotInUse = -13,
    ResourceExhausted = -14,
    ResourceNotReady = -15,
    PartitionExists = -16,
    PartitionIdInUse = -17,
    PartitionIdNotInUse = -18,
    PartitionNameInUse = -19,
    PartitionNameNotInUse = -20,
    PartitionIdNameMismatch = -21,
    NotReady = -22,
    ResourceUsedInThisPartition = -23,
    ResourceUsedInAnotherPartition = -24,
}

/// Every defined code, in numeric order
pub const ALL_STATUS_CODES: [StatusCode; 25] = [
    StatusCode::Success,
    StatusCode::BadParam,
    StatusCode::GenericError,
    StatusCode::NotSupported,
    StatusCode::Uninitialized,
    StatusCode::Timeout,
    StatusCode::VersionMismatch,
    StatusCode::InUse,
    StatusCode::NotConfigured,
    StatusCode::ConnectionNotValid,
    StatusCode::NvlinkError,
    StatusCode::ResourceBad,
    StatusCode::ResourceInUse,
    StatusCode::ResourceNotInUse,
    StatusCode::ResourceExhausted,
    StatusCode::ResourceNotReady,
    StatusCode::PartitionExists,
    StatusCode::PartitionIdInUse,
    StatusCode::PartitionIdNotInUse,
    StatusCode::PartitionNameInUse,
    StatusCode::PartitionNameNotInUse,
    StatusCode::PartitionIdNameMismatch,
    StatusCode::NotReady,
    StatusCode::ResourceUsedInThisPartition,
    StatusCode::ResourceUsedInAnotherPartition,
];

/// Message used for codes outside the defined space
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";

/// Failure category used to decide retry and backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// The channel to the daemon is unusable (retry after backoff or reconnect)
    Connection,
    /// A referenced hardware or logical resource is unavailable
    Resource,
    /// A partition identity conflict
    Partition,
    /// Terminal failures with no retry semantics
    Uncategorized,
}

impl StatusCode {
    /// Look up a raw status; `None` for values outside the defined space
    pub fn from_raw(raw: RawStatus) -> Option<Self> {
        ALL_STATUS_CODES.iter().copied().find(|c| c.as_raw() == raw)
    }

    /// The integer value on the wire
    pub fn as_raw(self) -> RawStatus {
        self as RawStatus
    }

    pub fn is_success(self) -> bool {
        self == StatusCode::Success
    }

    /// Human-readable description
    pub fn message(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::BadParam => "Bad parameter",
            Self::GenericError => "Generic error",
            Self::NotSupported => "Not supported",
            Self::Uninitialized => "Uninitialized",
            Self::Timeout => "Timeout",
            Self::VersionMismatch => "Version mismatch",
            Self::InUse => "Resource in use",
            Self::NotConfigured => "Not configured",
            Self::ConnectionNotValid => "Connection not valid",
            Self::NvlinkError => "NVLink error",
            Self::ResourceBad => "Bad resource",
            Self::ResourceInUse => "Resource in use",
            Self::ResourceNotInUse => "Resource not in use",
            Self::ResourceExhausted => "Resource exhausted",
            Self::ResourceNotReady => "Resource not ready",
            Self::PartitionExists => "Partition exists",
            Self::PartitionIdInUse => "Partition ID in use",
            Self::PartitionIdNotInUse => "Partition ID not in use",
            Self::PartitionNameInUse => "Partition name in use",
            Self::PartitionNameNotInUse => "Partition name not in use",
            Self::PartitionIdNameMismatch => "Partition ID name mismatch",
            Self::NotReady => "Not ready",
            Self::ResourceUsedInThisPartition => "Resource used in this partition",
            Self::ResourceUsedInAnotherPartition => "Resource used in another partition",
        }
    }

    /// Category of this code
    ///
    /// The three named categories are disjoint. `Success` is reported as
    /// `Uncategorized` since it never reaches an error value.
    pub fn category(self) -> ErrorCategory {
        match self {
            Self::ConnectionNotValid | Self::Uninitialized | Self::Timeout => {
                ErrorCategory::Connection
            }
            Self::ResourceBad
            | Self::ResourceInUse
            | Self::ResourceNotInUse
            | Self::ResourceExhausted
            | Self::ResourceNotReady => ErrorCategory::Resource,
            Self::PartitionExists
            | Self::PartitionIdInUse
            | Self::PartitionIdNotInUse
            | Self::PartitionNameInUse
            | Self::PartitionNameNotInUse
            | Self::PartitionIdNameMismatch => ErrorCategory::Partition,
            _ => ErrorCategory::Uncategorized,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.as_raw())
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => write!(f, "connection"),
            Self::Resource => write!(f, "resource"),
            Self::Partition => write!(f, "partition"),
            Self::Uncategorized => write!(f, "uncategorized"),
        }
    }
}

/// Message for any raw status, defined or not
pub fn message_for(raw: RawStatus) -> &'static str {
    StatusCode::from_raw(raw)
        .map(StatusCode::message)
        .unwrap_or(UNKNOWN_ERROR_MESSAGE)
}

/// Category for any raw status; unknown codes are uncategorized
pub fn category_for(raw: RawStatus) -> ErrorCategory {
    StatusCode::from_raw(raw)
        .map(StatusCode::category)
        .unwrap_or(ErrorCategory::Uncategorized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_values() {
        assert_eq!(StatusCode::Success.as_raw(), 0);
        assert_eq!(StatusCode::BadParam.as_raw(), -1);
        assert_eq!(StatusCode::ConnectionNotValid.as_raw(), -9);
        assert_eq!(StatusCode::ResourceUsedInAnotherPartition.as_raw(), -24);
    }

    #[test]
    fn test_from_raw_covers_defined_space() {
        for raw in -24..=0 {
            let code = StatusCode::from_raw(raw).unwrap();
            assert_eq!(code.as_raw(), raw);
        }
        assert_eq!(StatusCode::from_raw(-25), None);
        assert_eq!(StatusCode::from_raw(1), None);
    }

    #[test]
    fn test_connection_category() {
        for code in [
            StatusCode::ConnectionNotValid,
            StatusCode::Uninitialized,
            StatusCode::Timeout,
        ] {
            assert_eq!(code.category(), ErrorCategory::Connection, "{:?}", code);
        }
    }

    #[test]
    fn test_resource_category() {
        for raw in -15..=-11 {
            let code = StatusCode::from_raw(raw).unwrap();
            assert_eq!(code.category(), ErrorCategory::Resource, "{:?}", code);
        }
    }

    #[test]
    fn test_partition_category() {
        for raw in -21..=-16 {
            let code = StatusCode::from_raw(raw).unwrap();
            assert_eq!(code.category(), ErrorCategory::Partition, "{:?}", code);
        }
    }

    #[test]
    fn test_terminal_codes_uncategorized() {
        for code in [
            StatusCode::BadParam,
            StatusCode::GenericError,
            StatusCode::NotSupported,
            StatusCode::VersionMismatch,
            StatusCode::InUse,
            StatusCode::NotConfigured,
            StatusCode::NvlinkError,
            StatusCode::NotReady,
            StatusCode::ResourceUsedInThisPartition,
            StatusCode::ResourceUsedInAnotherPartition,
        ] {
            assert_eq!(code.category(), ErrorCategory::Uncategorized, "{:?}", code);
        }
    }

    #[test]
    fn test_unknown_code() {
        assert_eq!(message_for(-99), "Unknown error");
        assert_eq!(category_for(-99), ErrorCategory::Uncategorized);
        assert_eq!(message_for(-12), "Resource in use");
    }

    #[test]
    fn test_display() {
        assert_eq!(StatusCode::Timeout.to_string(), "Timeout (-5)");
    }
}
