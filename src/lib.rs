//! fmpm - NVIDIA Fabric Manager partition client library
//!
//! This library provides a client for the Fabric Manager control plane:
//! versioned fixed-layout messages, session handling, the status code
//! taxonomy and GPU partition operations.
//!
//! # Modules
//!
//! - [`cli`]: Command-line interface definitions
//! - [`commands`]: Command handlers
//! - [`config`]: Configuration system
//! - [`domain`]: Partition and NVLink data model
//! - [`error`]: Error types
//! - [`fabric`]: Fabric Manager client (library lifecycle, sessions, codec)
//! - [`status`]: Status codes and categories

pub mod cli;
pub mod commands;
pub mod config;
pub mod domain;
pub mod error;
pub mod fabric;
pub mod status;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::{AppError, FabricError, FmError, Result};
pub use fabric::Session;
pub use status::{ErrorCategory, StatusCode};
