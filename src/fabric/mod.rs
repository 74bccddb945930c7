//! Fabric Manager client
//!
//! This module provides the session protocol and partition operations on
//! top of the Fabric Manager client library:
//!
//! - [`codec`]: fixed-layout versioned message encoding
//! - [`traits`]: the raw entry-point seam, implemented by libnvfm and the mock
//! - [`library`]: process-wide init/shutdown
//! - [`session`]: connection handles
//!
//! # Example
//!
//! ```no_run
//! use fmpm::fabric::{self, Session};
//!
//! fabric::init()?;
//! let session = Session::connect("127.0.0.1", 5000)?;
//! for partition in session.supported_partitions()? {
//!     println!("{}", partition);
//! }
//! session.disconnect()?;
//! fabric::shutdown()?;
//! # Ok::<(), fmpm::error::FabricError>(())
//! ```

pub mod address;
pub mod codec;
pub mod library;
pub mod nvfm;
mod partitions;
pub mod session;
pub mod traits;

pub use address::{FabricAddress, FM_CMD_PORT_NUMBER};
pub use library::{global, init, init_with, shutdown, Library};
pub use nvfm::NvfmLibrary;
pub use session::Session;
pub use traits::{FabricApi, RawHandle};
