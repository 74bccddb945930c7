//! Process-wide Fabric Manager library state
//!
//! The client library must be initialized before the first connection and
//! shut down after the last one is closed. [`Library`] tracks that state
//! behind a single mutex:
//!
//! - `init` on an initialized library fails with
//!   [`FabricError::AlreadyInitialized`].
//! - `connect` on an uninitialized library fails with `UNINITIALIZED`.
//! - `shutdown` on an uninitialized library fails with `UNINITIALIZED`.
//! - `shutdown` while sessions are open fails with `IN_USE` and leaves the
//!   library initialized.
//! - `init` after a successful `shutdown` initializes again.
//!
//! The free functions [`init`], [`shutdown`] and [`global`] manage one
//! process-wide [`Library`] backed by libnvfm. Tests and alternate
//! backends build their own instance with [`Library::new`].

use crate::error::{FabricError, FmError};
use crate::fabric::address::FabricAddress;
use crate::fabric::nvfm::NvfmLibrary;
use crate::fabric::session::Session;
use crate::fabric::traits::FabricApi;
use crate::status::StatusCode;

use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct LibraryState {
    initialized: bool,
    open_sessions: usize,
}

/// Fabric Manager client library instance
pub struct Library {
    api: Arc<dyn FabricApi>,
    state: Mutex<LibraryState>,
}

impl Library {
    /// Wrap a backend; the result is not yet initialized
    pub fn new(api: Arc<dyn FabricApi>) -> Arc<Self> {
        Arc::new(Self {
            api,
            state: Mutex::new(LibraryState::default()),
        })
    }

    /// Load libnvfm; the result is not yet initialized
    pub fn load() -> Result<Arc<Self>, FabricError> {
        Ok(Self::new(Arc::new(NvfmLibrary::load()?)))
    }

    // The state is two plain counters; a panic elsewhere cannot leave it torn
    fn state(&self) -> MutexGuard<'_, LibraryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn api(&self) -> &dyn FabricApi {
        &*self.api
    }

    /// Initialize the client library
    pub fn init(&self) -> Result<(), FabricError> {
        let mut state = self.state();
        if state.initialized {
            return Err(FabricError::AlreadyInitialized);
        }
        FmError::check(self.api.lib_init())?;
        state.initialized = true;
        log::debug!("Fabric Manager library initialized");
        Ok(())
    }

    /// Shut the client library down
    pub fn shutdown(&self) -> Result<(), FabricError> {
        let mut state = self.state();
        if !state.initialized {
            return Err(StatusCode::Uninitialized.into());
        }
        if state.open_sessions > 0 {
            log::debug!(
                "Refusing shutdown with {} open session(s)",
                state.open_sessions
            );
            return Err(StatusCode::InUse.into());
        }
        FmError::check(self.api.lib_shutdown())?;
        state.initialized = false;
        log::debug!("Fabric Manager library shut down");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state().initialized
    }

    /// Number of sessions not yet disconnected
    pub fn open_sessions(&self) -> usize {
        self.state().open_sessions
    }

    /// Connect to a Fabric Manager instance
    ///
    /// `address` is a socket path or `host[:port]`; see [`FabricAddress`].
    pub fn connect(self: &Arc<Self>, address: &str, timeout_ms: u32) -> Result<Session, FabricError> {
        self.connect_to(FabricAddress::parse(address), timeout_ms)
    }

    /// Connect to an already classified address
    pub fn connect_to(
        self: &Arc<Self>,
        address: FabricAddress,
        timeout_ms: u32,
    ) -> Result<Session, FabricError> {
        Session::open(Arc::clone(self), address, timeout_ms)
    }

    /// Reserve a session slot; fails while uninitialized
    pub(crate) fn acquire_slot(&self) -> Result<(), FabricError> {
        let mut state = self.state();
        if !state.initialized {
            return Err(StatusCode::Uninitialized.into());
        }
        state.open_sessions += 1;
        Ok(())
    }

    pub(crate) fn release_slot(&self) {
        let mut state = self.state();
        state.open_sessions = state.open_sessions.saturating_sub(1);
    }
}

static GLOBAL: Mutex<Option<Arc<Library>>> = Mutex::new(None);

fn global_slot() -> MutexGuard<'static, Option<Arc<Library>>> {
    GLOBAL.lock().unwrap_or_else(|e| e.into_inner())
}

/// Load libnvfm and initialize the process-wide library
pub fn init() -> Result<(), FabricError> {
    let mut slot = global_slot();
    if slot.is_some() {
        return Err(FabricError::AlreadyInitialized);
    }
    let library = Library::load()?;
    library.init()?;
    *slot = Some(library);
    Ok(())
}

/// Initialize the process-wide library on a caller-supplied backend
pub fn init_with(api: Arc<dyn FabricApi>) -> Result<(), FabricError> {
    let mut slot = global_slot();
    if slot.is_some() {
        return Err(FabricError::AlreadyInitialized);
    }
    let library = Library::new(api);
    library.init()?;
    *slot = Some(library);
    Ok(())
}

/// Shut down the process-wide library
pub fn shutdown() -> Result<(), FabricError> {
    let mut slot = global_slot();
    let Some(library) = slot.as_ref() else {
        return Err(StatusCode::Uninitialized.into());
    };
    library.shutdown()?;
    *slot = None;
    Ok(())
}

/// The process-wide library, if initialized
pub fn global() -> Result<Arc<Library>, FabricError> {
    global_slot()
        .as_ref()
        .map(Arc::clone)
        .ok_or_else(|| StatusCode::Uninitialized.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockFabric;

    fn library() -> (Arc<MockFabric>, Arc<Library>) {
        let mock = Arc::new(MockFabric::new());
        let library = Library::new(mock.clone());
        (mock, library)
    }

    #[test]
    fn test_init_and_shutdown() {
        let (mock, library) = library();
        assert!(!library.is_initialized());
        library.init().unwrap();
        assert!(library.is_initialized());
        assert_eq!(mock.init_count(), 1);
        library.shutdown().unwrap();
        assert!(!library.is_initialized());
    }

    #[test]
    fn test_double_init_rejected() {
        let (mock, library) = library();
        library.init().unwrap();
        assert!(matches!(library.init(), Err(FabricError::AlreadyInitialized)));
        assert_eq!(mock.init_count(), 1);
    }

    #[test]
    fn test_shutdown_uninitialized() {
        let (_, library) = library();
        let err = library.shutdown().unwrap_err();
        assert_eq!(err.fm_error().unwrap().status(), Some(StatusCode::Uninitialized));
        assert!(err.fm_error().unwrap().is_connection_error());
    }

    #[test]
    fn test_reinit_after_shutdown() {
        let (mock, library) = library();
        library.init().unwrap();
        library.shutdown().unwrap();
        library.init().unwrap();
        assert_eq!(mock.init_count(), 2);
    }

    #[test]
    fn test_connect_uninitialized() {
        let (_, library) = library();
        let err = library.connect("127.0.0.1", 1000).unwrap_err();
        assert_eq!(err.fm_error().unwrap().status(), Some(StatusCode::Uninitialized));
        assert_eq!(library.open_sessions(), 0);
    }

    #[test]
    fn test_shutdown_with_open_session() {
        let (_, library) = library();
        library.init().unwrap();
        let session = library.connect("127.0.0.1", 1000).unwrap();
        let err = library.shutdown().unwrap_err();
        assert_eq!(err.fm_error().unwrap().status(), Some(StatusCode::InUse));
        assert!(library.is_initialized());

        session.disconnect().unwrap();
        library.shutdown().unwrap();
    }

    #[test]
    fn test_lib_init_failure_propagates() {
        let (mock, library) = library();
        mock.fail_init(StatusCode::GenericError);
        let err = library.init().unwrap_err();
        assert_eq!(err.fm_error().unwrap().status(), Some(StatusCode::GenericError));
        assert!(!library.is_initialized());
    }

    // The only test that touches the process-wide slot
    #[test]
    fn test_global_lifecycle() {
        assert!(global().is_err());
        assert!(shutdown().is_err());

        let mock = Arc::new(MockFabric::new());
        init_with(mock.clone()).unwrap();
        assert!(matches!(
            init_with(mock.clone()),
            Err(FabricError::AlreadyInitialized)
        ));

        let session = Session::connect("127.0.0.1", 1000).unwrap();
        assert!(shutdown().is_err());
        session.disconnect().unwrap();

        shutdown().unwrap();
        assert!(global().is_err());
        assert_eq!(mock.init_count(), 1);
    }
}
