//! Fabric Manager sessions
//!
//! A [`Session`] owns exactly one connection handle. The handle is released
//! by [`Session::disconnect`] or, failing that, when the session is dropped.
//! Operations on a released handle fail with `CONNECTION_NOT_VALID`.

use crate::error::{FabricError, FmError};
use crate::fabric::address::FabricAddress;
use crate::fabric::codec::{encode_connect_params, ConnectParams};
use crate::fabric::library::{self, Library};
use crate::fabric::traits::{FabricApi, RawHandle};
use crate::status::{RawStatus, StatusCode};

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// An open connection to a Fabric Manager instance
pub struct Session {
    library: Arc<Library>,
    handle: Mutex<Option<RawHandle>>,
    address: FabricAddress,
}

impl Session {
    /// Connect through the process-wide library
    ///
    /// `address` is a socket path or `host[:port]`; `timeout_ms` must be
    /// non-zero.
    pub fn connect(address: &str, timeout_ms: u32) -> Result<Self, FabricError> {
        library::global()?.connect(address, timeout_ms)
    }

    pub(crate) fn open(
        library: Arc<Library>,
        address: FabricAddress,
        timeout_ms: u32,
    ) -> Result<Self, FabricError> {
        if timeout_ms == 0 {
            return Err(StatusCode::BadParam.into());
        }
        library.acquire_slot()?;

        let params = ConnectParams {
            address: address.wire_string(),
            timeout_ms,
            address_is_unix_socket: address.is_unix_socket(),
        };
        let mut buf = encode_connect_params(&params);
        let mut handle = RawHandle(0);

        log::debug!("Connecting to Fabric Manager at {} (timeout {} ms)", address, timeout_ms);
        let status = library.api().connect(&mut buf, &mut handle);
        if let Err(e) = FmError::check(status) {
            library.release_slot();
            log::debug!("Connect to {} failed: {}", address, e);
            return Err(e.into());
        }
        log::debug!("Connected to {} with handle {:#x}", address, handle.0);

        Ok(Self {
            library,
            handle: Mutex::new(Some(handle)),
            address,
        })
    }

    /// Address this session was opened against
    pub fn address(&self) -> &FabricAddress {
        &self.address
    }

    /// Whether the handle has not been released
    pub fn is_connected(&self) -> bool {
        self.lock_handle().is_some()
    }

    /// Close the connection
    ///
    /// The handle is released even when the daemon reports a failure.
    pub fn disconnect(self) -> Result<(), FabricError> {
        match self.release() {
            Some(status) => FmError::check(status).map_err(FabricError::from),
            None => Err(StatusCode::ConnectionNotValid.into()),
        }
    }

    fn lock_handle(&self) -> MutexGuard<'_, Option<RawHandle>> {
        self.handle.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take the handle and disconnect it; `None` if already released
    fn release(&self) -> Option<RawStatus> {
        let handle = self.lock_handle().take()?;
        let status = self.library.api().disconnect(handle);
        self.library.release_slot();
        log::debug!("Disconnected from {} (status {})", self.address, status);
        Some(status)
    }

    /// Run one call against the live handle
    ///
    /// The handle lock is held for the duration of the call, so calls on a
    /// shared session are serialized.
    pub(crate) fn call<T>(
        &self,
        f: impl FnOnce(&dyn FabricApi, RawHandle) -> Result<T, FabricError>,
    ) -> Result<T, FabricError> {
        let guard = self.lock_handle();
        let handle = (*guard).ok_or_else(|| FabricError::from(StatusCode::ConnectionNotValid))?;
        f(self.library.api(), handle)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(status) = self.release() {
            if let Err(e) = FmError::check(status) {
                log::warn!("Disconnect from {} failed: {}", self.address, e);
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.address)
            .field("handle", &*self.lock_handle())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockFabric;

    fn library() -> (Arc<MockFabric>, Arc<Library>) {
        let mock = Arc::new(MockFabric::new());
        let library = Library::new(mock.clone());
        library.init().unwrap();
        (mock, library)
    }

    #[test]
    fn test_connect_records_params() {
        let (mock, library) = library();
        let session = library.connect("fm-node-01", 2500).unwrap();
        assert!(session.is_connected());
        assert_eq!(library.open_sessions(), 1);

        let params = mock.last_connect_params().unwrap();
        assert_eq!(params.address, "fm-node-01:6666");
        assert_eq!(params.timeout_ms, 2500);
        assert!(!params.address_is_unix_socket);
    }

    #[test]
    fn test_connect_unix_socket() {
        let (mock, library) = library();
        let _session = library.connect("/run/nvidia-fabricmanager/fm.sock", 1000).unwrap();
        let params = mock.last_connect_params().unwrap();
        assert!(params.address_is_unix_socket);
        assert_eq!(params.address, "/run/nvidia-fabricmanager/fm.sock");
    }

    #[test]
    fn test_zero_timeout_is_bad_param() {
        let (mock, library) = library();
        let err = library.connect("127.0.0.1", 0).unwrap_err();
        assert_eq!(err.fm_error().unwrap().status(), Some(StatusCode::BadParam));
        assert_eq!(mock.connect_count(), 0);
        assert_eq!(library.open_sessions(), 0);
    }

    #[test]
    fn test_unreachable_daemon() {
        let (mock, library) = library();
        mock.set_reachable(false);
        let err = library.connect("10.0.0.9", 100).unwrap_err();
        assert!(err.fm_error().unwrap().is_connection_error());
        assert_eq!(library.open_sessions(), 0);
    }

    #[test]
    fn test_disconnect_releases_handle() {
        let (mock, library) = library();
        let session = library.connect("127.0.0.1", 1000).unwrap();
        session.disconnect().unwrap();
        assert_eq!(library.open_sessions(), 0);
        assert_eq!(mock.open_handles(), 0);
    }

    #[test]
    fn test_drop_releases_handle() {
        let (mock, library) = library();
        {
            let _session = library.connect("127.0.0.1", 1000).unwrap();
            assert_eq!(mock.open_handles(), 1);
        }
        assert_eq!(mock.open_handles(), 0);
        assert_eq!(library.open_sessions(), 0);
        library.shutdown().unwrap();
    }

    #[test]
    fn test_released_handle_not_valid() {
        let (_, library) = library();
        let session = library.connect("127.0.0.1", 1000).unwrap();
        assert!(session.release().is_some());
        assert!(!session.is_connected());

        let err = session.call(|_, _| Ok(())).unwrap_err();
        assert_eq!(
            err.fm_error().unwrap().status(),
            Some(StatusCode::ConnectionNotValid)
        );
    }

    #[test]
    fn test_sessions_get_distinct_handles() {
        let (mock, library) = library();
        let a = library.connect("127.0.0.1", 1000).unwrap();
        let b = library.connect("127.0.0.1", 1000).unwrap();
        let ha = a.call(|_, h| Ok(h)).unwrap();
        let hb = b.call(|_, h| Ok(h)).unwrap();
        assert_ne!(ha, hb);
        assert_eq!(mock.open_handles(), 2);
    }
}
