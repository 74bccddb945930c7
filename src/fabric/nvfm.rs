//! libnvfm backend
//!
//! Loads the Fabric Manager client library at runtime and forwards each
//! [`FabricApi`] call to its C entry point. Encoded structures are passed
//! as pointers into their [`WireBuffer`].

use crate::domain::PartitionId;
use crate::error::FabricError;
use crate::fabric::codec::WireBuffer;
use crate::fabric::traits::{FabricApi, RawHandle};
use crate::status::RawStatus;

use libloading::Library;
use std::ffi::{c_void, OsStr};
use std::os::raw::{c_int, c_uint};

/// Library names tried in order
pub const LIBRARY_NAMES: [&str; 2] = ["libnvfm.so.1", "libnvfm.so"];

type FmHandle = *mut c_void;
type LibFn = unsafe extern "C" fn() -> c_int;
type ConnectFn = unsafe extern "C" fn(*mut c_void, *mut FmHandle) -> c_int;
type DisconnectFn = unsafe extern "C" fn(FmHandle) -> c_int;
type StructFn = unsafe extern "C" fn(FmHandle, *mut c_void) -> c_int;
type PartitionFn = unsafe extern "C" fn(FmHandle, c_uint) -> c_int;
type ActivateWithVfsFn = unsafe extern "C" fn(FmHandle, c_uint, *mut c_void, c_uint) -> c_int;

struct NvfmFunctions {
    lib_init: LibFn,
    lib_shutdown: LibFn,
    connect: ConnectFn,
    disconnect: DisconnectFn,
    get_supported_partitions: StructFn,
    activate_partition: PartitionFn,
    activate_partition_with_vfs: ActivateWithVfsFn,
    deactivate_partition: PartitionFn,
    set_activated_partitions: StructFn,
    get_nvlink_failed_devices: StructFn,
    get_unsupported_partitions: StructFn,
}

/// Dynamically loaded libnvfm
pub struct NvfmLibrary {
    fns: NvfmFunctions,
    // Keeps the resolved function pointers valid
    _lib: Library,
}

impl NvfmLibrary {
    /// Load libnvfm from the default search path
    pub fn load() -> Result<Self, FabricError> {
        let mut last_error = String::new();
        for name in LIBRARY_NAMES {
            match Self::load_from(name) {
                Ok(lib) => {
                    log::debug!("Loaded Fabric Manager library {}", name);
                    return Ok(lib);
                }
                Err(FabricError::LibraryNotFound(e)) => {
                    log::debug!("{} not loadable: {}", name, e);
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }
        Err(FabricError::LibraryNotFound(last_error))
    }

    /// Load libnvfm from an explicit path
    pub fn load_from(path: impl AsRef<OsStr>) -> Result<Self, FabricError> {
        let path = path.as_ref();
        // SAFETY: loading runs the library's initializers; libnvfm has no
        // initializers with preconditions on the caller.
        let lib = unsafe { Library::new(path) }
            .map_err(|e| FabricError::LibraryNotFound(format!("{}: {}", path.to_string_lossy(), e)))?;

        // SAFETY: each type alias matches the prototype in nv_fm_agent.h.
        let fns = unsafe {
            NvfmFunctions {
                lib_init: symbol(&lib, "fmLibInit")?,
                lib_shutdown: symbol(&lib, "fmLibShutdown")?,
                connect: symbol(&lib, "fmConnect")?,
                disconnect: symbol(&lib, "fmDisconnect")?,
                get_supported_partitions: symbol(&lib, "fmGetSupportedFabricPartitions")?,
                activate_partition: symbol(&lib, "fmActivateFabricPartition")?,
                activate_partition_with_vfs: symbol(&lib, "fmActivateFabricPartitionWithVFs")?,
                deactivate_partition: symbol(&lib, "fmDeactivateFabricPartition")?,
                set_activated_partitions: symbol(&lib, "fmSetActivatedFabricPartitions")?,
                get_nvlink_failed_devices: symbol(&lib, "fmGetNvlinkFailedDevices")?,
                get_unsupported_partitions: symbol(&lib, "fmGetUnsupportedFabricPartitions")?,
            }
        };

        Ok(Self { fns, _lib: lib })
    }
}

/// Resolve a symbol and copy out the function pointer
///
/// # Safety
/// `T` must be the exact function pointer type of the symbol.
unsafe fn symbol<T: Copy>(lib: &Library, name: &str) -> Result<T, FabricError> {
    lib.get::<T>(name.as_bytes())
        .map(|s| *s)
        .map_err(|e| FabricError::SymbolNotFound(format!("{}: {}", name, e)))
}

fn to_ptr(handle: RawHandle) -> FmHandle {
    handle.0 as FmHandle
}

impl FabricApi for NvfmLibrary {
    fn lib_init(&self) -> RawStatus {
        // SAFETY: no arguments
        unsafe { (self.fns.lib_init)() }
    }

    fn lib_shutdown(&self) -> RawStatus {
        // SAFETY: no arguments
        unsafe { (self.fns.lib_shutdown)() }
    }

    fn connect(&self, params: &mut WireBuffer, handle: &mut RawHandle) -> RawStatus {
        let mut raw: FmHandle = std::ptr::null_mut();
        // SAFETY: params is a full-size fmConnectParams buffer; raw is a
        // valid out-pointer for the duration of the call.
        let status = unsafe { (self.fns.connect)(params.as_mut_ptr(), &mut raw) };
        *handle = RawHandle(raw as usize);
        status
    }

    fn disconnect(&self, handle: RawHandle) -> RawStatus {
        // SAFETY: handle was issued by fmConnect
        unsafe { (self.fns.disconnect)(to_ptr(handle)) }
    }

    fn get_supported_partitions(&self, handle: RawHandle, list: &mut WireBuffer) -> RawStatus {
        // SAFETY: list is a full-size fmFabricPartitionList buffer
        unsafe { (self.fns.get_supported_partitions)(to_ptr(handle), list.as_mut_ptr()) }
    }

    fn activate_partition(&self, handle: RawHandle, id: PartitionId) -> RawStatus {
        // SAFETY: scalar arguments only
        unsafe { (self.fns.activate_partition)(to_ptr(handle), id) }
    }

    fn activate_partition_with_vfs(
        &self,
        handle: RawHandle,
        id: PartitionId,
        vfs: &mut WireBuffer,
        num_vfs: u32,
    ) -> RawStatus {
        // SAFETY: vfs holds num_vfs contiguous fmPciDevice_t records
        unsafe {
            (self.fns.activate_partition_with_vfs)(to_ptr(handle), id, vfs.as_mut_ptr(), num_vfs)
        }
    }

    fn deactivate_partition(&self, handle: RawHandle, id: PartitionId) -> RawStatus {
        // SAFETY: scalar arguments only
        unsafe { (self.fns.deactivate_partition)(to_ptr(handle), id) }
    }

    fn set_activated_partitions(&self, handle: RawHandle, list: &mut WireBuffer) -> RawStatus {
        // SAFETY: list is a full-size fmActivatedFabricPartitionList buffer
        unsafe { (self.fns.set_activated_partitions)(to_ptr(handle), list.as_mut_ptr()) }
    }

    fn get_nvlink_failed_devices(
        &self,
        handle: RawHandle,
        devices: &mut WireBuffer,
    ) -> RawStatus {
        // SAFETY: devices is a full-size fmNvlinkFailedDevices buffer
        unsafe { (self.fns.get_nvlink_failed_devices)(to_ptr(handle), devices.as_mut_ptr()) }
    }

    fn get_unsupported_partitions(&self, handle: RawHandle, list: &mut WireBuffer) -> RawStatus {
        // SAFETY: list is a full-size fmUnsupportedFabricPartitionList buffer
        unsafe { (self.fns.get_unsupported_partitions)(to_ptr(handle), list.as_mut_ptr()) }
    }
}
