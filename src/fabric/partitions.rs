//! Partition operations on a [`Session`]

use crate::domain::{NvlinkFailedDevices, Partition, PartitionId, PciDevice, UnsupportedPartition};
use crate::error::{FabricError, FmError};
use crate::fabric::codec::{
    decode_nvlink_failed_devices, decode_partition_list, decode_unsupported_partition_list,
    encode_activated_list, encode_pci_devices, FABRIC_PARTITION_LIST, NVLINK_FAILED_DEVICES,
    UNSUPPORTED_PARTITION_LIST,
};
use crate::fabric::session::Session;

impl Session {
    /// All partitions the daemon knows about, with their activation state
    pub fn supported_partitions(&self) -> Result<Vec<Partition>, FabricError> {
        self.call(|api, handle| {
            let mut buf = FABRIC_PARTITION_LIST.new_buffer();
            FmError::check(api.get_supported_partitions(handle, &mut buf))?;
            let partitions = decode_partition_list(&buf)?;
            log::debug!("Daemon reported {} partition(s)", partitions.len());
            Ok(partitions)
        })
    }

    /// Activate one partition
    pub fn activate_partition(&self, id: PartitionId) -> Result<(), FabricError> {
        log::debug!("Activating partition {}", id);
        self.call(|api, handle| Ok(FmError::check(api.activate_partition(handle, id))?))
    }

    /// Activate one partition, handing the listed virtual functions to it
    pub fn activate_partition_with_vfs(
        &self,
        id: PartitionId,
        vfs: &[PciDevice],
    ) -> Result<(), FabricError> {
        log::debug!("Activating partition {} with {} VF(s)", id, vfs.len());
        let mut buf = encode_pci_devices(vfs);
        self.call(|api, handle| {
            let status = api.activate_partition_with_vfs(handle, id, &mut buf, vfs.len() as u32);
            Ok(FmError::check(status)?)
        })
    }

    /// Deactivate one partition
    pub fn deactivate_partition(&self, id: PartitionId) -> Result<(), FabricError> {
        log::debug!("Deactivating partition {}", id);
        self.call(|api, handle| Ok(FmError::check(api.deactivate_partition(handle, id))?))
    }

    /// Replace the set of active partitions
    ///
    /// Used after a daemon restart to restore the activation state. An
    /// empty list leaves no partition active. More than 64 ids fail before
    /// anything is sent.
    pub fn set_activated_partitions(&self, ids: &[PartitionId]) -> Result<(), FabricError> {
        let mut buf = encode_activated_list(ids)?;
        log::debug!("Setting activated partitions to {:?}", ids);
        self.call(|api, handle| Ok(FmError::check(api.set_activated_partitions(handle, &mut buf))?))
    }

    /// GPUs and NVSwitches with failed NVLink ports
    pub fn nvlink_failed_devices(&self) -> Result<NvlinkFailedDevices, FabricError> {
        self.call(|api, handle| {
            let mut buf = NVLINK_FAILED_DEVICES.new_buffer();
            FmError::check(api.get_nvlink_failed_devices(handle, &mut buf))?;
            decode_nvlink_failed_devices(&buf)
        })
    }

    /// Partitions the current hardware cannot support
    pub fn unsupported_partitions(&self) -> Result<Vec<UnsupportedPartition>, FabricError> {
        self.call(|api, handle| {
            let mut buf = UNSUPPORTED_PARTITION_LIST.new_buffer();
            FmError::check(api.get_unsupported_partitions(handle, &mut buf))?;
            decode_unsupported_partition_list(&buf)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NvlinkFailedDeviceInfo, PartitionGpuInfo};
    use crate::error::ProtocolError;
    use crate::fabric::library::Library;
    use crate::mock::{Fault, MockFabric};
    use crate::status::{ErrorCategory, StatusCode};
    use std::sync::Arc;

    fn gpu(id: u32) -> PartitionGpuInfo {
        PartitionGpuInfo::new(
            id,
            format!("GPU-{:08x}-0000-0000-0000-000000000000", id),
            format!("00000000:{:02x}:00.0", 0x10 + id),
        )
        .with_nvlinks(12, 12)
        .with_line_rate(25_781)
    }

    /// Two disjoint partitions plus a third that overlaps the first
    fn fabric() -> Arc<MockFabric> {
        Arc::new(MockFabric::with_partitions(vec![
            Partition::new(0, false, vec![gpu(0), gpu(1)]),
            Partition::new(1, false, vec![gpu(2), gpu(3)]),
            Partition::new(2, false, vec![gpu(1), gpu(2)]),
        ]))
    }

    fn connect(mock: &Arc<MockFabric>) -> (Arc<Library>, Session) {
        let library = Library::new(mock.clone());
        library.init().unwrap();
        let session = library.connect("127.0.0.1", 1000).unwrap();
        (library, session)
    }

    fn active_ids(session: &Session) -> Vec<PartitionId> {
        session
            .supported_partitions()
            .unwrap()
            .into_iter()
            .filter(|p| p.is_active)
            .map(|p| p.id)
            .collect()
    }

    fn status_of(err: &FabricError) -> Option<StatusCode> {
        err.fm_error().and_then(|e| e.status())
    }

    #[test]
    fn test_list_partitions() {
        let mock = fabric();
        let (_library, session) = connect(&mock);
        let partitions = session.supported_partitions().unwrap();
        assert_eq!(partitions.len(), 3);
        assert_eq!(partitions[1].num_gpus, 2);
        assert_eq!(partitions[1].gpus[0].physical_id, 2);
        assert_eq!(partitions[1].gpus[0].pci_bus_id, "00000000:12:00.0");
        assert!(partitions.iter().all(|p| !p.is_active));
    }

    #[test]
    fn test_end_to_end_decode_matches_daemon() {
        let served = vec![
            Partition::new(
                0,
                true,
                vec![PartitionGpuInfo::new(0, "GPU-aaa", "00000000:07:00.0").with_nvlinks(4, 4)],
            ),
            Partition::new(1, false, Vec::new()),
        ];
        let mock = Arc::new(MockFabric::with_partitions(served.clone()));
        let (_library, session) = connect(&mock);

        assert_eq!(session.supported_partitions().unwrap(), served);
    }

    #[test]
    fn test_activate_deactivate_lifecycle() {
        let mock = fabric();
        let (library, session) = connect(&mock);

        session.activate_partition(0).unwrap();
        session.activate_partition(1).unwrap();
        assert_eq!(active_ids(&session), vec![0, 1]);

        session.deactivate_partition(0).unwrap();
        assert_eq!(active_ids(&session), vec![1]);

        session.disconnect().unwrap();
        library.shutdown().unwrap();
    }

    #[test]
    fn test_activate_twice_is_partition_error() {
        let mock = fabric();
        let (_library, session) = connect(&mock);
        session.activate_partition(0).unwrap();

        let err = session.activate_partition(0).unwrap_err();
        assert_eq!(status_of(&err), Some(StatusCode::PartitionIdInUse));
        assert_eq!(err.category(), ErrorCategory::Partition);
    }

    #[test]
    fn test_activate_unknown_partition() {
        let mock = fabric();
        let (_library, session) = connect(&mock);
        let err = session.activate_partition(42).unwrap_err();
        assert_eq!(status_of(&err), Some(StatusCode::PartitionIdNotInUse));
    }

    #[test]
    fn test_activate_overlapping_partition() {
        let mock = fabric();
        let (_library, session) = connect(&mock);
        session.activate_partition(0).unwrap();

        let err = session.activate_partition(2).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Resource);
        assert_eq!(active_ids(&session), vec![0]);
    }

    #[test]
    fn test_deactivate_inactive_partition() {
        let mock = fabric();
        let (_library, session) = connect(&mock);
        let err = session.deactivate_partition(1).unwrap_err();
        assert_eq!(status_of(&err), Some(StatusCode::PartitionIdNotInUse));
    }

    #[test]
    fn test_activate_with_vfs() {
        let mock = fabric();
        let (_library, session) = connect(&mock);
        let vfs = [
            PciDevice::new(0, 0x3b, 0, 1),
            PciDevice::new(0, 0x3b, 0, 2),
        ];
        session.activate_partition_with_vfs(1, &vfs).unwrap();
        assert_eq!(active_ids(&session), vec![1]);
        assert_eq!(mock.partition_vfs(1), vfs.to_vec());
    }

    #[test]
    fn test_set_activated_replaces_set() {
        let mock = fabric();
        let (_library, session) = connect(&mock);
        session.activate_partition(0).unwrap();

        session.set_activated_partitions(&[1]).unwrap();
        assert_eq!(active_ids(&session), vec![1]);

        session.set_activated_partitions(&[]).unwrap();
        assert!(active_ids(&session).is_empty());
    }

    #[test]
    fn test_set_activated_unknown_id_is_atomic() {
        let mock = fabric();
        let (_library, session) = connect(&mock);
        session.activate_partition(0).unwrap();

        let err = session.set_activated_partitions(&[1, 99]).unwrap_err();
        assert_eq!(status_of(&err), Some(StatusCode::PartitionIdNotInUse));
        assert_eq!(active_ids(&session), vec![0]);
    }

    #[test]
    fn test_set_activated_over_capacity() {
        let mock = fabric();
        let (_library, session) = connect(&mock);
        let ids: Vec<PartitionId> = (0..65).collect();

        let err = session.set_activated_partitions(&ids).unwrap_err();
        assert!(matches!(
            err,
            FabricError::Protocol(ProtocolError::CapacityExceeded { count: 65, .. })
        ));
        assert_eq!(mock.call_count("set_activated_partitions"), 0);
    }

    #[test]
    fn test_nvlink_failed_devices() {
        let mock = fabric();
        mock.set_nvlink_failures(NvlinkFailedDevices::new(
            vec![NvlinkFailedDeviceInfo::new(
                "GPU-00000003-0000-0000-0000-000000000000",
                "00000000:13:00.0",
                vec![4, 7],
            )],
            vec![NvlinkFailedDeviceInfo::new("", "00000000:c1:00.0", vec![30])],
        ));
        let (_library, session) = connect(&mock);

        let report = session.nvlink_failed_devices().unwrap();
        assert!(!report.is_healthy());
        assert_eq!(report.num_gpus, 1);
        assert_eq!(report.gpu_info[0].port_nums, vec![4, 7]);
        assert_eq!(report.switch_info[0].pci_bus_id, "00000000:c1:00.0");
    }

    #[test]
    fn test_healthy_fabric_reports_nothing() {
        let mock = fabric();
        let (_library, session) = connect(&mock);
        assert!(session.nvlink_failed_devices().unwrap().is_healthy());
        assert!(session.unsupported_partitions().unwrap().is_empty());
    }

    #[test]
    fn test_unsupported_partitions() {
        let mock = fabric();
        mock.set_unsupported(vec![UnsupportedPartition::new(5, vec![6, 7])]);
        let (_library, session) = connect(&mock);

        let unsupported = session.unsupported_partitions().unwrap();
        assert_eq!(unsupported.len(), 1);
        assert_eq!(unsupported[0].id, 5);
        assert_eq!(unsupported[0].gpu_physical_ids, vec![6, 7]);
    }

    #[test]
    fn test_revision_skew_is_version_mismatch() {
        let mock = fabric();
        let (_library, session) = connect(&mock);
        mock.inject(Fault::RevisionSkew);

        let err = session.supported_partitions().unwrap_err();
        assert_eq!(status_of(&err), Some(StatusCode::VersionMismatch));
    }

    #[test]
    fn test_count_overflow_rejected() {
        let mock = fabric();
        let (_library, session) = connect(&mock);
        mock.inject(Fault::CountOverflow);

        let err = session.unsupported_partitions().unwrap_err();
        assert!(matches!(
            err,
            FabricError::Protocol(ProtocolError::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn test_injected_status() {
        let mock = fabric();
        let (_library, session) = connect(&mock);
        mock.inject(Fault::Status(StatusCode::NotConfigured));

        let err = session.activate_partition(0).unwrap_err();
        assert_eq!(status_of(&err), Some(StatusCode::NotConfigured));
        // Faults fire once
        session.activate_partition(0).unwrap();
    }

    #[test]
    fn test_shared_session_across_threads() {
        let mock = fabric();
        let (_library, session) = connect(&mock);
        let session = Arc::new(session);

        let handles: Vec<_> = [0u32, 1]
            .into_iter()
            .map(|id| {
                let session = Arc::clone(&session);
                std::thread::spawn(move || session.activate_partition(id))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert_eq!(active_ids(&session), vec![0, 1]);
    }
}
