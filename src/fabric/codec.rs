//! Versioned message codec
//!
//! Every structure exchanged with the Fabric Manager is a fixed C layout
//! that starts with a version tag, `size | (revision << 24)`. Fields are
//! 32-bit unsigned integers in native byte order and fixed-size
//! NUL-terminated character arrays; all sizes are multiples of four so the
//! layouts carry no padding.
//!
//! The codec only packs and unpacks bytes. Buffers are [`WireBuffer`]s,
//! which are 4-byte aligned so the backend can hand them to the C library
//! unchanged.

use crate::domain::{
    NvlinkFailedDeviceInfo, NvlinkFailedDevices, Partition, PartitionGpuInfo, PartitionId,
    PciDevice, UnsupportedPartition,
};
use crate::error::{FabricError, FmError, ProtocolError};
use crate::status::StatusCode;

use std::ffi::c_void;

/// Size of the generic address buffer
pub const FM_MAX_STR_LENGTH: usize = 256;
/// GPUs per partition or per failure report
pub const FM_MAX_NUM_GPUS: usize = 16;
/// Partitions per list
pub const FM_MAX_FABRIC_PARTITIONS: usize = 64;
/// Failed ports per device
pub const FM_MAX_NUM_NVLINK_PORTS: usize = 64;
/// NVSwitches per failure report
pub const FM_MAX_NUM_NVSWITCHES: usize = 12;
/// UUID buffer size, terminator included
pub const FM_UUID_BUFFER_SIZE: usize = 80;
/// PCI bus ID buffer size, terminator included
pub const FM_DEVICE_PCI_BUS_ID_BUFFER_SIZE: usize = 32;

const WORD: usize = 4;

/// fmFabricPartitionGpuInfo_t
pub const PARTITION_GPU_INFO_SIZE: usize =
    WORD + FM_UUID_BUFFER_SIZE + FM_DEVICE_PCI_BUS_ID_BUFFER_SIZE + 3 * WORD;
/// fmFabricPartitionInfo_t
pub const PARTITION_INFO_SIZE: usize = 3 * WORD + FM_MAX_NUM_GPUS * PARTITION_GPU_INFO_SIZE;
/// fmNvlinkFailedDeviceInfo_t
pub const NVLINK_FAILED_DEVICE_INFO_SIZE: usize = FM_UUID_BUFFER_SIZE
    + FM_DEVICE_PCI_BUS_ID_BUFFER_SIZE
    + WORD
    + FM_MAX_NUM_NVLINK_PORTS * WORD;
/// fmUnsupportedFabricPartitionInfo_t
pub const UNSUPPORTED_PARTITION_INFO_SIZE: usize = 2 * WORD + FM_MAX_NUM_GPUS * WORD;
/// fmPciDevice_t
pub const PCI_DEVICE_SIZE: usize = 4 * WORD;

/// Pack a structure size and revision into a version tag
pub const fn version_tag(size: u32, revision: u32) -> u32 {
    size | (revision << 24)
}

/// Split a version tag into `(size, revision)`
pub const fn split_version_tag(tag: u32) -> (u32, u32) {
    (tag & 0x00FF_FFFF, tag >> 24)
}

/// Size and revision of a top-level versioned structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageLayout {
    pub name: &'static str,
    pub size: usize,
    pub revision: u32,
}

impl MessageLayout {
    /// Version tag this client writes and expects
    pub const fn version(&self) -> u32 {
        version_tag(self.size as u32, self.revision)
    }

    /// Zeroed buffer of the structure's size with its version tag set
    pub fn new_buffer(&self) -> WireBuffer {
        let mut buf = WireBuffer::zeroed(self.size);
        buf.put_u32(0, self.version());
        buf
    }

    /// Verify a buffer holds this structure at this revision
    ///
    /// A different tag means the peer speaks another revision of the
    /// layout; reading it would misinterpret memory, so it is reported as a
    /// version mismatch.
    pub fn check(&self, buf: &WireBuffer) -> Result<(), FabricError> {
        if buf.len() < self.size {
            return Err(ProtocolError::Truncated {
                expected: self.size,
                actual: buf.len(),
            }
            .into());
        }
        let found = buf.get_u32(0);
        if found != self.version() {
            let (size, revision) = split_version_tag(found);
            log::debug!(
                "{} version mismatch: expected size {} rev {}, found size {} rev {}",
                self.name,
                self.size,
                self.revision,
                size,
                revision
            );
            return Err(FmError::from(StatusCode::VersionMismatch).into());
        }
        log::trace!("{} version tag {:#010x} ok", self.name, found);
        Ok(())
    }
}

/// fmConnectParams_v1
pub const CONNECT_PARAMS: MessageLayout = MessageLayout {
    name: "fmConnectParams",
    size: WORD + FM_MAX_STR_LENGTH + 2 * WORD,
    revision: 1,
};

/// fmFabricPartitionList_v2
pub const FABRIC_PARTITION_LIST: MessageLayout = MessageLayout {
    name: "fmFabricPartitionList",
    size: 3 * WORD + FM_MAX_FABRIC_PARTITIONS * PARTITION_INFO_SIZE,
    revision: 2,
};

/// fmActivatedFabricPartitionList_v1
pub const ACTIVATED_PARTITION_LIST: MessageLayout = MessageLayout {
    name: "fmActivatedFabricPartitionList",
    size: 2 * WORD + FM_MAX_FABRIC_PARTITIONS * WORD,
    revision: 1,
};

/// fmNvlinkFailedDevices_v1
pub const NVLINK_FAILED_DEVICES: MessageLayout = MessageLayout {
    name: "fmNvlinkFailedDevices",
    size: 3 * WORD + (FM_MAX_NUM_GPUS + FM_MAX_NUM_NVSWITCHES) * NVLINK_FAILED_DEVICE_INFO_SIZE,
    revision: 1,
};

/// fmUnsupportedFabricPartitionList_v1
pub const UNSUPPORTED_PARTITION_LIST: MessageLayout = MessageLayout {
    name: "fmUnsupportedFabricPartitionList",
    size: 2 * WORD + FM_MAX_FABRIC_PARTITIONS * UNSUPPORTED_PARTITION_INFO_SIZE,
    revision: 1,
};

/// A 4-byte aligned, zero-initialized byte buffer
#[derive(Clone, PartialEq, Eq)]
pub struct WireBuffer {
    words: Vec<u32>,
    len: usize,
}

impl WireBuffer {
    /// Allocate `len` zero bytes
    pub fn zeroed(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(WORD)],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: the words vector owns at least `len` initialized bytes and
        // every bit pattern is a valid u8.
        unsafe { std::slice::from_raw_parts(self.words.as_ptr().cast::<u8>(), self.len) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above; the mutable borrow of self keeps the view unique.
        unsafe { std::slice::from_raw_parts_mut(self.words.as_mut_ptr().cast::<u8>(), self.len) }
    }

    /// Pointer for passing the structure across the C ABI
    pub fn as_mut_ptr(&mut self) -> *mut c_void {
        self.words.as_mut_ptr().cast()
    }

    /// Read a field at a byte offset
    pub fn get_u32(&self, offset: usize) -> u32 {
        read_u32(self.as_bytes(), offset)
    }

    /// Write a field at a byte offset
    pub fn put_u32(&mut self, offset: usize, value: u32) {
        write_u32(self.as_bytes_mut(), offset, value);
    }
}

impl std::fmt::Debug for WireBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireBuffer")
            .field("len", &self.len)
            .field("version", &self.words.first().copied())
            .finish()
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; WORD];
    word.copy_from_slice(&bytes[offset..offset + WORD]);
    u32::from_ne_bytes(word)
}

fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + WORD].copy_from_slice(&value.to_ne_bytes());
}

/// Copy a string into a fixed buffer
///
/// At most `dst.len() - 1` bytes are copied; the rest of the buffer,
/// terminator included, is zeroed.
pub fn encode_fixed_str(dst: &mut [u8], value: &str) {
    let Some(max) = dst.len().checked_sub(1) else {
        return;
    };
    let src = value.as_bytes();
    let n = src.len().min(max);
    if n < src.len() {
        log::debug!("truncating {} byte string to {} bytes", src.len(), n);
    }
    dst[..n].copy_from_slice(&src[..n]);
    dst[n..].fill(0);
}

/// Read a NUL-terminated string from a fixed buffer, never past its end
pub fn decode_fixed_str(src: &[u8]) -> String {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    String::from_utf8_lossy(&src[..end]).into_owned()
}

fn check_capacity(field: &'static str, count: usize, capacity: usize) -> Result<(), ProtocolError> {
    if count > capacity {
        return Err(ProtocolError::CapacityExceeded {
            field,
            count,
            capacity,
        });
    }
    Ok(())
}

/// Sequential reader over one fixed-layout record
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn at(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    fn u32(&mut self) -> u32 {
        let value = read_u32(self.bytes, self.pos);
        self.pos += WORD;
        value
    }

    fn count(&mut self, field: &'static str, capacity: usize) -> Result<usize, ProtocolError> {
        let count = self.u32() as usize;
        check_capacity(field, count, capacity)?;
        Ok(count)
    }

    fn string(&mut self, bound: usize) -> String {
        let value = decode_fixed_str(&self.bytes[self.pos..self.pos + bound]);
        self.pos += bound;
        value
    }

    fn u32_array(&mut self, count: usize, capacity: usize) -> Vec<u32> {
        let start = self.pos;
        self.pos += capacity * WORD;
        (0..count).map(|i| read_u32(self.bytes, start + i * WORD)).collect()
    }
}

/// Sequential writer over one fixed-layout record
struct Writer<'a> {
    bytes: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn at(bytes: &'a mut [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    fn u32(&mut self, value: u32) {
        write_u32(self.bytes, self.pos, value);
        self.pos += WORD;
    }

    fn string(&mut self, value: &str, bound: usize) {
        encode_fixed_str(&mut self.bytes[self.pos..self.pos + bound], value);
        self.pos += bound;
    }

    fn u32_array(
        &mut self,
        field: &'static str,
        values: &[u32],
        capacity: usize,
    ) -> Result<(), ProtocolError> {
        check_capacity(field, values.len(), capacity)?;
        for (i, value) in values.iter().enumerate() {
            write_u32(self.bytes, self.pos + i * WORD, *value);
        }
        self.bytes[self.pos + values.len() * WORD..self.pos + capacity * WORD].fill(0);
        self.pos += capacity * WORD;
        Ok(())
    }
}

/// Decoded form of fmConnectParams
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    /// Socket path or `host:port`
    pub address: String,
    pub timeout_ms: u32,
    pub address_is_unix_socket: bool,
}

/// Encode connect parameters; the address is truncated to 255 bytes
pub fn encode_connect_params(params: &ConnectParams) -> WireBuffer {
    let mut buf = CONNECT_PARAMS.new_buffer();
    let mut w = Writer::at(buf.as_bytes_mut(), WORD);
    w.string(&params.address, FM_MAX_STR_LENGTH);
    w.u32(params.timeout_ms);
    w.u32(u32::from(params.address_is_unix_socket));
    buf
}

/// Decode connect parameters (daemon side)
pub fn decode_connect_params(buf: &WireBuffer) -> Result<ConnectParams, FabricError> {
    CONNECT_PARAMS.check(buf)?;
    let mut r = Reader::at(buf.as_bytes(), WORD);
    Ok(ConnectParams {
        address: r.string(FM_MAX_STR_LENGTH),
        timeout_ms: r.u32(),
        address_is_unix_socket: r.u32() != 0,
    })
}

/// Decode a supported partition list response
pub fn decode_partition_list(buf: &WireBuffer) -> Result<Vec<Partition>, FabricError> {
    FABRIC_PARTITION_LIST.check(buf)?;
    let bytes = buf.as_bytes();
    let num_partitions = Reader::at(bytes, WORD).count("partition", FM_MAX_FABRIC_PARTITIONS)?;

    let mut partitions = Vec::with_capacity(num_partitions);
    for i in 0..num_partitions {
        let mut r = Reader::at(bytes, 3 * WORD + i * PARTITION_INFO_SIZE);
        let id = r.u32();
        let is_active = r.u32() != 0;
        let num_gpus = r.count("partition GPU", FM_MAX_NUM_GPUS)?;

        let gpus_start = r.pos;
        let gpus = (0..num_gpus)
            .map(|j| decode_partition_gpu(bytes, gpus_start + j * PARTITION_GPU_INFO_SIZE))
            .collect::<Result<Vec<_>, _>>()?;

        partitions.push(Partition::new(id, is_active, gpus));
    }

    Ok(partitions)
}

fn decode_partition_gpu(bytes: &[u8], offset: usize) -> Result<PartitionGpuInfo, ProtocolError> {
    let mut g = Reader::at(bytes, offset);
    let gpu = PartitionGpuInfo {
        physical_id: g.u32(),
        uuid: g.string(FM_UUID_BUFFER_SIZE),
        pci_bus_id: g.string(FM_DEVICE_PCI_BUS_ID_BUFFER_SIZE),
        num_nvlinks_available: g.u32(),
        max_num_nvlinks: g.u32(),
        nvlink_line_rate_mbps: g.u32(),
    };
    if gpu.num_nvlinks_available > gpu.max_num_nvlinks {
        return Err(ProtocolError::InvalidField {
            field: "available NVLink",
            value: gpu.num_nvlinks_available,
            bound: gpu.max_num_nvlinks,
        });
    }
    Ok(gpu)
}

/// Fill a supported partition list (daemon side)
pub fn encode_partition_list(
    buf: &mut WireBuffer,
    partitions: &[Partition],
) -> Result<(), FabricError> {
    FABRIC_PARTITION_LIST.check(buf)?;
    check_capacity("partition", partitions.len(), FM_MAX_FABRIC_PARTITIONS)?;
    let bytes = buf.as_bytes_mut();
    let mut header = Writer::at(bytes, WORD);
    header.u32(partitions.len() as u32);
    header.u32(FM_MAX_FABRIC_PARTITIONS as u32);

    for (i, partition) in partitions.iter().enumerate() {
        check_capacity("partition GPU", partition.gpus.len(), FM_MAX_NUM_GPUS)?;
        let start = 3 * WORD + i * PARTITION_INFO_SIZE;
        let mut w = Writer::at(bytes, start);
        w.u32(partition.id);
        w.u32(u32::from(partition.is_active));
        w.u32(partition.gpus.len() as u32);

        for (j, gpu) in partition.gpus.iter().enumerate() {
            let mut g = Writer::at(bytes, start + 3 * WORD + j * PARTITION_GPU_INFO_SIZE);
            g.u32(gpu.physical_id);
            g.string(&gpu.uuid, FM_UUID_BUFFER_SIZE);
            g.string(&gpu.pci_bus_id, FM_DEVICE_PCI_BUS_ID_BUFFER_SIZE);
            g.u32(gpu.num_nvlinks_available);
            g.u32(gpu.max_num_nvlinks);
            g.u32(gpu.nvlink_line_rate_mbps);
        }
    }
    Ok(())
}

/// Encode the full set of partitions that should be active
pub fn encode_activated_list(ids: &[PartitionId]) -> Result<WireBuffer, ProtocolError> {
    check_capacity("activated partition", ids.len(), FM_MAX_FABRIC_PARTITIONS)?;
    let mut buf = ACTIVATED_PARTITION_LIST.new_buffer();
    let mut w = Writer::at(buf.as_bytes_mut(), WORD);
    w.u32(ids.len() as u32);
    w.u32_array("activated partition", ids, FM_MAX_FABRIC_PARTITIONS)?;
    Ok(buf)
}

/// Decode an activated partition list (daemon side)
pub fn decode_activated_list(buf: &WireBuffer) -> Result<Vec<PartitionId>, FabricError> {
    ACTIVATED_PARTITION_LIST.check(buf)?;
    let mut r = Reader::at(buf.as_bytes(), WORD);
    let count = r.count("activated partition", FM_MAX_FABRIC_PARTITIONS)?;
    Ok(r.u32_array(count, FM_MAX_FABRIC_PARTITIONS))
}

fn decode_failed_device(bytes: &[u8], offset: usize) -> Result<NvlinkFailedDeviceInfo, ProtocolError> {
    let mut r = Reader::at(bytes, offset);
    let uuid = r.string(FM_UUID_BUFFER_SIZE);
    let pci_bus_id = r.string(FM_DEVICE_PCI_BUS_ID_BUFFER_SIZE);
    let num_ports = r.count("failed port", FM_MAX_NUM_NVLINK_PORTS)?;
    let port_nums = r.u32_array(num_ports, FM_MAX_NUM_NVLINK_PORTS);
    if let Some(&port) = port_nums
        .iter()
        .find(|&&port| port as usize >= FM_MAX_NUM_NVLINK_PORTS)
    {
        return Err(ProtocolError::InvalidField {
            field: "failed port number",
            value: port,
            bound: FM_MAX_NUM_NVLINK_PORTS as u32,
        });
    }
    Ok(NvlinkFailedDeviceInfo::new(uuid, pci_bus_id, port_nums))
}

fn encode_failed_device(
    bytes: &mut [u8],
    offset: usize,
    device: &NvlinkFailedDeviceInfo,
) -> Result<(), ProtocolError> {
    let mut w = Writer::at(bytes, offset);
    w.string(&device.uuid, FM_UUID_BUFFER_SIZE);
    w.string(&device.pci_bus_id, FM_DEVICE_PCI_BUS_ID_BUFFER_SIZE);
    w.u32(device.port_nums.len() as u32);
    w.u32_array("failed port", &device.port_nums, FM_MAX_NUM_NVLINK_PORTS)
}

const FAILED_GPUS_OFFSET: usize = 3 * WORD;
const FAILED_SWITCHES_OFFSET: usize =
    FAILED_GPUS_OFFSET + FM_MAX_NUM_GPUS * NVLINK_FAILED_DEVICE_INFO_SIZE;

/// Decode an NVLink failed devices response
pub fn decode_nvlink_failed_devices(buf: &WireBuffer) -> Result<NvlinkFailedDevices, FabricError> {
    NVLINK_FAILED_DEVICES.check(buf)?;
    let bytes = buf.as_bytes();
    let mut header = Reader::at(bytes, WORD);
    let num_gpus = header.count("failed GPU", FM_MAX_NUM_GPUS)?;
    let num_switches = header.count("failed NVSwitch", FM_MAX_NUM_NVSWITCHES)?;

    let gpu_info = (0..num_gpus)
        .map(|i| decode_failed_device(bytes, FAILED_GPUS_OFFSET + i * NVLINK_FAILED_DEVICE_INFO_SIZE))
        .collect::<Result<Vec<_>, _>>()?;
    let switch_info = (0..num_switches)
        .map(|i| {
            decode_failed_device(bytes, FAILED_SWITCHES_OFFSET + i * NVLINK_FAILED_DEVICE_INFO_SIZE)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(NvlinkFailedDevices::new(gpu_info, switch_info))
}

/// Fill an NVLink failed devices report (daemon side)
pub fn encode_nvlink_failed_devices(
    buf: &mut WireBuffer,
    report: &NvlinkFailedDevices,
) -> Result<(), FabricError> {
    NVLINK_FAILED_DEVICES.check(buf)?;
    check_capacity("failed GPU", report.gpu_info.len(), FM_MAX_NUM_GPUS)?;
    check_capacity("failed NVSwitch", report.switch_info.len(), FM_MAX_NUM_NVSWITCHES)?;
    let bytes = buf.as_bytes_mut();
    let mut header = Writer::at(bytes, WORD);
    header.u32(report.gpu_info.len() as u32);
    header.u32(report.switch_info.len() as u32);

    for (i, gpu) in report.gpu_info.iter().enumerate() {
        encode_failed_device(bytes, FAILED_GPUS_OFFSET + i * NVLINK_FAILED_DEVICE_INFO_SIZE, gpu)?;
    }
    for (i, switch) in report.switch_info.iter().enumerate() {
        encode_failed_device(
            bytes,
            FAILED_SWITCHES_OFFSET + i * NVLINK_FAILED_DEVICE_INFO_SIZE,
            switch,
        )?;
    }
    Ok(())
}

/// Decode an unsupported partition list response
pub fn decode_unsupported_partition_list(
    buf: &WireBuffer,
) -> Result<Vec<UnsupportedPartition>, FabricError> {
    UNSUPPORTED_PARTITION_LIST.check(buf)?;
    let bytes = buf.as_bytes();
    let num_partitions =
        Reader::at(bytes, WORD).count("unsupported partition", FM_MAX_FABRIC_PARTITIONS)?;

    let mut partitions = Vec::with_capacity(num_partitions);
    for i in 0..num_partitions {
        let mut r = Reader::at(bytes, 2 * WORD + i * UNSUPPORTED_PARTITION_INFO_SIZE);
        let id = r.u32();
        let num_gpus = r.count("unsupported partition GPU", FM_MAX_NUM_GPUS)?;
        let gpu_physical_ids = r.u32_array(num_gpus, FM_MAX_NUM_GPUS);
        partitions.push(UnsupportedPartition::new(id, gpu_physical_ids));
    }
    Ok(partitions)
}

/// Fill an unsupported partition list (daemon side)
pub fn encode_unsupported_partition_list(
    buf: &mut WireBuffer,
    partitions: &[UnsupportedPartition],
) -> Result<(), FabricError> {
    UNSUPPORTED_PARTITION_LIST.check(buf)?;
    check_capacity("unsupported partition", partitions.len(), FM_MAX_FABRIC_PARTITIONS)?;
    let bytes = buf.as_bytes_mut();
    Writer::at(bytes, WORD).u32(partitions.len() as u32);

    for (i, partition) in partitions.iter().enumerate() {
        let mut w = Writer::at(bytes, 2 * WORD + i * UNSUPPORTED_PARTITION_INFO_SIZE);
        w.u32(partition.id);
        w.u32(partition.gpu_physical_ids.len() as u32);
        w.u32_array(
            "unsupported partition GPU",
            &partition.gpu_physical_ids,
            FM_MAX_NUM_GPUS,
        )?;
    }
    Ok(())
}

/// Encode a contiguous fmPciDevice_t array
pub fn encode_pci_devices(devices: &[PciDevice]) -> WireBuffer {
    let mut buf = WireBuffer::zeroed(devices.len() * PCI_DEVICE_SIZE);
    let mut w = Writer::at(buf.as_bytes_mut(), 0);
    for vf in devices {
        w.u32(vf.domain);
        w.u32(vf.bus);
        w.u32(vf.device);
        w.u32(vf.function);
    }
    buf
}

/// Decode `count` fmPciDevice_t records (daemon side)
pub fn decode_pci_devices(buf: &WireBuffer, count: usize) -> Result<Vec<PciDevice>, ProtocolError> {
    let expected = count * PCI_DEVICE_SIZE;
    if buf.len() < expected {
        return Err(ProtocolError::Truncated {
            expected,
            actual: buf.len(),
        });
    }
    let mut r = Reader::at(buf.as_bytes(), 0);
    Ok((0..count)
        .map(|_| PciDevice::new(r.u32(), r.u32(), r.u32(), r.u32()))
        .collect())
}
