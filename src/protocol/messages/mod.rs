//! DroneCAN message set used by the bootloader: data-type ids, schema
//! signatures, DSDL constants, and hand-written payload codecs for the
//! seven messages the core exchanges. Fields the bootloader never
//! populates (version control hashes, certificates) are encoded at
//! their neutral values.
use crate::error::{DecodeError, EncodeError};
use crate::infra::bytes::Bytes;
use crate::protocol::transport::traits::transfer_bus::{DataType, NODE_ID_BROADCAST};

//==================================================================================DATA_TYPES

pub const NODE_STATUS: DataType = DataType {
    id: 341,
    signature: 0x0f0868d0c1a7c6f1,
};
pub const GET_NODE_INFO: DataType = DataType {
    id: 1,
    signature: 0xee468a8121c46a9e,
};
pub const RESTART_NODE: DataType = DataType {
    id: 5,
    signature: 0x569e05394a3017f0,
};
pub const BEGIN_FIRMWARE_UPDATE: DataType = DataType {
    id: 40,
    signature: 0xb7d725df72724126,
};
pub const FILE_READ: DataType = DataType {
    id: 48,
    signature: 0x8dcdca939f33f678,
};
pub const DYNAMIC_NODE_ID_ALLOCATION: DataType = DataType {
    id: 1,
    signature: 0x0b2a812620a11d40,
};
pub const DEBUG_LOG_MESSAGE: DataType = DataType {
    id: 16383,
    signature: 0xd654a48e0c049d75,
};

//==================================================================================CAPACITIES

/// Bytes of unique id carried by the allocation exchange.
pub const UNIQUE_ID_LEN: usize = 16;
/// Unique-id bytes fitting into one allocation request frame.
pub const UNIQUE_ID_BYTES_PER_REQUEST: usize = 6;
/// Longest remote file path on the wire.
pub const PATH_CAPACITY: usize = 200;
/// Payload bytes of a single file-read response; a shorter response
/// signals end of file.
pub const READ_CHUNK: usize = 256;
/// Longest node name in a get-node-info response.
pub const NAME_CAPACITY: usize = 80;

pub type PathBytes = Bytes<PATH_CAPACITY>;
pub type ChunkBytes = Bytes<READ_CHUNK>;
pub type NameBytes = Bytes<NAME_CAPACITY>;
pub type UniqueIdBytes = Bytes<UNIQUE_ID_LEN>;

//==================================================================================DSDL_CONSTANTS

/// Minimum pause between two allocation requests.
pub const ALLOCATION_MIN_REQUEST_PERIOD_MS: u32 = 600;
/// Upper bound of the random follow-up delay added to every request.
pub const ALLOCATION_MAX_FOLLOWUP_DELAY_MS: u16 = 400;

pub const HEALTH_OK: u8 = 0;

pub const MODE_OPERATIONAL: u8 = 0;
pub const MODE_INITIALIZATION: u8 = 1;
pub const MODE_MAINTENANCE: u8 = 2;
pub const MODE_SOFTWARE_UPDATE: u8 = 3;
pub const MODE_OFFLINE: u8 = 7;

pub const BEGIN_FIRMWARE_UPDATE_ERROR_OK: u8 = 0;
pub const BEGIN_FIRMWARE_UPDATE_ERROR_INVALID_MODE: u8 = 1;
pub const BEGIN_FIRMWARE_UPDATE_ERROR_IN_PROGRESS: u8 = 2;
pub const BEGIN_FIRMWARE_UPDATE_ERROR_UNKNOWN: u8 = 255;

pub const LOG_LEVEL_DEBUG: u8 = 0;
pub const LOG_LEVEL_INFO: u8 = 1;
pub const LOG_LEVEL_WARNING: u8 = 2;
pub const LOG_LEVEL_ERROR: u8 = 3;

//==================================================================================NODE_STATUS

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Periodic liveness broadcast.
pub struct NodeStatus {
    pub uptime_sec: u32,
    pub health: u8,
    pub mode: u8,
    pub sub_mode: u8,
    /// Doubles as pre-update health code and coarse update progress.
    pub vendor_specific_status_code: u16,
}

impl NodeStatus {
    pub const WIRE_SIZE: usize = 7;

    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        if buf.len() < Self::WIRE_SIZE {
            return Err(EncodeError::BufferTooSmall);
        }
        buf[0..4].copy_from_slice(&self.uptime_sec.to_le_bytes());
        buf[4] = (self.health & 0x03) << 6 | (self.mode & 0x07) << 3 | (self.sub_mode & 0x07);
        buf[5..7].copy_from_slice(&self.vendor_specific_status_code.to_le_bytes());
        Ok(Self::WIRE_SIZE)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.len() < Self::WIRE_SIZE {
            return Err(DecodeError::Truncated);
        }
        let mut uptime = [0u8; 4];
        uptime.copy_from_slice(&payload[0..4]);
        let mut vendor = [0u8; 2];
        vendor.copy_from_slice(&payload[5..7]);
        Ok(Self {
            uptime_sec: u32::from_le_bytes(uptime),
            health: payload[4] >> 6,
            mode: (payload[4] >> 3) & 0x07,
            sub_mode: payload[4] & 0x07,
            vendor_specific_status_code: u16::from_le_bytes(vendor),
        })
    }
}

//==================================================================================GET_NODE_INFO

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SoftwareVersion {
    pub major: u8,
    pub minor: u8,
    pub optional_field_flags: u8,
    pub vcs_commit: u32,
    pub image_crc: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HardwareVersion {
    pub major: u8,
    pub minor: u8,
    pub unique_id: [u8; UNIQUE_ID_LEN],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Response to a get-node-info request. The request carries no payload.
pub struct GetNodeInfoResponse {
    pub status: NodeStatus,
    pub software_version: SoftwareVersion,
    pub hardware_version: HardwareVersion,
    pub name: NameBytes,
}

impl GetNodeInfoResponse {
    /// Status + software version + hardware version (with an empty
    /// certificate, one length byte) + name tail.
    pub const MAX_SIZE: usize = NodeStatus::WIRE_SIZE + 15 + 18 + 1 + NAME_CAPACITY;

    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let total = NodeStatus::WIRE_SIZE + 15 + 18 + 1 + self.name.len();
        if buf.len() < total {
            return Err(EncodeError::BufferTooSmall);
        }
        let mut at = self.status.encode(buf)?;
        let sw = &self.software_version;
        buf[at] = sw.major;
        buf[at + 1] = sw.minor;
        buf[at + 2] = sw.optional_field_flags;
        buf[at + 3..at + 7].copy_from_slice(&sw.vcs_commit.to_le_bytes());
        buf[at + 7..at + 15].copy_from_slice(&sw.image_crc.to_le_bytes());
        at += 15;
        let hw = &self.hardware_version;
        buf[at] = hw.major;
        buf[at + 1] = hw.minor;
        buf[at + 2..at + 18].copy_from_slice(&hw.unique_id);
        at += 18;
        // Empty certificate of authenticity.
        buf[at] = 0;
        at += 1;
        buf[at..at + self.name.len()].copy_from_slice(self.name.as_slice());
        Ok(at + self.name.len())
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        const FIXED: usize = NodeStatus::WIRE_SIZE + 15 + 18;
        if payload.len() < FIXED + 1 {
            return Err(DecodeError::Truncated);
        }
        let status = NodeStatus::decode(payload)?;
        let mut at = NodeStatus::WIRE_SIZE;
        let mut vcs = [0u8; 4];
        vcs.copy_from_slice(&payload[at + 3..at + 7]);
        let mut image_crc = [0u8; 8];
        image_crc.copy_from_slice(&payload[at + 7..at + 15]);
        let software_version = SoftwareVersion {
            major: payload[at],
            minor: payload[at + 1],
            optional_field_flags: payload[at + 2],
            vcs_commit: u32::from_le_bytes(vcs),
            image_crc: u64::from_le_bytes(image_crc),
        };
        at += 15;
        let mut unique_id = [0u8; UNIQUE_ID_LEN];
        unique_id.copy_from_slice(&payload[at + 2..at + 18]);
        let hardware_version = HardwareVersion {
            major: payload[at],
            minor: payload[at + 1],
            unique_id,
        };
        at += 18;
        let certificate_len = payload[at] as usize;
        at += 1;
        if payload.len() < at + certificate_len {
            return Err(DecodeError::BadLength);
        }
        at += certificate_len;
        let name = NameBytes::from_slice(&payload[at..]).ok_or(DecodeError::BadLength)?;
        Ok(Self {
            status,
            software_version,
            hardware_version,
            name,
        })
    }
}

//==================================================================================ALLOCATION

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Dynamic node-id allocation broadcast, both directions.
pub struct AllocationMessage {
    pub node_id: u8,
    pub first_part_of_unique_id: bool,
    pub unique_id: UniqueIdBytes,
}

impl AllocationMessage {
    pub const MAX_SIZE: usize = 1 + UNIQUE_ID_LEN;

    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        if buf.len() < 1 + self.unique_id.len() {
            return Err(EncodeError::BufferTooSmall);
        }
        buf[0] = (self.node_id & 0x7F) << 1 | u8::from(self.first_part_of_unique_id);
        buf[1..1 + self.unique_id.len()].copy_from_slice(self.unique_id.as_slice());
        Ok(1 + self.unique_id.len())
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.is_empty() {
            return Err(DecodeError::Truncated);
        }
        let unique_id = UniqueIdBytes::from_slice(&payload[1..]).ok_or(DecodeError::BadLength)?;
        Ok(Self {
            node_id: payload[0] >> 1,
            first_part_of_unique_id: payload[0] & 1 != 0,
            unique_id,
        })
    }

    /// Whether the allocator returned no node id with this stage.
    pub fn is_pending(&self) -> bool {
        self.node_id == NODE_ID_BROADCAST
    }
}

//==================================================================================FILE_READ

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Request for `READ_CHUNK` bytes of the remote file at `offset`.
pub struct FileReadRequest {
    /// 40-bit file offset.
    pub offset: u64,
    pub path: PathBytes,
}

impl FileReadRequest {
    pub const MAX_SIZE: usize = 5 + PATH_CAPACITY;

    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        if self.offset >> 40 != 0 {
            return Err(EncodeError::Oversize { field: "offset" });
        }
        if buf.len() < 5 + self.path.len() {
            return Err(EncodeError::BufferTooSmall);
        }
        buf[0..5].copy_from_slice(&self.offset.to_le_bytes()[0..5]);
        buf[5..5 + self.path.len()].copy_from_slice(self.path.as_slice());
        Ok(5 + self.path.len())
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.len() < 5 {
            return Err(DecodeError::Truncated);
        }
        let mut offset = [0u8; 8];
        offset[0..5].copy_from_slice(&payload[0..5]);
        let path = PathBytes::from_slice(&payload[5..]).ok_or(DecodeError::BadLength)?;
        Ok(Self {
            offset: u64::from_le_bytes(offset),
            path,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// File-read response: error code plus up to [`READ_CHUNK`] bytes.
pub struct FileReadResponse {
    pub error: i16,
    pub data: ChunkBytes,
}

impl FileReadResponse {
    pub const MAX_SIZE: usize = 2 + READ_CHUNK;

    pub const fn new() -> Self {
        Self {
            error: 0,
            data: ChunkBytes::new(),
        }
    }

    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        if buf.len() < 2 + self.data.len() {
            return Err(EncodeError::BufferTooSmall);
        }
        buf[0..2].copy_from_slice(&self.error.to_le_bytes());
        buf[2..2 + self.data.len()].copy_from_slice(self.data.as_slice());
        Ok(2 + self.data.len())
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.len() < 2 {
            return Err(DecodeError::Truncated);
        }
        let data = ChunkBytes::from_slice(&payload[2..]).ok_or(DecodeError::BadLength)?;
        Ok(Self {
            error: i16::from_le_bytes([payload[0], payload[1]]),
            data,
        })
    }
}

impl Default for FileReadResponse {
    fn default() -> Self {
        Self::new()
    }
}

//==================================================================================BEGIN_FIRMWARE_UPDATE

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Command to start pulling a new image from a file server.
pub struct BeginFirmwareUpdateRequest {
    /// File server to read from; 0 delegates to the transfer source.
    pub source_node_id: u8,
    pub image_file_remote_path: PathBytes,
}

impl BeginFirmwareUpdateRequest {
    pub const MAX_SIZE: usize = 1 + PATH_CAPACITY;

    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        if buf.len() < 1 + self.image_file_remote_path.len() {
            return Err(EncodeError::BufferTooSmall);
        }
        buf[0] = self.source_node_id;
        buf[1..1 + self.image_file_remote_path.len()]
            .copy_from_slice(self.image_file_remote_path.as_slice());
        Ok(1 + self.image_file_remote_path.len())
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.is_empty() {
            return Err(DecodeError::Truncated);
        }
        let image_file_remote_path =
            PathBytes::from_slice(&payload[1..]).ok_or(DecodeError::BadLength)?;
        Ok(Self {
            source_node_id: payload[0],
            image_file_remote_path,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BeginFirmwareUpdateResponse {
    pub error: u8,
}

impl BeginFirmwareUpdateResponse {
    pub const MAX_SIZE: usize = 1;

    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        if buf.is_empty() {
            return Err(EncodeError::BufferTooSmall);
        }
        buf[0] = self.error;
        Ok(1)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.is_empty() {
            return Err(DecodeError::Truncated);
        }
        Ok(Self { error: payload[0] })
    }
}

//==================================================================================LOG_MESSAGE

/// Longest log source tag on the wire.
pub const LOG_SOURCE_CAPACITY: usize = 31;
/// Longest log text on the wire.
pub const LOG_TEXT_CAPACITY: usize = 90;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Broadcast diagnostic text, non-essential.
pub struct LogMessage {
    pub level: u8,
    pub source: Bytes<LOG_SOURCE_CAPACITY>,
    pub text: Bytes<LOG_TEXT_CAPACITY>,
}

impl LogMessage {
    pub const MAX_SIZE: usize = 1 + LOG_SOURCE_CAPACITY + LOG_TEXT_CAPACITY;

    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let total = 1 + self.source.len() + self.text.len();
        if buf.len() < total {
            return Err(EncodeError::BufferTooSmall);
        }
        buf[0] = (self.level & 0x07) << 5 | self.source.len() as u8;
        buf[1..1 + self.source.len()].copy_from_slice(self.source.as_slice());
        buf[1 + self.source.len()..total].copy_from_slice(self.text.as_slice());
        Ok(total)
    }
}
