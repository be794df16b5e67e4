//! Pre-boot handoff records. An application that wants the bootloader
//! to flash a new image leaves one of two records behind before
//! resetting: a RAM record with the update order, or (legacy path) an
//! identity stashed in the first CAN peripheral's filter registers.
//! Both are validated, consumed, and cleared here; the raw addresses
//! stay in board glue.
use crate::protocol::messages::{PathBytes, PATH_CAPACITY};
use crc::{Crc, CRC_64_WE};

//==================================================================================RAM_RECORD

/// Magic marking a valid application→bootloader RAM record.
pub const UPDATE_MARKER_MAGIC: u32 = 0xc134_5dc2;

/// Wire size of the RAM record: magic, two node ids, and a
/// NUL-terminated path.
pub const UPDATE_MARKER_SIZE: usize = 4 + 2 + PATH_CAPACITY + 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Update order left behind by the application.
pub struct UpdateMarker {
    /// File server to pull the image from.
    pub server_node_id: u8,
    /// Identity to adopt, skipping dynamic allocation.
    pub my_node_id: u8,
    pub path: PathBytes,
}

/// Validate and consume the RAM record.
///
/// Returns the order when the magic matches and a node id is present;
/// the region is zeroed on success so a later reboot cannot replay it.
pub fn take_update_marker(region: &mut [u8]) -> Option<UpdateMarker> {
    if region.len() < UPDATE_MARKER_SIZE {
        return None;
    }
    let magic = u32::from_le_bytes([region[0], region[1], region[2], region[3]]);
    if magic != UPDATE_MARKER_MAGIC {
        return None;
    }
    let server_node_id = region[4];
    let my_node_id = region[5];
    if my_node_id == 0 {
        return None;
    }
    let raw_path = &region[6..6 + PATH_CAPACITY + 1];
    let path_len = raw_path
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(PATH_CAPACITY)
        .min(PATH_CAPACITY);
    let path = PathBytes::from_slice(&raw_path[..path_len])?;

    region[..UPDATE_MARKER_SIZE].fill(0);
    Some(UpdateMarker {
        server_node_id,
        my_node_id,
        path,
    })
}

//==================================================================================FILTER_RECORD

/// Signature marking a valid identity record in the filter registers.
pub const FILTER_HANDOFF_SIGNATURE: u32 = 0xb0a0_4150;

/// Number of 32-bit filter words spanned by the record.
pub const FILTER_HANDOFF_WORDS: usize = 5;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_WE);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Identity handed over through the legacy filter-register path.
pub struct FilterHandoff {
    pub node_id: u8,
    pub bus_speed: u32,
}

/// Validate and consume the filter-register record.
///
/// Layout: `{crc64, signature, bus_speed, node_id}` where the CRC
/// covers the last three words and is stored with its 32-bit halves
/// swapped. The signature word is cleared on success to break reboot
/// loops.
pub fn take_filter_handoff(words: &mut [u32; FILTER_HANDOFF_WORDS]) -> Option<FilterHandoff> {
    let signature = words[2];
    let bus_speed = words[3];
    let node_id = words[4];
    if signature != FILTER_HANDOFF_SIGNATURE {
        return None;
    }
    if node_id == 0 || node_id >= 128 {
        return None;
    }

    let mut covered = [0u8; 12];
    covered[0..4].copy_from_slice(&signature.to_le_bytes());
    covered[4..8].copy_from_slice(&bus_speed.to_le_bytes());
    covered[8..12].copy_from_slice(&node_id.to_le_bytes());
    let crc = CRC64.checksum(&covered);
    let (lo, hi) = (crc as u32, (crc >> 32) as u32);
    if words[0] != hi || words[1] != lo {
        return None;
    }

    words[2] = 0;
    Some(FilterHandoff {
        node_id: node_id as u8,
        bus_speed,
    })
}
