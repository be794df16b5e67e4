//! Pipelined firmware-update engine. Keeps `P` file-read requests in
//! flight towards the server to hide bus round-trips, re-orders the
//! replies into strict commit order, and feeds the flash writer until
//! the server signals end of file.
use crate::error::AppendError;
use crate::protocol::managment::handoff::UpdateMarker;
use crate::protocol::messages::{
    BeginFirmwareUpdateRequest, BeginFirmwareUpdateResponse, FileReadRequest, FileReadResponse,
    PathBytes, BEGIN_FIRMWARE_UPDATE, BEGIN_FIRMWARE_UPDATE_ERROR_OK, FILE_READ, READ_CHUNK,
};
use crate::protocol::node::board::{Board, FirmwareCheck};
use crate::protocol::node::status::StatusReporter;
use crate::protocol::transport::adapter::IfaceAdapter;
use crate::protocol::transport::traits::{
    can_iface::CanIface,
    clock::Clock,
    transfer_bus::{RxTransfer, TransferBus, NODE_ID_BROADCAST},
};
use crate::protocol::transport::TRANSFER_PRIORITY_HIGH;
use crate::protocol::update::flash_writer::{Flash, FlashWriter};

pub mod flash_writer;

/// Ceiling of the smoothed round-trip estimate.
const RTT_MAX_MS: u32 = 3000;
/// Floor of a round-trip sample.
const RTT_MIN_SAMPLE_MS: u32 = 25;
/// Estimate growth applied when a reply misses the matching window.
const RTT_LATE_STEP_MS: u32 = 250;
/// Floor of the estimate inside the re-issue window computation.
const RTT_WINDOW_FLOOR_MS: u32 = 250;

#[derive(Clone, Copy)]
/// One outstanding file read.
struct ReadSlot {
    /// Transfer id the request went out with, for response matching.
    tx_id: u8,
    /// Send time, 0 while the slot is idle.
    sent_ms: u32,
    /// File offset this slot is responsible for.
    offset: u32,
    /// Reply buffered, waiting for its turn to commit.
    have_reply: bool,
    pkt: FileReadResponse,
}

impl ReadSlot {
    const IDLE: Self = Self {
        tx_id: 0,
        sent_ms: 0,
        offset: 0,
        have_reply: false,
        pkt: FileReadResponse::new(),
    };
}

/// Update context. Dormant while `server_node_id` is 0; a single
/// pipeline, a single writer (the main loop).
pub struct FirmwareUpdate<const P: usize> {
    server_node_id: u8,
    path: PathBytes,
    transfer_id: u8,
    /// Next pipeline slot to commit.
    idx: usize,
    /// Smoothed round-trip estimate.
    rtt_ms: u32,
    reads: [ReadSlot; P],
}

impl<const P: usize> FirmwareUpdate<P> {
    /// Outstanding requests must fit the 5-bit transfer-id window.
    const DEPTH_FITS_ID_WINDOW: () = assert!(P >= 1 && P <= 16);

    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let _ = Self::DEPTH_FITS_ID_WINDOW;
        Self {
            server_node_id: NODE_ID_BROADCAST,
            path: PathBytes::new(),
            transfer_id: 0,
            idx: 0,
            rtt_ms: 0,
            reads: [ReadSlot::IDLE; P],
        }
    }

    /// Whether an update is currently being pulled.
    #[inline]
    pub fn in_progress(&self) -> bool {
        self.server_node_id != NODE_ID_BROADCAST
    }

    /// Smoothed round-trip estimate, for diagnostics.
    #[inline]
    pub fn rtt_ms(&self) -> u32 {
        self.rtt_ms
    }

    /// Zero the context and seed slot `i` with offset `i * READ_CHUNK`.
    fn arm(&mut self, server_node_id: u8, path: &PathBytes) {
        *self = Self::new();
        for (i, slot) in self.reads.iter_mut().enumerate() {
            slot.offset = (i * READ_CHUNK) as u32;
        }
        self.server_node_id = server_node_id;
        self.path = *path;
    }

    /// Start pulling immediately per a pre-boot handoff record.
    pub fn start_from_marker(&mut self, marker: &UpdateMarker) {
        self.arm(marker.server_node_id, &marker.path);
    }

    /// Handle a begin-firmware-update request.
    ///
    /// Arms the pipeline when dormant; while busy the request is
    /// idempotent. A successful-start response goes out in either case;
    /// malformed requests (decode failure, over-long path) are ignored
    /// without a response. Returns whether a new update was armed, so
    /// the caller can rewind its flash state.
    pub fn handle_begin<B: TransferBus>(&mut self, bus: &mut B, transfer: &RxTransfer) -> bool {
        let mut armed = false;
        if !self.in_progress() {
            let Ok(req) = BeginFirmwareUpdateRequest::decode(transfer.payload.as_slice()) else {
                return false;
            };
            let server = if req.source_node_id != NODE_ID_BROADCAST {
                req.source_node_id
            } else {
                transfer.source_node_id
            };
            self.arm(server, &req.image_file_remote_path);
            armed = true;
            #[cfg(feature = "defmt")]
            defmt::info!("fw update: pulling from node {}", server);
        }

        let reply = BeginFirmwareUpdateResponse {
            error: BEGIN_FIRMWARE_UPDATE_ERROR_OK,
        };
        let mut buffer = [0u8; BeginFirmwareUpdateResponse::MAX_SIZE];
        if let Ok(len) = reply.encode(&mut buffer) {
            let _ = bus.respond(
                transfer.source_node_id,
                BEGIN_FIRMWARE_UPDATE,
                transfer.transfer_id,
                transfer.priority,
                &buffer[..len],
            );
        }
        armed
    }

    /// (Re-)issue the read for one slot. Returns false when the
    /// transport refused the request; timing recovers later.
    fn send_read<B, C>(&mut self, bus: &mut B, clock: &C, idx: usize) -> bool
    where
        B: TransferBus,
        C: Clock,
    {
        self.reads[idx].tx_id = self.transfer_id;
        self.reads[idx].have_reply = false;

        let request = FileReadRequest {
            offset: u64::from(self.reads[idx].offset),
            path: self.path,
        };
        let mut buffer = [0u8; FileReadRequest::MAX_SIZE];
        let Ok(len) = request.encode(&mut buffer) else {
            return false;
        };
        if bus
            .request(
                self.server_node_id,
                FILE_READ,
                &mut self.transfer_id,
                TRANSFER_PRIORITY_HIGH,
                &buffer[..len],
            )
            .is_ok()
        {
            self.reads[idx].sent_ms = clock.now_ms();
            return true;
        }
        false
    }

    /// Sweep the pipeline in cyclic order and (re-)issue every slot
    /// that is neither buffered nor still inside its reply window.
    ///
    /// The window `10 + 2·max(250, rtt)` guarantees a ≥510 ms floor
    /// against premature retransmits while tracking servers that take
    /// seconds to answer. A transmit failure ends the sweep for this
    /// tick so the queue can drain first.
    pub fn send_reads<B, C>(&mut self, bus: &mut B, clock: &C)
    where
        B: TransferBus,
        C: Clock,
    {
        let now = clock.now_ms();
        for i in 0..P {
            let idx = (self.idx + i) % P;
            let slot = &self.reads[idx];
            if slot.have_reply {
                continue;
            }
            if slot.sent_ms != 0
                && now.wrapping_sub(slot.sent_ms) < 10 + 2 * self.rtt_ms.max(RTT_WINDOW_FLOOR_MS)
            {
                // Waiting on a response.
                continue;
            }
            if !self.send_read(bus, clock, idx) {
                break;
            }
        }
    }

    /// Handle a file-read response from the update server.
    #[allow(clippy::too_many_arguments)]
    pub fn handle_read_response<B, C, I, F, D, const N: usize>(
        &mut self,
        bus: &mut B,
        clock: &C,
        adapter: &mut IfaceAdapter<I, N>,
        writer: &mut FlashWriter<F>,
        board: &mut D,
        status: &mut StatusReporter,
        transfer: &RxTransfer,
    ) where
        B: TransferBus,
        C: Clock,
        I: CanIface,
        F: Flash,
        D: Board,
    {
        if transfer.source_node_id != self.server_node_id {
            return;
        }

        // Match the response to a sent request.
        let Some(found) = (0..P).find(|&i| self.reads[i].tx_id == transfer.transfer_id) else {
            // Not a current transfer: the server is slower than the
            // reply window, so widen the estimate and drop the data.
            self.rtt_ms = RTT_MAX_MS.min(self.rtt_ms + RTT_LATE_STEP_MS);
            return;
        };
        let Ok(pkt) = FileReadResponse::decode(transfer.payload.as_slice()) else {
            return;
        };
        self.reads[found].pkt = pkt;
        self.reads[found].have_reply = true;

        let sample = clock
            .now_ms()
            .wrapping_sub(self.reads[found].sent_ms)
            .clamp(RTT_MIN_SAMPLE_MS, RTT_MAX_MS);
        self.rtt_ms = (9 * self.rtt_ms + sample) / 10;

        // Commit every in-order slot buffered so far.
        while self.reads[self.idx].have_reply {
            let idx = self.idx;
            if self.reads[idx].offset != writer.offset() {
                // Bad sequence; re-issue this slot and wait.
                self.reads[idx].have_reply = false;
                self.reads[idx].sent_ms = 0;
                break;
            }

            if writer.offset() == 0 {
                writer.unlock();
            }

            let data = self.reads[idx].pkt.data;
            match writer.append(data.as_slice()) {
                Ok(()) => {}
                Err(AppendError::ImageTooBig) => {
                    self.server_node_id = NODE_ID_BROADCAST;
                    let _ = writer.relock();
                    status.set_vendor_status(u16::from(FirmwareCheck::BadLengthApp.code()));
                    #[cfg(feature = "defmt")]
                    defmt::warn!("fw update: image exceeds flash, aborting");
                    break;
                }
                Err(_) => {
                    // Transient device failure: the slot stays buffered
                    // and the next response event retries the commit.
                    break;
                }
            }

            if data.len() < READ_CHUNK {
                // Short chunk: end of file.
                self.server_node_id = NODE_ID_BROADCAST;
                let _ = writer.relock();
                let verdict = board.check_firmware();
                status.set_vendor_status(u16::from(verdict.code()));
                if verdict == FirmwareCheck::Ok {
                    #[cfg(feature = "defmt")]
                    defmt::info!("fw update: image verified, booting");
                    board.jump_to_app();
                }
                return;
            }

            // Rotate the slot to the next stripe and put it back in
            // flight while the reply window of the others still runs.
            self.reads[idx].have_reply = false;
            self.reads[idx].sent_ms = 0;
            self.reads[idx].offset += (P * READ_CHUNK) as u32;
            self.send_read(bus, clock, idx);
            adapter.process_tx(bus);
            self.idx = (idx + 1) % P;
        }

        if self.in_progress() {
            // Kilobytes flashed, as a coarse progress indicator.
            status.set_vendor_status(1 + (writer.offset() / 1024) as u16);
        }
    }
}

impl<const P: usize> Default for FirmwareUpdate<P> {
    fn default() -> Self {
        Self::new()
    }
}
