//! The bootloader node: ties the transfer bus, the hardware
//! interfaces, the flash writer, and the board services together into
//! the single cooperative loop that announces the node, acquires an
//! identity, and services firmware updates.
use crate::infra::rng::Mwc16;
use crate::protocol::managment::handoff::{FilterHandoff, UpdateMarker};
use crate::protocol::managment::node_id_allocation::NodeIdAllocation;
use crate::protocol::messages::{
    GetNodeInfoResponse, HardwareVersion, NameBytes, SoftwareVersion, BEGIN_FIRMWARE_UPDATE,
    DYNAMIC_NODE_ID_ALLOCATION, FILE_READ, GET_NODE_INFO, MODE_MAINTENANCE, MODE_SOFTWARE_UPDATE,
    NAME_CAPACITY, RESTART_NODE, UNIQUE_ID_LEN,
};
use crate::protocol::node::board::{Board, FirmwareCheck};
use crate::protocol::node::status::StatusReporter;
use crate::protocol::transport::adapter::IfaceAdapter;
use crate::protocol::transport::traits::{
    can_iface::CanIface,
    clock::Clock,
    transfer_bus::{AcceptFilter, RxTransfer, TransferBus, TransferKind, NODE_ID_BROADCAST},
};
use crate::protocol::update::flash_writer::{Flash, FlashWriter};
use crate::protocol::update::FirmwareUpdate;

pub mod board;
pub mod status;

/// Bus bitrate used unless a handoff record overrides it.
pub const DEFAULT_BUS_SPEED: u32 = 1_000_000;

/// Cooperative pause per main-loop iteration.
const LOOP_YIELD_US: u32 = 200;

#[derive(Clone, Copy, Debug)]
/// Compile-time identity reported through get-node-info.
pub struct NodeInfoConfig {
    /// Board-identifying name, e.g. `com.example.node`.
    pub name: &'static str,
    /// Board id; high byte and low byte become the hardware version.
    pub board_id: u16,
    pub software_version_major: u8,
    pub software_version_minor: u8,
}

/// Reassembly acceptance rules exported to the transfer library.
///
/// An anonymous node listens to allocation broadcasts only; an
/// identified node serves node info, update commands, restarts, and
/// file-read responses. Everything else is never buffered.
struct Acceptance;

impl AcceptFilter for Acceptance {
    fn should_accept(
        &self,
        local_node_id: u8,
        data_type_id: u16,
        kind: TransferKind,
        _source_node_id: u8,
    ) -> Option<u64> {
        if local_node_id == NODE_ID_BROADCAST {
            return (kind == TransferKind::Broadcast
                && data_type_id == DYNAMIC_NODE_ID_ALLOCATION.id)
                .then_some(DYNAMIC_NODE_ID_ALLOCATION.signature);
        }
        match data_type_id {
            id if id == GET_NODE_INFO.id => Some(GET_NODE_INFO.signature),
            id if id == BEGIN_FIRMWARE_UPDATE.id => Some(BEGIN_FIRMWARE_UPDATE.signature),
            id if id == RESTART_NODE.id => Some(RESTART_NODE.signature),
            id if id == FILE_READ.id => Some(FILE_READ.signature),
            _ => None,
        }
    }
}

/// The bootloader node. `P` is the read-pipeline depth (1 for drivers
/// that gain nothing from pipelining, up to 16); `N` the number of
/// hardware interfaces served.
pub struct BootloaderNode<B, I, F, D, C, const P: usize, const N: usize>
where
    B: TransferBus,
    I: CanIface,
    F: Flash,
    D: Board,
    C: Clock,
{
    bus: B,
    adapter: IfaceAdapter<I, N>,
    writer: FlashWriter<F>,
    board: D,
    clock: C,
    rng: Mwc16,
    unique_id: [u8; UNIQUE_ID_LEN],
    alloc: NodeIdAllocation,
    fw: FirmwareUpdate<P>,
    status: StatusReporter,
    info: NodeInfoConfig,
    bus_speed: u32,
    last_1hz_ms: u32,
    #[cfg(feature = "debug-log")]
    log_transfer_id: u8,
}

impl<B, I, F, D, C, const P: usize, const N: usize> BootloaderNode<B, I, F, D, C, P, N>
where
    B: TransferBus,
    I: CanIface,
    F: Flash,
    D: Board,
    C: Clock,
{
    /// Assemble the node and take the pre-update health reading.
    ///
    /// The vendor status starts as the image checker's verdict so an
    /// operator can see why the bootloader is waiting; a watchdog
    /// reset overrides it.
    pub fn new(bus: B, ifaces: [I; N], flash: F, mut board: D, clock: C, info: NodeInfoConfig) -> Self {
        let mut rng = Mwc16::new();
        let mut unique_id = [0u8; UNIQUE_ID_LEN];
        board.read_unique_id(&mut unique_id);

        let mut status = StatusReporter::new();
        status.set_vendor_status(u16::from(board.check_firmware().code()));
        if board.was_watchdog_reset() {
            status.set_vendor_status(u16::from(FirmwareCheck::Watchdog.code()));
        }

        let alloc = NodeIdAllocation::new(&clock, &mut rng);
        Self {
            bus,
            adapter: IfaceAdapter::new(ifaces),
            writer: FlashWriter::new(flash),
            board,
            clock,
            rng,
            unique_id,
            alloc,
            fw: FirmwareUpdate::new(),
            status,
            info,
            bus_speed: DEFAULT_BUS_SPEED,
            last_1hz_ms: 0,
            #[cfg(feature = "debug-log")]
            log_transfer_id: 0,
        }
    }

    /// Adopt a fixed node id, skipping dynamic allocation.
    pub fn set_node_id(&mut self, node_id: u8) {
        self.bus.set_local_node_id(node_id);
    }

    /// Currently assigned node id, 0 while unallocated.
    pub fn node_id(&self) -> u8 {
        self.bus.local_node_id()
    }

    /// Bitrate the interfaces should run at.
    pub fn bus_speed(&self) -> u32 {
        self.bus_speed
    }

    /// Current vendor status (health code or update progress).
    pub fn vendor_status(&self) -> u16 {
        self.status.vendor_status()
    }

    /// Whether a firmware update is being pulled.
    pub fn update_in_progress(&self) -> bool {
        self.fw.in_progress()
    }

    /// Adopt the application's RAM handoff record: identity and an
    /// immediately-started update.
    pub fn adopt_update_marker(&mut self, marker: &UpdateMarker) {
        self.bus.set_local_node_id(marker.my_node_id);
        self.writer.reset();
        self.fw.start_from_marker(marker);
    }

    /// Adopt the legacy filter-register handoff: identity and bitrate.
    pub fn adopt_filter_handoff(&mut self, handoff: &FilterHandoff) {
        self.bus.set_local_node_id(handoff.node_id);
        self.bus_speed = handoff.bus_speed;
    }

    /// One main-loop iteration: drain TX, dispatch RX, drive the
    /// allocation and status schedules, sweep the read pipeline.
    pub fn poll(&mut self) {
        self.adapter.process_tx(&mut self.bus);
        while let Some(transfer) = self.adapter.poll_rx(&mut self.bus, &self.clock, &Acceptance) {
            self.on_transfer(&transfer);
        }
        self.alloc
            .poll(&mut self.bus, &self.clock, &mut self.rng, &self.unique_id);
        let now = self.clock.now_ms();
        if now.wrapping_sub(self.last_1hz_ms) >= 1000 {
            self.last_1hz_ms = now;
            self.process_1hz();
        }
        if self.fw.in_progress() {
            self.fw.send_reads(&mut self.bus, &self.clock);
        }
    }

    /// Run the cooperative loop until no update is in progress. Called
    /// from the bootloader main; returns once per idle pass so the
    /// caller can time out into the application.
    pub fn run(&mut self) {
        loop {
            self.poll();
            self.clock.delay_us(LOOP_YIELD_US);
            if !self.fw.in_progress() {
                break;
            }
        }
    }

    /// Route one reassembled transfer to its handler.
    fn on_transfer(&mut self, transfer: &RxTransfer) {
        if self.bus.local_node_id() == NODE_ID_BROADCAST {
            if transfer.kind == TransferKind::Broadcast
                && transfer.data_type_id == DYNAMIC_NODE_ID_ALLOCATION.id
            {
                self.alloc.handle_response(
                    &mut self.bus,
                    &self.clock,
                    &mut self.rng,
                    &self.unique_id,
                    transfer,
                );
            }
            return;
        }

        match transfer.data_type_id {
            id if id == GET_NODE_INFO.id => self.handle_get_node_info(transfer),
            id if id == BEGIN_FIRMWARE_UPDATE.id => {
                if self.fw.handle_begin(&mut self.bus, transfer) {
                    // Fresh image: rewind the flash cursors.
                    self.writer.reset();
                    #[cfg(feature = "debug-log")]
                    self.debug_log(format_args!("fw update start"));
                }
            }
            id if id == FILE_READ.id => self.fw.handle_read_response(
                &mut self.bus,
                &self.clock,
                &mut self.adapter,
                &mut self.writer,
                &mut self.board,
                &mut self.status,
                transfer,
            ),
            id if id == RESTART_NODE.id => self.board.system_reset(),
            _ => {}
        }
    }

    fn handle_get_node_info(&mut self, transfer: &RxTransfer) {
        let name_bytes = self.info.name.as_bytes();
        let name_len = name_bytes.len().min(NAME_CAPACITY);
        let response = GetNodeInfoResponse {
            status: self.status.snapshot(&self.clock),
            software_version: SoftwareVersion {
                major: self.info.software_version_major,
                minor: self.info.software_version_minor,
                optional_field_flags: 0,
                vcs_commit: 0,
                image_crc: 0,
            },
            hardware_version: HardwareVersion {
                major: (self.info.board_id >> 8) as u8,
                minor: (self.info.board_id & 0xFF) as u8,
                unique_id: self.unique_id,
            },
            name: NameBytes::from_slice(&name_bytes[..name_len]).unwrap_or_default(),
        };
        let mut buffer = [0u8; GetNodeInfoResponse::MAX_SIZE];
        if let Ok(len) = response.encode(&mut buffer) {
            let _ = self.bus.respond(
                transfer.source_node_id,
                GET_NODE_INFO,
                transfer.transfer_id,
                transfer.priority,
                &buffer[..len],
            );
        }
    }

    /// Once per second: age out stalled reassembly, refresh and send
    /// the status broadcast once the node has an identity.
    fn process_1hz(&mut self) {
        self.bus.cleanup_stale_transfers(self.clock.now_us());
        if self.bus.local_node_id() != NODE_ID_BROADCAST {
            self.status.set_mode(if self.fw.in_progress() {
                MODE_SOFTWARE_UPDATE
            } else {
                MODE_MAINTENANCE
            });
            self.status.broadcast(&mut self.bus, &self.clock);
        }
    }

    /// Broadcast a diagnostic line over the bus log channel.
    #[cfg(feature = "debug-log")]
    pub fn debug_log(&mut self, args: core::fmt::Arguments) {
        use crate::protocol::messages::{
            LogMessage, DEBUG_LOG_MESSAGE, LOG_LEVEL_DEBUG, LOG_TEXT_CAPACITY,
        };
        use crate::protocol::transport::TRANSFER_PRIORITY_LOW;

        struct TextWriter {
            buf: [u8; LOG_TEXT_CAPACITY],
            len: usize,
        }
        impl core::fmt::Write for TextWriter {
            fn write_str(&mut self, s: &str) -> core::fmt::Result {
                // Truncation is acceptable for diagnostics.
                let room = LOG_TEXT_CAPACITY - self.len;
                let take = room.min(s.len());
                self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
                self.len += take;
                Ok(())
            }
        }

        let mut text = TextWriter {
            buf: [0; LOG_TEXT_CAPACITY],
            len: 0,
        };
        let _ = core::fmt::write(&mut text, args);
        let message = LogMessage {
            level: LOG_LEVEL_DEBUG,
            source: Default::default(),
            text: crate::infra::bytes::Bytes::from_slice(&text.buf[..text.len])
                .unwrap_or_default(),
        };
        let mut buffer = [0u8; LogMessage::MAX_SIZE];
        if let Ok(len) = message.encode(&mut buffer) {
            let _ = self.bus.broadcast(
                DEBUG_LOG_MESSAGE,
                &mut self.log_transfer_id,
                TRANSFER_PRIORITY_LOW,
                &buffer[..len],
            );
        }
    }
}
