//! Shared mock collaborators for the end-to-end scenarios: a
//! transfer-level bus double, a pending-frame CAN interface, a
//! manually-advanced clock, an in-memory flash, and a scripted board.
#![allow(dead_code)]

use canboot::protocol::messages::{
    BeginFirmwareUpdateRequest, FileReadResponse, PathBytes, BEGIN_FIRMWARE_UPDATE,
    DYNAMIC_NODE_ID_ALLOCATION, FILE_READ, GET_NODE_INFO, RESTART_NODE,
};
use canboot::protocol::node::board::{Board, FirmwareCheck};
use canboot::protocol::node::{BootloaderNode, NodeInfoConfig};
use canboot::protocol::transport::can_frame::CanFrame;
use canboot::protocol::transport::traits::can_iface::CanIface;
use canboot::protocol::transport::traits::clock::Clock;
use canboot::protocol::transport::traits::transfer_bus::{
    AcceptFilter, DataType, RxTransfer, TransferBus, TransferBytes, TransferKind,
};
use canboot::protocol::transport::{TRANSFER_PRIORITY_HIGH, TRANSFER_PRIORITY_LOW};
use canboot::protocol::update::flash_writer::Flash;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

pub const DUMMY_FRAME: CanFrame = CanFrame {
    id: 0,
    data: [0; 8],
    len: 0,
};

pub const INFO: NodeInfoConfig = NodeInfoConfig {
    name: "com.acme.servo",
    board_id: 0x1234,
    software_version_major: 2,
    software_version_minor: 0,
};

//==================================================================================BUS

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutTransfer {
    pub kind: TransferKind,
    pub destination: u8,
    pub data_type_id: u16,
    pub transfer_id: u8,
    pub priority: u8,
    pub payload: Vec<u8>,
}

#[derive(Default)]
pub struct BusState {
    pub node_id: u8,
    pub outgoing: Vec<OutTransfer>,
    pub inbound: VecDeque<RxTransfer>,
    pub rejected: usize,
    pub cleanups: usize,
    pub refuse_requests: bool,
}

/// Transfer-level double of the framing library, shared between the
/// node (owner) and the test (observer) through `Rc`.
#[derive(Clone, Default)]
pub struct SharedBus(pub Rc<RefCell<BusState>>);

impl SharedBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_transfer(&self, transfer: RxTransfer) {
        self.0.borrow_mut().inbound.push_back(transfer);
    }

    pub fn take_outgoing(&self) -> Vec<OutTransfer> {
        std::mem::take(&mut self.0.borrow_mut().outgoing)
    }

    pub fn outgoing_len(&self) -> usize {
        self.0.borrow().outgoing.len()
    }

    pub fn rejected(&self) -> usize {
        self.0.borrow().rejected
    }

    pub fn cleanups(&self) -> usize {
        self.0.borrow().cleanups
    }

    pub fn set_refuse_requests(&self, refuse: bool) {
        self.0.borrow_mut().refuse_requests = refuse;
    }

    fn record(
        &mut self,
        kind: TransferKind,
        destination: u8,
        data_type: DataType,
        transfer_id: u8,
        priority: u8,
        payload: &[u8],
    ) {
        self.0.borrow_mut().outgoing.push(OutTransfer {
            kind,
            destination,
            data_type_id: data_type.id,
            transfer_id,
            priority,
            payload: payload.to_vec(),
        });
    }
}

impl TransferBus for SharedBus {
    type Error = ();

    fn local_node_id(&self) -> u8 {
        self.0.borrow().node_id
    }

    fn set_local_node_id(&mut self, node_id: u8) {
        self.0.borrow_mut().node_id = node_id;
    }

    fn broadcast(
        &mut self,
        data_type: DataType,
        transfer_id: &mut u8,
        priority: u8,
        payload: &[u8],
    ) -> Result<(), ()> {
        let used = *transfer_id;
        *transfer_id = (*transfer_id + 1) & 0x1F;
        self.record(TransferKind::Broadcast, 0, data_type, used, priority, payload);
        Ok(())
    }

    fn request(
        &mut self,
        destination: u8,
        data_type: DataType,
        transfer_id: &mut u8,
        priority: u8,
        payload: &[u8],
    ) -> Result<(), ()> {
        if self.0.borrow().refuse_requests {
            return Err(());
        }
        let used = *transfer_id;
        *transfer_id = (*transfer_id + 1) & 0x1F;
        self.record(
            TransferKind::Request,
            destination,
            data_type,
            used,
            priority,
            payload,
        );
        Ok(())
    }

    fn respond(
        &mut self,
        destination: u8,
        data_type: DataType,
        transfer_id: u8,
        priority: u8,
        payload: &[u8],
    ) -> Result<(), ()> {
        self.record(
            TransferKind::Response,
            destination,
            data_type,
            transfer_id,
            priority,
            payload,
        );
        Ok(())
    }

    fn peek_tx(&mut self) -> Option<CanFrame> {
        // Frame-level TX is exercised by the adapter unit tests.
        None
    }

    fn pop_tx(&mut self) {}

    fn handle_rx_frame<A: AcceptFilter>(
        &mut self,
        _frame: &CanFrame,
        _timestamp_us: u64,
        filter: &A,
    ) -> Option<RxTransfer> {
        let transfer = self.0.borrow_mut().inbound.pop_front()?;
        let local = self.local_node_id();
        if filter
            .should_accept(
                local,
                transfer.data_type_id,
                transfer.kind,
                transfer.source_node_id,
            )
            .is_some()
        {
            Some(transfer)
        } else {
            self.0.borrow_mut().rejected += 1;
            None
        }
    }

    fn cleanup_stale_transfers(&mut self, _now_us: u64) {
        self.0.borrow_mut().cleanups += 1;
    }
}

/// Interface double: surfaces one dummy frame per queued transfer so
/// the adapter's RX drain pulls them through the bus double.
pub struct PendingIface(pub SharedBus);

impl CanIface for PendingIface {
    type Error = ();

    fn transmit(&mut self, _frame: &CanFrame) -> nb::Result<(), ()> {
        Ok(())
    }

    fn receive(&mut self) -> nb::Result<CanFrame, ()> {
        if self.0 .0.borrow().inbound.is_empty() {
            Err(nb::Error::WouldBlock)
        } else {
            Ok(DUMMY_FRAME)
        }
    }
}

//==================================================================================CLOCK

/// Manually advanced microsecond clock.
#[derive(Clone, Default)]
pub struct TestClock(pub Rc<Cell<u64>>);

impl TestClock {
    pub fn advance_ms(&self, ms: u32) {
        self.0.set(self.0.get() + u64::from(ms) * 1000);
    }

    pub fn advance_us(&self, us: u32) {
        self.0.set(self.0.get() + u64::from(us));
    }
}

impl Clock for TestClock {
    fn now_ms(&self) -> u32 {
        (self.0.get() / 1000) as u32
    }

    fn now_us(&self) -> u64 {
        self.0.get()
    }

    fn delay_us(&mut self, us: u32) {
        self.advance_us(us);
    }
}

//==================================================================================FLASH

pub struct FlashState {
    pub sector_size: u32,
    pub sectors: usize,
    pub erased: Vec<bool>,
    pub erase_count: usize,
    pub data: Vec<u8>,
    /// Per-byte write counters, for exactly-once assertions.
    pub write_counts: Vec<u32>,
    pub fail_writes: usize,
    pub flushes: usize,
    pub keep_unlocked: bool,
    pub wrote_unerased: bool,
}

#[derive(Clone)]
pub struct SharedFlash(pub Rc<RefCell<FlashState>>);

impl SharedFlash {
    pub fn new(sector_size: u32, sectors: usize) -> Self {
        let capacity = sector_size as usize * sectors;
        Self(Rc::new(RefCell::new(FlashState {
            sector_size,
            sectors,
            erased: vec![false; sectors],
            erase_count: 0,
            data: vec![0; capacity],
            write_counts: vec![0; capacity],
            fail_writes: 0,
            flushes: 0,
            keep_unlocked: false,
            wrote_unerased: false,
        })))
    }
}

impl Flash for SharedFlash {
    type Error = ();

    fn sector_size(&self, sector: u16) -> u32 {
        let state = self.0.borrow();
        if usize::from(sector) < state.sectors {
            state.sector_size
        } else {
            0
        }
    }

    fn is_erased(&self, sector: u16) -> bool {
        self.0.borrow().erased[usize::from(sector)]
    }

    fn erase_sector(&mut self, sector: u16) -> Result<(), ()> {
        let mut state = self.0.borrow_mut();
        state.erased[usize::from(sector)] = true;
        state.erase_count += 1;
        Ok(())
    }

    fn write_words(&mut self, offset: u32, words: &[u32]) -> Result<(), ()> {
        let mut state = self.0.borrow_mut();
        if state.fail_writes > 0 {
            state.fail_writes -= 1;
            return Err(());
        }
        if !words.is_empty() {
            let first = offset / state.sector_size;
            let last = (offset + words.len() as u32 * 4 - 1) / state.sector_size;
            for sector in first..=last {
                if !state.erased[sector as usize] {
                    state.wrote_unerased = true;
                }
            }
        }
        for (i, word) in words.iter().enumerate() {
            let at = offset as usize + i * 4;
            state.data[at..at + 4].copy_from_slice(&word.to_le_bytes());
            for counter in &mut state.write_counts[at..at + 4] {
                *counter += 1;
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ()> {
        self.0.borrow_mut().flushes += 1;
        Ok(())
    }

    fn set_keep_unlocked(&mut self, keep: bool) {
        self.0.borrow_mut().keep_unlocked = keep;
    }
}

//==================================================================================BOARD

pub struct BoardState {
    pub unique_id: [u8; 16],
    pub watchdog_reset: bool,
    pub check_result: FirmwareCheck,
    pub checks: usize,
}

#[derive(Clone)]
pub struct SharedBoard(pub Rc<RefCell<BoardState>>);

impl SharedBoard {
    pub fn healthy() -> Self {
        Self(Rc::new(RefCell::new(BoardState {
            unique_id: *b"\x11\x22\x33\x44\x55\x66\x77\x88\x99\xAA\xBB\xCC\xDD\xEE\xFF\x10",
            watchdog_reset: false,
            check_result: FirmwareCheck::Ok,
            checks: 0,
        })))
    }

    pub fn set_check_result(&self, result: FirmwareCheck) {
        self.0.borrow_mut().check_result = result;
    }
}

impl Board for SharedBoard {
    fn read_unique_id(&self, out: &mut [u8; 16]) {
        *out = self.0.borrow().unique_id;
    }

    fn check_firmware(&mut self) -> FirmwareCheck {
        let mut state = self.0.borrow_mut();
        state.checks += 1;
        state.check_result
    }

    fn was_watchdog_reset(&self) -> bool {
        self.0.borrow().watchdog_reset
    }

    fn jump_to_app(&mut self) -> ! {
        panic!("jump_to_app");
    }

    fn system_reset(&mut self) -> ! {
        panic!("system_reset");
    }
}

//==================================================================================HARNESS

pub type TestNode<const P: usize> =
    BootloaderNode<SharedBus, PendingIface, SharedFlash, SharedBoard, TestClock, P, 1>;

pub struct Harness<const P: usize> {
    pub node: TestNode<P>,
    pub bus: SharedBus,
    pub clock: TestClock,
    pub flash: SharedFlash,
    pub board: SharedBoard,
}

pub fn harness<const P: usize>(sector_size: u32, sectors: usize) -> Harness<P> {
    let bus = SharedBus::new();
    let clock = TestClock::default();
    // Hardware bring-up takes a moment; a zero send timestamp would
    // read as "never sent".
    clock.advance_ms(5);
    let flash = SharedFlash::new(sector_size, sectors);
    let board = SharedBoard::healthy();
    let node = BootloaderNode::new(
        bus.clone(),
        [PendingIface(bus.clone())],
        flash.clone(),
        board.clone(),
        clock.clone(),
        INFO,
    );
    Harness {
        node,
        bus,
        clock,
        flash,
        board,
    }
}

//==================================================================================TRANSFERS

pub fn begin_update_transfer(source: u8, server_field: u8, path: &[u8]) -> RxTransfer {
    let request = BeginFirmwareUpdateRequest {
        source_node_id: server_field,
        image_file_remote_path: PathBytes::from_slice(path).unwrap(),
    };
    let mut buf = [0u8; BeginFirmwareUpdateRequest::MAX_SIZE];
    let len = request.encode(&mut buf).unwrap();
    RxTransfer {
        kind: TransferKind::Request,
        data_type_id: BEGIN_FIRMWARE_UPDATE.id,
        source_node_id: source,
        transfer_id: 7,
        priority: TRANSFER_PRIORITY_LOW,
        payload: TransferBytes::from_slice(&buf[..len]).unwrap(),
    }
}

pub fn read_response_transfer(server: u8, transfer_id: u8, data: &[u8]) -> RxTransfer {
    let response = FileReadResponse {
        error: 0,
        data: canboot::protocol::messages::ChunkBytes::from_slice(data).unwrap(),
    };
    let mut buf = [0u8; FileReadResponse::MAX_SIZE];
    let len = response.encode(&mut buf).unwrap();
    RxTransfer {
        kind: TransferKind::Response,
        data_type_id: FILE_READ.id,
        source_node_id: server,
        transfer_id,
        priority: TRANSFER_PRIORITY_HIGH,
        payload: TransferBytes::from_slice(&buf[..len]).unwrap(),
    }
}

pub fn get_node_info_request(source: u8) -> RxTransfer {
    RxTransfer {
        kind: TransferKind::Request,
        data_type_id: GET_NODE_INFO.id,
        source_node_id: source,
        transfer_id: 3,
        priority: TRANSFER_PRIORITY_LOW,
        payload: TransferBytes::new(),
    }
}

pub fn restart_transfer(source: u8) -> RxTransfer {
    RxTransfer {
        kind: TransferKind::Request,
        data_type_id: RESTART_NODE.id,
        source_node_id: source,
        transfer_id: 1,
        priority: TRANSFER_PRIORITY_LOW,
        payload: TransferBytes::new(),
    }
}

pub fn allocation_broadcast(source: u8, node_id: u8, prefix: &[u8]) -> RxTransfer {
    let msg = canboot::protocol::messages::AllocationMessage {
        node_id,
        first_part_of_unique_id: false,
        unique_id: canboot::protocol::messages::UniqueIdBytes::from_slice(prefix).unwrap(),
    };
    let mut buf = [0u8; canboot::protocol::messages::AllocationMessage::MAX_SIZE];
    let len = msg.encode(&mut buf).unwrap();
    RxTransfer {
        kind: TransferKind::Broadcast,
        data_type_id: DYNAMIC_NODE_ID_ALLOCATION.id,
        source_node_id: source,
        transfer_id: 0,
        priority: TRANSFER_PRIORITY_LOW,
        payload: TransferBytes::from_slice(&buf[..len]).unwrap(),
    }
}

/// Decode the offset of an outgoing file-read request.
pub fn request_offset(out: &OutTransfer) -> u32 {
    let request = canboot::protocol::messages::FileReadRequest::decode(&out.payload).unwrap();
    request.offset as u32
}

/// File-read requests among `outgoing`, in emission order.
pub fn read_requests(outgoing: &[OutTransfer]) -> Vec<OutTransfer> {
    outgoing
        .iter()
        .filter(|t| t.kind == TransferKind::Request && t.data_type_id == FILE_READ.id)
        .cloned()
        .collect()
}
