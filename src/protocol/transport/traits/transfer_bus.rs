//! Narrow interface to the multi-frame transfer library. The library
//! owns the local node id, the outgoing frame queue, and the fixed
//! memory pool backing reassembly; the bootloader core drives it
//! exclusively through this trait.
use crate::infra::bytes::Bytes;
use crate::protocol::transport::can_frame::CanFrame;

/// Largest reassembled payload the bootloader accepts (a file-read
/// response plus framing slack).
pub const MAX_TRANSFER_PAYLOAD: usize = 300;

/// Payload buffer of a reassembled transfer.
pub type TransferBytes = Bytes<MAX_TRANSFER_PAYLOAD>;

/// The "unassigned" node id, doubling as the broadcast destination.
pub const NODE_ID_BROADCAST: u8 = 0;

/// Wire width of a transfer id; outgoing counters wrap at this many
/// bits, so at most 16 requests may be outstanding towards one server.
pub const TRANSFER_ID_BITS: u8 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Role of a transfer on the bus.
pub enum TransferKind {
    Broadcast,
    Request,
    Response,
}

#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// A fully reassembled incoming transfer.
pub struct RxTransfer {
    pub kind: TransferKind,
    /// Schema identifier of the carried message.
    pub data_type_id: u16,
    /// Sender, `NODE_ID_BROADCAST` for anonymous frames.
    pub source_node_id: u8,
    /// Wire transfer id (truncated to [`TRANSFER_ID_BITS`]).
    pub transfer_id: u8,
    pub priority: u8,
    pub payload: TransferBytes,
}

/// Static description of a transfer data type: numeric id plus the
/// 64-bit schema signature that must accompany every transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataType {
    pub id: u16,
    pub signature: u64,
}

/// Reassembly-time acceptance hook exported to the transfer library.
///
/// Called when the first frame of a transfer is seen so the library can
/// decide whether to allocate a buffer for it. Returning the data-type
/// signature accepts the transfer; `None` ignores it.
pub trait AcceptFilter {
    fn should_accept(
        &self,
        local_node_id: u8,
        data_type_id: u16,
        kind: TransferKind,
        source_node_id: u8,
    ) -> Option<u64>;
}

/// Contract implemented by the transfer library.
///
/// `broadcast` and `request` increment `transfer_id` (modulo the
/// [`TRANSFER_ID_BITS`] wire width) once the transfer is queued;
/// `respond` echoes the id of the request being answered.
pub trait TransferBus {
    type Error: core::fmt::Debug;

    /// Currently assigned node id, `NODE_ID_BROADCAST` until allocated.
    fn local_node_id(&self) -> u8;
    /// Commit an allocated node id. Terminal: assigned once per boot.
    fn set_local_node_id(&mut self, node_id: u8);

    /// Queue a broadcast transfer.
    fn broadcast(
        &mut self,
        data_type: DataType,
        transfer_id: &mut u8,
        priority: u8,
        payload: &[u8],
    ) -> Result<(), Self::Error>;

    /// Queue a service request towards `destination`.
    fn request(
        &mut self,
        destination: u8,
        data_type: DataType,
        transfer_id: &mut u8,
        priority: u8,
        payload: &[u8],
    ) -> Result<(), Self::Error>;

    /// Queue a service response towards `destination`.
    fn respond(
        &mut self,
        destination: u8,
        data_type: DataType,
        transfer_id: u8,
        priority: u8,
        payload: &[u8],
    ) -> Result<(), Self::Error>;

    /// Head of the outgoing frame queue, if any.
    fn peek_tx(&mut self) -> Option<CanFrame>;
    /// Drop the head of the outgoing frame queue.
    fn pop_tx(&mut self);

    /// Feed one received frame into reassembly. Returns a transfer when
    /// `frame` completed one that passed `filter`.
    fn handle_rx_frame<A: AcceptFilter>(
        &mut self,
        frame: &CanFrame,
        timestamp_us: u64,
        filter: &A,
    ) -> Option<RxTransfer>;

    /// Drop reassembly sessions that stalled before `now_us`.
    fn cleanup_stale_transfers(&mut self, now_us: u64);
}
