//! Dynamic node-ID allocation: acquire an addressable identity from an
//! allocator server by progressive matching on the 16-byte unique id,
//! with randomized request timing to avoid colliding with other
//! unallocated nodes.
use crate::infra::rng::Mwc16;
use crate::protocol::messages::{
    AllocationMessage, ALLOCATION_MAX_FOLLOWUP_DELAY_MS, ALLOCATION_MIN_REQUEST_PERIOD_MS,
    DYNAMIC_NODE_ID_ALLOCATION, UNIQUE_ID_BYTES_PER_REQUEST, UNIQUE_ID_LEN,
};
use crate::protocol::transport::traits::{
    clock::Clock,
    transfer_bus::{RxTransfer, TransferBus, NODE_ID_BROADCAST},
};
use crate::protocol::transport::TRANSFER_PRIORITY_LOW;

/// Allocation exchange state. Lives from boot until the bus commits a
/// node id, after which both entry points become no-ops.
pub struct NodeIdAllocation {
    /// Bytes of the local unique id already confirmed by the allocator.
    unique_id_offset: u8,
    next_request_at_ms: u32,
    transfer_id: u8,
}

impl NodeIdAllocation {
    /// Fresh state with the first request scheduled from `clock`.
    pub fn new<C: Clock>(clock: &C, rng: &mut Mwc16) -> Self {
        Self {
            unique_id_offset: 0,
            next_request_at_ms: Self::next_deadline(clock, rng),
            transfer_id: 0,
        }
    }

    fn next_deadline<C: Clock>(clock: &C, rng: &mut Mwc16) -> u32 {
        clock.now_ms()
            + ALLOCATION_MIN_REQUEST_PERIOD_MS
            + rng.rand_range(ALLOCATION_MAX_FOLLOWUP_DELAY_MS)
    }

    /// Bytes of unique id the allocator has confirmed so far.
    pub fn unique_id_offset(&self) -> u8 {
        self.unique_id_offset
    }

    /// Broadcast the next allocation request when it is due.
    ///
    /// The request carries byte 0 = `(0 << 1) | first_part_flag` and up
    /// to six unique-id bytes starting at the confirmed offset. The
    /// offset resets after sending; only an allocator response within
    /// the round restores it.
    pub fn poll<B, C>(&mut self, bus: &mut B, clock: &C, rng: &mut Mwc16, unique_id: &[u8; UNIQUE_ID_LEN])
    where
        B: TransferBus,
        C: Clock,
    {
        if bus.local_node_id() != NODE_ID_BROADCAST {
            return;
        }
        if clock.now_ms() < self.next_request_at_ms {
            return;
        }
        self.next_request_at_ms = Self::next_deadline(clock, rng);

        let offset = usize::from(self.unique_id_offset);
        let take = (UNIQUE_ID_LEN - offset).min(UNIQUE_ID_BYTES_PER_REQUEST);
        let mut request = [0u8; 1 + UNIQUE_ID_BYTES_PER_REQUEST];
        request[0] = NODE_ID_BROADCAST << 1;
        if self.unique_id_offset == 0 {
            request[0] |= 1;
        }
        request[1..1 + take].copy_from_slice(&unique_id[offset..offset + take]);

        let _ = bus.broadcast(
            DYNAMIC_NODE_ID_ALLOCATION,
            &mut self.transfer_id,
            TRANSFER_PRIORITY_LOW,
            &request[..1 + take],
        );

        // Pessimistic reset; an allocator response updates it back.
        self.unique_id_offset = 0;
    }

    /// Apply an allocation broadcast observed while unallocated.
    pub fn handle_response<B, C>(
        &mut self,
        bus: &mut B,
        clock: &C,
        rng: &mut Mwc16,
        unique_id: &[u8; UNIQUE_ID_LEN],
        transfer: &RxTransfer,
    ) where
        B: TransferBus,
        C: Clock,
    {
        // Any allocation activity on the bus postpones our next round.
        self.next_request_at_ms = Self::next_deadline(clock, rng);

        if transfer.source_node_id == NODE_ID_BROADCAST {
            // Another requester, not the allocator.
            self.unique_id_offset = 0;
            return;
        }

        let Ok(msg) = AllocationMessage::decode(transfer.payload.as_slice()) else {
            return;
        };

        if msg.unique_id.as_slice() != &unique_id[..msg.unique_id.len()] {
            // Allocator is talking to somebody else.
            self.unique_id_offset = 0;
            return;
        }

        if msg.unique_id.len() < UNIQUE_ID_LEN {
            // Prefix confirmed; accelerate the follow-up round.
            self.unique_id_offset = msg.unique_id.len() as u8;
            self.next_request_at_ms -= ALLOCATION_MIN_REQUEST_PERIOD_MS;
            #[cfg(feature = "defmt")]
            defmt::info!("allocation: {} unique id bytes confirmed", self.unique_id_offset);
        } else if !msg.is_pending() {
            // Full match carrying an id: allocation complete.
            bus.set_local_node_id(msg.node_id);
            #[cfg(feature = "defmt")]
            defmt::info!("allocation: node id {} assigned", msg.node_id);
        }
    }
}
