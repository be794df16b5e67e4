//! Bridges the hardware CAN interfaces and the transfer library's
//! frame queues. Outbound frames go to every interface; inbound frames
//! from any interface are merged, timestamped, and fed to reassembly.
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::traits::{
    can_iface::CanIface,
    clock::Clock,
    transfer_bus::{AcceptFilter, RxTransfer, TransferBus},
};

/// Consecutive send failures tolerated on one frame before it is
/// dropped to keep the transfer pool from filling up.
pub const TX_FAIL_DROP_LIMIT: u8 = 8;

/// Frame-level glue between `N` interfaces and the transfer library.
pub struct IfaceAdapter<I: CanIface, const N: usize> {
    ifaces: [I; N],
    fail_count: u8,
}

impl<I: CanIface, const N: usize> IfaceAdapter<I, N> {
    pub fn new(ifaces: [I; N]) -> Self {
        Self {
            ifaces,
            fail_count: 0,
        }
    }

    /// Drain the outgoing frame queue.
    ///
    /// The head frame is offered to every interface; one acceptance is
    /// enough to pop it. A failing head stops the drain for this pass
    /// and, once [`TX_FAIL_DROP_LIMIT`] consecutive passes have failed,
    /// is discarded anyway.
    pub fn process_tx<B: TransferBus>(&mut self, bus: &mut B) {
        while let Some(frame) = bus.peek_tx() {
            let mut sent = false;
            for iface in self.ifaces.iter_mut() {
                sent |= iface.transmit(&frame).is_ok();
            }
            if sent {
                bus.pop_tx();
                self.fail_count = 0;
            } else {
                if self.fail_count < TX_FAIL_DROP_LIMIT {
                    self.fail_count += 1;
                } else {
                    bus.pop_tx();
                }
                return;
            }
        }
    }

    /// Pull frames from every interface into reassembly until a
    /// transfer completes or no interface has anything left.
    ///
    /// Each frame is stamped with the current microsecond clock. Frames
    /// still queued when a transfer completes are picked up by the next
    /// call, preserving arrival order across handler invocations.
    pub fn poll_rx<B, C, A>(&mut self, bus: &mut B, clock: &C, filter: &A) -> Option<RxTransfer>
    where
        B: TransferBus,
        C: Clock,
        A: AcceptFilter,
    {
        loop {
            let mut got_frame = false;
            for iface in self.ifaces.iter_mut() {
                let frame: CanFrame = match iface.receive() {
                    Ok(frame) => frame,
                    Err(_) => continue,
                };
                got_frame = true;
                let timestamp_us = clock.now_us();
                if let Some(transfer) = bus.handle_rx_frame(&frame, timestamp_us, filter) {
                    return Some(transfer);
                }
            }
            if !got_frame {
                return None;
            }
        }
    }
}
