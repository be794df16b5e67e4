//! Node-status bookkeeping and the periodic liveness broadcast.
use crate::protocol::messages::{NodeStatus, HEALTH_OK, MODE_MAINTENANCE, NODE_STATUS};
use crate::protocol::transport::traits::{clock::Clock, transfer_bus::TransferBus};
use crate::protocol::transport::TRANSFER_PRIORITY_LOW;

/// Live status record: mode plus the vendor status byte that doubles
/// as pre-update health code and update progress indicator.
pub struct StatusReporter {
    mode: u8,
    vendor_status: u16,
    transfer_id: u8,
}

impl StatusReporter {
    pub const fn new() -> Self {
        Self {
            mode: MODE_MAINTENANCE,
            vendor_status: 0,
            transfer_id: 0,
        }
    }

    #[inline]
    pub fn mode(&self) -> u8 {
        self.mode
    }

    #[inline]
    pub fn set_mode(&mut self, mode: u8) {
        self.mode = mode;
    }

    #[inline]
    pub fn vendor_status(&self) -> u16 {
        self.vendor_status
    }

    #[inline]
    pub fn set_vendor_status(&mut self, code: u16) {
        self.vendor_status = code;
    }

    /// Wire record with a fresh uptime reading.
    pub fn snapshot<C: Clock>(&self, clock: &C) -> NodeStatus {
        NodeStatus {
            uptime_sec: clock.now_ms() / 1000,
            health: HEALTH_OK,
            mode: self.mode,
            sub_mode: 0,
            vendor_specific_status_code: self.vendor_status,
        }
    }

    /// Broadcast the current status.
    pub fn broadcast<B, C>(&mut self, bus: &mut B, clock: &C)
    where
        B: TransferBus,
        C: Clock,
    {
        let status = self.snapshot(clock);
        let mut buffer = [0u8; NodeStatus::WIRE_SIZE];
        if let Ok(len) = status.encode(&mut buffer) {
            let _ = bus.broadcast(
                NODE_STATUS,
                &mut self.transfer_id,
                TRANSFER_PRIORITY_LOW,
                &buffer[..len],
            );
        }
    }
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}
