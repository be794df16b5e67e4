//! Minimal abstraction for a non-blocking CAN interface. Allows the
//! bootloader to plug into various drivers (a peripheral driven
//! directly, or logical interfaces behind a HAL).
use crate::protocol::transport::can_frame::CanFrame;

/// Contract to send and receive CAN frames without blocking.
pub trait CanIface {
    type Error: core::fmt::Debug;
    /// Queue a frame for transmission. `nb::Error::WouldBlock` when no
    /// mailbox is free; the caller retries on a later pass.
    fn transmit(&mut self, frame: &CanFrame) -> nb::Result<(), Self::Error>;
    /// Fetch the next received frame. `nb::Error::WouldBlock` when the
    /// receive queue is empty.
    fn receive(&mut self) -> nb::Result<CanFrame, Self::Error>;
}
