//! Trait seams towards the external collaborators: the hardware CAN
//! interfaces, the monotonic clock, and the multi-frame transfer
//! library that turns frames into whole messages and back.
pub mod can_iface;
pub mod clock;
pub mod transfer_bus;
