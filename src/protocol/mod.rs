//! High-level components of the bootloader protocol: network identity
//! management, message structures, CAN transport plumbing, and the
//! pipelined firmware-update engine.
pub mod managment;
pub mod messages;
pub mod node;
pub mod transport;
pub mod update;
