//! `canboot` library: the CAN firmware-update core of an embedded
//! flight-controller bootloader in a `no_std` environment. The crate
//! exposes the infrastructure modules (bounded buffers, timing jitter),
//! the protocol logic (dynamic node-ID allocation, message codecs,
//! transport plumbing), and the pipelined firmware-update engine.
#![no_std]
//==================================================================================
/// Domain and low-level errors (message encoding/decoding, flash
/// append outcomes, and related issues).
pub mod error;
/// Low-level building blocks shared across the crate.
pub mod infra;
/// Bootloader protocol implementation: messages, identity management,
/// CAN transport, and the firmware-update engine.
pub mod protocol;
//==================================================================================
