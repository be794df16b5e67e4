//! Network identity management: dynamic node-ID allocation against a
//! bus allocator, and the pre-boot handoff records by which an
//! application hands an identity (and an update order) to the
//! bootloader across a reset.
pub mod handoff;
pub mod node_id_allocation;
