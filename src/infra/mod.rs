//! Low-level building blocks shared by the protocol modules: bounded
//! byte buffers and the timing-jitter pseudo-random generator.
pub mod bytes;
pub mod rng;
