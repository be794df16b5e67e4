//! Monotonic timebase abstraction providing the timing primitives
//! required by the allocation, retransmission, and status logic.

/// Wall-clock readings plus the cooperative pause of the main loop.
pub trait Clock {
    /// Milliseconds since boot. Wraps after ~49 days, far beyond any
    /// bootloader session.
    fn now_ms(&self) -> u32;
    /// Microseconds since boot.
    fn now_us(&self) -> u64;
    /// Busy-wait or sleep for `us` microseconds, yielding the CPU to
    /// low-level housekeeping where the platform allows it.
    fn delay_us(&mut self, us: u32);
}
