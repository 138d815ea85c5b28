//! Time source abstraction.
//!
//! Everything that waits (the primitive executor, the control loop) asks a
//! [`Clock`] instead of calling `std::thread::sleep` directly, so tests can
//! substitute [`ManualClock`][crate::sim::ManualClock] and run without real
//! delays.

use std::time::{Duration, Instant};

/// Monotonic time source with a blocking sleep.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation backed by [`Instant`] and `thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}
