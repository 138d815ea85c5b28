//! In-process simulation doubles for CI/CD testing without a robot.
//!
//! - [`RecordingSink`] – a [`VelocitySink`] that records every [`Twist`] it
//!   receives and can be told to fail on demand.
//! - [`ManualClock`] – a [`Clock`] whose `sleep` advances virtual time
//!   instantly, so a 200 ms primitive runs in microseconds.
//!
//! Both are cheap to clone and every clone shares the same state, so a test
//! can hand one clone to the executor and keep another to assert on.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use sumo_hal::clock::Clock;
//! use sumo_hal::sim::ManualClock;
//!
//! let clock = ManualClock::new();
//! let start = clock.now();
//! clock.sleep(Duration::from_millis(25));
//! assert_eq!(clock.now() - start, Duration::from_millis(25));
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use sumo_types::{SumoError, Twist};

use crate::clock::Clock;
use crate::sink::VelocitySink;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ────────────────────────────────────────────────────────────────────────────
// Recording sink
// ────────────────────────────────────────────────────────────────────────────

/// Which sends a [`RecordingSink`] should reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultMode {
    /// Accept everything.
    #[default]
    Healthy,
    /// Reject non-zero velocities but accept the stop command.
    MotionOnly,
    /// Reject every send.
    All,
}

#[derive(Debug, Default)]
struct SinkState {
    sent: Vec<Twist>,
    fault: FaultMode,
    rejected: usize,
}

/// A simulated velocity sink that records accepted commands.
#[derive(Debug, Clone)]
pub struct RecordingSink {
    id: String,
    state: Arc<Mutex<SinkState>>,
}

impl RecordingSink {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Arc::default(),
        }
    }

    /// Every accepted twist, oldest first.
    pub fn sent(&self) -> Vec<Twist> {
        lock(&self.state).sent.clone()
    }

    pub fn last(&self) -> Option<Twist> {
        lock(&self.state).sent.last().copied()
    }

    pub fn len(&self) -> usize {
        lock(&self.state).sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of sends refused because of the current [`FaultMode`].
    pub fn rejected(&self) -> usize {
        lock(&self.state).rejected
    }

    pub fn clear(&self) {
        lock(&self.state).sent.clear();
    }

    pub fn set_fault(&self, fault: FaultMode) {
        lock(&self.state).fault = fault;
    }
}

impl VelocitySink for RecordingSink {
    fn id(&self) -> &str {
        &self.id
    }

    fn send(&mut self, twist: Twist) -> Result<(), SumoError> {
        let mut state = lock(&self.state);
        let refuse = match state.fault {
            FaultMode::Healthy => false,
            FaultMode::MotionOnly => !twist.is_zero(),
            FaultMode::All => true,
        };
        if refuse {
            state.rejected += 1;
            return Err(SumoError::Actuation {
                sink: self.id.clone(),
                details: "simulated link fault".to_string(),
            });
        }
        state.sent.push(twist);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Manual clock
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct ClockState {
    origin: Instant,
    offset: Duration,
    sleeps: Vec<Duration>,
}

/// A virtual clock: `sleep` returns immediately and moves `now` forward.
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ClockState>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ClockState {
                origin: Instant::now(),
                offset: Duration::ZERO,
                sleeps: Vec::new(),
            })),
        }
    }

    /// Virtual time elapsed since construction.
    pub fn elapsed(&self) -> Duration {
        lock(&self.state).offset
    }

    /// Move time forward without recording a sleep.
    pub fn advance(&self, by: Duration) {
        lock(&self.state).offset += by;
    }

    /// Every sleep requested so far, oldest first.
    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.state).sleeps.clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let state = lock(&self.state);
        state.origin + state.offset
    }

    fn sleep(&self, duration: Duration) {
        let mut state = lock(&self.state);
        state.offset += duration;
        state.sleeps.push(duration);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn forward() -> Twist {
        Twist {
            linear_x: 0.5,
            linear_y: 0.0,
            angular_z: 0.0,
        }
    }

    #[test]
    fn recording_sink_shares_log_between_clones() {
        let sink = RecordingSink::new("sim");
        let mut handle = sink.clone();
        handle.send(forward()).unwrap();
        handle.send(Twist::ZERO).unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.sent()[0], forward());
        assert!(sink.last().unwrap().is_zero());
    }

    #[test]
    fn motion_only_fault_accepts_stop() {
        let mut sink = RecordingSink::new("sim");
        sink.set_fault(FaultMode::MotionOnly);

        assert!(sink.send(forward()).is_err());
        assert!(sink.send(Twist::ZERO).is_ok());
        assert_eq!(sink.rejected(), 1);
        assert_eq!(sink.sent(), vec![Twist::ZERO]);
    }

    #[test]
    fn all_fault_rejects_everything_until_cleared() {
        let mut sink = RecordingSink::new("sim");
        sink.set_fault(FaultMode::All);
        assert!(matches!(
            sink.send(Twist::ZERO),
            Err(SumoError::Actuation { ref sink, .. }) if sink == "sim"
        ));

        sink.set_fault(FaultMode::Healthy);
        assert!(sink.send(Twist::ZERO).is_ok());
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn clear_empties_log() {
        let mut sink = RecordingSink::new("sim");
        sink.send(forward()).unwrap();
        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn manual_clock_sleep_is_virtual() {
        let clock = ManualClock::new();
        let wall = Instant::now();
        clock.sleep(Duration::from_secs(10));
        assert_eq!(clock.elapsed(), Duration::from_secs(10));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(10)]);
        assert!(wall.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn manual_clock_advance_does_not_record_sleep() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        clock.advance(Duration::from_millis(7));
        assert_eq!(clock.now() - t0, Duration::from_millis(7));
        assert!(clock.sleeps().is_empty());
    }
}
