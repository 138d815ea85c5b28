//! [`MotionPrimitiveExecutor`] – the only path from intent to emitted command.
//!
//! A motion primitive is a single constant-velocity [`RobotCommand`] held for
//! a bounded duration.  The executor re-emits the command's [`Twist`] at a
//! fixed cadence (40 Hz by default) until the duration has elapsed, then
//! emits [`Twist::ZERO`].
//!
//! # Fail-stop
//!
//! Whatever ends the primitive (normal completion, the [`ShutdownSignal`],
//! or a sink error) the executor attempts a final stop command before it
//! returns.  The robot is never left coasting on the last non-zero velocity.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use sumo_hal::executor::{MotionPrimitiveExecutor, ShutdownSignal};
//! use sumo_hal::sim::{ManualClock, RecordingSink};
//! use sumo_types::RobotCommand;
//!
//! let sink = RecordingSink::new("cmd_vel");
//! let clock = ManualClock::new();
//! let mut exec = MotionPrimitiveExecutor::new(
//!     Box::new(sink.clone()),
//!     Arc::new(clock.clone()),
//!     ShutdownSignal::new(),
//! );
//!
//! let report = exec.run(&RobotCommand::drive(0.5, 0.0, 0.1)).unwrap();
//! assert_eq!(report.emissions, 4); // 0, 25, 50, 75 ms
//! assert!(sink.last().unwrap().is_zero());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sumo_types::{RobotCommand, SumoError, Twist};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::sink::VelocitySink;

/// Nominal emission cadence for motion primitives.
pub const DEFAULT_EMISSION_RATE_HZ: f32 = 40.0;

/// Highest cadence a velocity sink accepts.
pub const MAX_EMISSION_RATE_HZ: f32 = 40.0;

// ────────────────────────────────────────────────────────────────────────────
// ShutdownSignal
// ────────────────────────────────────────────────────────────────────────────

/// Process-wide stop flag shared by the executor, the control loop and
/// whatever handles Ctrl-C.  Cloning shares the same flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown.  Idempotent.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Executor
// ────────────────────────────────────────────────────────────────────────────

/// Outcome of a single [`MotionPrimitiveExecutor::run`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionReport {
    /// Velocity emissions, not counting the trailing stop.
    pub emissions: usize,
    /// `true` when the shutdown signal cut the primitive short.
    pub interrupted: bool,
}

/// Emits a [`RobotCommand`] at a fixed cadence for its duration, then stops.
pub struct MotionPrimitiveExecutor {
    sink: Box<dyn VelocitySink>,
    clock: Arc<dyn Clock>,
    period: Duration,
    shutdown: ShutdownSignal,
}

impl MotionPrimitiveExecutor {
    /// Create an executor emitting at [`DEFAULT_EMISSION_RATE_HZ`].
    pub fn new(
        sink: Box<dyn VelocitySink>,
        clock: Arc<dyn Clock>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            sink,
            clock,
            period: rate_to_period(DEFAULT_EMISSION_RATE_HZ),
            shutdown,
        }
    }

    /// Override the emission cadence.  Non-positive or non-finite rates are
    /// ignored; rates above [`MAX_EMISSION_RATE_HZ`] are capped.
    pub fn with_emission_rate(mut self, rate_hz: f32) -> Self {
        if !(rate_hz.is_finite() && rate_hz > 0.0) {
            warn!(rate_hz, "ignoring invalid emission rate");
        } else if rate_hz > MAX_EMISSION_RATE_HZ {
            warn!(rate_hz, max = MAX_EMISSION_RATE_HZ, "emission rate above sink limit; capping");
            self.period = rate_to_period(MAX_EMISSION_RATE_HZ);
        } else {
            self.period = rate_to_period(rate_hz);
        }
        self
    }

    /// Interval between two emissions.
    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn sink_id(&self) -> &str {
        self.sink.id()
    }

    /// Handle to the signal this executor honours.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Ask the running primitive (and every later one) to stop early.
    pub fn interrupt(&self) {
        self.shutdown.trigger();
    }

    /// Execute one motion primitive, blocking for up to `command.duration`.
    ///
    /// A non-positive or non-finite duration emits only the stop command.
    ///
    /// # Errors
    ///
    /// Returns the sink's [`SumoError::Actuation`] if a velocity emission or
    /// the final stop could not be delivered.  The stop is attempted even
    /// when an earlier emission failed.
    pub fn run(&mut self, command: &RobotCommand) -> Result<ExecutionReport, SumoError> {
        let hold = seconds_to_duration(command.duration);
        let twist = command.twist();
        let mut report = ExecutionReport::default();
        let mut outcome = Ok(());

        debug!(
            sink = %self.sink.id(),
            ?twist,
            hold_ms = hold.as_millis() as u64,
            "running primitive"
        );

        let start = self.clock.now();
        while self.clock.now().duration_since(start) < hold {
            if self.shutdown.is_triggered() {
                report.interrupted = true;
                break;
            }
            if let Err(e) = self.sink.send(twist) {
                outcome = Err(e);
                break;
            }
            report.emissions += 1;
            self.clock.sleep(self.period);
        }

        let stopped = self.stop();
        if let (Err(_), Err(stop_err)) = (&outcome, &stopped) {
            warn!(sink = %self.sink.id(), error = %stop_err, "stop command also failed");
        }
        outcome?;
        stopped?;

        if report.interrupted {
            debug!(emissions = report.emissions, "primitive interrupted by shutdown");
        }
        Ok(report)
    }

    /// Emit a single zero-velocity command.
    pub fn stop(&mut self) -> Result<(), SumoError> {
        self.sink.send(Twist::ZERO)
    }
}

// Durations are rounded to whole microseconds so that, e.g., 0.1 s at 40 Hz is
// exactly four emissions rather than five due to f32 representation error.
fn seconds_to_duration(seconds: f32) -> Duration {
    if seconds.is_finite() && seconds > 0.0 {
        Duration::from_micros((f64::from(seconds) * 1e6).round() as u64)
    } else {
        Duration::ZERO
    }
}

fn rate_to_period(rate_hz: f32) -> Duration {
    Duration::from_micros((1e6 / f64::from(rate_hz)).round() as u64)
}
