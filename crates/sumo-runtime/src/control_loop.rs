//! [`ControlLoop`] – the outer tick driver.
//!
//! Wraps a [`PriorityArbiter`] in a fixed-period loop (50 Hz by default)
//! and owns everything that outlives a single tick:
//!
//! - **Shutdown** – the loop checks the shared [`ShutdownSignal`] before
//!   every tick and emits a final stop command when it is set.
//! - **Actuation failures** – a tick whose command the sink refused is
//!   logged and the loop carries on.  [`ActuationGuard`] counts failures in
//!   a row; at the threshold the loop commands a stop and returns
//!   [`SumoError::ActuationEscalated`].
//! - **Stream health** – [`StreamWatchdog`] logs when the vision or range
//!   producer goes quiet.  It does not influence decisions.  Stream ages
//!   are measured on the injected [`Clock`], anchored to a wall-clock epoch
//!   taken at construction (see [`ControlLoop::with_epoch`]).
//!
//! A tick blocks for as long as its motion primitives last, so ticks that
//! run over the period are followed by the next one immediately.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use sumo_hal::sim::{ManualClock, RecordingSink};
//! use sumo_hal::{MotionPrimitiveExecutor, ShutdownSignal};
//! use sumo_kernel::CommandGuard;
//! use sumo_perception::SensorState;
//! use sumo_runtime::arbiter::{ArbiterConfig, PriorityArbiter};
//! use sumo_runtime::control_loop::{ControlLoop, ControlLoopConfig};
//! use sumo_runtime::strategy::StrategySelector;
//!
//! let sink = RecordingSink::new("cmd_vel");
//! let clock = Arc::new(ManualClock::new());
//! let executor = MotionPrimitiveExecutor::new(
//!     Box::new(sink.clone()),
//!     clock.clone(),
//!     ShutdownSignal::new(),
//! );
//! let arbiter = PriorityArbiter::new(
//!     ArbiterConfig::default(),
//!     Arc::new(SensorState::new()),
//!     StrategySelector::seeded(3),
//!     CommandGuard::standard(1.0, 2.0),
//!     executor,
//! )
//! .unwrap();
//!
//! let mut control = ControlLoop::new(arbiter, clock, ControlLoopConfig::default());
//! assert_eq!(control.run_for_ticks(3).unwrap(), 3);
//! assert!(sink.last().unwrap().is_zero());
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use sumo_hal::{Clock, ShutdownSignal};
use sumo_kernel::{DEFAULT_STREAM_TIMEOUT, StreamWatchdog};
use sumo_types::SumoError;
use tracing::{error, info, warn};

use crate::arbiter::{PriorityArbiter, TickReport};
use crate::failure_guard::{ActuationGuard, DEFAULT_FAILURE_THRESHOLD};

/// Nominal control period (50 Hz).
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(20);

pub const VISION_STREAM: &str = "vision";
pub const RANGE_STREAM: &str = "range";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Loop-level settings for [`ControlLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlLoopConfig {
    pub tick_period: Duration,
    /// Consecutive failed ticks before the loop halts.
    pub max_consecutive_actuation_failures: usize,
    /// Age after which a sensor stream is reported stale.
    pub stream_timeout: Duration,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            tick_period: DEFAULT_TICK_PERIOD,
            max_consecutive_actuation_failures: DEFAULT_FAILURE_THRESHOLD,
            stream_timeout: DEFAULT_STREAM_TIMEOUT,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ControlLoop
// ─────────────────────────────────────────────────────────────────────────────

/// Fixed-period driver around a [`PriorityArbiter`].
pub struct ControlLoop<R: Rng = ChaCha8Rng> {
    arbiter: PriorityArbiter<R>,
    clock: Arc<dyn Clock>,
    shutdown: ShutdownSignal,
    guard: ActuationGuard,
    watchdog: StreamWatchdog,
    tick_period: Duration,
    ticks: u64,
    epoch: (Instant, DateTime<Utc>),
}

impl<R: Rng> ControlLoop<R> {
    /// Build a loop around `arbiter`, honouring the arbiter's shutdown
    /// signal.  `clock` should be the same one the executor uses.
    pub fn new(
        arbiter: PriorityArbiter<R>,
        clock: Arc<dyn Clock>,
        config: ControlLoopConfig,
    ) -> Self {
        let shutdown = arbiter.shutdown_signal();
        let epoch = (clock.now(), Utc::now());
        Self {
            arbiter,
            clock,
            shutdown,
            guard: ActuationGuard::new(config.max_consecutive_actuation_failures),
            watchdog: StreamWatchdog::new(config.stream_timeout),
            tick_period: config.tick_period,
            ticks: 0,
            epoch,
        }
    }

    /// Pin the wall-clock time that corresponds to the clock's current
    /// instant.  Replays use this to line stream ages up with recorded
    /// sensor timestamps.
    pub fn with_epoch(mut self, wall: DateTime<Utc>) -> Self {
        self.epoch = (self.clock.now(), wall);
        self
    }

    /// Wall-clock time according to the injected clock.
    pub fn wall_now(&self) -> DateTime<Utc> {
        let (origin, wall) = self.epoch;
        let elapsed = self.clock.now().saturating_duration_since(origin);
        TimeDelta::from_std(elapsed)
            .ok()
            .and_then(|delta| wall.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn arbiter(&self) -> &PriorityArbiter<R> {
        &self.arbiter
    }

    pub fn watchdog(&self) -> &StreamWatchdog {
        &self.watchdog
    }

    pub fn actuation_guard(&self) -> &ActuationGuard {
        &self.guard
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Ticks run so far, including failed ones.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Run until the shutdown signal is set, then emit a final stop.
    ///
    /// # Errors
    ///
    /// [`SumoError::ActuationEscalated`] if the sink kept refusing commands.
    pub fn run(&mut self) -> Result<(), SumoError> {
        info!(
            tick_ms = self.tick_period.as_millis() as u64,
            failure_threshold = self.guard.threshold(),
            "control loop started"
        );
        while !self.shutdown.is_triggered() {
            self.paced_tick()?;
        }
        self.finish();
        Ok(())
    }

    /// Run at most `n` ticks, stopping early on shutdown.  Emits a stop
    /// command afterwards either way.  Returns the number of ticks run.
    pub fn run_for_ticks(&mut self, n: usize) -> Result<usize, SumoError> {
        let mut ran = 0;
        while ran < n && !self.shutdown.is_triggered() {
            self.paced_tick()?;
            ran += 1;
        }
        self.finish();
        Ok(ran)
    }

    /// One arbitration tick with failure accounting, without pacing.
    ///
    /// Returns `Ok(None)` for a tolerated actuation failure.
    pub fn tick_once(&mut self) -> Result<Option<TickReport>, SumoError> {
        self.ticks += 1;
        self.check_streams();

        match self.arbiter.tick() {
            Ok(report) => {
                self.guard.record_success();
                Ok(Some(report))
            }
            Err(e) => {
                let escalate = self.guard.record_failure();
                let failures = self.guard.consecutive_failures();
                if escalate {
                    error!(error = %e, failures, "actuation keeps failing; halting control loop");
                    if let Err(stop_err) = self.arbiter.stop() {
                        error!(error = %stop_err, "final stop could not be delivered");
                    }
                    return Err(SumoError::ActuationEscalated { failures });
                }
                warn!(error = %e, failures, "actuation failed; continuing");
                Ok(None)
            }
        }
    }

    fn paced_tick(&mut self) -> Result<(), SumoError> {
        let started = self.clock.now();
        self.tick_once()?;
        let elapsed = self.clock.now().duration_since(started);
        let remaining = self.tick_period.saturating_sub(elapsed);
        if !remaining.is_zero() {
            self.clock.sleep(remaining);
        }
        Ok(())
    }

    fn check_streams(&mut self) {
        let snapshot = self.arbiter.sensors().snapshot();
        let now = self.wall_now();
        self.watchdog
            .observe(VISION_STREAM, snapshot.opponent.map(|o| o.timestamp), now);
        self.watchdog
            .observe(RANGE_STREAM, snapshot.range.map(|r| r.timestamp), now);
    }

    fn finish(&mut self) {
        info!(ticks = self.ticks, "control loop stopping");
        if let Err(e) = self.arbiter.stop() {
            warn!(error = %e, "final stop could not be delivered");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
