//! [`PriorityArbiter`] – the per-tick decision state machine.
//!
//! Each tick reads one [`SensorSnapshot`], evaluates [`ArbitrationRule::ORDER`]
//! top to bottom and acts on the first rule that matches:
//!
//! 1. **AvoidBoundary** – a range sector is closer than the wall threshold.
//!    Issue a counter-motion away from it.
//! 2. **Search** – no opponent detected.  Rotate in place.
//! 3. **CloseRangeBackoff** – the opponent blob is larger than the proximity
//!    threshold.  Back off.
//! 4. **Engage** – retain (or draw) a [`Strategy`] and run it against the
//!    live horizontal offset.
//!
//! Apart from the strategy retained by the [`StrategySelector`] nothing
//! carries over between ticks: the state is recomputed from scratch every
//! time.  A missing reading counts as "nothing there", i.e. infinite
//! distance and no opponent.
//!
//! Every planned command passes through the [`CommandGuard`] before the
//! [`MotionPrimitiveExecutor`] emits it.

use std::sync::Arc;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sumo_hal::{MotionPrimitiveExecutor, ShutdownSignal};
use sumo_kernel::CommandGuard;
use sumo_perception::{SensorSnapshot, SensorState};
use sumo_types::{Direction, OpponentBlob, RangeSnapshot, RobotCommand, Strategy, SumoError};
use tracing::{debug, info, warn};

use crate::strategy::{StrategySelector, StrategyTuning, check_magnitude, check_step_duration};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Whether boundary avoidance and close-range backoff drop the retained
/// strategy.  Search always drops it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidationPolicy {
    /// Draw a fresh strategy after any interruption.
    #[default]
    Always,
    /// Resume the interrupted strategy once engagement is possible again.
    Resume,
}

/// What CloseRangeBackoff does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloseRangeManeuver {
    /// A single brief straight reverse.
    #[default]
    Reverse,
    /// The two-step [`Strategy::Defensive`] expansion.
    Defensive,
}

/// Counter-motions issued outside of engagement.  Speeds are magnitudes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManeuverTuning {
    pub boundary_linear_speed: f32,
    pub boundary_turn_rate: f32,
    pub boundary_duration: f32,
    pub search_turn_rate: f32,
    pub search_duration: f32,
    pub backoff_speed: f32,
    pub backoff_duration: f32,
}

impl Default for ManeuverTuning {
    fn default() -> Self {
        Self {
            boundary_linear_speed: 0.4,
            boundary_turn_rate: 1.2,
            boundary_duration: 0.20,
            search_turn_rate: 0.8,
            search_duration: 0.10,
            backoff_speed: 0.4,
            backoff_duration: 0.15,
        }
    }
}

impl ManeuverTuning {
    /// Reject negative or non-finite magnitudes and out-of-range durations.
    pub fn validate(&self) -> Result<(), SumoError> {
        for (name, value) in [
            ("boundary_linear_speed", self.boundary_linear_speed),
            ("boundary_turn_rate", self.boundary_turn_rate),
            ("search_turn_rate", self.search_turn_rate),
            ("backoff_speed", self.backoff_speed),
        ] {
            check_magnitude("maneuvers", name, value)?;
        }
        for (name, value) in [
            ("boundary_duration", self.boundary_duration),
            ("search_duration", self.search_duration),
            ("backoff_duration", self.backoff_duration),
        ] {
            check_step_duration("maneuvers", name, value)?;
        }
        Ok(())
    }
}

/// Everything the arbiter can be tuned with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    /// Metres.  A sector strictly closer than this is a boundary breach.
    pub wall_distance_threshold: f32,
    /// Blob area (pixels).  Strictly larger than this triggers backoff.
    pub proximity_area_threshold: f32,
    /// Camera frame width in pixels.
    pub frame_width: u32,
    /// Tie-break order when several sectors breach at once.
    pub boundary_scan_order: Vec<Direction>,
    pub invalidation_policy: InvalidationPolicy,
    pub close_range_maneuver: CloseRangeManeuver,
    pub maneuvers: ManeuverTuning,
    pub strategies: StrategyTuning,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            wall_distance_threshold: 0.25,
            proximity_area_threshold: 8000.0,
            frame_width: 320,
            boundary_scan_order: Direction::ALL.to_vec(),
            invalidation_policy: InvalidationPolicy::default(),
            close_range_maneuver: CloseRangeManeuver::default(),
            maneuvers: ManeuverTuning::default(),
            strategies: StrategyTuning::default(),
        }
    }
}

impl ArbiterConfig {
    pub fn frame_half_width(&self) -> f32 {
        self.frame_width as f32 / 2.0
    }

    /// Reject thresholds, scan orders and tunings the arbiter cannot work
    /// with.
    pub fn validate(&self) -> Result<(), SumoError> {
        if !self.wall_distance_threshold.is_finite() || self.wall_distance_threshold < 0.0 {
            return Err(SumoError::Config(format!(
                "wall_distance_threshold must be a non-negative number, got {}",
                self.wall_distance_threshold
            )));
        }
        if !self.proximity_area_threshold.is_finite() || self.proximity_area_threshold < 0.0 {
            return Err(SumoError::Config(format!(
                "proximity_area_threshold must be a non-negative number, got {}",
                self.proximity_area_threshold
            )));
        }
        if self.frame_width == 0 {
            return Err(SumoError::Config("frame_width must be positive".to_string()));
        }
        let order = &self.boundary_scan_order;
        let complete = order.len() == Direction::ALL.len()
            && Direction::ALL.iter().all(|d| order.contains(d));
        if !complete {
            return Err(SumoError::Config(format!(
                "boundary_scan_order must name front, back, left and right exactly once, got {order:?}"
            )));
        }
        self.maneuvers.validate()?;
        self.strategies.validate()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decision types
// ─────────────────────────────────────────────────────────────────────────────

/// Which rule produced a tick's plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArbitrationState {
    /// Moving away from the breached sector.
    AvoidBoundary(Direction),
    Search,
    CloseRangeBackoff,
    Engage(Strategy),
}

/// The ordered rule list.  First match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbitrationRule {
    AvoidBoundary,
    Search,
    CloseRangeBackoff,
    Engage,
}

impl ArbitrationRule {
    pub const ORDER: [ArbitrationRule; 4] = [
        ArbitrationRule::AvoidBoundary,
        ArbitrationRule::Search,
        ArbitrationRule::CloseRangeBackoff,
        ArbitrationRule::Engage,
    ];
}

/// A decided state and the commands it wants executed, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub state: ArbitrationState,
    pub commands: Vec<RobotCommand>,
}

/// What a [`PriorityArbiter::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub state: ArbitrationState,
    /// Velocity emissions across all executed commands.
    pub emissions: usize,
    /// `true` if shutdown cut the plan short.
    pub interrupted: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// PriorityArbiter
// ─────────────────────────────────────────────────────────────────────────────

/// Reads sensors, decides, and drives the executor once per tick.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use sumo_hal::sim::{ManualClock, RecordingSink};
/// use sumo_hal::{MotionPrimitiveExecutor, ShutdownSignal};
/// use sumo_kernel::CommandGuard;
/// use sumo_perception::SensorState;
/// use sumo_runtime::arbiter::{ArbiterConfig, ArbitrationState, PriorityArbiter};
/// use sumo_runtime::strategy::StrategySelector;
/// use sumo_types::{Direction, RangeSnapshot};
///
/// let sensors = Arc::new(SensorState::new());
/// let sink = RecordingSink::new("cmd_vel");
/// let executor = MotionPrimitiveExecutor::new(
///     Box::new(sink.clone()),
///     Arc::new(ManualClock::new()),
///     ShutdownSignal::new(),
/// );
/// let mut arbiter = PriorityArbiter::new(
///     ArbiterConfig::default(),
///     Arc::clone(&sensors),
///     StrategySelector::seeded(1),
///     CommandGuard::standard(1.0, 2.0),
///     executor,
/// )
/// .unwrap();
///
/// sensors.update_range(RangeSnapshot::new(0.10, 1.0, 1.0, 1.0));
/// let report = arbiter.tick().unwrap();
/// assert_eq!(report.state, ArbitrationState::AvoidBoundary(Direction::Front));
/// assert!(sink.last().unwrap().is_zero());
/// ```
pub struct PriorityArbiter<R: Rng = ChaCha8Rng> {
    config: ArbiterConfig,
    sensors: Arc<SensorState>,
    selector: StrategySelector<R>,
    guard: CommandGuard,
    executor: MotionPrimitiveExecutor,
    last_state: Option<ArbitrationState>,
}

impl<R: Rng> PriorityArbiter<R> {
    /// Wire up an arbiter.  The selector's tuning is replaced by
    /// `config.strategies`.
    ///
    /// # Errors
    ///
    /// [`SumoError::Config`] if `config` fails [`ArbiterConfig::validate`].
    pub fn new(
        config: ArbiterConfig,
        sensors: Arc<SensorState>,
        selector: StrategySelector<R>,
        guard: CommandGuard,
        executor: MotionPrimitiveExecutor,
    ) -> Result<Self, SumoError> {
        config.validate()?;
        let selector = selector.with_tuning(config.strategies);
        Ok(Self {
            config,
            sensors,
            selector,
            guard,
            executor,
            last_state: None,
        })
    }

    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    pub fn sensors(&self) -> Arc<SensorState> {
        Arc::clone(&self.sensors)
    }

    /// The strategy currently retained by the selector.
    pub fn current_strategy(&self) -> Option<Strategy> {
        self.selector.current()
    }

    /// State decided on the previous tick.
    pub fn last_state(&self) -> Option<ArbitrationState> {
        self.last_state
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.executor.shutdown_signal()
    }

    /// Emit a single stop command on the executor's sink.
    pub fn stop(&mut self) -> Result<(), SumoError> {
        self.executor.stop()
    }

    // -------------------------------------------------------------------------
    // Decide
    // -------------------------------------------------------------------------

    /// Evaluate the rule list against `snapshot` without emitting anything.
    ///
    /// Updates the selector (retention / invalidation) exactly as a real tick
    /// would.
    pub fn decide(&mut self, snapshot: &SensorSnapshot) -> Decision {
        let range = snapshot.range_or_clear();
        let blob = snapshot.opponent_blob();

        for rule in ArbitrationRule::ORDER {
            if let Some(decision) = self.evaluate(rule, &range, blob) {
                return decision;
            }
        }
        // Engage only declines without a blob, and Search catches that first.
        self.search()
    }

    fn evaluate(
        &mut self,
        rule: ArbitrationRule,
        range: &RangeSnapshot,
        blob: Option<OpponentBlob>,
    ) -> Option<Decision> {
        match rule {
            ArbitrationRule::AvoidBoundary => self
                .breached_direction(range)
                .map(|direction| self.avoid_boundary(direction)),
            ArbitrationRule::Search => blob.is_none().then(|| self.search()),
            ArbitrationRule::CloseRangeBackoff => blob
                .filter(|b| b.area > self.config.proximity_area_threshold)
                .map(|b| self.back_off(b)),
            ArbitrationRule::Engage => blob.map(|b| self.engage(b)),
        }
    }

    /// First sector in scan order closer than the wall threshold.
    fn breached_direction(&self, range: &RangeSnapshot) -> Option<Direction> {
        self.config
            .boundary_scan_order
            .iter()
            .copied()
            .find(|d| range.distance(*d) < self.config.wall_distance_threshold)
    }

    fn avoid_boundary(&mut self, direction: Direction) -> Decision {
        let m = self.config.maneuvers;
        let (linear_x, angular_z) = match direction {
            Direction::Front => (-m.boundary_linear_speed, 0.0),
            Direction::Back => (m.boundary_linear_speed, 0.0),
            Direction::Left => (0.0, -m.boundary_turn_rate),
            Direction::Right => (0.0, m.boundary_turn_rate),
        };
        let command = RobotCommand::drive(linear_x, angular_z, m.boundary_duration);
        self.apply_invalidation_policy();
        Decision {
            state: ArbitrationState::AvoidBoundary(direction),
            commands: vec![command],
        }
    }

    fn search(&mut self) -> Decision {
        let m = self.config.maneuvers;
        self.selector.invalidate();
        Decision {
            state: ArbitrationState::Search,
            commands: vec![RobotCommand::drive(0.0, m.search_turn_rate, m.search_duration)],
        }
    }

    fn back_off(&mut self, blob: OpponentBlob) -> Decision {
        let commands = match self.config.close_range_maneuver {
            CloseRangeManeuver::Reverse => {
                let m = self.config.maneuvers;
                vec![RobotCommand::drive(-m.backoff_speed, 0.0, m.backoff_duration)]
            }
            CloseRangeManeuver::Defensive => {
                let half = self.config.frame_half_width();
                let error_x = self.error_x(blob);
                self.selector.expand(Strategy::Defensive, error_x, half)
            }
        };
        self.apply_invalidation_policy();
        Decision {
            state: ArbitrationState::CloseRangeBackoff,
            commands,
        }
    }

    fn engage(&mut self, blob: OpponentBlob) -> Decision {
        let half = self.config.frame_half_width();
        let error_x = self.error_x(blob);
        let (strategy, commands) = self.selector.engage(error_x, half);
        Decision {
            state: ArbitrationState::Engage(strategy),
            commands,
        }
    }

    /// Horizontal offset from frame centre, clamped to the half-width.
    fn error_x(&self, blob: OpponentBlob) -> f32 {
        let half = self.config.frame_half_width();
        (blob.center_x as f32 - half).clamp(-half, half)
    }

    fn apply_invalidation_policy(&mut self) {
        if self.config.invalidation_policy == InvalidationPolicy::Always {
            self.selector.invalidate();
        }
    }

    // -------------------------------------------------------------------------
    // Tick
    // -------------------------------------------------------------------------

    /// One arbitration cycle: snapshot, decide, guard, execute.
    ///
    /// Blocks for the combined duration of the planned commands.  A command
    /// rejected by the guard is skipped; the rest of the plan still runs.
    ///
    /// # Errors
    ///
    /// Returns the executor's [`SumoError::Actuation`] on the first command
    /// the sink refused.  The remaining commands of the plan are dropped.
    pub fn tick(&mut self) -> Result<TickReport, SumoError> {
        let snapshot = self.sensors.snapshot();
        let decision = self.decide(&snapshot);
        self.record_transition(decision.state);

        let mut report = TickReport {
            state: decision.state,
            emissions: 0,
            interrupted: false,
        };

        for command in decision.commands {
            if self.executor.shutdown_signal().is_triggered() {
                report.interrupted = true;
                break;
            }
            let command = match self.guard.apply(command) {
                Ok(c) => c,
                Err(e) => {
                    warn!(
                        state = ?decision.state,
                        ?command,
                        error = %e,
                        "command rejected by guard; skipping"
                    );
                    continue;
                }
            };
            let executed = self.executor.run(&command)?;
            report.emissions += executed.emissions;
            if executed.interrupted {
                report.interrupted = true;
                break;
            }
        }

        debug!(
            state = ?report.state,
            emissions = report.emissions,
            interrupted = report.interrupted,
            "arbitration tick"
        );
        Ok(report)
    }

    fn record_transition(&mut self, state: ArbitrationState) {
        if self.last_state != Some(state) {
            info!(from = ?self.last_state, to = ?state, "arbitration state changed");
        }
        self.last_state = Some(state);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
