//! [`StrategySelector`] – randomized engagement strategy choice.
//!
//! The selector owns the currently retained [`Strategy`].  Once chosen, a
//! strategy is kept across ticks until something asks for re-selection via
//! [`StrategySelector::invalidate`]; only then is a new one drawn uniformly
//! from [`Strategy::RANDOM_POOL`].  `Defensive` is never drawn, it is only
//! expanded on request by the arbiter.
//!
//! Each strategy expands into a short sequence of [`RobotCommand`]s, some
//! steered proportionally by the live opponent offset.  All speeds, rates
//! and durations come from [`StrategyTuning`].
//!
//! # Example
//!
//! ```rust
//! use sumo_runtime::strategy::StrategySelector;
//! use sumo_types::Strategy;
//!
//! let mut selector = StrategySelector::seeded(7);
//! let cmds = selector.expand(Strategy::Direct, 40.0, 160.0);
//! assert_eq!(cmds.len(), 1);
//! assert!((cmds[0].angular_z + 0.25).abs() < 1e-6);
//!
//! assert_eq!(selector.retain_or_select(Some(Strategy::Zigzag), false), Strategy::Zigzag);
//! ```

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sumo_types::{RobotCommand, Strategy, SumoError};
use tracing::debug;

// ─────────────────────────────────────────────────────────────────────────────
// Tuning
// ─────────────────────────────────────────────────────────────────────────────

/// Speeds (m/s), turn rates (rad/s) and step durations (s) of every strategy.
///
/// Reverse speeds are given as magnitudes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyTuning {
    pub direct_speed: f32,
    pub direct_duration: f32,

    pub zigzag_speed: f32,
    pub zigzag_turn_rate: f32,
    /// Duration of each of the two zigzag legs.
    pub zigzag_step_duration: f32,

    pub circle_arc_speed: f32,
    pub circle_arc_turn_rate: f32,
    pub circle_arc_duration: f32,
    pub circle_approach_speed: f32,
    pub circle_approach_duration: f32,

    pub defensive_reverse_speed: f32,
    pub defensive_turn_rate: f32,
    pub defensive_turn_duration: f32,
    pub defensive_retreat_speed: f32,
    pub defensive_retreat_duration: f32,
}

impl Default for StrategyTuning {
    fn default() -> Self {
        Self {
            direct_speed: 0.5,
            direct_duration: 0.10,
            zigzag_speed: 0.4,
            zigzag_turn_rate: 0.6,
            zigzag_step_duration: 0.15,
            circle_arc_speed: 0.3,
            circle_arc_turn_rate: 0.8,
            circle_arc_duration: 0.20,
            circle_approach_speed: 0.5,
            circle_approach_duration: 0.10,
            defensive_reverse_speed: 0.3,
            defensive_turn_rate: 1.0,
            defensive_turn_duration: 0.15,
            defensive_retreat_speed: 0.4,
            defensive_retreat_duration: 0.15,
        }
    }
}

impl StrategyTuning {
    /// Reject negative or non-finite speeds and rates, and step durations
    /// outside `[0, MAX_STEP_DURATION]`.
    pub fn validate(&self) -> Result<(), SumoError> {
        for (name, value) in [
            ("direct_speed", self.direct_speed),
            ("zigzag_speed", self.zigzag_speed),
            ("zigzag_turn_rate", self.zigzag_turn_rate),
            ("circle_arc_speed", self.circle_arc_speed),
            ("circle_arc_turn_rate", self.circle_arc_turn_rate),
            ("circle_approach_speed", self.circle_approach_speed),
            ("defensive_reverse_speed", self.defensive_reverse_speed),
            ("defensive_turn_rate", self.defensive_turn_rate),
            ("defensive_retreat_speed", self.defensive_retreat_speed),
        ] {
            check_magnitude("strategies", name, value)?;
        }
        for (name, value) in [
            ("direct_duration", self.direct_duration),
            ("zigzag_step_duration", self.zigzag_step_duration),
            ("circle_arc_duration", self.circle_arc_duration),
            ("circle_approach_duration", self.circle_approach_duration),
            ("defensive_turn_duration", self.defensive_turn_duration),
            ("defensive_retreat_duration", self.defensive_retreat_duration),
        ] {
            check_step_duration("strategies", name, value)?;
        }
        Ok(())
    }
}

/// Longest single motion step (seconds).  A step blocks the tick, so
/// boundary checks wait at most this long per command.
pub const MAX_STEP_DURATION: f32 = 1.0;

pub(crate) fn check_magnitude(section: &str, name: &str, value: f32) -> Result<(), SumoError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SumoError::Config(format!(
            "{section}.{name} must be a non-negative number, got {value}"
        )))
    }
}

pub(crate) fn check_step_duration(section: &str, name: &str, value: f32) -> Result<(), SumoError> {
    if value.is_finite() && (0.0..=MAX_STEP_DURATION).contains(&value) {
        Ok(())
    } else {
        Err(SumoError::Config(format!(
            "{section}.{name} must be between 0 and {MAX_STEP_DURATION} s, got {value}"
        )))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// StrategySelector
// ─────────────────────────────────────────────────────────────────────────────

/// Draws, retains and expands engagement strategies.
///
/// Generic over the random source so tests and replays can inject a seeded
/// generator; production uses [`StrategySelector::from_entropy`].
pub struct StrategySelector<R: Rng = ChaCha8Rng> {
    rng: R,
    tuning: StrategyTuning,
    current: Option<Strategy>,
}

impl StrategySelector<ChaCha8Rng> {
    /// Reproducible selector: the same seed yields the same strategy and
    /// zigzag-sign sequence.
    pub fn seeded(seed: u64) -> Self {
        Self::new(ChaCha8Rng::seed_from_u64(seed), StrategyTuning::default())
    }

    pub fn from_entropy() -> Self {
        Self::new(ChaCha8Rng::from_entropy(), StrategyTuning::default())
    }
}

impl<R: Rng> StrategySelector<R> {
    pub fn new(rng: R, tuning: StrategyTuning) -> Self {
        Self {
            rng,
            tuning,
            current: None,
        }
    }

    pub fn with_tuning(mut self, tuning: StrategyTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn tuning(&self) -> &StrategyTuning {
        &self.tuning
    }

    /// The retained strategy, if any.
    pub fn current(&self) -> Option<Strategy> {
        self.current
    }

    /// Drop the retained strategy so the next [`engage`](Self::engage)
    /// draws a fresh one.
    pub fn invalidate(&mut self) {
        if let Some(previous) = self.current.take() {
            debug!(%previous, "strategy invalidated");
        }
    }

    /// Draw uniformly from [`Strategy::RANDOM_POOL`].
    pub fn select_new(&mut self) -> Strategy {
        let idx = self.rng.gen_range(0..Strategy::RANDOM_POOL.len());
        Strategy::RANDOM_POOL[idx]
    }

    /// Return `current` unless it is absent or `invalidate` is set, in which
    /// case draw a new strategy.
    pub fn retain_or_select(&mut self, current: Option<Strategy>, invalidate: bool) -> Strategy {
        match current {
            Some(strategy) if !invalidate => strategy,
            _ => self.select_new(),
        }
    }

    /// Retain (or select) a strategy and expand it for the given offset.
    ///
    /// `error_x` is the opponent's horizontal pixel offset from frame centre,
    /// `max_error` the frame half-width.
    pub fn engage(&mut self, error_x: f32, max_error: f32) -> (Strategy, Vec<RobotCommand>) {
        let strategy = self.retain_or_select(self.current, false);
        if self.current != Some(strategy) {
            debug!(%strategy, "strategy selected");
        }
        self.current = Some(strategy);
        (strategy, self.expand(strategy, error_x, max_error))
    }

    /// Turn `strategy` into its motion steps.
    ///
    /// Proportional steering is `-error_x / max_error`, which stays within
    /// `[-1, 1]` while `|error_x| <= max_error`.  A non-positive `max_error`
    /// gives zero steering.
    pub fn expand(
        &mut self,
        strategy: Strategy,
        error_x: f32,
        max_error: f32,
    ) -> Vec<RobotCommand> {
        let t = self.tuning;
        let steer = proportional_steer(error_x, max_error);
        match strategy {
            Strategy::Direct => vec![RobotCommand::drive(t.direct_speed, steer, t.direct_duration)],
            Strategy::Zigzag => {
                let sign = if self.rng.gen_bool(0.5) { 1.0 } else { -1.0 };
                let turn = sign * t.zigzag_turn_rate;
                vec![
                    RobotCommand::drive(t.zigzag_speed, turn, t.zigzag_step_duration),
                    RobotCommand::drive(t.zigzag_speed, -turn, t.zigzag_step_duration),
                ]
            }
            Strategy::Circle => vec![
                RobotCommand::drive(
                    t.circle_arc_speed,
                    t.circle_arc_turn_rate,
                    t.circle_arc_duration,
                ),
                RobotCommand::drive(t.circle_approach_speed, steer, t.circle_approach_duration),
            ],
            Strategy::Defensive => vec![
                RobotCommand::drive(
                    -t.defensive_reverse_speed,
                    t.defensive_turn_rate,
                    t.defensive_turn_duration,
                ),
                RobotCommand::drive(
                    -t.defensive_retreat_speed,
                    0.0,
                    t.defensive_retreat_duration,
                ),
            ],
        }
    }
}

fn proportional_steer(error_x: f32, max_error: f32) -> f32 {
    if max_error > 0.0 && max_error.is_finite() && error_x.is_finite() {
        -error_x / max_error
    } else {
        0.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn default_tuning_is_valid() {
        assert!(StrategyTuning::default().validate().is_ok());
    }

    #[test]
    fn tuning_rejects_negative_speed_and_long_steps() {
        let mut t = StrategyTuning::default();
        t.zigzag_turn_rate = -0.6;
        assert!(matches!(t.validate(), Err(SumoError::Config(_))));

        let mut t = StrategyTuning::default();
        t.direct_duration = 3600.0;
        assert!(matches!(t.validate(), Err(SumoError::Config(_))));

        let mut t = StrategyTuning::default();
        t.circle_arc_duration = f32::NAN;
        assert!(t.validate().is_err());

        let mut t = StrategyTuning::default();
        t.direct_duration = MAX_STEP_DURATION;
        assert!(t.validate().is_ok());
    }

    #[test]
    fn select_new_never_draws_defensive() {
        let mut s = StrategySelector::seeded(1);
        for _ in 0..1_000 {
            assert_ne!(s.select_new(), Strategy::Defensive);
        }
    }

    #[test]
    fn select_new_covers_whole_pool() {
        let mut s = StrategySelector::seeded(42);
        let drawn: Vec<Strategy> = (0..300).map(|_| s.select_new()).collect();
        for strategy in Strategy::RANDOM_POOL {
            assert!(drawn.contains(&strategy), "{strategy} never drawn");
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = StrategySelector::seeded(99);
        let mut b = StrategySelector::seeded(99);
        for _ in 0..50 {
            assert_eq!(a.select_new(), b.select_new());
            assert_eq!(
                a.expand(Strategy::Zigzag, 0.0, 160.0),
                b.expand(Strategy::Zigzag, 0.0, 160.0)
            );
        }
    }

    #[test]
    fn retain_keeps_current_unless_invalidated() {
        let mut s = StrategySelector::seeded(3);
        assert_eq!(s.retain_or_select(Some(Strategy::Zigzag), false), Strategy::Zigzag);
        assert_eq!(s.retain_or_select(Some(Strategy::Defensive), false), Strategy::Defensive);

        for _ in 0..100 {
            let picked = s.retain_or_select(Some(Strategy::Zigzag), true);
            assert!(Strategy::RANDOM_POOL.contains(&picked));
        }
    }

    #[test]
    fn retain_selects_when_absent() {
        let mut s = StrategySelector::seeded(3);
        let picked = s.retain_or_select(None, false);
        assert!(Strategy::RANDOM_POOL.contains(&picked));
    }

    #[test]
    fn engage_retains_across_calls_until_invalidated() {
        let mut s = StrategySelector::seeded(11);
        assert!(s.current().is_none());

        let (first, _) = s.engage(0.0, 160.0);
        for _ in 0..20 {
            assert_eq!(s.engage(10.0, 160.0).0, first);
        }
        assert_eq!(s.current(), Some(first));

        s.invalidate();
        assert!(s.current().is_none());
        let (next, _) = s.engage(0.0, 160.0);
        assert_eq!(s.current(), Some(next));
    }

    #[test]
    fn direct_steers_proportionally() {
        let mut s = StrategySelector::seeded(0);
        let cmds = s.expand(Strategy::Direct, 40.0, 160.0);
        assert_eq!(cmds.len(), 1);
        assert!(approx(cmds[0].linear_x, 0.5));
        assert!(approx(cmds[0].angular_z, -0.25));
        assert!(approx(cmds[0].duration, 0.10));
    }

    #[test]
    fn steering_bounded_at_frame_edge() {
        let mut s = StrategySelector::seeded(0);
        assert!(approx(s.expand(Strategy::Direct, 160.0, 160.0)[0].angular_z, -1.0));
        assert!(approx(s.expand(Strategy::Direct, -160.0, 160.0)[0].angular_z, 1.0));
    }

    #[test]
    fn zero_half_width_gives_zero_steering() {
        let mut s = StrategySelector::seeded(0);
        assert_eq!(s.expand(Strategy::Direct, 50.0, 0.0)[0].angular_z, 0.0);
        assert_eq!(s.expand(Strategy::Circle, 50.0, -1.0)[1].angular_z, 0.0);
    }

    #[test]
    fn zigzag_legs_have_opposite_turns_and_both_signs_occur() {
        let mut s = StrategySelector::seeded(5);
        let mut saw_positive = false;
        let mut saw_negative = false;
        for _ in 0..200 {
            let cmds = s.expand(Strategy::Zigzag, 0.0, 160.0);
            assert_eq!(cmds.len(), 2);
            assert!(approx(cmds[0].angular_z, -cmds[1].angular_z));
            assert!(approx(cmds[0].angular_z.abs(), 0.6));
            assert!(cmds.iter().all(|c| approx(c.linear_x, 0.4)));
            saw_positive |= cmds[0].angular_z > 0.0;
            saw_negative |= cmds[0].angular_z < 0.0;
        }
        assert!(saw_positive && saw_negative);
    }

    #[test]
    fn circle_arcs_then_steers() {
        let mut s = StrategySelector::seeded(0);
        let cmds = s.expand(Strategy::Circle, -80.0, 160.0);
        assert_eq!(cmds.len(), 2);
        assert!(approx(cmds[0].linear_x, 0.3));
        assert!(approx(cmds[0].angular_z, 0.8));
        assert!(approx(cmds[0].duration, 0.20));
        assert!(approx(cmds[1].linear_x, 0.5));
        assert!(approx(cmds[1].angular_z, 0.5));
    }

    #[test]
    fn defensive_reverses_and_rotates_then_retreats() {
        let mut s = StrategySelector::seeded(0);
        let cmds = s.expand(Strategy::Defensive, 100.0, 160.0);
        assert_eq!(cmds.len(), 2);
        assert!(cmds[0].linear_x < 0.0 && cmds[0].angular_z != 0.0);
        assert!(cmds[1].linear_x < 0.0);
        assert_eq!(cmds[1].angular_z, 0.0);
    }

    #[test]
    fn custom_tuning_applies() {
        let tuning = StrategyTuning {
            direct_speed: 0.9,
            direct_duration: 0.05,
            ..StrategyTuning::default()
        };
        let mut s = StrategySelector::seeded(0).with_tuning(tuning);
        let cmd = s.expand(Strategy::Direct, 0.0, 160.0)[0];
        assert!(approx(cmd.linear_x, 0.9));
        assert!(approx(cmd.duration, 0.05));
    }

    #[test]
    fn tuning_deserializes_partial_table() {
        let tuning: StrategyTuning = serde_json::from_str(r#"{"zigzag_turn_rate": 0.9}"#).unwrap();
        assert!(approx(tuning.zigzag_turn_rate, 0.9));
        assert!(approx(tuning.direct_speed, 0.5));
    }
}
