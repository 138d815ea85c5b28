//! [`CommandGuard`] – last safety check before a command is executed.
//!
//! Every [`RobotCommand`] the arbiter plans passes through
//! [`CommandGuard::apply`] before it reaches the executor.  Registered
//! [`CommandRule`]s run in insertion order; each may rewrite the command
//! (e.g. clamp a velocity) or reject it outright.  The first rejection wins
//! and the command is not executed.
//!
//! Built-in rules:
//! - [`FiniteCommandRule`] – rejects NaN or infinite velocities.
//! - [`SpeedCapRule`] – clamps linear and angular velocities to caps.

use sumo_types::{RobotCommand, SumoError};
use tracing::debug;

// ────────────────────────────────────────────────────────────────────────────
// Rule trait
// ────────────────────────────────────────────────────────────────────────────

/// A single invariant applied to outgoing commands.
pub trait CommandRule: Send + Sync {
    /// Name used in rejection messages.
    fn name(&self) -> &str;

    /// Return the (possibly adjusted) command, or
    /// [`SumoError::InvalidCommand`] if it must not be executed.
    fn apply(&self, command: RobotCommand) -> Result<RobotCommand, SumoError>;
}

// ────────────────────────────────────────────────────────────────────────────
// CommandGuard
// ────────────────────────────────────────────────────────────────────────────

/// Ordered rule chain applied to every outgoing [`RobotCommand`].
///
/// # Example
///
/// ```
/// use sumo_kernel::command_guard::CommandGuard;
/// use sumo_types::RobotCommand;
///
/// let guard = CommandGuard::standard(1.0, 2.0);
///
/// let fast = RobotCommand::drive(3.0, -5.0, 0.1);
/// let capped = guard.apply(fast).unwrap();
/// assert_eq!(capped.linear_x, 1.0);
/// assert_eq!(capped.angular_z, -2.0);
///
/// assert!(guard.apply(RobotCommand::drive(f32::NAN, 0.0, 0.1)).is_err());
/// ```
#[derive(Default)]
pub struct CommandGuard {
    rules: Vec<Box<dyn CommandRule>>,
}

impl CommandGuard {
    /// An empty guard that passes every command through unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    /// The default chain: finite check, then speed caps.
    pub fn standard(max_linear: f32, max_angular: f32) -> Self {
        let mut guard = Self::new();
        guard.add_rule(Box::new(FiniteCommandRule));
        guard.add_rule(Box::new(SpeedCapRule {
            max_linear,
            max_angular,
        }));
        guard
    }

    /// Register a rule.  Rules run in insertion order.
    pub fn add_rule(&mut self, rule: Box<dyn CommandRule>) {
        self.rules.push(rule);
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Run `command` through every rule.
    pub fn apply(&self, command: RobotCommand) -> Result<RobotCommand, SumoError> {
        self.rules.iter().try_fold(command, |cmd, rule| rule.apply(cmd))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in rules
// ────────────────────────────────────────────────────────────────────────────

/// Rejects commands carrying a NaN or infinite velocity.  A non-finite
/// duration is rewritten to zero, which the executor treats as "stop only".
pub struct FiniteCommandRule;

impl CommandRule for FiniteCommandRule {
    fn name(&self) -> &str {
        "finite"
    }

    fn apply(&self, mut command: RobotCommand) -> Result<RobotCommand, SumoError> {
        let fields = [
            ("linear_x", command.linear_x),
            ("linear_y", command.linear_y),
            ("angular_z", command.angular_z),
        ];
        if let Some((field, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(SumoError::InvalidCommand(format!(
                "{field} is {value}; refusing non-finite velocity"
            )));
        }
        if !command.duration.is_finite() {
            command.duration = 0.0;
        }
        Ok(command)
    }
}

/// Clamps `linear_x`/`linear_y` to `±max_linear` and `angular_z` to
/// `±max_angular`.
pub struct SpeedCapRule {
    /// Maximum absolute linear velocity (m/s).
    pub max_linear: f32,
    /// Maximum absolute angular velocity (rad/s).
    pub max_angular: f32,
}

impl CommandRule for SpeedCapRule {
    fn name(&self) -> &str {
        "speed_cap"
    }

    fn apply(&self, command: RobotCommand) -> Result<RobotCommand, SumoError> {
        let linear = cap_magnitude(self.max_linear);
        let angular = cap_magnitude(self.max_angular);
        let capped = RobotCommand {
            linear_x: command.linear_x.clamp(-linear, linear),
            linear_y: command.linear_y.clamp(-linear, linear),
            angular_z: command.angular_z.clamp(-angular, angular),
            duration: command.duration,
        };
        if capped != command {
            debug!(?command, ?capped, "speed cap applied");
        }
        Ok(capped)
    }
}

// A negative cap bounds by its magnitude; NaN allows no motion at all.
fn cap_magnitude(cap: f32) -> f32 {
    if cap.is_nan() { 0.0 } else { cap.abs() }
}
