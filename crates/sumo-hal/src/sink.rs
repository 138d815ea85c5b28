//! Generic `VelocitySink` trait for whatever accepts drive commands: a
//! motor controller, a `/cmd_vel` publisher, a serial link, a test recorder.
//!
//! The [`MotionPrimitiveExecutor`][crate::executor::MotionPrimitiveExecutor]
//! only ever talks to the trait, so the transport can be swapped without
//! touching the decision logic.

use sumo_types::{SumoError, Twist};

/// Destination for emitted velocity commands.
pub trait VelocitySink: Send {
    /// Stable identifier used in logs and errors, e.g. `"cmd_vel"`.
    fn id(&self) -> &str;

    /// Deliver one velocity command.
    ///
    /// # Errors
    ///
    /// Returns [`SumoError::Actuation`] if the command could not be handed to
    /// the actuation layer (link down, buffer full, driver fault).
    fn send(&mut self, twist: Twist) -> Result<(), SumoError>;
}

impl<S: VelocitySink + ?Sized> VelocitySink for Box<S> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn send(&mut self, twist: Twist) -> Result<(), SumoError> {
        (**self).send(twist)
    }
}
