//! `sumo-hal` – Actuation layer
//!
//! Everything between a decided [`RobotCommand`][sumo_types::RobotCommand]
//! and the wheels.
//!
//! # Modules
//!
//! - [`sink`] – [`VelocitySink`][sink::VelocitySink]: the trait every
//!   command transport implements.
//! - [`clock`] – [`Clock`][clock::Clock] and [`SystemClock`][clock::SystemClock]:
//!   injectable time so that emission timing is testable.
//! - [`executor`] – [`MotionPrimitiveExecutor`][executor::MotionPrimitiveExecutor]:
//!   fixed-cadence, fail-stop emission of bounded motion primitives, plus the
//!   shared [`ShutdownSignal`][executor::ShutdownSignal].
//! - [`sim`] – recording sink and virtual clock for headless tests.

pub mod clock;
pub mod executor;
pub mod sim;
pub mod sink;

pub use clock::{Clock, SystemClock};
pub use executor::{
    DEFAULT_EMISSION_RATE_HZ, ExecutionReport, MAX_EMISSION_RATE_HZ, MotionPrimitiveExecutor,
    ShutdownSignal,
};
pub use sink::VelocitySink;
