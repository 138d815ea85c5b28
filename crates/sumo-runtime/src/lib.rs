//! `sumo-runtime` – Decision engine
//!
//! Turns the latest sensor snapshot into motion, once per tick.
//!
//! # Modules
//!
//! - [`strategy`] – [`StrategySelector`][strategy::StrategySelector]:
//!   randomized, seedable choice and retention of an engagement
//!   [`Strategy`][sumo_types::Strategy], and its expansion into motion steps.
//! - [`arbiter`] – [`PriorityArbiter`][arbiter::PriorityArbiter]:
//!   the ordered rule list (boundary avoidance, search, close-range backoff,
//!   engagement) evaluated fresh every tick.
//! - [`control_loop`] – [`ControlLoop`][control_loop::ControlLoop]:
//!   the fixed-period driver that handles shutdown, actuation-failure
//!   escalation and sensor stream health.
//! - [`failure_guard`] – [`ActuationGuard`][failure_guard::ActuationGuard]:
//!   consecutive actuation failure counter.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   installs the global `tracing` subscriber with an optional OTLP span
//!   exporter.
//!
//! # Command path
//!
//! Every command the arbiter plans passes through
//! [`CommandGuard::apply`] before the executor emits it.  [`CommandGuard`]
//! is re-exported here so the wiring code needs no direct dependency on
//! `sumo-kernel`.

pub mod arbiter;
pub mod control_loop;
pub mod failure_guard;
pub mod strategy;
pub mod telemetry;

pub use arbiter::{
    ArbiterConfig, ArbitrationRule, ArbitrationState, CloseRangeManeuver, Decision,
    InvalidationPolicy, ManeuverTuning, PriorityArbiter, TickReport,
};
pub use control_loop::{ControlLoop, ControlLoopConfig, DEFAULT_TICK_PERIOD};
pub use failure_guard::ActuationGuard;
pub use strategy::{StrategySelector, StrategyTuning};
pub use telemetry::{TracerProviderGuard, init_tracing};

pub use sumo_kernel::CommandGuard;
