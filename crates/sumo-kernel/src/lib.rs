//! `sumo-kernel` – Safety checks
//!
//! Enforces rules; makes no decisions.  Everything the arbiter plans passes
//! through here before it reaches the executor.
//!
//! # Modules
//!
//! - [`command_guard`] – [`CommandGuard`][command_guard::CommandGuard]:
//!   an ordered rule chain that rejects non-finite commands and clamps
//!   velocities to configured caps.
//! - [`watchdog`] – [`StreamWatchdog`][watchdog::StreamWatchdog]:
//!   tracks the age of each sensor stream and logs when a producer goes
//!   quiet or comes back.

pub mod command_guard;
pub mod watchdog;

pub use command_guard::{CommandGuard, CommandRule, FiniteCommandRule, SpeedCapRule};
pub use watchdog::{DEFAULT_STREAM_TIMEOUT, StreamHealth, StreamWatchdog};
