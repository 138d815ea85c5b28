//! `sumo-perception` – Sensing layer.
//!
//! Holds what the robot currently believes about the ring and the opponent.
//! Segmentation and scan preprocessing happen upstream; this crate receives
//! their summaries.
//!
//! # Modules
//!
//! - [`sensor_state`] – [`SensorState`][sensor_state::SensorState]: the
//!   synchronized latest-value store written by the vision and range
//!   producers and read once per control tick as a
//!   [`SensorSnapshot`][sensor_state::SensorSnapshot].

pub mod sensor_state;

pub use sensor_state::{SensorSnapshot, SensorState};
