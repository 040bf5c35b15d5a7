//! Shared components for the film scan rig.
//!
//! This crate holds everything both the control logic (`telecine`) and the
//! device drivers (`hardware`) need to agree on:
//!
//! - [`rig_interface`] - capability traits for the stepper motors, the gate
//!   breakbeam sensor and the networked frame camera, plus deterministic
//!   in-process doubles for testing transport logic without a rig.
//! - [`rig_config`] - JSON-backed storage for every rig-specific tuning value
//!   (camera URL, GPIO/I2C wiring, overshoot counts, maintenance periods).

pub mod rig_config;
pub mod rig_interface;
