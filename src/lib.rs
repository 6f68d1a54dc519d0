//! # PID Controller Test Harness
//!
//! Drives a PID controller with a generated setpoint signal, closes the loop through a
//! user-bound feedback function, and records setpoint/input/output into a live series.
//!
//! ## Layout
//! - [`settings`]: validated value objects and the two-phase settings commit.
//! - [`control`]: controller, function slots, signal scheduler and lifecycle.
//! - [`utils`]: series buffer, scheduler metrics, CSV export and configuration.
//! - [`session`]: command dispatch for a front end.

pub mod error;
pub mod settings;
pub mod control;
pub mod utils;
pub mod session;
