//! Application core: pure domain logic, zero I/O.
//!
//! The [`service::Orchestrator`] ties the estimator, state machine,
//! controller, monitor and validation recorder into one control tick.
//! All interaction with the outside world happens through **port traits**
//! defined in [`ports`], keeping this layer fully testable without real
//! cameras or motors.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
