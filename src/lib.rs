//! AquaFeed feeding control engine.
//!
//! Turns per-frame visual features of a fish school into a feed motor duty
//! cycle: features are fused into an activity index, a four-state feeding
//! cycle samples it, a PI controller maps it to PWM, and an anomaly monitor
//! drops the feeder to a safe baseline when the inputs or the actuator go
//! bad.  All I/O sits behind the port traits in [`app::ports`].

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod control;
pub mod diagnostics;
pub mod error;
pub mod fsm;
pub mod safety;
pub mod sensors;
pub mod validation;
