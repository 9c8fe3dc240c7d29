//! Inbound commands to the orchestrator.
//!
//! These represent actions requested by the outside world (operator
//! console, supervisor process, tests) that the
//! [`Orchestrator`](super::service::Orchestrator) interprets and acts upon.

use serde::Deserialize;

use crate::config::ConfigPatch;

/// Commands that external adapters can send into the engine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum EngineCommand {
    /// Leave SAFE and restart the feed cycle. Rejected while the fault that
    /// caused SAFE is still present.
    Reset,

    /// Force baseline duty and SAFE on the spot.
    Stop,

    /// Validate and apply a partial configuration change between ticks.
    UpdateConfig(ConfigPatch),
}
