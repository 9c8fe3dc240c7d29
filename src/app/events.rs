//! Outbound application events.
//!
//! The [`Orchestrator`](super::service::Orchestrator) emits these through
//! the [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log lines, JSON records on stdout, a
//! dashboard feed.

use serde::Serialize;

use crate::control::pi::ControllerState;
use crate::fsm::StateId;
use crate::safety::AnomalyRecord;
use crate::sensors::FeatureVector;

/// Most warnings a single tick can raise.
pub const MAX_TICK_WARNINGS: usize = 4;

/// Non-fatal conditions noticed during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TickWarning {
    /// No new feature vector was available.
    NoFreshFeatures,
    /// The vector failed validation; H is the held value.
    DegradedFrame,
    /// Evaluation window stretched for sustained low activity.
    EvalExtended,
    /// The controller's raw demand was outside the PWM bounds.
    Saturated,
}

/// Per-tick log record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickRecord {
    pub timestamp_us: u64,
    pub state: StateId,
    /// Activity index in force after this tick (held value if degraded).
    pub h: f32,
    /// Duty commanded on this tick.
    pub pwm: f32,
    /// The fresh vector consumed this tick, if any.
    pub features: Option<FeatureVector>,
    pub warnings: heapless::Vec<TickWarning, MAX_TICK_WARNINGS>,
}

/// Structured events emitted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AppEvent {
    /// One control tick finished.
    Tick(TickRecord),

    /// The FSM moved between states.
    StateChanged { from: StateId, to: StateId },

    /// The controller consumed an H report and issued a new duty.
    ControllerUpdated {
        h_eval: f32,
        pwm: f32,
        state: ControllerState,
    },

    /// The anomaly monitor latched a fault and forced SAFE.
    AnomalyTripped(AnomalyRecord),

    /// The engine started (carries initial state).
    Started(StateId),

    /// An explicit reset cleared SAFE.
    Reset,

    /// An operator stop forced SAFE.
    Stopped,

    /// A runtime config patch was validated and applied.
    ConfigApplied,
}
