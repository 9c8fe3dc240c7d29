//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Orchestrator (domain)
//! ```
//!
//! Driven adapters (feature intake, actuators, event sinks, config storage)
//! implement these traits.  The [`Orchestrator`](super::service::Orchestrator)
//! consumes them via generics, so the domain core never touches I/O directly.

use crate::config::EngineConfig;
use crate::error::ActuatorError;
use crate::sensors::FeatureVector;

pub use crate::error::ConfigError;

// ───────────────────────────────────────────────────────────────
// Feature port (driven adapter: vision pipeline → domain)
// ───────────────────────────────────────────────────────────────

/// Read-side port: the domain calls this once per tick.
pub trait FeaturePort {
    /// Take the newest vector published since the last call, if any.
    /// Must not block.
    fn latest_features(&mut self) -> Option<FeatureVector>;
}

// ───────────────────────────────────────────────────────────────
// Actuator port (driven adapter: domain → feeder hardware)
// ───────────────────────────────────────────────────────────────

/// Write-side port: the domain calls this to command the feeder.
pub trait ActuatorPort {
    /// Set the feed motor duty in percent. Called every tick with the
    /// current command, so implementations must tolerate repeats.
    fn write_duty(&mut self, duty: f32) -> Result<(), ActuatorError>;

    /// Fire one feed actuation pulse.
    fn request_feed_pulse(&mut self) -> Result<(), ActuatorError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

/// Fan one event stream out to two sinks.
impl<A: EventSink, B: EventSink> EventSink for (A, B) {
    fn emit(&mut self, event: &super::events::AppEvent) {
        self.0.emit(event);
        self.1.emit(event);
    }
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists engine configuration.
///
/// Implementations validate before persisting and after loading. Invalid
/// values are rejected with [`ConfigError::ValidationFailed`], never clamped.
pub trait ConfigPort {
    fn load(&self) -> Result<EngineConfig, ConfigError>;

    fn save(&self, config: &EngineConfig) -> Result<(), ConfigError>;
}
