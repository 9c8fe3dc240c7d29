//! Unified error types for the feeding control engine.
//!
//! A single `Error` enum that every subsystem converts into keeps the
//! orchestrator's error handling uniform.  Feature, timeout and actuator
//! errors are `Copy` so they pass through the monitor and FSM without
//! allocation.

use core::fmt;

use crate::safety::AnomalyKind;

// ---------------------------------------------------------------------------
// Top-level engine error
// ---------------------------------------------------------------------------

/// Every fallible engine operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Error {
    /// A feature vector failed validation.
    Feature(InvalidFeatureError),
    /// No fresh feature vector arrived within the staleness window.
    Timeout(TimeoutError),
    /// An actuator write was rejected.
    Actuator(ActuatorError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
    /// A control command could not be applied.
    Command(CommandError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Feature(e) => write!(f, "feature: {e}"),
            Self::Timeout(e) => write!(f, "timeout: {e}"),
            Self::Actuator(e) => write!(f, "actuator: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Command(e) => write!(f, "command: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Feature errors
// ---------------------------------------------------------------------------

/// Identifies one field of a [`FeatureVector`](crate::sensors::FeatureVector).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum FeatureField {
    Me,
    Rsi,
    Pop,
    Flow,
}

impl fmt::Display for FeatureField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Me => write!(f, "ME"),
            Self::Rsi => write!(f, "RSI"),
            Self::Pop => write!(f, "POP"),
            Self::Flow => write!(f, "FLOW"),
        }
    }
}

/// Why a feature field was rejected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureFault {
    /// NaN, infinite, or absent on the wire.
    NotFinite,
    /// Outside `[0, max]`.
    OutOfRange { value: f32, max: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvalidFeatureError {
    pub field: FeatureField,
    pub fault: FeatureFault,
}

impl fmt::Display for InvalidFeatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fault {
            FeatureFault::NotFinite => write!(f, "{} is missing or not finite", self.field),
            FeatureFault::OutOfRange { value, max } => {
                write!(f, "{} = {value} outside [0, {max}]", self.field)
            }
        }
    }
}

impl From<InvalidFeatureError> for Error {
    fn from(e: InvalidFeatureError) -> Self {
        Self::Feature(e)
    }
}

// ---------------------------------------------------------------------------
// Timeout errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutError {
    /// Age of the freshest feature vector at detection time.
    pub age_us: u64,
}

impl fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no fresh features for {} ms", self.age_us / 1000)
    }
}

impl From<TimeoutError> for Error {
    fn from(e: TimeoutError) -> Self {
        Self::Timeout(e)
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ActuatorError {
    /// PWM duty-cycle write failed.
    PwmWriteFailed,
    /// Feed trigger output could not be pulsed.
    FeedPulseFailed,
    /// The actuator link is down.
    Disconnected,
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PwmWriteFailed => write!(f, "PWM write failed"),
            Self::FeedPulseFailed => write!(f, "feed pulse failed"),
            Self::Disconnected => write!(f, "actuator disconnected"),
        }
    }
}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        Self::Actuator(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration validation and [`ConfigPort`](crate::app::ports::ConfigPort)
/// operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage.
    NotFound,
    /// Stored config failed deserialization.
    Corrupted,
    /// A field failed range or relationship validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Command errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// Reset refused because the fault that caused SAFE is still present.
    ResetRejected(AnomalyKind),
    /// A config patch failed validation and was not applied.
    Config(ConfigError),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResetRejected(kind) => write!(f, "reset rejected: {kind} still active"),
            Self::Config(e) => write!(f, "config update rejected: {e}"),
        }
    }
}

impl From<ConfigError> for CommandError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<CommandError> for Error {
    fn from(e: CommandError) -> Self {
        Self::Command(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Engine-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
