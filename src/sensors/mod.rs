//! Vision feature intake.
//!
//! The camera pipeline (outside this crate) condenses each frame into a
//! [`FeatureVector`]. [`activity::ActivityEstimator`] fuses it into the
//! scalar activity index H that the rest of the engine runs on.

pub mod activity;

use serde::{Deserialize, Serialize};

fn missing() -> f32 {
    f32::NAN
}

/// One frame's worth of visual features.
///
/// Fields absent from the wire decode as NaN so that the estimator can
/// reject them the same way it rejects any other non-finite input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Motion energy
    #[serde(rename = "ME", default = "missing")]
    pub me: f32,
    /// Ripple spectral index
    #[serde(rename = "RSI", default = "missing")]
    pub rsi: f32,
    /// Bubble/pop event count
    #[serde(rename = "POP", default = "missing")]
    pub pop: f32,
    /// Optical-flow inconsistency
    #[serde(rename = "FLOW", default = "missing")]
    pub flow: f32,
    /// Capture time on the engine's monotonic clock (microseconds)
    #[serde(default)]
    pub timestamp_us: u64,
}

impl FeatureVector {
    pub fn new(me: f32, rsi: f32, pop: f32, flow: f32, timestamp_us: u64) -> Self {
        Self {
            me,
            rsi,
            pop,
            flow,
            timestamp_us,
        }
    }
}
