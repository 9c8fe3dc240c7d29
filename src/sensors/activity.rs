//! Activity index fusion.
//!
//! H = α·RSI + β·POP + γ·FLOW − δ·ME, each feature first normalized by its
//! declared maximum, the sum clamped to [0, 1].
//!
//! A frame that fails validation does not stop the loop: the estimator
//! hands back the last good H flagged as degraded and counts the streak.
//! The anomaly monitor decides when a streak is long enough to trip.

use log::warn;

use crate::config::EngineConfig;
use crate::error::{FeatureFault, FeatureField, InvalidFeatureError};

use super::FeatureVector;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub alpha: f32,
    pub beta: f32,
    pub gamma: f32,
    pub delta: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureScale {
    pub me_max: f32,
    pub rsi_max: f32,
    pub pop_max: f32,
    pub flow_max: f32,
}

/// Result of one estimator call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub h: f32,
    /// Set when the frame was rejected and `h` is the held value.
    pub fault: Option<InvalidFeatureError>,
}

impl Estimate {
    pub fn is_degraded(&self) -> bool {
        self.fault.is_some()
    }
}

pub struct ActivityEstimator {
    weights: FusionWeights,
    scale: FeatureScale,
    last_good: f32,
    degraded_streak: u32,
}

impl ActivityEstimator {
    pub fn new(config: &EngineConfig) -> Self {
        let mut est = Self {
            weights: FusionWeights {
                alpha: 0.0,
                beta: 0.0,
                gamma: 0.0,
                delta: 0.0,
            },
            scale: FeatureScale {
                me_max: 1.0,
                rsi_max: 1.0,
                pop_max: 1.0,
                flow_max: 1.0,
            },
            last_good: 0.0,
            degraded_streak: 0,
        };
        est.retune(config);
        est
    }

    /// Pick up new weights and feature ranges. History is kept.
    pub fn retune(&mut self, config: &EngineConfig) {
        self.weights = FusionWeights {
            alpha: config.alpha,
            beta: config.beta,
            gamma: config.gamma,
            delta: config.delta,
        };
        self.scale = FeatureScale {
            me_max: config.me_max,
            rsi_max: config.rsi_max,
            pop_max: config.pop_max,
            flow_max: config.flow_max,
        };
    }

    /// Deterministic fusion with no bookkeeping.
    pub fn fuse(&self, fv: &FeatureVector) -> Result<f32, InvalidFeatureError> {
        let me = normalize(FeatureField::Me, fv.me, self.scale.me_max)?;
        let rsi = normalize(FeatureField::Rsi, fv.rsi, self.scale.rsi_max)?;
        let pop = normalize(FeatureField::Pop, fv.pop, self.scale.pop_max)?;
        let flow = normalize(FeatureField::Flow, fv.flow, self.scale.flow_max)?;

        let w = &self.weights;
        let h = w.alpha * rsi + w.beta * pop + w.gamma * flow - w.delta * me;
        Ok(h.clamp(0.0, 1.0))
    }

    /// Fuse a frame, falling back to the last good H on invalid input.
    pub fn estimate(&mut self, fv: &FeatureVector) -> Estimate {
        match self.fuse(fv) {
            Ok(h) => {
                self.last_good = h;
                self.degraded_streak = 0;
                Estimate { h, fault: None }
            }
            Err(e) => {
                self.degraded_streak = self.degraded_streak.saturating_add(1);
                warn!(
                    "ESTIMATOR: frame @{}us rejected ({e}), holding H={:.3} (streak {})",
                    fv.timestamp_us, self.last_good, self.degraded_streak
                );
                Estimate {
                    h: self.last_good,
                    fault: Some(e),
                }
            }
        }
    }

    pub fn last_good(&self) -> f32 {
        self.last_good
    }

    /// Consecutive degraded estimates since the last good frame.
    pub fn degraded_streak(&self) -> u32 {
        self.degraded_streak
    }

    pub fn clear_streak(&mut self) {
        self.degraded_streak = 0;
    }
}

fn normalize(field: FeatureField, value: f32, max: f32) -> Result<f32, InvalidFeatureError> {
    if !value.is_finite() {
        return Err(InvalidFeatureError {
            field,
            fault: FeatureFault::NotFinite,
        });
    }
    if !(0.0..=max).contains(&value) {
        return Err(InvalidFeatureError {
            field,
            fault: FeatureFault::OutOfRange { value, max },
        });
    }
    Ok(value / max)
}
