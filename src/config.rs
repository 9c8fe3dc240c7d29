//! Engine configuration parameters
//!
//! All tunable parameters for the feeding control engine. A config is
//! validated as a whole before the engine accepts it; runtime edits arrive
//! as a [`ConfigPatch`] that is merged into a candidate copy and validated
//! before the swap, so a rejected patch leaves nothing half-applied.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Largest rolling validation window the recorder can hold.
pub const VALIDATION_WINDOW_MAX: usize = 1024;

/// How the band error drives the PWM output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Polarity {
    /// High activity raises feed rate.
    #[default]
    Direct,
    /// High activity throttles the feeder.
    Reverse,
}

impl Polarity {
    pub fn sign(self) -> f32 {
        match self {
            Self::Direct => 1.0,
            Self::Reverse => -1.0,
        }
    }
}

/// Core engine configuration
///
/// Fields missing from a serialized config take their default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // --- Fusion weights ---
    /// RSI weight (alpha)
    pub alpha: f32,
    /// POP weight (beta)
    pub beta: f32,
    /// FLOW weight (gamma)
    pub gamma: f32,
    /// ME weight (delta), subtracted
    pub delta: f32,

    // --- Feature scale ---
    /// Declared upper bound of the raw ME feature
    pub me_max: f32,
    /// Declared upper bound of the raw RSI feature
    pub rsi_max: f32,
    /// Declared upper bound of the raw POP feature
    pub pop_max: f32,
    /// Declared upper bound of the raw FLOW feature
    pub flow_max: f32,

    // --- Activity band ---
    /// Upper edge of the dead band
    pub h_hi: f32,
    /// Lower edge of the dead band
    pub h_lo: f32,

    // --- PI gains ---
    pub kp: f32,
    pub ki: f32,
    /// Magnitude cap on the integral accumulator
    pub max_integral: f32,
    pub polarity: Polarity,

    // --- Cycle timing ---
    /// FEEDING dwell (seconds)
    pub t_feed_secs: f32,
    /// EVALUATING dwell (seconds)
    pub t_eval_secs: f32,
    /// STABLE dwell (seconds)
    pub t_stable_secs: f32,
    /// Host runner tick cadence (milliseconds)
    pub tick_interval_ms: u32,

    // --- PWM ---
    /// Lower duty bound (percent)
    pub pwm_min: f32,
    /// Upper duty bound (percent)
    pub pwm_max: f32,
    /// Duty commanded in SAFE and at startup (percent)
    pub pwm_baseline: f32,
    /// Largest duty change per controller update (percent points)
    pub max_slew: f32,

    // --- Anomaly supervision ---
    /// Feature age that trips the fallback (seconds)
    pub staleness_timeout_secs: f32,
    /// Consecutive degraded estimates that trip the fallback
    pub degraded_streak_limit: u32,
    /// Minimum fresh-frame rate; 0 disables the check
    pub min_frame_rate_hz: f32,
    /// How long the frame rate may stay low before tripping (seconds)
    pub low_frame_rate_hold_secs: f32,
    /// Sustained low activity before the evaluation window is stretched (seconds)
    pub low_activity_secs: f32,
    /// Multiplier applied to `t_eval_secs` while activity stays low
    pub eval_extension_factor: f32,

    // --- Validation ---
    /// Rolling window size (samples)
    pub window_size: u16,
    /// Expected time for activity to drop below `h_lo` after a feed pulse (seconds)
    pub t_disappear_secs: f32,
    pub target_correlation: f32,
    /// Peak-to-peak PWM limit (percent points)
    pub target_oscillation_pp: f32,
    pub target_hit_rate: f32,
    /// Fault onset to SAFE limit (seconds)
    pub target_fallback_latency_secs: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            // Fusion weights
            alpha: 0.4,
            beta: 0.3,
            gamma: 0.2,
            delta: 0.1,

            // Features arrive pre-normalized
            me_max: 1.0,
            rsi_max: 1.0,
            pop_max: 1.0,
            flow_max: 1.0,

            // Activity band
            h_hi: 0.65,
            h_lo: 0.35,

            // PI gains
            kp: 15.0,
            ki: 2.0,
            max_integral: 50.0,
            polarity: Polarity::Direct,

            // Cycle timing
            t_feed_secs: 0.6,
            t_eval_secs: 3.0,
            t_stable_secs: 1.0,
            tick_interval_ms: 33, // ~30 fps

            // PWM
            pwm_min: 20.0,
            pwm_max: 70.0,
            pwm_baseline: 30.0,
            max_slew: 10.0,

            // Anomaly supervision
            staleness_timeout_secs: 0.5,
            degraded_streak_limit: 2,
            min_frame_rate_hz: 10.0,
            low_frame_rate_hold_secs: 1.0,
            low_activity_secs: 30.0,
            eval_extension_factor: 2.0,

            // Validation
            window_size: 200,
            t_disappear_secs: 4.0,
            target_correlation: 0.75,
            target_oscillation_pp: 15.0,
            target_hit_rate: 0.70,
            target_fallback_latency_secs: 1.0,
        }
    }
}

/// Convert a duration in seconds to whole microseconds.
pub fn micros(secs: f32) -> u64 {
    (f64::from(secs.max(0.0)) * 1_000_000.0) as u64
}

fn finite_non_negative(v: f32) -> bool {
    v.is_finite() && v >= 0.0
}

fn finite_positive(v: f32) -> bool {
    v.is_finite() && v > 0.0
}

impl EngineConfig {
    /// Check every range and cross-field relationship.
    ///
    /// Returns the first violation found. Values are never clamped into
    /// range; an out-of-range config is refused outright.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if ![self.alpha, self.beta, self.gamma, self.delta]
            .into_iter()
            .all(finite_non_negative)
        {
            return Err(ConfigError::ValidationFailed(
                "fusion weights must be finite and >= 0",
            ));
        }
        if ![self.me_max, self.rsi_max, self.pop_max, self.flow_max]
            .into_iter()
            .all(finite_positive)
        {
            return Err(ConfigError::ValidationFailed(
                "feature maxima must be finite and > 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.h_lo) || !(0.0..=1.0).contains(&self.h_hi) {
            return Err(ConfigError::ValidationFailed("h_lo and h_hi must be 0.0–1.0"));
        }
        if self.h_lo >= self.h_hi {
            return Err(ConfigError::ValidationFailed("h_lo must be < h_hi"));
        }
        if !finite_non_negative(self.kp) || !finite_non_negative(self.ki) {
            return Err(ConfigError::ValidationFailed("kp and ki must be finite and >= 0"));
        }
        if !finite_positive(self.max_integral) {
            return Err(ConfigError::ValidationFailed("max_integral must be > 0"));
        }
        if ![self.t_feed_secs, self.t_eval_secs, self.t_stable_secs]
            .into_iter()
            .all(finite_positive)
        {
            return Err(ConfigError::ValidationFailed("cycle durations must be > 0"));
        }
        if !(1..=1000).contains(&self.tick_interval_ms) {
            return Err(ConfigError::ValidationFailed("tick_interval_ms must be 1–1000"));
        }
        if !(0.0..=100.0).contains(&self.pwm_min) || !(0.0..=100.0).contains(&self.pwm_max) {
            return Err(ConfigError::ValidationFailed("pwm_min and pwm_max must be 0–100"));
        }
        if self.pwm_min > self.pwm_max {
            return Err(ConfigError::ValidationFailed("pwm_min must be <= pwm_max"));
        }
        if !(self.pwm_min..=self.pwm_max).contains(&self.pwm_baseline) {
            return Err(ConfigError::ValidationFailed(
                "pwm_baseline must lie within pwm_min..=pwm_max",
            ));
        }
        if !finite_positive(self.max_slew) {
            return Err(ConfigError::ValidationFailed("max_slew must be > 0"));
        }
        if !finite_positive(self.staleness_timeout_secs) || self.staleness_timeout_secs > 1.0 {
            return Err(ConfigError::ValidationFailed(
                "staleness_timeout_secs must be > 0 and <= 1.0",
            ));
        }
        if self.tick_interval_ms as f32 / 1000.0 >= self.staleness_timeout_secs {
            return Err(ConfigError::ValidationFailed(
                "tick_interval_ms must be shorter than staleness_timeout_secs",
            ));
        }
        if self.degraded_streak_limit == 0 {
            return Err(ConfigError::ValidationFailed("degraded_streak_limit must be >= 1"));
        }
        if !finite_non_negative(self.min_frame_rate_hz) {
            return Err(ConfigError::ValidationFailed("min_frame_rate_hz must be >= 0"));
        }
        if !finite_positive(self.low_frame_rate_hold_secs) {
            return Err(ConfigError::ValidationFailed("low_frame_rate_hold_secs must be > 0"));
        }
        if !finite_positive(self.low_activity_secs) {
            return Err(ConfigError::ValidationFailed("low_activity_secs must be > 0"));
        }
        if !(1.0..=10.0).contains(&self.eval_extension_factor) {
            return Err(ConfigError::ValidationFailed(
                "eval_extension_factor must be 1.0–10.0",
            ));
        }
        if !(2..=VALIDATION_WINDOW_MAX).contains(&usize::from(self.window_size)) {
            return Err(ConfigError::ValidationFailed("window_size must be 2–1024"));
        }
        if !finite_positive(self.t_disappear_secs) {
            return Err(ConfigError::ValidationFailed("t_disappear_secs must be > 0"));
        }
        if !(-1.0..=1.0).contains(&self.target_correlation)
            || !(0.0..=1.0).contains(&self.target_hit_rate)
            || !finite_non_negative(self.target_oscillation_pp)
            || !finite_positive(self.target_fallback_latency_secs)
        {
            return Err(ConfigError::ValidationFailed("validation targets out of range"));
        }
        Ok(())
    }

    /// Copy of `self` with every field present in `patch` overwritten.
    /// The result is not validated.
    pub fn merged(&self, patch: &ConfigPatch) -> Self {
        let mut next = self.clone();
        macro_rules! apply {
            ($($field:ident),* $(,)?) => {
                $(if let Some(v) = patch.$field { next.$field = v; })*
            };
        }
        apply!(
            alpha, beta, gamma, delta,
            me_max, rsi_max, pop_max, flow_max,
            h_hi, h_lo,
            kp, ki, max_integral, polarity,
            t_feed_secs, t_eval_secs, t_stable_secs, tick_interval_ms,
            pwm_min, pwm_max, pwm_baseline, max_slew,
            staleness_timeout_secs, degraded_streak_limit, min_frame_rate_hz,
            low_frame_rate_hold_secs, low_activity_secs, eval_extension_factor,
            window_size, t_disappear_secs, target_correlation,
            target_oscillation_pp, target_hit_rate, target_fallback_latency_secs,
        );
        next
    }
}

/// Partial configuration update. Absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    pub alpha: Option<f32>,
    pub beta: Option<f32>,
    pub gamma: Option<f32>,
    pub delta: Option<f32>,
    pub me_max: Option<f32>,
    pub rsi_max: Option<f32>,
    pub pop_max: Option<f32>,
    pub flow_max: Option<f32>,
    pub h_hi: Option<f32>,
    pub h_lo: Option<f32>,
    pub kp: Option<f32>,
    pub ki: Option<f32>,
    pub max_integral: Option<f32>,
    pub polarity: Option<Polarity>,
    pub t_feed_secs: Option<f32>,
    pub t_eval_secs: Option<f32>,
    pub t_stable_secs: Option<f32>,
    pub tick_interval_ms: Option<u32>,
    pub pwm_min: Option<f32>,
    pub pwm_max: Option<f32>,
    pub pwm_baseline: Option<f32>,
    pub max_slew: Option<f32>,
    pub staleness_timeout_secs: Option<f32>,
    pub degraded_streak_limit: Option<u32>,
    pub min_frame_rate_hz: Option<f32>,
    pub low_frame_rate_hold_secs: Option<f32>,
    pub low_activity_secs: Option<f32>,
    pub eval_extension_factor: Option<f32>,
    pub window_size: Option<u16>,
    pub t_disappear_secs: Option<f32>,
    pub target_correlation: Option<f32>,
    pub target_oscillation_pp: Option<f32>,
    pub target_hit_rate: Option<f32>,
    pub target_fallback_latency_secs: Option<f32>,
}
