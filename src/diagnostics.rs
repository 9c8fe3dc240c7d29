//! Runtime counters.
//!
//! Monotonic tallies the orchestrator bumps as it runs. They ride along in
//! every [`EngineSnapshot`](crate::app::service::EngineSnapshot) and in the
//! periodic status report printed by the host runner.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeCounters {
    pub ticks: u64,
    /// Completed FEEDING→EVALUATING→STABLE rounds.
    pub cycles: u64,
    pub feed_pulses: u64,
    /// PI updates actually applied (skipped cycles excluded).
    pub controller_updates: u64,
    pub fresh_frames: u64,
    pub degraded_frames: u64,
    pub anomaly_trips: u32,
    pub actuator_errors: u32,
    pub resets: u32,
    pub config_updates: u32,
}

impl RuntimeCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of fresh frames that failed validation.
    pub fn degraded_ratio(&self) -> Option<f32> {
        (self.fresh_frames > 0).then(|| self.degraded_frames as f32 / self.fresh_frames as f32)
    }
}

impl core::fmt::Display for RuntimeCounters {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "ticks={} cycles={} pulses={} updates={} frames={} degraded={} trips={} actuator_errors={} resets={}",
            self.ticks,
            self.cycles,
            self.feed_pulses,
            self.controller_updates,
            self.fresh_frames,
            self.degraded_frames,
            self.anomaly_trips,
            self.actuator_errors,
            self.resets,
        )
    }
}
