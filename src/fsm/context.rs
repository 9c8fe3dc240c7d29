//! Shared context passed to every FSM handler.
//!
//! The orchestrator writes inputs (clock, latest H, fresh sample) before
//! each tick and reads the outputs (feed pulse request, H report, PWM
//! command) after it. Handlers never touch ports directly.

use crate::config::EngineConfig;

// ---------------------------------------------------------------------------
// Evaluation window
// ---------------------------------------------------------------------------

/// Time-weighted mean of H over one EVALUATING dwell.
///
/// Each sample is held until the next one arrives (zero-order hold); the
/// last sample is held until the window closes.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalWindow {
    weighted_sum: f64,
    total_us: u64,
    last: Option<(u64, f32)>,
    samples: u32,
}

impl EvalWindow {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn push(&mut self, t_us: u64, h: f32) {
        if let Some((t0, h0)) = self.last {
            self.accumulate(t_us.saturating_sub(t0), h0);
        }
        self.last = Some((t_us, h));
        self.samples += 1;
    }

    /// Close the window at `t_end_us`. `None` when no sample was taken.
    pub fn close(&mut self, t_end_us: u64) -> Option<f32> {
        let (t0, h0) = self.last?;
        self.accumulate(t_end_us.saturating_sub(t0), h0);
        let mean = if self.total_us == 0 {
            h0
        } else {
            (self.weighted_sum / self.total_us as f64) as f32
        };
        self.clear();
        Some(mean)
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    fn accumulate(&mut self, dt_us: u64, h: f32) {
        self.weighted_sum += f64::from(h) * dt_us as f64;
        self.total_us += dt_us;
    }
}

// ---------------------------------------------------------------------------
// Cycle outputs (written by state handlers; consumed by the orchestrator)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct CycleCommands {
    /// Duty the actuator should hold (percent).
    pub pwm: f32,
    /// One feed pulse requested on FEEDING entry.
    pub feed_pulse: bool,
    /// Representative H reported when EVALUATING exits.
    pub h_eval: Option<f32>,
}

// ---------------------------------------------------------------------------
// Dwell times
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct CycleTiming {
    pub feed_secs: f32,
    /// Effective EVALUATING dwell, including any low-activity extension.
    pub eval_secs: f32,
    pub stable_secs: f32,
}

// ---------------------------------------------------------------------------
// FsmContext
// ---------------------------------------------------------------------------

pub struct FsmContext {
    // -- Timing --
    /// Timestamp of the current tick (microseconds).
    pub now_us: u64,
    /// Timestamp at which the current state was entered.
    pub state_entered_us: u64,
    pub timing: CycleTiming,

    // -- Inputs --
    /// Latest activity index (held value when degraded).
    pub activity: f32,
    /// H from a fresh feature vector this tick, if any.
    pub sample: Option<f32>,
    pub window: EvalWindow,

    // -- Outputs --
    pub commands: CycleCommands,
    pub pwm_baseline: f32,
    /// FEEDING→EVALUATING→STABLE rounds finished.
    pub cycles_completed: u64,
}

impl FsmContext {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            now_us: 0,
            state_entered_us: 0,
            timing: CycleTiming {
                feed_secs: config.t_feed_secs,
                eval_secs: config.t_eval_secs,
                stable_secs: config.t_stable_secs,
            },
            activity: 0.0,
            sample: None,
            window: EvalWindow::default(),
            commands: CycleCommands {
                pwm: config.pwm_baseline,
                feed_pulse: false,
                h_eval: None,
            },
            pwm_baseline: config.pwm_baseline,
            cycles_completed: 0,
        }
    }

    /// Seconds elapsed since the current state was entered.
    pub fn secs_in_state(&self) -> f32 {
        self.now_us.saturating_sub(self.state_entered_us) as f32 / 1_000_000.0
    }
}
