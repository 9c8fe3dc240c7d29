//! Online validation metrics.
//!
//! [`ValidationRecorder`] taps the (H, PWM) stream into a fixed-capacity
//! rolling window and tracks, per feed pulse, whether activity fell back
//! below `h_lo` within `T_disappear`.  It is purely observational: nothing
//! in the control path reads from it.
//!
//! | Metric           | Definition over the current window               |
//! |------------------|--------------------------------------------------|
//! | `correlation`    | Pearson r(H, PWM)                                |
//! | `oscillation`    | (max PWM − min PWM) / mean PWM                   |
//! | `oscillation_pp` | max PWM − min PWM, in duty points                |
//! | `hit_rate`       | decided cycles that were hits / decided cycles   |

use heapless::{Deque, HistoryBuffer};
use serde::Serialize;

use crate::config::{EngineConfig, VALIDATION_WINDOW_MAX, micros};

/// Feed cycles remembered for the hit rate.
pub const CYCLE_HISTORY_LEN: usize = 64;

const MIN_VARIANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub h: f32,
    pub pwm: f32,
    pub timestamp_us: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ValidationMetrics {
    pub correlation: Option<f32>,
    pub oscillation: Option<f32>,
    pub oscillation_pp: Option<f32>,
    pub hit_rate: Option<f32>,
    /// Samples currently in the window.
    pub samples: usize,
    /// Decided feed cycles behind `hit_rate`.
    pub cycles: usize,
}

#[derive(Debug, Clone, Copy)]
struct OpenCycle {
    pulse_us: u64,
    /// Activity has been at or above `h_lo` since the pulse.
    armed: bool,
}

pub struct ValidationRecorder {
    window: Deque<Sample, VALIDATION_WINDOW_MAX>,
    capacity: usize,
    h_lo: f32,
    t_disappear_us: u64,
    last_h: Option<f32>,
    open: Option<OpenCycle>,
    outcomes: HistoryBuffer<bool, CYCLE_HISTORY_LEN>,
}

impl ValidationRecorder {
    pub fn new(config: &EngineConfig) -> Self {
        let mut rec = Self {
            window: Deque::new(),
            capacity: VALIDATION_WINDOW_MAX,
            h_lo: 0.0,
            t_disappear_us: 0,
            last_h: None,
            open: None,
            outcomes: HistoryBuffer::new(),
        };
        rec.retune(config);
        rec
    }

    /// Pick up a new window size, band edge and disappearance time.
    /// Shrinking the window drops the oldest samples.
    pub fn retune(&mut self, config: &EngineConfig) {
        self.capacity = usize::from(config.window_size).clamp(2, VALIDATION_WINDOW_MAX);
        while self.window.len() > self.capacity {
            self.window.pop_front();
        }
        self.h_lo = config.h_lo;
        self.t_disappear_us = micros(config.t_disappear_secs);
    }

    pub fn record(&mut self, h: f32, pwm: f32, timestamp_us: u64) {
        if self.window.len() >= self.capacity {
            self.window.pop_front();
        }
        let _ = self.window.push_back(Sample {
            h,
            pwm,
            timestamp_us,
        });

        if let Some(mut cycle) = self.open {
            if timestamp_us > cycle.pulse_us + self.t_disappear_us {
                self.decide(false);
            } else if cycle.armed && h < self.h_lo {
                self.decide(true);
            } else {
                cycle.armed |= h >= self.h_lo;
                self.open = Some(cycle);
            }
        }
        self.last_h = Some(h);
    }

    /// A feed pulse went out; start watching for the activity drop.
    pub fn mark_feed_pulse(&mut self, timestamp_us: u64) {
        if self.open.is_some() {
            self.decide(false);
        }
        self.open = Some(OpenCycle {
            pulse_us: timestamp_us,
            armed: self.last_h.is_some_and(|h| h >= self.h_lo),
        });
    }

    /// Drop the open cycle undecided. Called on SAFE entry: a cycle cut
    /// short by a fallback is neither a hit nor a miss.
    pub fn abandon_cycle(&mut self) {
        self.open = None;
    }

    pub fn metrics(&self) -> ValidationMetrics {
        let n = self.window.len();
        let mut m = ValidationMetrics {
            samples: n,
            cycles: self.outcomes.len(),
            ..Default::default()
        };

        if n > 0 {
            let (mut lo, mut hi, mut sum) = (f32::INFINITY, f32::NEG_INFINITY, 0.0f64);
            for s in &self.window {
                lo = lo.min(s.pwm);
                hi = hi.max(s.pwm);
                sum += f64::from(s.pwm);
            }
            let mean = sum / n as f64;
            let pp = hi - lo;
            m.oscillation_pp = Some(pp);
            if mean > 0.0 {
                m.oscillation = Some((f64::from(pp) / mean) as f32);
            }
        }

        if n >= 2 {
            m.correlation = pearson(self.window.iter().map(|s| (s.h, s.pwm)), n);
        }

        if !self.outcomes.is_empty() {
            let hits = self.outcomes.oldest_ordered().filter(|hit| **hit).count();
            m.hit_rate = Some(hits as f32 / self.outcomes.len() as f32);
        }

        m
    }

    /// Samples in the window, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.window.iter()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn decide(&mut self, hit: bool) {
        self.outcomes.write(hit);
        self.open = None;
    }
}

fn pearson(pairs: impl Iterator<Item = (f32, f32)> + Clone, n: usize) -> Option<f32> {
    let nf = n as f64;
    let (sx, sy) = pairs
        .clone()
        .fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + f64::from(x), sy + f64::from(y)));
    let (mx, my) = (sx / nf, sy / nf);

    let (mut cov, mut vx, mut vy) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in pairs {
        let dx = f64::from(x) - mx;
        let dy = f64::from(y) - my;
        cov += dx * dy;
        vx += dx * dx;
        vy += dy * dy;
    }
    if vx < MIN_VARIANCE || vy < MIN_VARIANCE {
        return None;
    }
    Some((cov / (vx * vy).sqrt()).clamp(-1.0, 1.0) as f32)
}

// ---------------------------------------------------------------------------
// Targets and report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValidationTargets {
    pub min_correlation: f32,
    pub max_oscillation_pp: f32,
    pub min_hit_rate: f32,
    pub max_fallback_latency_secs: f32,
}

impl ValidationTargets {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            min_correlation: config.target_correlation,
            max_oscillation_pp: config.target_oscillation_pp,
            min_hit_rate: config.target_hit_rate,
            max_fallback_latency_secs: config.target_fallback_latency_secs,
        }
    }
}

/// One metric against its target. `passed` is `None` when the metric is
/// undefined (too few samples, no cycles, no trips).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TargetCheck {
    pub value: Option<f32>,
    pub target: f32,
    pub passed: Option<bool>,
}

impl TargetCheck {
    fn at_least(value: Option<f32>, target: f32) -> Self {
        Self {
            value,
            target,
            passed: value.map(|v| v >= target),
        }
    }

    fn at_most(value: Option<f32>, target: f32) -> Self {
        Self {
            value,
            target,
            passed: value.map(|v| v <= target),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValidationReport {
    pub correlation: TargetCheck,
    pub oscillation_pp: TargetCheck,
    pub hit_rate: TargetCheck,
    pub fallback_latency: TargetCheck,
    /// No defined check failed.
    pub passed: bool,
}

impl ValidationReport {
    pub fn build(
        metrics: &ValidationMetrics,
        worst_fallback_latency_secs: Option<f32>,
        targets: &ValidationTargets,
    ) -> Self {
        let correlation = TargetCheck::at_least(metrics.correlation, targets.min_correlation);
        let oscillation_pp = TargetCheck::at_most(metrics.oscillation_pp, targets.max_oscillation_pp);
        let hit_rate = TargetCheck::at_least(metrics.hit_rate, targets.min_hit_rate);
        let fallback_latency =
            TargetCheck::at_most(worst_fallback_latency_secs, targets.max_fallback_latency_secs);
        let passed = [correlation, oscillation_pp, hit_rate, fallback_latency]
            .iter()
            .all(|c| c.passed != Some(false));
        Self {
            correlation,
            oscillation_pp,
            hit_rate,
            fallback_latency,
            passed,
        }
    }
}
