//! Anomaly monitor.
//!
//! The monitor runs **every tick before the FSM** and decides whether the
//! engine may keep feeding.  It watches three upstream signals:
//!
//! - feature freshness (age of the newest vector and the frame rate),
//! - the estimator's degraded streak,
//! - actuator write failures reported by the orchestrator.
//!
//! ## Trip lifecycle
//!
//! 1. A condition crosses its limit.
//! 2. The monitor latches the kind in its trip mask, appends a Critical
//!    [`AnomalyRecord`], and reports the kind to the orchestrator.
//! 3. The orchestrator forces SAFE; `safe_enter` drops the duty to baseline.
//! 4. Nothing un-latches on its own.  Only [`AnomalyMonitor::clear`], called
//!    on an explicit reset, returns the monitor to normal, and only after
//!    [`AnomalyMonitor::can_reset`] confirms the feature stream is fresh.
//!
//! Warnings (a single degraded frame, sustained low activity) are recorded
//! in the same bounded history but never trip.

use core::fmt;

use heapless::HistoryBuffer;
use log::{error, info, warn};
use serde::Serialize;

use crate::config::{EngineConfig, micros};
use crate::error::TimeoutError;

/// Anomaly records kept for diagnostics.
pub const ANOMALY_HISTORY_LEN: usize = 32;

const FRAME_RATE_SMOOTHING: f32 = 0.2;

// ---------------------------------------------------------------------------
// Anomaly kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum AnomalyKind {
    /// No fresh feature vector within the staleness timeout.
    StaleFeatures = 0b0000_0001,
    /// Too many consecutive degraded estimates.
    DegradedStreak = 0b0000_0010,
    /// The actuator rejected a write.
    ActuatorFailure = 0b0000_0100,
    /// Fresh frames arriving below the minimum rate.
    LowFrameRate = 0b0000_1000,
    /// Operator stop.
    StopRequested = 0b0001_0000,
    /// One frame failed validation.
    DegradedFrame = 0b0010_0000,
    /// Activity stayed far below the band; evaluation stretched.
    LowActivity = 0b0100_0000,
}

impl AnomalyKind {
    pub const fn mask(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StaleFeatures => write!(f, "stale features"),
            Self::DegradedStreak => write!(f, "degraded streak"),
            Self::ActuatorFailure => write!(f, "actuator failure"),
            Self::LowFrameRate => write!(f, "low frame rate"),
            Self::StopRequested => write!(f, "stop requested"),
            Self::DegradedFrame => write!(f, "degraded frame"),
            Self::LowActivity => write!(f, "low activity"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnomalyRecord {
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub timestamp_us: u64,
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

pub struct AnomalyMonitor {
    staleness_us: u64,
    streak_limit: u32,
    min_frame_rate_hz: f32,
    low_rate_hold_us: u64,
    low_activity_us: u64,
    h_lo: f32,

    /// Reference point for feature age before the first frame.
    started_us: u64,
    last_fresh_us: Option<u64>,
    frame_rate_hz: Option<f32>,
    low_rate_since: Option<u64>,
    low_activity_since: Option<u64>,
    eval_extended: bool,

    /// Latched trip bitmask.
    tripped: u8,
    history: HistoryBuffer<AnomalyRecord, ANOMALY_HISTORY_LEN>,
    trips: u32,
    worst_latency_us: Option<u64>,
}

impl AnomalyMonitor {
    pub fn new(config: &EngineConfig, now_us: u64) -> Self {
        let mut monitor = Self {
            staleness_us: 0,
            streak_limit: 0,
            min_frame_rate_hz: 0.0,
            low_rate_hold_us: 0,
            low_activity_us: 0,
            h_lo: 0.0,
            started_us: now_us,
            last_fresh_us: None,
            frame_rate_hz: None,
            low_rate_since: None,
            low_activity_since: None,
            eval_extended: false,
            tripped: 0,
            history: HistoryBuffer::new(),
            trips: 0,
            worst_latency_us: None,
        };
        monitor.retune(config);
        monitor
    }

    pub fn retune(&mut self, config: &EngineConfig) {
        self.staleness_us = micros(config.staleness_timeout_secs);
        self.streak_limit = config.degraded_streak_limit;
        self.min_frame_rate_hz = config.min_frame_rate_hz;
        self.low_rate_hold_us = micros(config.low_frame_rate_hold_secs);
        self.low_activity_us = micros(config.low_activity_secs);
        self.h_lo = config.h_lo;
    }

    // ── Observations ──────────────────────────────────────────────

    /// Note a feature vector consumed at `now_us`. Returns `false` if it is
    /// not fresh: not newer than the last one seen, or stamped ahead of the
    /// engine clock. Feature age is only ever measured from stamps at or
    /// before `now_us`.
    pub fn observe_frame(&mut self, timestamp_us: u64, now_us: u64) -> bool {
        if timestamp_us > now_us {
            warn!(
                "MONITOR: frame stamped {}us ahead of the clock, not fresh",
                timestamp_us - now_us
            );
            return false;
        }
        if let Some(prev) = self.last_fresh_us {
            if timestamp_us <= prev {
                return false;
            }
            let inst = 1_000_000.0 / (timestamp_us - prev) as f32;
            self.frame_rate_hz = Some(match self.frame_rate_hz {
                Some(ema) => ema + FRAME_RATE_SMOOTHING * (inst - ema),
                None => inst,
            });
        }
        self.last_fresh_us = Some(timestamp_us);
        true
    }

    /// Track sustained low activity. Returns whether the evaluation
    /// window should currently be stretched.
    pub fn observe_activity(&mut self, h: f32, now_us: u64) -> bool {
        if h >= self.h_lo {
            if self.eval_extended {
                info!("MONITOR: activity back to {h:.3}, evaluation window restored");
            }
            self.low_activity_since = None;
            self.eval_extended = false;
        } else if h < 0.5 * self.h_lo {
            let since = *self.low_activity_since.get_or_insert(now_us);
            if !self.eval_extended && now_us.saturating_sub(since) >= self.low_activity_us {
                self.eval_extended = true;
                warn!(
                    "MONITOR: activity below {:.3} for {}s, stretching evaluation",
                    0.5 * self.h_lo,
                    self.low_activity_us / 1_000_000
                );
                self.record(AnomalyKind::LowActivity, Severity::Warning, now_us);
            }
        } else {
            self.low_activity_since = None;
        }
        self.eval_extended
    }

    pub fn record_degraded_frame(&mut self, now_us: u64) {
        self.record(AnomalyKind::DegradedFrame, Severity::Warning, now_us);
    }

    // ── Evaluation ───────────────────────────────────────────────

    /// Check every trip condition. Returns the kind that tripped on this
    /// call, if any.
    pub fn evaluate(&mut self, now_us: u64, degraded_streak: u32) -> Option<AnomalyKind> {
        let age = self.feature_age_us(now_us);
        if age > self.staleness_us {
            warn!("MONITOR: {}", TimeoutError { age_us: age });
            let onset = self.last_fresh_us.unwrap_or(self.started_us);
            return self.trip_at(AnomalyKind::StaleFeatures, now_us, onset);
        }

        if degraded_streak >= self.streak_limit {
            return self.trip(AnomalyKind::DegradedStreak, now_us);
        }

        if let Some(since) = self.low_frame_rate_since(now_us) {
            if now_us.saturating_sub(since) >= self.low_rate_hold_us {
                return self.trip_at(AnomalyKind::LowFrameRate, now_us, since);
            }
        }

        None
    }

    /// Actuator rejected a write on this tick.
    pub fn report_actuator_failure(&mut self, now_us: u64) -> Option<AnomalyKind> {
        self.trip(AnomalyKind::ActuatorFailure, now_us)
    }

    /// Latch `kind` with onset at `now_us`.
    pub fn trip(&mut self, kind: AnomalyKind, now_us: u64) -> Option<AnomalyKind> {
        self.trip_at(kind, now_us, now_us)
    }

    // ── Reset ────────────────────────────────────────────────────

    /// Whether an explicit reset may clear the latch now.
    pub fn can_reset(&self, now_us: u64) -> Result<(), AnomalyKind> {
        if self.feature_age_us(now_us) > self.staleness_us {
            return Err(AnomalyKind::StaleFeatures);
        }
        Ok(())
    }

    /// Clear the latch and the rate/activity trackers. History is kept.
    pub fn clear(&mut self) {
        if self.tripped != 0 {
            info!("MONITOR: trip mask 0b{:08b} cleared by reset", self.tripped);
        }
        self.tripped = 0;
        self.frame_rate_hz = None;
        self.low_rate_since = None;
        self.low_activity_since = None;
        self.eval_extended = false;
    }

    // ── Queries ──────────────────────────────────────────────────

    pub fn feature_age_us(&self, now_us: u64) -> u64 {
        now_us.saturating_sub(self.last_fresh_us.unwrap_or(self.started_us))
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped != 0
    }

    pub fn has_tripped(&self, kind: AnomalyKind) -> bool {
        self.tripped & kind.mask() != 0
    }

    pub fn tripped_mask(&self) -> u8 {
        self.tripped
    }

    pub fn frame_rate_hz(&self) -> Option<f32> {
        self.frame_rate_hz
    }

    pub fn eval_extended(&self) -> bool {
        self.eval_extended
    }

    pub fn trip_count(&self) -> u32 {
        self.trips
    }

    /// Longest fault-onset-to-trip delay observed so far.
    pub fn worst_fallback_latency_secs(&self) -> Option<f32> {
        self.worst_latency_us.map(|us| us as f32 / 1_000_000.0)
    }

    /// Records, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &AnomalyRecord> {
        self.history.oldest_ordered()
    }

    pub fn last_record(&self) -> Option<&AnomalyRecord> {
        self.history.recent()
    }

    // ── Internal ─────────────────────────────────────────────────

    fn low_frame_rate_since(&mut self, now_us: u64) -> Option<u64> {
        let low = self.min_frame_rate_hz > 0.0
            && self.frame_rate_hz.is_some_and(|hz| hz < self.min_frame_rate_hz);
        if low {
            Some(*self.low_rate_since.get_or_insert(now_us))
        } else {
            self.low_rate_since = None;
            None
        }
    }

    fn trip_at(&mut self, kind: AnomalyKind, now_us: u64, onset_us: u64) -> Option<AnomalyKind> {
        if self.tripped & kind.mask() != 0 {
            return None;
        }
        self.tripped |= kind.mask();
        self.trips = self.trips.saturating_add(1);

        let latency = now_us.saturating_sub(onset_us);
        self.worst_latency_us = Some(self.worst_latency_us.map_or(latency, |w| w.max(latency)));

        error!("ANOMALY TRIPPED: {kind} at {now_us}us (onset +{}ms)", latency / 1000);
        self.record(kind, Severity::Critical, now_us);
        Some(kind)
    }

    fn record(&mut self, kind: AnomalyKind, severity: Severity, timestamp_us: u64) {
        self.history.write(AnomalyRecord {
            kind,
            severity,
            timestamp_us,
        });
    }
}
