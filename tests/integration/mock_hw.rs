//! Mock feeder and camera for integration tests.
//!
//! Records every actuator call so tests can assert on the full command
//! history without touching real PWM registers, and lets a test hand the
//! engine exactly the feature vector it wants on each tick.

use aquafeed::app::commands::EngineCommand;
use aquafeed::app::events::{AppEvent, TickRecord};
use aquafeed::app::ports::{ActuatorPort, EventSink, FeaturePort};
use aquafeed::app::service::Orchestrator;
use aquafeed::config::EngineConfig;
use aquafeed::error::{ActuatorError, CommandError};
use aquafeed::fsm::StateId;
use aquafeed::safety::AnomalyRecord;
use aquafeed::sensors::FeatureVector;

pub const MS: u64 = 1_000;
pub const SEC: u64 = 1_000_000;
/// Harness tick period (20 Hz, above the default minimum frame rate).
pub const TICK_US: u64 = 50 * MS;

/// Feature vector whose fused H equals `h` under the default weights.
pub fn features_for(h: f32, timestamp_us: u64) -> FeatureVector {
    let x = (h / 0.9).clamp(0.0, 1.0);
    FeatureVector::new(0.0, x, x, x, timestamp_us)
}

// ── Actuator call record ──────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ActuatorCall {
    WriteDuty { duty: f32, ok: bool },
    FeedPulse { at_us: u64, ok: bool },
}

// ── MockIo ────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockIo {
    pub now_us: u64,
    pub calls: Vec<ActuatorCall>,
    pending: Option<FeatureVector>,
    /// Reject the next N duty writes.
    pub fail_duty_writes: u32,
    /// Reject the next N feed pulses.
    pub fail_pulses: u32,
}

#[allow(dead_code)]
impl MockIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest-wins, like the real mailbox.
    pub fn publish(&mut self, fv: FeatureVector) {
        self.pending = Some(fv);
    }

    /// Duty of the last write that went through.
    pub fn last_duty(&self) -> Option<f32> {
        self.calls.iter().rev().find_map(|c| match c {
            ActuatorCall::WriteDuty { duty, ok: true } => Some(*duty),
            _ => None,
        })
    }

    pub fn duties(&self) -> Vec<f32> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                ActuatorCall::WriteDuty { duty, ok: true } => Some(*duty),
                _ => None,
            })
            .collect()
    }

    pub fn pulse_times(&self) -> Vec<u64> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                ActuatorCall::FeedPulse { at_us, ok: true } => Some(*at_us),
                _ => None,
            })
            .collect()
    }

    pub fn last_pulse_us(&self) -> Option<u64> {
        self.pulse_times().last().copied()
    }
}

impl FeaturePort for MockIo {
    fn latest_features(&mut self) -> Option<FeatureVector> {
        self.pending.take()
    }
}

impl ActuatorPort for MockIo {
    fn write_duty(&mut self, duty: f32) -> Result<(), ActuatorError> {
        let ok = self.fail_duty_writes == 0;
        self.calls.push(ActuatorCall::WriteDuty { duty, ok });
        if ok {
            Ok(())
        } else {
            self.fail_duty_writes -= 1;
            Err(ActuatorError::PwmWriteFailed)
        }
    }

    fn request_feed_pulse(&mut self) -> Result<(), ActuatorError> {
        let ok = self.fail_pulses == 0;
        self.calls.push(ActuatorCall::FeedPulse {
            at_us: self.now_us,
            ok,
        });
        if ok {
            Ok(())
        } else {
            self.fail_pulses -= 1;
            Err(ActuatorError::FeedPulseFailed)
        }
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn state_changes(&self) -> Vec<(StateId, StateId)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::StateChanged { from, to } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    pub fn trips(&self) -> Vec<AnomalyRecord> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::AnomalyTripped(r) => Some(*r),
                _ => None,
            })
            .collect()
    }

    pub fn controller_updates(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, AppEvent::ControllerUpdated { .. }))
            .count()
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Bench: engine + mocks on a simulated clock ────────────────

pub struct Bench {
    pub engine: Orchestrator,
    pub io: MockIo,
    pub sink: RecordingSink,
    pub now_us: u64,
}

#[allow(dead_code)]
impl Bench {
    /// Engine started at t = 0.
    pub fn new(config: EngineConfig) -> Self {
        let mut bench = Self {
            engine: Orchestrator::new(config).expect("valid config"),
            io: MockIo::new(),
            sink: RecordingSink::default(),
            now_us: 0,
        };
        bench.engine.start(0, &mut bench.io, &mut bench.sink);
        bench
    }

    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default())
    }

    /// Advance one tick, optionally publishing a frame with activity `h`.
    pub fn step(&mut self, h: Option<f32>) -> TickRecord {
        self.now_us += TICK_US;
        self.io.now_us = self.now_us;
        if let Some(h) = h {
            self.io.publish(features_for(h, self.now_us));
        }
        self.engine.tick(self.now_us, &mut self.io, &mut self.sink)
    }

    /// Advance one tick publishing an explicit vector.
    pub fn step_with(&mut self, fv: FeatureVector) -> TickRecord {
        self.now_us += TICK_US;
        self.io.now_us = self.now_us;
        self.io.publish(FeatureVector {
            timestamp_us: self.now_us,
            ..fv
        });
        self.engine.tick(self.now_us, &mut self.io, &mut self.sink)
    }

    /// Advance one tick publishing a frame with the producer's own stamp,
    /// which may be behind or ahead of the engine clock.
    pub fn step_stamped(&mut self, h: f32, stamp_us: u64) -> TickRecord {
        self.now_us += TICK_US;
        self.io.now_us = self.now_us;
        self.io.publish(features_for(h, stamp_us));
        self.engine.tick(self.now_us, &mut self.io, &mut self.sink)
    }

    /// Run for `duration_us` with a frame every tick at constant `h`.
    pub fn run_constant(&mut self, duration_us: u64, h: f32) -> Vec<TickRecord> {
        self.run(duration_us, |_, _| Some(h))
    }

    /// Run for `duration_us`; `h` sees the mock and the current time and
    /// returns the activity to publish (or `None` for no frame).
    pub fn run(
        &mut self,
        duration_us: u64,
        mut h: impl FnMut(&MockIo, u64) -> Option<f32>,
    ) -> Vec<TickRecord> {
        let end = self.now_us + duration_us;
        let mut records = Vec::new();
        while self.now_us < end {
            let next = self.now_us + TICK_US;
            let value = h(&self.io, next);
            records.push(self.step(value));
        }
        records
    }

    pub fn command(&mut self, cmd: EngineCommand) -> Result<(), CommandError> {
        self.engine
            .handle_command(cmd, self.now_us, &mut self.io, &mut self.sink)
    }
}
