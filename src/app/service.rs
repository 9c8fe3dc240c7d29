//! Orchestrator: the hexagonal core.
//!
//! [`Orchestrator`] owns the FSM, estimator, controller, anomaly monitor and
//! validation recorder, and nothing else holds a mutable reference to any
//! of them.  All I/O flows through port traits injected at call sites, so
//! the whole engine is testable with mock adapters.  Observers read
//! [`EngineSnapshot`]s taken between ticks.
//!
//! ```text
//!  FeaturePort ──▶ ┌───────────────────────────────┐ ──▶ EventSink
//!                  │          Orchestrator          │
//! ActuatorPort ◀── │ Estimator · FSM · PI · Monitor │
//!                  └───────────────────────────────┘
//! ```
//!
//! ## Tick order
//!
//! 1. Take the latest feature vector and fuse it into H.
//! 2. Anomaly checks. A trip forces SAFE before the FSM runs.
//! 3. Stretch the EVALUATING dwell if activity has been low for long.
//! 4. FSM tick (time-triggered transitions).
//! 5. Feed an H report from EVALUATING exit into the PI controller.
//! 6. Record the (H, PWM) sample for validation.
//! 7. Fire a pending feed pulse, then write the duty. A rejected write
//!    trips SAFE and the baseline goes out on the same tick.
//! 8. Emit `StateChanged` and the `Tick` record.

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::control::pi::{ControllerState, PiController};
use crate::diagnostics::RuntimeCounters;
use crate::error::{ActuatorError, CommandError, ConfigError};
use crate::fsm::context::FsmContext;
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};
use crate::safety::{AnomalyKind, AnomalyMonitor, AnomalyRecord};
use crate::sensors::FeatureVector;
use crate::sensors::activity::ActivityEstimator;
use crate::validation::{ValidationMetrics, ValidationRecorder, ValidationReport, ValidationTargets};

use super::commands::EngineCommand;
use super::events::{AppEvent, MAX_TICK_WARNINGS, TickRecord, TickWarning};
use super::ports::{ActuatorPort, ConfigPort, EventSink, FeaturePort};

/// Read-only view of the engine taken after a tick completes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    pub timestamp_us: u64,
    pub state: StateId,
    pub h: f32,
    pub pwm: f32,
    pub controller: ControllerState,
    pub tripped_mask: u8,
    pub last_anomaly: Option<AnomalyRecord>,
    pub eval_extended: bool,
    pub frame_rate_hz: Option<f32>,
    pub feature_age_us: u64,
    pub degraded_streak: u32,
    pub counters: RuntimeCounters,
    pub metrics: ValidationMetrics,
}

type Warnings = heapless::Vec<TickWarning, MAX_TICK_WARNINGS>;

// ───────────────────────────────────────────────────────────────
// Orchestrator
// ───────────────────────────────────────────────────────────────

pub struct Orchestrator {
    config: EngineConfig,
    fsm: Fsm,
    ctx: FsmContext,
    estimator: ActivityEstimator,
    pi: PiController,
    monitor: AnomalyMonitor,
    recorder: ValidationRecorder,
    counters: RuntimeCounters,
    started: bool,
}

impl Orchestrator {
    /// Build an engine from configuration. Refuses invalid config.
    ///
    /// Does **not** start the FSM; call [`start`](Self::start) or just
    /// [`tick`](Self::tick), which starts on first use.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            fsm: Fsm::new(build_state_table(), StateId::Feeding),
            ctx: FsmContext::new(&config),
            estimator: ActivityEstimator::new(&config),
            pi: PiController::new(&config),
            monitor: AnomalyMonitor::new(&config, 0),
            recorder: ValidationRecorder::new(&config),
            counters: RuntimeCounters::new(),
            started: false,
            config,
        })
    }

    /// Build an engine from a stored configuration.
    pub fn from_store(store: &impl ConfigPort) -> crate::error::Result<Self> {
        let config = store.load()?;
        Ok(Self::new(config)?)
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Enter FEEDING at `now_us` and fire its pulse.
    pub fn start(&mut self, now_us: u64, io: &mut impl ActuatorPort, sink: &mut impl EventSink) {
        if self.started {
            return;
        }
        self.started = true;
        self.ctx.now_us = now_us;
        self.monitor = AnomalyMonitor::new(&self.config, now_us);
        self.fsm.start(&mut self.ctx);
        sink.emit(&AppEvent::Started(self.fsm.current_state()));
        info!(
            "Orchestrator started in {:?} at {:.1}% duty",
            self.fsm.current_state(),
            self.ctx.commands.pwm
        );
        self.drive_actuators(io, sink);
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one control tick.
    ///
    /// The `io` parameter satisfies **both** [`FeaturePort`] and
    /// [`ActuatorPort`], which avoids a double mutable borrow while keeping
    /// the port boundary explicit.
    pub fn tick(
        &mut self,
        now_us: u64,
        io: &mut (impl FeaturePort + ActuatorPort),
        sink: &mut impl EventSink,
    ) -> TickRecord {
        if !self.started {
            self.start(now_us, io, sink);
        }
        self.ctx.now_us = now_us;
        self.counters.ticks += 1;
        let prev_state = self.fsm.current_state();
        let mut warnings = Warnings::new();

        // 1. Feature intake
        let fresh: Option<FeatureVector> = io
            .latest_features()
            .filter(|fv| self.monitor.observe_frame(fv.timestamp_us, now_us));
        let mut degraded = false;
        match fresh {
            Some(fv) => {
                self.counters.fresh_frames += 1;
                let est = self.estimator.estimate(&fv);
                if est.is_degraded() {
                    degraded = true;
                    self.counters.degraded_frames += 1;
                    self.monitor.record_degraded_frame(now_us);
                    let _ = warnings.push(TickWarning::DegradedFrame);
                } else {
                    self.monitor.observe_activity(est.h, now_us);
                }
                self.ctx.activity = est.h;
                self.ctx.sample = Some(est.h);
            }
            None => {
                let _ = warnings.push(TickWarning::NoFreshFeatures);
            }
        }

        // 2. Anomaly checks
        if self.fsm.current_state() != StateId::Safe {
            let streak = self.estimator.degraded_streak();
            if let Some(kind) = self.monitor.evaluate(now_us, streak) {
                self.enter_safe(Some(kind), sink);
            }
        }

        // 3. Low-activity stretch of the evaluation dwell
        let factor = if self.monitor.eval_extended() {
            let _ = warnings.push(TickWarning::EvalExtended);
            self.config.eval_extension_factor
        } else {
            1.0
        };
        self.ctx.timing.eval_secs = self.config.t_eval_secs * factor;

        // 4. FSM tick
        self.fsm.tick(&mut self.ctx);
        self.counters.cycles = self.ctx.cycles_completed;

        // 5. Controller update on an H report
        if let Some(h_eval) = self.ctx.commands.h_eval.take() {
            let cmd = self.pi.update(h_eval);
            self.ctx.commands.pwm = cmd.duty();
            self.counters.controller_updates += 1;
            let state = self.pi.state();
            if state.saturated {
                let _ = warnings.push(TickWarning::Saturated);
            }
            sink.emit(&AppEvent::ControllerUpdated {
                h_eval,
                pwm: cmd.duty(),
                state,
            });
        }

        // 6. Validation tap
        if fresh.is_some() && !degraded && self.fsm.current_state() != StateId::Safe {
            self.recorder
                .record(self.ctx.activity, self.commanded_duty(), now_us);
        }

        // 7. Actuators
        self.drive_actuators(io, sink);

        // 8. Events
        let new_state = self.fsm.current_state();
        if new_state != prev_state {
            sink.emit(&AppEvent::StateChanged {
                from: prev_state,
                to: new_state,
            });
        }

        let record = TickRecord {
            timestamp_us: now_us,
            state: new_state,
            h: self.ctx.activity,
            pwm: self.commanded_duty(),
            features: fresh,
            warnings,
        };
        sink.emit(&AppEvent::Tick(record.clone()));
        record
    }

    // ── Command handling ──────────────────────────────────────

    /// Apply an external command between ticks.
    pub fn handle_command(
        &mut self,
        cmd: EngineCommand,
        now_us: u64,
        io: &mut impl ActuatorPort,
        sink: &mut impl EventSink,
    ) -> Result<(), CommandError> {
        self.ctx.now_us = now_us;
        match cmd {
            EngineCommand::Stop => {
                let prev = self.fsm.current_state();
                let tripped = self.monitor.trip(AnomalyKind::StopRequested, now_us);
                self.enter_safe(tripped, sink);
                self.drive_actuators(io, sink);
                if prev != StateId::Safe {
                    sink.emit(&AppEvent::StateChanged {
                        from: prev,
                        to: StateId::Safe,
                    });
                }
                sink.emit(&AppEvent::Stopped);
                Ok(())
            }
            EngineCommand::Reset => {
                if self.fsm.current_state() != StateId::Safe {
                    debug!("Reset ignored: engine is not in SAFE");
                    return Ok(());
                }
                self.monitor
                    .can_reset(now_us)
                    .map_err(CommandError::ResetRejected)?;

                self.monitor.clear();
                self.estimator.clear_streak();
                self.pi.reset(self.config.pwm_baseline);
                self.ctx.commands.pwm = self.pi.output().duty();
                self.fsm.force_transition(StateId::Feeding, &mut self.ctx);
                self.counters.resets += 1;
                info!("Reset accepted, feed cycle restarted from baseline");

                sink.emit(&AppEvent::Reset);
                sink.emit(&AppEvent::StateChanged {
                    from: StateId::Safe,
                    to: StateId::Feeding,
                });
                self.drive_actuators(io, sink);
                Ok(())
            }
            EngineCommand::UpdateConfig(patch) => {
                let candidate = self.config.merged(&patch);
                candidate.validate().map_err(CommandError::Config)?;
                self.apply_config(candidate);
                sink.emit(&AppEvent::ConfigApplied);
                Ok(())
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            timestamp_us: self.ctx.now_us,
            state: self.fsm.current_state(),
            h: self.ctx.activity,
            pwm: self.commanded_duty(),
            controller: self.pi.state(),
            tripped_mask: self.monitor.tripped_mask(),
            last_anomaly: self.monitor.last_record().copied(),
            eval_extended: self.monitor.eval_extended(),
            frame_rate_hz: self.monitor.frame_rate_hz(),
            feature_age_us: self.monitor.feature_age_us(self.ctx.now_us),
            degraded_streak: self.estimator.degraded_streak(),
            counters: self.counters,
            metrics: self.recorder.metrics(),
        }
    }

    pub fn metrics(&self) -> ValidationMetrics {
        self.recorder.metrics()
    }

    pub fn validation_report(&self) -> ValidationReport {
        ValidationReport::build(
            &self.recorder.metrics(),
            self.monitor.worst_fallback_latency_secs(),
            &ValidationTargets::from_config(&self.config),
        )
    }

    /// Anomaly records, oldest first.
    pub fn anomalies(&self) -> impl Iterator<Item = &AnomalyRecord> {
        self.monitor.history()
    }

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    /// The most recent H, held across degraded frames.
    pub fn activity(&self) -> f32 {
        self.ctx.activity
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn counters(&self) -> &RuntimeCounters {
        &self.counters
    }

    /// Persist the live configuration.
    pub fn save_config(&self, store: &impl ConfigPort) -> Result<(), ConfigError> {
        store.save(&self.config)?;
        info!("Config saved");
        Ok(())
    }

    // ── Internal ──────────────────────────────────────────────

    fn commanded_duty(&self) -> f32 {
        self.ctx
            .commands
            .pwm
            .clamp(self.config.pwm_min, self.config.pwm_max)
    }

    /// Force SAFE after a trip. `tripped` is `None` when the kind was
    /// already latched and no new record was written.
    fn enter_safe(&mut self, tripped: Option<AnomalyKind>, sink: &mut impl EventSink) {
        if tripped.is_some() {
            self.counters.anomaly_trips += 1;
            if let Some(record) = self.monitor.last_record() {
                sink.emit(&AppEvent::AnomalyTripped(*record));
            }
        }
        if self.fsm.current_state() != StateId::Safe {
            warn!("Entering SAFE, trip mask 0b{:08b}", self.monitor.tripped_mask());
            self.fsm.force_transition(StateId::Safe, &mut self.ctx);
            self.recorder.abandon_cycle();
        }
    }

    fn actuator_failed(&mut self, err: ActuatorError, sink: &mut impl EventSink) {
        self.counters.actuator_errors += 1;
        error!("ACTUATOR: {err}");
        let tripped = self.monitor.report_actuator_failure(self.ctx.now_us);
        self.enter_safe(tripped, sink);
    }

    /// Fire a pending pulse, then write the current duty.
    fn drive_actuators(&mut self, io: &mut impl ActuatorPort, sink: &mut impl EventSink) {
        if core::mem::take(&mut self.ctx.commands.feed_pulse) {
            match io.request_feed_pulse() {
                Ok(()) => {
                    self.counters.feed_pulses += 1;
                    self.recorder.mark_feed_pulse(self.ctx.now_us);
                }
                Err(e) => self.actuator_failed(e, sink),
            }
        }

        let was_safe = self.fsm.current_state() == StateId::Safe;
        if let Err(e) = io.write_duty(self.commanded_duty()) {
            self.actuator_failed(e, sink);
            if !was_safe {
                // SAFE entry just replaced the command with the baseline.
                if let Err(e) = io.write_duty(self.commanded_duty()) {
                    self.counters.actuator_errors += 1;
                    error!("ACTUATOR: baseline write also failed: {e}");
                }
            }
        }
    }

    fn apply_config(&mut self, config: EngineConfig) {
        self.estimator.retune(&config);
        self.pi.retune(&config);
        self.monitor.retune(&config);
        self.recorder.retune(&config);
        self.ctx.timing.feed_secs = config.t_feed_secs;
        self.ctx.timing.eval_secs = config.t_eval_secs;
        self.ctx.timing.stable_secs = config.t_stable_secs;
        self.ctx.pwm_baseline = config.pwm_baseline;
        self.ctx.commands.pwm = if self.fsm.current_state() == StateId::Safe {
            config.pwm_baseline
        } else {
            self.pi.output().duty()
        };
        self.config = config;
        self.counters.config_updates += 1;
        info!("Configuration updated at runtime");
    }
}
