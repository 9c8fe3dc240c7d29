//! Integration tests for the Orchestrator → FSM → PI → actuator pipeline.
//!
//! Everything runs on a simulated 20 Hz clock against mock ports; no
//! threads, no sleeping.

use aquafeed::adapters::config_store::MemoryConfigStore;
use aquafeed::app::commands::EngineCommand;
use aquafeed::app::events::{AppEvent, TickRecord, TickWarning};
use aquafeed::app::ports::ConfigPort;
use aquafeed::config::{ConfigPatch, EngineConfig};
use aquafeed::error::{CommandError, ConfigError};
use aquafeed::fsm::StateId;
use aquafeed::safety::{AnomalyKind, Severity};

use super::mock_hw::{Bench, SEC, TICK_US};

/// (time, new state) for every tick where the state changed.
fn transitions(start: StateId, records: &[TickRecord]) -> Vec<(u64, StateId)> {
    let mut prev = start;
    let mut out = Vec::new();
    for r in records {
        if r.state != prev {
            out.push((r.timestamp_us, r.state));
            prev = r.state;
        }
    }
    out
}

// ── Cycle cadence ────────────────────────────────────────────

#[test]
fn cycle_runs_feeding_evaluating_stable_in_order() {
    let mut bench = Bench::with_defaults();
    bench.run_constant(10 * SEC, 0.5);

    use StateId::*;
    let changes = bench.sink.state_changes();
    assert_eq!(
        &changes[..6],
        &[
            (Feeding, Evaluating),
            (Evaluating, Stable),
            (Stable, Feeding),
            (Feeding, Evaluating),
            (Evaluating, Stable),
            (Stable, Feeding),
        ]
    );
    assert_eq!(bench.io.pulse_times(), vec![0, 4_600_000, 9_200_000]);
    assert_eq!(bench.engine.counters().cycles, 2);
}

#[test]
fn dwell_times_follow_the_clock() {
    let mut bench = Bench::with_defaults();
    let records = bench.run_constant(5 * SEC, 0.5);
    assert_eq!(
        transitions(StateId::Feeding, &records),
        vec![
            (600_000, StateId::Evaluating),
            (3_600_000, StateId::Stable),
            (4_600_000, StateId::Feeding),
        ]
    );
}

#[test]
fn activity_inside_band_holds_baseline() {
    let mut bench = Bench::with_defaults();
    bench.run_constant(15 * SEC, 0.5);
    assert!(bench.io.duties().iter().all(|d| *d == 30.0));
    assert_eq!(bench.sink.controller_updates(), 3);
    let state = bench.engine.snapshot().controller;
    assert_eq!(state.integral, 0.0);
    assert!(!state.saturated);
}

// ── Controller behaviour ─────────────────────────────────────

#[test]
fn high_activity_drives_pwm_up_to_max_within_slew() {
    let mut bench = Bench::with_defaults();
    bench.run_constant(40 * SEC, 0.9);

    let duties = bench.io.duties();
    for pair in duties.windows(2) {
        assert!(pair[1] >= pair[0], "PWM fell: {pair:?}");
        assert!(pair[1] - pair[0] <= 10.0 + 1e-4, "slew exceeded: {pair:?}");
    }
    assert!(duties.iter().all(|d| (20.0..=70.0).contains(d)));
    assert_eq!(bench.io.last_duty(), Some(70.0));

    let state = bench.engine.snapshot().controller;
    assert!(state.saturated);
    assert!((state.integral - 1.5).abs() < 1e-3, "I = {}", state.integral);
}

#[test]
fn twenty_cycles_from_45_with_slew_5() {
    let mut bench = Bench::new(EngineConfig {
        pwm_baseline: 45.0,
        max_slew: 5.0,
        ..Default::default()
    });
    bench.run_constant(20 * 4_600_000, 0.9);

    let mut outputs = Vec::new();
    for e in &bench.sink.events {
        if let AppEvent::ControllerUpdated { pwm, state, .. } = e {
            outputs.push((*pwm, state.integral));
        }
    }
    assert_eq!(outputs.len(), 20);

    let mut prev = 45.0;
    for (pwm, _) in &outputs {
        assert!(*pwm >= prev && *pwm - prev <= 5.0 + 1e-4);
        assert!(*pwm <= 70.0);
        prev = *pwm;
    }
    assert_eq!(outputs.last().map(|o| o.0), Some(70.0));

    let frozen = outputs[5].1;
    assert!((frozen - 1.0).abs() < 1e-3, "I = {frozen}");
    assert!(outputs[5..].iter().all(|(_, i)| *i == frozen));
}

#[test]
fn low_activity_drives_pwm_to_min_and_stretches_evaluation() {
    let mut bench = Bench::with_defaults();
    let records = bench.run_constant(50 * SEC, 0.1);

    assert_eq!(bench.io.last_duty(), Some(20.0));
    assert!(records.iter().all(|r| r.state != StateId::Safe));

    let extended_at = records
        .iter()
        .find(|r| r.warnings.contains(&TickWarning::EvalExtended))
        .map(|r| r.timestamp_us)
        .expect("evaluation never stretched");
    assert!(extended_at >= 30 * SEC);
    assert!(bench.engine.snapshot().eval_extended);

    // Evaluation dwell: 3 s before the stretch, 6 s for windows opened after.
    let t = transitions(StateId::Feeding, &records);
    for pair in t.windows(2) {
        if let [(start, StateId::Evaluating), (end, StateId::Stable)] = pair {
            let dwell = end - start;
            if *end < 30 * SEC {
                assert_eq!(dwell, 3 * SEC);
            } else if *start > extended_at {
                assert_eq!(dwell, 6 * SEC);
            }
        }
    }

    let warning = bench
        .engine
        .anomalies()
        .find(|r| r.kind == AnomalyKind::LowActivity)
        .expect("no low-activity record");
    assert_eq!(warning.severity, Severity::Warning);
}

// ── Commands ─────────────────────────────────────────────────

#[test]
fn stop_forces_baseline_and_discards_pending_report() {
    let mut bench = Bench::with_defaults();
    bench.run_constant(2 * SEC, 0.9);
    assert_eq!(bench.engine.state(), StateId::Evaluating);

    bench.command(EngineCommand::Stop).unwrap();
    assert_eq!(bench.engine.state(), StateId::Safe);
    assert_eq!(bench.io.last_duty(), Some(30.0));
    assert_eq!(bench.sink.count(|e| matches!(e, AppEvent::Stopped)), 1);

    let records = bench.run_constant(10 * SEC, 0.9);
    assert!(records.iter().all(|r| r.state == StateId::Safe && r.pwm == 30.0));
    assert_eq!(bench.sink.controller_updates(), 0);
    assert_eq!(bench.io.pulse_times(), vec![0]);

    let stop = bench.engine.anomalies().last().copied().unwrap();
    assert_eq!(stop.kind, AnomalyKind::StopRequested);
    assert_eq!(stop.severity, Severity::Critical);
}

#[test]
fn reset_after_stop_restarts_from_baseline() {
    let mut bench = Bench::with_defaults();
    bench.run_constant(20 * SEC, 0.9);
    assert!(bench.io.last_duty().unwrap() > 30.0);

    bench.command(EngineCommand::Stop).unwrap();
    bench.step(Some(0.5));
    bench.command(EngineCommand::Reset).unwrap();

    assert_eq!(bench.engine.state(), StateId::Feeding);
    assert_eq!(bench.io.last_duty(), Some(30.0));
    assert_eq!(bench.io.last_pulse_us(), Some(bench.now_us));
    let snap = bench.engine.snapshot();
    assert_eq!(snap.tripped_mask, 0);
    assert_eq!(snap.controller.integral, 0.0);
    assert_eq!(snap.counters.resets, 1);
    assert_eq!(bench.sink.count(|e| matches!(e, AppEvent::Reset)), 1);

    let records = bench.run_constant(5 * SEC, 0.5);
    assert!(records.iter().all(|r| r.state != StateId::Safe));
}

#[test]
fn reset_outside_safe_is_a_no_op() {
    let mut bench = Bench::with_defaults();
    bench.run_constant(SEC, 0.5);
    let before = bench.io.calls.len();
    assert_eq!(bench.command(EngineCommand::Reset), Ok(()));
    assert_eq!(bench.io.calls.len(), before);
    assert_eq!(bench.engine.counters().resets, 0);
}

#[test]
fn config_patch_retunes_and_clamps_output() {
    let mut bench = Bench::with_defaults();
    bench.run_constant(40 * SEC, 0.9);
    assert_eq!(bench.io.last_duty(), Some(70.0));

    let patch = ConfigPatch {
        pwm_max: Some(50.0),
        ..Default::default()
    };
    bench.command(EngineCommand::UpdateConfig(patch)).unwrap();
    assert_eq!(bench.engine.config().pwm_max, 50.0);
    assert_eq!(bench.engine.snapshot().pwm, 50.0);

    let rec = bench.step(Some(0.9));
    assert_eq!(rec.pwm, 50.0);
    assert_eq!(bench.io.last_duty(), Some(50.0));
    assert_eq!(bench.sink.count(|e| matches!(e, AppEvent::ConfigApplied)), 1);
}

#[test]
fn invalid_patch_is_rejected_whole() {
    let mut bench = Bench::with_defaults();
    let patch = ConfigPatch {
        kp: Some(5.0),
        h_lo: Some(0.9),
        ..Default::default()
    };
    let err = bench.command(EngineCommand::UpdateConfig(patch)).unwrap_err();
    assert!(matches!(err, CommandError::Config(ConfigError::ValidationFailed(_))));
    assert_eq!(bench.engine.config(), &EngineConfig::default());
}

#[test]
fn live_config_can_be_saved_and_reloaded() {
    let mut bench = Bench::with_defaults();
    let patch = ConfigPatch {
        kp: Some(9.0),
        window_size: Some(64),
        ..Default::default()
    };
    bench.command(EngineCommand::UpdateConfig(patch)).unwrap();

    let store = MemoryConfigStore::new();
    bench.engine.save_config(&store).unwrap();
    let loaded = store.load().unwrap();
    assert_eq!(&loaded, bench.engine.config());
    assert_eq!(loaded.kp, 9.0);
}

// ── Outputs ──────────────────────────────────────────────────

#[test]
fn every_tick_emits_a_record() {
    let mut bench = Bench::with_defaults();
    let records = bench.run_constant(2 * SEC, 0.5);
    assert!(matches!(bench.sink.events[0], AppEvent::Started(StateId::Feeding)));
    assert_eq!(
        bench.sink.count(|e| matches!(e, AppEvent::Tick(_))),
        records.len()
    );
    assert_eq!(records.len() as u64, 2 * SEC / TICK_US);
    assert!(records.iter().all(|r| r.features.is_some() && r.warnings.is_empty()));
}

#[test]
fn instances_are_independent() {
    let mut a = Bench::with_defaults();
    let mut b = Bench::new(EngineConfig {
        pwm_baseline: 50.0,
        ..Default::default()
    });
    a.run_constant(20 * SEC, 0.9);
    b.run_constant(20 * SEC, 0.5);
    assert!(a.io.last_duty().unwrap() > 30.0);
    assert_eq!(b.io.last_duty(), Some(50.0));
}

// ── Validation metrics ───────────────────────────────────────

#[test]
fn quick_drop_after_each_pulse_counts_as_hit() {
    let mut bench = Bench::with_defaults();
    bench.run(30 * SEC, |io, t| {
        let since = t - io.last_pulse_us().unwrap_or(0);
        Some(if since <= SEC { 0.8 } else { 0.2 })
    });
    let m = bench.engine.metrics();
    assert!(m.cycles >= 5, "cycles = {}", m.cycles);
    assert_eq!(m.hit_rate, Some(1.0));
}

#[test]
fn cycle_cut_short_by_fallback_is_not_scored() {
    let pattern = |io: &super::mock_hw::MockIo, t: u64| {
        let since = t - io.last_pulse_us().unwrap_or(0);
        Some(if since <= SEC { 0.8 } else { 0.2 })
    };

    let mut bench = Bench::with_defaults();
    bench.run(5 * SEC, pattern);
    assert_eq!(bench.engine.metrics().cycles, 1);

    // Pulse at 4.6 s is still open when the operator stops the feeder.
    bench.command(EngineCommand::Stop).unwrap();
    bench.step(Some(0.8));
    bench.command(EngineCommand::Reset).unwrap();
    let m = bench.engine.metrics();
    assert_eq!(m.cycles, 1);
    assert_eq!(m.hit_rate, Some(1.0));

    bench.run(3 * SEC, pattern);
    let m = bench.engine.metrics();
    assert_eq!(m.cycles, 2);
    assert_eq!(m.hit_rate, Some(1.0));
}

#[test]
fn activity_that_never_drops_is_a_miss() {
    let mut bench = Bench::with_defaults();
    bench.run_constant(30 * SEC, 0.8);
    let m = bench.engine.metrics();
    assert!(m.cycles >= 5);
    assert_eq!(m.hit_rate, Some(0.0));
}

#[test]
fn report_after_settled_run() {
    let mut bench = Bench::with_defaults();
    bench.run_constant(60 * SEC, 0.9);
    let report = bench.engine.validation_report();
    // Last 10 s all at pwm_max: no spread, no variance.
    assert_eq!(report.oscillation_pp.value, Some(0.0));
    assert_eq!(report.oscillation_pp.passed, Some(true));
    assert_eq!(report.correlation.value, None);
    assert_eq!(report.fallback_latency.value, None);
    assert!(report.passed);
}
