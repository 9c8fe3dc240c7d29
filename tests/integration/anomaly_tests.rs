//! Integration tests for fallback: every trip path forces SAFE at baseline.

use aquafeed::app::commands::EngineCommand;
use aquafeed::app::events::{AppEvent, TickWarning};
use aquafeed::config::EngineConfig;
use aquafeed::error::CommandError;
use aquafeed::fsm::StateId;
use aquafeed::safety::{AnomalyKind, Severity};
use aquafeed::sensors::FeatureVector;

use super::mock_hw::{ActuatorCall, Bench, MS, SEC, TICK_US};

fn first_safe_tick(records: &[aquafeed::app::events::TickRecord]) -> Option<u64> {
    records
        .iter()
        .find(|r| r.state == StateId::Safe)
        .map(|r| r.timestamp_us)
}

// ── Stale features ───────────────────────────────────────────

#[test]
fn lost_stream_trips_within_one_second() {
    let mut bench = Bench::with_defaults();
    bench.run_constant(2 * SEC, 0.9);
    let last_frame = bench.now_us;

    let records = bench.run(2 * SEC, |_, _| None);
    let tripped_at = first_safe_tick(&records).expect("no fallback");
    assert!(tripped_at - last_frame <= SEC);
    assert_eq!(tripped_at - last_frame, 550 * MS);

    assert!(records.iter().all(|r| r.warnings.contains(&TickWarning::NoFreshFeatures)));
    assert!(
        records
            .iter()
            .filter(|r| r.state == StateId::Safe)
            .all(|r| r.pwm == 30.0)
    );

    let trips = bench.sink.trips();
    assert_eq!(trips.len(), 1, "latched trip recorded once");
    assert_eq!(trips[0].kind, AnomalyKind::StaleFeatures);
    assert_eq!(trips[0].severity, Severity::Critical);

    let report = bench.engine.validation_report();
    assert!(report.fallback_latency.value.unwrap() <= 1.0);
    assert_eq!(report.fallback_latency.passed, Some(true));
}

#[test]
fn no_frames_from_start_trips() {
    let mut bench = Bench::with_defaults();
    let records = bench.run(SEC, |_, _| None);
    assert_eq!(first_safe_tick(&records), Some(550 * MS));
    assert_eq!(bench.io.last_duty(), Some(30.0));
}

#[test]
fn frame_stamped_ahead_of_clock_does_not_hold_off_staleness() {
    let mut bench = Bench::with_defaults();
    bench.run_constant(SEC, 0.5);
    let last_frame = bench.now_us;

    let rec = bench.step_stamped(0.5, bench.now_us + 3_600 * SEC);
    assert!(rec.features.is_none());
    assert!(rec.warnings.contains(&TickWarning::NoFreshFeatures));

    let records = bench.run(10 * SEC, |_, _| None);
    assert_eq!(first_safe_tick(&records), Some(last_frame + 550 * MS));
    assert_eq!(bench.sink.trips()[0].kind, AnomalyKind::StaleFeatures);
    assert_eq!(bench.io.last_duty(), Some(30.0));
}

#[test]
fn frame_stamped_ahead_of_clock_does_not_shadow_later_frames() {
    let mut bench = Bench::with_defaults();
    bench.run_constant(SEC, 0.5);
    bench.step_stamped(0.5, bench.now_us + 3_600 * SEC);

    let records = bench.run_constant(5 * SEC, 0.5);
    assert!(records.iter().all(|r| r.state != StateId::Safe));
    assert!(records.iter().all(|r| r.features.is_some()));
    assert!(bench.sink.trips().is_empty());
}

#[test]
fn frames_older_than_last_fresh_count_as_silence() {
    let mut bench = Bench::with_defaults();
    bench.run_constant(SEC, 0.5);
    let last_frame = bench.now_us;

    let records: Vec<_> = (0..40)
        .map(|_| bench.step_stamped(0.5, last_frame - 500 * MS))
        .collect();
    assert!(records.iter().all(|r| r.features.is_none()));
    assert_eq!(first_safe_tick(&records), Some(last_frame + 550 * MS));
    assert_eq!(bench.sink.trips()[0].kind, AnomalyKind::StaleFeatures);
}

#[test]
fn reset_waits_for_fresh_features() {
    let mut bench = Bench::with_defaults();
    bench.run_constant(SEC, 0.5);
    bench.run(SEC, |_, _| None);
    assert_eq!(bench.engine.state(), StateId::Safe);

    assert_eq!(
        bench.command(EngineCommand::Reset),
        Err(CommandError::ResetRejected(AnomalyKind::StaleFeatures))
    );
    assert_eq!(bench.engine.state(), StateId::Safe);

    // A fresh frame alone does not leave SAFE.
    let rec = bench.step(Some(0.5));
    assert_eq!(rec.state, StateId::Safe);

    let pulses_before = bench.io.pulse_times().len();
    bench.command(EngineCommand::Reset).unwrap();
    assert_eq!(bench.engine.state(), StateId::Feeding);
    assert_eq!(bench.io.pulse_times().len(), pulses_before + 1);
    assert_eq!(bench.engine.snapshot().tripped_mask, 0);

    let records = bench.run_constant(10 * SEC, 0.5);
    assert!(records.iter().all(|r| r.state != StateId::Safe));
    assert_eq!(bench.sink.trips().len(), 1);
}

#[test]
fn safe_is_terminal_without_reset() {
    let mut bench = Bench::with_defaults();
    bench.run(SEC, |_, _| None);
    let records = bench.run_constant(30 * SEC, 0.5);
    assert!(records.iter().all(|r| r.state == StateId::Safe && r.pwm == 30.0));
    assert_eq!(bench.io.pulse_times(), vec![0]);
}

// ── Degraded frames ──────────────────────────────────────────

#[test]
fn single_degraded_frame_holds_last_activity() {
    let mut bench = Bench::with_defaults();
    let before = bench.run_constant(SEC, 0.5);
    let held = before.last().unwrap().h;

    let rec = bench.step_with(FeatureVector::new(0.0, f32::NAN, 0.5, 0.5, 0));
    assert_eq!(rec.h, held);
    assert!(rec.warnings.contains(&TickWarning::DegradedFrame));
    assert_ne!(rec.state, StateId::Safe);

    bench.run_constant(2 * SEC, 0.5);
    assert_ne!(bench.engine.state(), StateId::Safe);
    assert!(bench.sink.trips().is_empty());

    let warning = bench.engine.anomalies().last().copied().unwrap();
    assert_eq!(warning.kind, AnomalyKind::DegradedFrame);
    assert_eq!(warning.severity, Severity::Warning);
}

#[test]
fn degraded_streak_trips() {
    let mut bench = Bench::with_defaults();
    bench.run_constant(SEC, 0.5);

    let bad = FeatureVector::new(0.0, 1.5, 0.5, 0.5, 0);
    let first = bench.step_with(bad);
    assert_ne!(first.state, StateId::Safe);
    let second = bench.step_with(bad);
    assert_eq!(second.state, StateId::Safe);
    assert_eq!(second.pwm, 30.0);

    let trips = bench.sink.trips();
    assert_eq!(trips.len(), 1);
    assert_eq!(trips[0].kind, AnomalyKind::DegradedStreak);
}

// ── Actuator failures ────────────────────────────────────────

#[test]
fn rejected_duty_write_falls_back_on_same_tick() {
    let mut bench = Bench::with_defaults();
    bench.run_constant(15 * SEC, 0.9);
    let running = bench.io.last_duty().unwrap();
    assert!(running > 30.0);

    bench.io.fail_duty_writes = 1;
    let rec = bench.step(Some(0.9));
    assert_eq!(rec.state, StateId::Safe);
    assert_eq!(rec.pwm, 30.0);

    let tail = &bench.io.calls[bench.io.calls.len() - 2..];
    assert_eq!(
        tail,
        &[
            ActuatorCall::WriteDuty {
                duty: running,
                ok: false
            },
            ActuatorCall::WriteDuty {
                duty: 30.0,
                ok: true
            },
        ]
    );

    let trips = bench.sink.trips();
    assert_eq!(trips.len(), 1);
    assert_eq!(trips[0].kind, AnomalyKind::ActuatorFailure);
    assert_eq!(trips[0].timestamp_us, bench.now_us);
    assert_eq!(bench.engine.counters().actuator_errors, 1);
}

#[test]
fn rejected_feed_pulse_falls_back() {
    let mut bench = Bench::with_defaults();
    bench.run_constant(SEC, 0.5);
    bench.io.fail_pulses = 1;

    let records = bench.run_constant(5 * SEC, 0.5);
    assert_eq!(first_safe_tick(&records), Some(4_600_000));
    assert_eq!(bench.io.last_duty(), Some(30.0));
    assert_eq!(bench.sink.trips()[0].kind, AnomalyKind::ActuatorFailure);
}

#[test]
fn every_safe_entry_leaves_a_record() {
    let mut bench = Bench::with_defaults();
    bench.run(SEC, |_, _| None);
    let entries = bench
        .sink
        .state_changes()
        .iter()
        .filter(|(_, to)| *to == StateId::Safe)
        .count();
    assert_eq!(entries, 1);
    assert_eq!(bench.sink.count(|e| matches!(e, AppEvent::AnomalyTripped(_))), 1);
    assert!(bench.engine.snapshot().last_anomaly.is_some());
}

// ── Frame rate ───────────────────────────────────────────────

/// A frame on every third tick: ~6.7 Hz.
fn slow_frames(_: &super::mock_hw::MockIo, t: u64) -> Option<f32> {
    ((t / TICK_US) % 3 == 0).then_some(0.5)
}

#[test]
fn low_frame_rate_trips_after_hold() {
    let mut bench = Bench::with_defaults();
    let records = bench.run(3 * SEC, slow_frames);
    let tripped_at = first_safe_tick(&records).expect("no fallback");
    assert!(tripped_at >= 1_300 * MS && tripped_at <= 1_500 * MS);
    assert_eq!(bench.sink.trips()[0].kind, AnomalyKind::LowFrameRate);
}

#[test]
fn zero_min_frame_rate_disables_rate_check() {
    let mut bench = Bench::new(EngineConfig {
        min_frame_rate_hz: 0.0,
        ..Default::default()
    });
    let records = bench.run(5 * SEC, slow_frames);
    assert!(records.iter().all(|r| r.state != StateId::Safe));
}
