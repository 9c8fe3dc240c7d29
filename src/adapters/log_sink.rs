//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured engine events through the
//! `log` facade (stderr in the host runner).  Ticks arrive at the vision
//! frame rate, so they go out at `debug`; everything else at `info` or
//! `warn`.

use log::{debug, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] as a single line.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Tick(t) => {
                debug!(
                    "TICK | t={}us | state={:?} | H={:.3} | pwm={:.1}% | fresh={} | warnings={:?}",
                    t.timestamp_us,
                    t.state,
                    t.h,
                    t.pwm,
                    t.features.is_some(),
                    t.warnings.as_slice(),
                );
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            AppEvent::ControllerUpdated { h_eval, pwm, state } => {
                info!(
                    "PI | H_eval={:.3} | pwm={:.1}% | I={:.3}{}",
                    h_eval,
                    pwm,
                    state.integral,
                    if state.saturated { " | saturated" } else { "" }
                );
            }
            AppEvent::AnomalyTripped(rec) => {
                warn!(
                    "ANOMALY | {} ({:?}) at {}us",
                    rec.kind, rec.severity, rec.timestamp_us
                );
            }
            AppEvent::Started(state) => {
                info!("START | initial_state={:?}", state);
            }
            AppEvent::Reset => {
                info!("RESET | SAFE cleared");
            }
            AppEvent::Stopped => {
                info!("STOP | baseline duty, SAFE");
            }
            AppEvent::ConfigApplied => {
                info!("CONFIG | patch applied");
            }
        }
    }
}
