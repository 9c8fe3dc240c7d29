//! PI controller for feed-motor duty
//!
//! Runs once per evaluation window. The band error is zero inside
//! `[h_lo, h_hi]`; outside it is the distance to the nearer edge, signed so
//! that activity above the band is positive. With [`Polarity::Direct`]
//! positive error raises the duty.
//!
//! Each update is slew-limited against the previous output and then clamped
//! to `[pwm_min, pwm_max]`. The integral is committed only when the raw
//! demand lies inside the bounds (clamp-before-integrate).

use log::debug;
use serde::Serialize;

use crate::config::{EngineConfig, Polarity};

/// Duty-cycle command in percent, always inside the configured bounds.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct PwmCommand(f32);

impl PwmCommand {
    pub fn clamped(duty: f32, min: f32, max: f32) -> Self {
        Self(duty.clamp(min, max))
    }

    pub fn duty(self) -> f32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControllerState {
    pub integral: f32,
    pub previous_pwm: f32,
    /// Raw demand fell outside the bounds on the last update.
    pub saturated: bool,
}

/// PI controller
pub struct PiController {
    kp: f32,
    ki: f32,
    max_integral: f32,
    polarity: Polarity,
    h_hi: f32,
    h_lo: f32,
    pwm_min: f32,
    pwm_max: f32,
    max_slew: f32,
    state: ControllerState,
}

impl PiController {
    /// Build from config, starting at the baseline duty.
    pub fn new(config: &EngineConfig) -> Self {
        let mut pi = Self {
            kp: 0.0,
            ki: 0.0,
            max_integral: 0.0,
            polarity: Polarity::Direct,
            h_hi: 1.0,
            h_lo: 0.0,
            pwm_min: 0.0,
            pwm_max: 100.0,
            max_slew: 0.0,
            state: ControllerState {
                integral: 0.0,
                previous_pwm: config.pwm_baseline,
                saturated: false,
            },
        };
        pi.retune(config);
        pi
    }

    /// Apply new gains, band and bounds.
    ///
    /// The previous output is pulled into the new bounds, which can move it
    /// by more than one slew step.
    pub fn retune(&mut self, config: &EngineConfig) {
        self.kp = config.kp;
        self.ki = config.ki;
        self.max_integral = config.max_integral;
        self.polarity = config.polarity;
        self.h_hi = config.h_hi;
        self.h_lo = config.h_lo;
        self.pwm_min = config.pwm_min;
        self.pwm_max = config.pwm_max;
        self.max_slew = config.max_slew;
        self.state.integral = self.state.integral.clamp(-self.max_integral, self.max_integral);
        self.state.previous_pwm = self.state.previous_pwm.clamp(self.pwm_min, self.pwm_max);
    }

    /// Signed distance of `h` outside the dead band, after polarity.
    pub fn band_error(&self, h: f32) -> f32 {
        let e = if h > self.h_hi {
            h - self.h_hi
        } else if h < self.h_lo {
            h - self.h_lo
        } else {
            0.0
        };
        e * self.polarity.sign()
    }

    /// Compute the next duty from a representative activity value.
    pub fn update(&mut self, h_eval: f32) -> PwmCommand {
        let prev = self.state.previous_pwm;
        if !h_eval.is_finite() {
            return PwmCommand::clamped(prev, self.pwm_min, self.pwm_max);
        }

        let error = self.band_error(h_eval);
        if error == 0.0 {
            // Dead band: hold output and integral.
            self.state.saturated = false;
            debug!("PI: H={h_eval:.3} in band, holding {prev:.1}%");
            return PwmCommand::clamped(prev, self.pwm_min, self.pwm_max);
        }

        let candidate = (self.state.integral + error).clamp(-self.max_integral, self.max_integral);
        let raw = prev + self.kp * error + self.ki * candidate;

        let saturated = raw > self.pwm_max || raw < self.pwm_min;
        if !saturated {
            self.state.integral = candidate;
        }
        self.state.saturated = saturated;

        let delta = (raw - prev).clamp(-self.max_slew, self.max_slew);
        let out = PwmCommand::clamped(prev + delta, self.pwm_min, self.pwm_max);
        self.state.previous_pwm = out.duty();

        debug!(
            "PI: H={h_eval:.3} e={error:+.3} I={:.3} raw={raw:.2} -> {:.2}%{}",
            self.state.integral,
            out.duty(),
            if saturated { " (saturated)" } else { "" }
        );
        out
    }

    /// Set the previous output without touching the integral.
    pub fn preset(&mut self, pwm: f32) {
        self.state.previous_pwm = pwm.clamp(self.pwm_min, self.pwm_max);
    }

    /// Zero the integral and restart from `pwm`.
    pub fn reset(&mut self, pwm: f32) {
        self.state.integral = 0.0;
        self.state.saturated = false;
        self.preset(pwm);
    }

    pub fn output(&self) -> PwmCommand {
        PwmCommand(self.state.previous_pwm)
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }
}
