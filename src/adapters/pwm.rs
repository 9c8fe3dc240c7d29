//! Feed motor actuator over embedded-hal 1.0.
//!
//! Duty goes to any [`SetDutyCycle`] channel (LEDC, TIM, a PCA9685 output),
//! the feed trigger is one rising-then-falling edge on an [`OutputPin`].
//! HAL errors are mapped to [`ActuatorError`] and logged with their
//! [`ErrorKind`](embedded_hal::pwm::ErrorKind); nothing is retried here.

use embedded_hal::digital::{Error as _, OutputPin};
use embedded_hal::pwm::{Error as _, SetDutyCycle};
use log::{debug, warn};

use crate::app::ports::ActuatorPort;
use crate::error::ActuatorError;

pub struct PwmActuator<P, T> {
    pwm: P,
    trigger: T,
    last_raw: Option<u16>,
}

impl<P: SetDutyCycle, T: OutputPin> PwmActuator<P, T> {
    pub fn new(pwm: P, trigger: T) -> Self {
        Self {
            pwm,
            trigger,
            last_raw: None,
        }
    }

    /// Percent duty to raw compare value for this channel.
    pub fn raw_duty(&self, percent: f32) -> u16 {
        let max = self.pwm.max_duty_cycle();
        let frac = if percent.is_finite() {
            percent.clamp(0.0, 100.0) / 100.0
        } else {
            0.0
        };
        (frac * f32::from(max)).round() as u16
    }

    /// Raw value of the last successful duty write.
    pub fn last_raw(&self) -> Option<u16> {
        self.last_raw
    }

    pub fn release(self) -> (P, T) {
        (self.pwm, self.trigger)
    }
}

impl<P: SetDutyCycle, T: OutputPin> ActuatorPort for PwmActuator<P, T> {
    fn write_duty(&mut self, duty: f32) -> Result<(), ActuatorError> {
        let raw = self.raw_duty(duty);
        self.pwm.set_duty_cycle(raw).map_err(|e| {
            warn!("PWM: set_duty_cycle({raw}) failed: {:?}", e.kind());
            ActuatorError::PwmWriteFailed
        })?;
        if self.last_raw != Some(raw) {
            debug!("PWM: duty {duty:.1}% -> {raw}/{}", self.pwm.max_duty_cycle());
        }
        self.last_raw = Some(raw);
        Ok(())
    }

    fn request_feed_pulse(&mut self) -> Result<(), ActuatorError> {
        let fail = |e: T::Error| {
            warn!("PWM: feed trigger failed: {:?}", e.kind());
            ActuatorError::FeedPulseFailed
        };
        self.trigger.set_high().map_err(fail)?;
        self.trigger.set_low().map_err(fail)?;
        Ok(())
    }
}
