//! In-memory feeder for host runs and demos.
//!
//! Tracks duty and pulse count the way a real driver would track its
//! hardware state. The link can be cut with [`SimActuator::disconnect`] to
//! exercise the actuator-failure path end to end.

use log::{debug, info};

use crate::app::ports::ActuatorPort;
use crate::error::ActuatorError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeederState {
    Idle,
    Running { duty: f32 },
}

pub struct SimActuator {
    state: FeederState,
    pulses: u64,
    writes: u64,
    connected: bool,
}

impl Default for SimActuator {
    fn default() -> Self {
        Self::new()
    }
}

impl SimActuator {
    pub fn new() -> Self {
        info!("SimActuator: simulation backend");
        Self {
            state: FeederState::Idle,
            pulses: 0,
            writes: 0,
            connected: true,
        }
    }

    pub fn disconnect(&mut self) {
        self.connected = false;
    }

    pub fn reconnect(&mut self) {
        self.connected = true;
    }

    pub fn state(&self) -> FeederState {
        self.state
    }

    pub fn duty(&self) -> f32 {
        match self.state {
            FeederState::Idle => 0.0,
            FeederState::Running { duty } => duty,
        }
    }

    pub fn pulses(&self) -> u64 {
        self.pulses
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }
}

impl ActuatorPort for SimActuator {
    fn write_duty(&mut self, duty: f32) -> Result<(), ActuatorError> {
        if !self.connected {
            return Err(ActuatorError::Disconnected);
        }
        self.writes += 1;
        let next = if duty > 0.0 {
            FeederState::Running { duty }
        } else {
            FeederState::Idle
        };
        if next != self.state {
            debug!("SimActuator: {:?} -> {:?}", self.state, next);
        }
        self.state = next;
        Ok(())
    }

    fn request_feed_pulse(&mut self) -> Result<(), ActuatorError> {
        if !self.connected {
            return Err(ActuatorError::Disconnected);
        }
        self.pulses += 1;
        Ok(())
    }
}
