//! Host adapter: bridges the feature mailbox and an actuator to the
//! domain port traits.
//!
//! The orchestrator's `tick` wants one value that is both a
//! [`FeaturePort`] and an [`ActuatorPort`]; this bundles the two halves.

use crate::app::ports::{ActuatorPort, FeaturePort};
use crate::error::ActuatorError;
use crate::sensors::FeatureVector;

use super::mailbox::FeatureMailbox;

pub struct HostIo<A> {
    mailbox: FeatureMailbox,
    actuator: A,
}

impl<A: ActuatorPort> HostIo<A> {
    pub fn new(mailbox: FeatureMailbox, actuator: A) -> Self {
        Self { mailbox, actuator }
    }

    pub fn mailbox(&self) -> &FeatureMailbox {
        &self.mailbox
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn actuator_mut(&mut self) -> &mut A {
        &mut self.actuator
    }
}

// ── FeaturePort implementation ────────────────────────────────

impl<A> FeaturePort for HostIo<A> {
    fn latest_features(&mut self) -> Option<FeatureVector> {
        self.mailbox.take()
    }
}

// ── ActuatorPort implementation ───────────────────────────────

impl<A: ActuatorPort> ActuatorPort for HostIo<A> {
    fn write_duty(&mut self, duty: f32) -> Result<(), ActuatorError> {
        self.actuator.write_duty(duty)
    }

    fn request_feed_pulse(&mut self) -> Result<(), ActuatorError> {
        self.actuator.request_feed_pulse()
    }
}
