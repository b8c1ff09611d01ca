use crate::angles::body_to_world;
use crate::calibrator::ReferenceCalibrator;
use crate::types::{
    AngleSample, KinematicState, MotionSample, MotionUpdate, ReferenceFrame, RelativeAngles,
};
use reckon_config::EstimatorConfig;
use std::time::Instant;

/// Result of feeding one motion sample to the integrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IntegrationOutcome {
    /// The sample became the session reference. Kinematics start at rest.
    Calibrated(ReferenceFrame),
    /// First timed sample after an angle-only reference; only the clock was armed.
    Armed,
    /// Timestep outside `(0, max_valid_dt]`. Position and velocity are untouched.
    Rejected { dt: f64 },
    Updated(MotionUpdate),
}

impl IntegrationOutcome {
    pub fn into_update(self) -> Option<MotionUpdate> {
        match self {
            IntegrationOutcome::Updated(update) => Some(update),
            _ => None,
        }
    }
}

/// Dead-reckons world-frame velocity and position from body-frame acceleration.
///
/// Each accepted sample is rotated into the world frame using its absolute
/// roll/pitch/yaw, gravity is removed from world Z, and the result is
/// integrated with one explicit Euler step (velocity first, then position).
/// There is no bias estimation or zero-velocity correction, so position
/// drifts without bound over a long session.
pub struct MotionIntegrator {
    calibrator: ReferenceCalibrator,
    state: KinematicState,
    gravity: f64,
    max_valid_dt: f64,
}

impl MotionIntegrator {
    pub fn new(config: &EstimatorConfig) -> Self {
        Self {
            calibrator: ReferenceCalibrator::new(config.yaw_sign_flip),
            state: KinematicState::default(),
            gravity: config.gravity,
            max_valid_dt: config.max_valid_dt,
        }
    }

    /// Integrate one sample taken at `now`.
    pub fn integrate(&mut self, sample: &MotionSample, now: Instant) -> Option<MotionUpdate> {
        self.step(sample, now).into_update()
    }

    pub fn step(&mut self, sample: &MotionSample, now: Instant) -> IntegrationOutcome {
        let Some(orientation) = self.calibrator.observe(&sample.angles) else {
            self.state = KinematicState::at_rest(Some(now));
            return IntegrationOutcome::Calibrated(ReferenceFrame::from(&sample.angles));
        };

        let Some(last) = self.state.last_timestamp.replace(now) else {
            return IntegrationOutcome::Armed;
        };

        let dt = match now.checked_duration_since(last) {
            Some(elapsed) => elapsed.as_secs_f64(),
            None => -last.duration_since(now).as_secs_f64(),
        };
        if dt <= 0.0 || dt > self.max_valid_dt {
            tracing::debug!(dt, max = self.max_valid_dt, "Rejecting implausible timestep");
            return IntegrationOutcome::Rejected { dt };
        }

        let angles = &sample.angles;
        let rotation = body_to_world(angles.roll_deg, angles.pitch_deg, angles.yaw_deg);
        let mut accel_world = rotation * sample.accel;
        accel_world.z -= self.gravity;

        self.state.velocity += accel_world * dt;
        self.state.position += self.state.velocity * dt;

        IntegrationOutcome::Updated(MotionUpdate {
            orientation,
            kinematics: self.state,
            dt,
        })
    }

    /// Relative orientation for an angle-only sample.
    ///
    /// If this sample becomes the reference, kinematics are zeroed and left
    /// untimed; the next motion sample only arms the clock.
    pub fn orient(&mut self, angles: &AngleSample) -> Option<RelativeAngles> {
        let relative = self.calibrator.observe(angles);
        if relative.is_none() {
            self.state = KinematicState::at_rest(None);
        }
        relative
    }

    pub fn state(&self) -> &KinematicState {
        &self.state
    }

    pub fn reference(&self) -> Option<&ReferenceFrame> {
        self.calibrator.reference()
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrator.is_calibrated()
    }

    /// Drop the reference and all kinematic state.
    pub fn reset(&mut self) {
        self.calibrator.reset();
        self.state = KinematicState::default();
    }
}
