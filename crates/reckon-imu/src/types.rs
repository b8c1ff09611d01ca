use glam::DVec3;
use std::time::{Duration, Instant};

/// Absolute orientation reading from the sensor, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AngleSample {
    pub roll_deg: f64,
    pub pitch_deg: f64,
    pub yaw_deg: f64,
}

impl AngleSample {
    pub fn new(roll_deg: f64, pitch_deg: f64, yaw_deg: f64) -> Self {
        Self {
            roll_deg,
            pitch_deg,
            yaw_deg,
        }
    }
}

/// Orientation reading extended with body-frame acceleration.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionSample {
    pub angles: AngleSample,
    /// Body-frame acceleration including gravity (m/s^2).
    pub accel: DVec3,
}

impl MotionSample {
    pub fn new(angles: AngleSample, ax: f64, ay: f64, az: f64) -> Self {
        Self {
            angles,
            accel: DVec3::new(ax, ay, az),
        }
    }
}

/// One decoded line from the sensor feed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    Angles(AngleSample),
    Motion(MotionSample),
}

impl Sample {
    pub fn angles(&self) -> &AngleSample {
        match self {
            Sample::Angles(angles) => angles,
            Sample::Motion(motion) => &motion.angles,
        }
    }

    pub fn accel(&self) -> Option<DVec3> {
        match self {
            Sample::Angles(_) => None,
            Sample::Motion(motion) => Some(motion.accel),
        }
    }
}

/// Orientation captured from the first sample of a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceFrame {
    pub roll0: f64,
    pub pitch0: f64,
    pub yaw0: f64,
}

impl From<&AngleSample> for ReferenceFrame {
    fn from(sample: &AngleSample) -> Self {
        Self {
            roll0: sample.roll_deg,
            pitch0: sample.pitch_deg,
            yaw0: sample.yaw_deg,
        }
    }
}

/// Orientation relative to the reference frame, each axis in (-180, 180] degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RelativeAngles {
    pub roll_deg: f64,
    pub pitch_deg: f64,
    pub yaw_deg: f64,
}

/// Dead-reckoned world-frame motion.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct KinematicState {
    /// Meters, world frame.
    pub position: DVec3,
    /// m/s, world frame.
    pub velocity: DVec3,
    pub last_timestamp: Option<Instant>,
}

impl KinematicState {
    /// Zero position and velocity, timed from `now`.
    pub fn at_rest(now: Option<Instant>) -> Self {
        Self {
            position: DVec3::ZERO,
            velocity: DVec3::ZERO,
            last_timestamp: now,
        }
    }
}

/// Output of one accepted integration step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionUpdate {
    pub orientation: RelativeAngles,
    pub kinematics: KinematicState,
    /// Timestep the update integrated over (seconds).
    pub dt: f64,
}

/// What the estimator hands to sinks for every sample that produces output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub orientation: RelativeAngles,
    /// Present only for motion samples.
    pub kinematics: Option<KinematicState>,
    /// The sample as fed to the core (axis lock and unit scaling applied).
    pub sample: Sample,
    /// Time since the session's first sample.
    pub elapsed: Duration,
}
