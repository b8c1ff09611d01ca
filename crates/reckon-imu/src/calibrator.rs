use crate::angles::relative_angles;
use crate::types::{AngleSample, ReferenceFrame, RelativeAngles};

/// Captures the first sample of a session as the zero reference and reports
/// every later sample relative to it.
pub struct ReferenceCalibrator {
    state: CalibrationState,
    yaw_sign_flip: bool,
}

#[derive(Clone, Copy)]
enum CalibrationState {
    AwaitingReference,
    Referenced(ReferenceFrame),
}

impl ReferenceCalibrator {
    pub fn new(yaw_sign_flip: bool) -> Self {
        Self {
            state: CalibrationState::AwaitingReference,
            yaw_sign_flip,
        }
    }

    /// Relative orientation of `sample`, or `None` if this sample became the reference.
    pub fn observe(&mut self, sample: &AngleSample) -> Option<RelativeAngles> {
        match self.state {
            CalibrationState::AwaitingReference => {
                let reference = ReferenceFrame::from(sample);
                tracing::debug!(
                    roll0 = reference.roll0,
                    pitch0 = reference.pitch0,
                    yaw0 = reference.yaw0,
                    "Reference orientation captured"
                );
                self.state = CalibrationState::Referenced(reference);
                None
            }
            CalibrationState::Referenced(reference) => {
                Some(relative_angles(sample, &reference, self.yaw_sign_flip))
            }
        }
    }

    pub fn reference(&self) -> Option<&ReferenceFrame> {
        match &self.state {
            CalibrationState::AwaitingReference => None,
            CalibrationState::Referenced(reference) => Some(reference),
        }
    }

    pub fn is_calibrated(&self) -> bool {
        matches!(self.state, CalibrationState::Referenced(_))
    }

    /// Forget the reference; the next sample observed becomes the new one.
    pub fn reset(&mut self) {
        self.state = CalibrationState::AwaitingReference;
    }
}
