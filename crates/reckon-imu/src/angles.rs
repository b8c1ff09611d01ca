//! Angle wrapping and Euler-angle rotation helpers. All angles are degrees.

use crate::types::{AngleSample, ReferenceFrame, RelativeAngles};
use glam::{DMat3, DVec3};

/// Wrap an angle into (-180, 180].
pub fn normalize_deg(angle: f64) -> f64 {
    let wrapped = (angle + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped <= -180.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}

/// Angles of `sample` relative to `reference`, each wrapped into (-180, 180].
///
/// With `yaw_sign_flip` the yaw difference is negated (and wrapped again) so
/// the reported direction follows the physical rotation of the sensor.
pub fn relative_angles(
    sample: &AngleSample,
    reference: &ReferenceFrame,
    yaw_sign_flip: bool,
) -> RelativeAngles {
    let d_yaw = normalize_deg(sample.yaw_deg - reference.yaw0);
    RelativeAngles {
        roll_deg: normalize_deg(sample.roll_deg - reference.roll0),
        pitch_deg: normalize_deg(sample.pitch_deg - reference.pitch0),
        yaw_deg: if yaw_sign_flip {
            normalize_deg(-d_yaw)
        } else {
            d_yaw
        },
    }
}

/// Body-to-world rotation for aerospace Z-Y-X Euler angles.
///
/// Yaw about world Z, then pitch about the new Y, then roll about the new X:
/// `R = Rz(yaw) * Ry(pitch) * Rx(roll)`.
pub fn body_to_world(roll_deg: f64, pitch_deg: f64, yaw_deg: f64) -> DMat3 {
    let (sr, cr) = roll_deg.to_radians().sin_cos();
    let (sp, cp) = pitch_deg.to_radians().sin_cos();
    let (sy, cy) = yaw_deg.to_radians().sin_cos();

    DMat3::from_cols(
        DVec3::new(cy * cp, sy * cp, -sp),
        DVec3::new(cy * sp * sr - sy * cr, sy * sp * sr + cy * cr, cp * sr),
        DVec3::new(cy * sp * cr + sy * sr, sy * sp * cr - cy * sr, cp * cr),
    )
}
