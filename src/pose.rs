use crate::types::{Matrix3, Pose, RawSample, Vector3};
use crate::{LibertyError, Result};
use std::f64::consts::FRAC_PI_2;

/// Distance from ±1 at which `m[2][0]` counts as a gimbal pole.
pub const POLE_EPSILON: f64 = 1e-10;

/// How Euler angles are pulled out of a rotation matrix.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EulerMode {
    /// Always use the general formula, even at the poles. This matches the
    /// output of the existing Liberty tools, which compute the pole case
    /// and then overwrite it.
    #[default]
    Observed = 0,
    /// Use the pole-case angles when `|m[2][0]|` is within
    /// [`POLE_EPSILON`] of 1.
    PoleGuarded = 1,
}

impl EulerMode {
    pub fn parse(s: &str) -> Option<EulerMode> {
        match s.to_ascii_lowercase().as_str() {
            "observed" => Some(EulerMode::Observed),
            "pole-guarded" | "pole_guarded" | "guarded" => Some(EulerMode::PoleGuarded),
            _ => None,
        }
    }
}

/// Decode one sensor block into a pose.
///
/// Position keeps x and negates y and z. Orientation is the XYZ Euler triple
/// `(ex, ey, ez)` of the sample's rotation, stored as `(-ez, -ey, ex)`.
pub fn decode(raw: &RawSample, mode: EulerMode) -> Result<Pose> {
    if !raw.is_finite() {
        return Err(LibertyError::NonFinite);
    }

    let [px, py, pz] = raw.position;
    let [w, x, y, z] = normalize_quaternion(raw.quaternion)?;
    let m = quaternion_to_rotation(w, x, y, z);
    let [ex, ey, ez] = matrix_to_euler(&m, mode);

    Ok(Pose {
        position: [px, -py, -pz],
        orientation: [-ez, -ey, ex],
    })
}

/// Scale a [w, x, y, z] quaternion to unit length.
///
/// Components are divided by the largest magnitude first, so very large or
/// very small quaternions normalize without overflow. Only the all-zero
/// quaternion is rejected.
pub fn normalize_quaternion(q: [f64; 4]) -> Result<[f64; 4]> {
    if !q.iter().all(|v| v.is_finite()) {
        return Err(LibertyError::NonFinite);
    }
    let largest = q.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    if largest == 0.0 {
        return Err(LibertyError::DegenerateQuaternion);
    }
    let scaled = q.map(|v| v / largest);
    let norm = scaled.iter().map(|v| v * v).sum::<f64>().sqrt();
    Ok(scaled.map(|v| v / norm))
}

/// Convert a unit quaternion [w, x, y, z] to a 3x3 rotation matrix (row-major).
pub fn quaternion_to_rotation(w: f64, x: f64, y: f64, z: f64) -> Matrix3 {
    [
        [1.0 - 2.0*(y*y + z*z), 2.0*(x*y - z*w),       2.0*(x*z + y*w)],
        [2.0*(x*y + z*w),       1.0 - 2.0*(x*x + z*z), 2.0*(y*z - x*w)],
        [2.0*(x*z - y*w),       2.0*(y*z + x*w),       1.0 - 2.0*(x*x + y*y)],
    ]
}

/// Extract XYZ Euler angles (radians) from a rotation matrix.
///
/// General case:
///   x = atan2(m21, m22), y = -asin(m20), z = atan2(m10, m00)
///
/// At the poles (`m20` within [`POLE_EPSILON`] of ±1), [`EulerMode::PoleGuarded`]
/// instead returns x = atan2(m01, m02), y = ∓π/2, z = 0.
pub fn matrix_to_euler(m: &Matrix3, mode: EulerMode) -> Vector3 {
    if mode == EulerMode::PoleGuarded {
        if m[2][0] > 1.0 - POLE_EPSILON {
            return [m[0][1].atan2(m[0][2]), -FRAC_PI_2, 0.0];
        }
        if m[2][0] < -(1.0 - POLE_EPSILON) {
            return [m[0][1].atan2(m[0][2]), FRAC_PI_2, 0.0];
        }
    }

    // asin is undefined past ±1; rounding in the matrix can push m20 there.
    let x = m[2][1].atan2(m[2][2]);
    let y = -m[2][0].clamp(-1.0, 1.0).asin();
    let z = m[1][0].atan2(m[0][0]);
    [x, y, z]
}
