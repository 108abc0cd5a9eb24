//! C FFI layer for liberty.
//!
//! Plain-data API over the decode, frame and angle operations for the C/C++
//! hand controller. The generated C header is written to `include/liberty.h`
//! by cbindgen.

use crate::error::LastError;
use crate::frame::{build_frame, relative_angle};
use crate::frameset::{build_frame_set, compute_angles, SensorBlocks};
use crate::pose::{decode, EulerMode};
use crate::types::{Pose, RawSample, SensorArity, Vector3};
use crate::{LibertyError, Result};
use std::ffi::{c_char, c_int};

static LAST_ERROR: LastError = LastError::new();

/// One sensor block as received from the tracker.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LbSample {
    /// Position [x, y, z].
    pub position: [f64; 3],
    /// Quaternion [w, x, y, z], not necessarily normalized.
    pub quaternion: [f64; 4],
}

/// Decoded pose.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct LbPose {
    /// Position [x, -y, -z].
    pub position: [f64; 3],
    /// Euler angles [roll, pitch, yaw] in radians.
    pub orientation: [f64; 3],
}

/// Orientation frame of one pose.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct LbFrame {
    /// Rotation matrix, flat row-major (9 elements).
    pub rotation: [f64; 9],
    /// Forward axis (third column of the rotation).
    pub axis: [f64; 3],
}

/// Angles for one hand, in degrees.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct LbAngles {
    pub palm_tilt: f64,
    /// Flexion of finger1..finger3; only the first `finger_count` are set.
    pub fingers: [f64; 3],
    pub finger_count: u32,
}

impl From<LbSample> for RawSample {
    fn from(s: LbSample) -> Self {
        RawSample::new(s.position, s.quaternion)
    }
}

impl From<Pose> for LbPose {
    fn from(p: Pose) -> Self {
        LbPose {
            position: p.position,
            orientation: p.orientation,
        }
    }
}

impl From<LbPose> for Pose {
    fn from(p: LbPose) -> Self {
        Pose {
            position: p.position,
            orientation: p.orientation,
        }
    }
}

fn euler_mode(mode: c_int) -> Result<EulerMode> {
    match mode {
        0 => Ok(EulerMode::Observed),
        1 => Ok(EulerMode::PoleGuarded),
        other => Err(LibertyError::InvalidConfig(format!(
            "euler mode must be 0 or 1 (got {})",
            other
        ))),
    }
}

/// Report `result` to C: 0 on success, -1 with the last error set otherwise.
fn status(result: Result<()>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(e) => {
            LAST_ERROR.set(&e);
            -1
        }
    }
}

/// Decode one sensor block into a pose.
/// `mode`: 0 = observed, 1 = pole-guarded.
/// Returns 0 on success, -1 on error (check lb_last_error()).
///
/// # Safety
/// `sample` and `out` must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn lb_decode_pose(
    sample: *const LbSample,
    mode: c_int,
    out: *mut LbPose,
) -> c_int {
    if sample.is_null() || out.is_null() {
        return -1;
    }
    let raw = RawSample::from(*sample);
    status(euler_mode(mode).and_then(|mode| {
        let pose = decode(&raw, mode)?;
        out.write(pose.into());
        Ok(())
    }))
}

/// Build the orientation frame of a decoded pose.
/// Returns 0 on success, -1 on null input.
///
/// # Safety
/// `pose` and `out` must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn lb_build_frame(pose: *const LbPose, out: *mut LbFrame) -> c_int {
    if pose.is_null() || out.is_null() {
        return -1;
    }
    let frame = build_frame(&Pose::from(*pose));
    let m = frame.rotation;
    out.write(LbFrame {
        rotation: [
            m[0][0], m[0][1], m[0][2], m[1][0], m[1][1], m[1][2], m[2][0], m[2][1], m[2][2],
        ],
        axis: frame.axis,
    });
    0
}

/// Angle between two 3-vectors in degrees, in `[0, 180]`.
/// Returns NaN if either pointer is null.
///
/// # Safety
/// `a` and `b` must each point to 3 doubles, or be null.
#[no_mangle]
pub unsafe extern "C" fn lb_relative_angle(a: *const f64, b: *const f64) -> f64 {
    if a.is_null() || b.is_null() {
        return f64::NAN;
    }
    let a: Vector3 = *(a as *const Vector3);
    let b: Vector3 = *(b as *const Vector3);
    relative_angle(&a, &b)
}

/// Palm tilt and finger flexion for `count` sensor blocks (1, 2 or 4),
/// ordered palm, finger1, finger2, finger3.
/// Returns 0 on success, -1 on error (check lb_last_error()).
///
/// # Safety
/// `samples` must point to `count` `LbSample` elements; `out` must be valid.
#[no_mangle]
pub unsafe extern "C" fn lb_compute_angles(
    samples: *const LbSample,
    count: c_int,
    mode: c_int,
    out: *mut LbAngles,
) -> c_int {
    if samples.is_null() || out.is_null() || count < 0 {
        return -1;
    }
    let raw: Vec<RawSample> = std::slice::from_raw_parts(samples, count as usize)
        .iter()
        .map(|s| RawSample::from(*s))
        .collect();

    status(angles_for(&raw, mode).map(|angles| out.write(angles)))
}

fn angles_for(raw: &[RawSample], mode: c_int) -> Result<LbAngles> {
    let arity = SensorArity::try_from(raw.len().min(u8::MAX as usize) as u8)?;
    let blocks = SensorBlocks::from_ordered(raw)?;
    let frames = build_frame_set(&blocks, arity, euler_mode(mode)?)?;
    let angles = compute_angles(&frames);

    let mut result = LbAngles {
        palm_tilt: angles.palm_tilt,
        finger_count: angles.fingers.len() as u32,
        ..LbAngles::default()
    };
    for (slot, reading) in result.fingers.iter_mut().zip(&angles.fingers) {
        *slot = reading.degrees;
    }
    Ok(result)
}

/// Get the last error message. Returns NULL if no error.
/// The returned pointer is valid until the next liberty API call.
#[no_mangle]
pub extern "C" fn lb_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY: LbSample = LbSample {
        position: [1.0, 2.0, 3.0],
        quaternion: [1.0, 0.0, 0.0, 0.0],
    };

    #[test]
    fn test_decode_and_frame() {
        let mut pose = LbPose::default();
        let mut frame = LbFrame::default();
        unsafe {
            assert_eq!(lb_decode_pose(&IDENTITY, 0, &mut pose), 0);
            assert_eq!(lb_build_frame(&pose, &mut frame), 0);
        }
        assert_eq!(pose.position, [1.0, -2.0, -3.0]);
        assert!((frame.rotation[0] - 1.0).abs() < 1e-12);
        assert!((frame.rotation[8] - 1.0).abs() < 1e-12);
        assert!((frame.axis[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_decode_sets_last_error() {
        let zero = LbSample {
            position: [0.0; 3],
            quaternion: [0.0; 4],
        };
        let mut pose = LbPose::default();
        unsafe {
            assert_eq!(lb_decode_pose(&zero, 0, &mut pose), -1);
            assert!(!lb_last_error().is_null());
        }
    }

    #[test]
    fn test_bad_euler_mode() {
        let mut pose = LbPose::default();
        unsafe {
            assert_eq!(lb_decode_pose(&IDENTITY, 7, &mut pose), -1);
        }
    }

    #[test]
    fn test_relative_angle() {
        let x = [1.0, 0.0, 0.0];
        let y = [0.0, 1.0, 0.0];
        unsafe {
            assert!((lb_relative_angle(x.as_ptr(), y.as_ptr()) - 90.0).abs() < 1e-9);
            assert!(lb_relative_angle(x.as_ptr(), std::ptr::null()).is_nan());
        }
    }

    #[test]
    fn test_compute_angles() {
        let samples = [IDENTITY; 4];
        let mut angles = LbAngles::default();
        unsafe {
            assert_eq!(lb_compute_angles(samples.as_ptr(), 4, 0, &mut angles), 0);
        }
        assert_eq!(angles.finger_count, 3);
        assert!(angles.palm_tilt.abs() < 1e-9);
        assert!(angles.fingers.iter().all(|a| (a - 180.0).abs() < 1e-9));

        unsafe {
            assert_eq!(lb_compute_angles(samples.as_ptr(), 3, 0, &mut angles), -1);
        }
    }

    #[test]
    fn test_null_pointers() {
        unsafe {
            assert_eq!(lb_decode_pose(std::ptr::null(), 0, std::ptr::null_mut()), -1);
            assert_eq!(lb_build_frame(std::ptr::null(), std::ptr::null_mut()), -1);
        }
    }
}
