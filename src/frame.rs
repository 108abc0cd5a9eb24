use crate::types::{Matrix3, OrientationFrame, Pose, Vector3};

/// World "up" axis the palm tilt is measured against.
pub const WORLD_UP: Vector3 = [0.0, 0.0, 1.0];

/// Rebuild the rotation of a pose as `Rz(yaw) * Ry(pitch) * Rx(roll)`.
///
/// The frame axis is the third column of the result.
pub fn build_frame(pose: &Pose) -> OrientationFrame {
    let [roll, pitch, yaw] = pose.orientation;
    let rotation = mat_mul(&mat_mul(&rot_z(yaw), &rot_y(pitch)), &rot_x(roll));
    OrientationFrame {
        rotation,
        axis: third_column(&rotation),
    }
}

pub fn third_column(m: &Matrix3) -> Vector3 {
    [m[0][2], m[1][2], m[2][2]]
}

/// Angle in degrees between two unit axes.
///
/// The dot product is clamped to [-1, 1] before `acos`, so axes that are
/// parallel up to rounding still give 0 or 180 rather than NaN.
pub fn relative_angle(a: &Vector3, b: &Vector3) -> f64 {
    let theta = dot(a, b).clamp(-1.0, 1.0).acos();
    theta * 180.0 / std::f64::consts::PI
}

/// Tilt of the palm axis away from world up, in degrees.
pub fn palm_tilt(palm_axis: &Vector3) -> f64 {
    relative_angle(palm_axis, &WORLD_UP)
}

/// Flexion of a finger: its axis against the inverted palm axis, in degrees.
pub fn flexion(finger_axis: &Vector3, palm_axis: &Vector3) -> f64 {
    relative_angle(finger_axis, &negate(palm_axis))
}

pub fn dot(a: &Vector3, b: &Vector3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub fn negate(v: &Vector3) -> Vector3 {
    [-v[0], -v[1], -v[2]]
}

fn rot_x(angle: f64) -> Matrix3 {
    let (s, c) = angle.sin_cos();
    [[1.0, 0.0, 0.0], [0.0, c, -s], [0.0, s, c]]
}

fn rot_y(angle: f64) -> Matrix3 {
    let (s, c) = angle.sin_cos();
    [[c, 0.0, s], [0.0, 1.0, 0.0], [-s, 0.0, c]]
}

fn rot_z(angle: f64) -> Matrix3 {
    let (s, c) = angle.sin_cos();
    [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]]
}

fn mat_mul(a: &Matrix3, b: &Matrix3) -> Matrix3 {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}
