/// 3-vector used for positions and frame axes.
pub type Vector3 = [f64; 3];

/// 3x3 row-major matrix, `m[row][col]`.
pub type Matrix3 = [[f64; 3]; 3];

/// One sensor block as delivered by the tracker.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    /// Position [x, y, z] in the tracker's native frame.
    pub position: Vector3,
    /// Orientation quaternion [w, x, y, z]. Need not be normalized.
    pub quaternion: [f64; 4],
}

impl RawSample {
    pub fn new(position: Vector3, quaternion: [f64; 4]) -> Self {
        Self {
            position,
            quaternion,
        }
    }

    /// Build from the Liberty wire order `[px, py, pz, qx, qy, qz, qw]`.
    pub fn from_wire(data: &[f64; 7]) -> Self {
        Self {
            position: [data[0], data[1], data[2]],
            quaternion: [data[6], data[3], data[4], data[5]],
        }
    }

    /// Flatten into the Liberty wire order `[px, py, pz, qx, qy, qz, qw]`.
    pub fn to_wire(&self) -> [f64; 7] {
        let [w, x, y, z] = self.quaternion;
        [
            self.position[0],
            self.position[1],
            self.position[2],
            x,
            y,
            z,
            w,
        ]
    }

    pub fn is_finite(&self) -> bool {
        self.position.iter().chain(self.quaternion.iter()).all(|v| v.is_finite())
    }
}

/// Decoded 6DOF pose.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Position [x, y, z] with y and z negated relative to the tracker.
    pub position: Vector3,
    /// Euler angles [roll, pitch, yaw] in radians.
    pub orientation: Vector3,
}

impl Pose {
    /// The pose as the flat 6-vector `[x, y, z, roll, pitch, yaw]`.
    pub fn as_array(&self) -> [f64; 6] {
        [
            self.position[0],
            self.position[1],
            self.position[2],
            self.orientation[0],
            self.orientation[1],
            self.orientation[2],
        ]
    }
}

/// Rotation matrix rebuilt from a pose, plus its forward (third column) axis.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationFrame {
    pub rotation: Matrix3,
    pub axis: Vector3,
}

/// Logical identity of one sensor within a message.
///
/// Sensor block *n* of a message always carries role *n*.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SensorRole {
    Palm = 0,
    Finger1 = 1,
    Finger2 = 2,
    Finger3 = 3,
}

impl SensorRole {
    pub const ALL: [SensorRole; 4] = [
        SensorRole::Palm,
        SensorRole::Finger1,
        SensorRole::Finger2,
        SensorRole::Finger3,
    ];

    /// Index of the sensor block carrying this role.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<SensorRole> {
        Self::ALL.get(index).copied()
    }

    pub fn flag(self) -> RoleSet {
        RoleSet::from_bits_truncate(1 << self.index())
    }

    pub fn label(self) -> &'static str {
        match self {
            SensorRole::Palm => "palm",
            SensorRole::Finger1 => "finger1",
            SensorRole::Finger2 => "finger2",
            SensorRole::Finger3 => "finger3",
        }
    }
}

bitflags::bitflags! {
    /// Set of sensor roles, used for configured and received sensors.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RoleSet: u8 {
        const PALM    = 1 << 0;
        const FINGER1 = 1 << 1;
        const FINGER2 = 1 << 2;
        const FINGER3 = 1 << 3;
    }
}

impl RoleSet {
    /// Roles in this set, in block order.
    pub fn roles(self) -> impl Iterator<Item = SensorRole> {
        SensorRole::ALL
            .into_iter()
            .filter(move |role| self.contains(role.flag()))
    }
}

/// Number of sensors wired up in a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorArity {
    /// Palm only (posture logging).
    One,
    /// Palm and one finger.
    Two,
    /// Palm and three fingers.
    Four,
}

impl SensorArity {
    pub fn roles(self) -> RoleSet {
        match self {
            SensorArity::One => RoleSet::PALM,
            SensorArity::Two => RoleSet::PALM | RoleSet::FINGER1,
            SensorArity::Four => RoleSet::all(),
        }
    }

    pub fn count(self) -> usize {
        match self {
            SensorArity::One => 1,
            SensorArity::Two => 2,
            SensorArity::Four => 4,
        }
    }
}

impl TryFrom<u8> for SensorArity {
    type Error = crate::LibertyError;

    fn try_from(n: u8) -> crate::Result<Self> {
        match n {
            1 => Ok(SensorArity::One),
            2 => Ok(SensorArity::Two),
            4 => Ok(SensorArity::Four),
            other => Err(crate::LibertyError::InvalidConfig(format!(
                "sensor count must be 1, 2 or 4 (got {})",
                other
            ))),
        }
    }
}

/// One decoded sensor within a cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorFrame {
    pub role: SensorRole,
    pub raw: RawSample,
    pub pose: Pose,
    pub frame: OrientationFrame,
}

/// All decoded sensors of one cycle, ordered by role. Always holds the palm.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSet {
    pub(crate) sensors: Vec<SensorFrame>,
}

impl FrameSet {
    pub fn get(&self, role: SensorRole) -> Option<&SensorFrame> {
        self.sensors.iter().find(|s| s.role == role)
    }

    pub fn palm(&self) -> &SensorFrame {
        &self.sensors[0]
    }

    /// Non-palm sensors in role order.
    pub fn fingers(&self) -> impl Iterator<Item = &SensorFrame> {
        self.sensors.iter().skip(1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SensorFrame> {
        self.sensors.iter()
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn roles(&self) -> RoleSet {
        self.sensors
            .iter()
            .fold(RoleSet::empty(), |set, s| set | s.role.flag())
    }
}

/// Flexion angle of one finger sensor against the palm, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleReading {
    pub role: SensorRole,
    pub degrees: f64,
}

/// Every angle derived from one frame set.
#[derive(Debug, Clone, PartialEq)]
pub struct AngleSet {
    /// Palm forward axis against world up, in degrees.
    pub palm_tilt: f64,
    pub fingers: Vec<AngleReading>,
}

impl AngleSet {
    pub fn get(&self, role: SensorRole) -> Option<f64> {
        self.fingers
            .iter()
            .find(|r| r.role == role)
            .map(|r| r.degrees)
    }
}
