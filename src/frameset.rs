use crate::frame::{build_frame, flexion, palm_tilt};
use crate::pose::{decode, EulerMode};
use crate::types::{
    AngleReading, AngleSet, FrameSet, RawSample, RoleSet, SensorArity, SensorFrame, SensorRole,
};
use crate::{LibertyError, Result};

/// Sensor blocks of one inbound message, indexed by role.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorBlocks {
    blocks: [Option<RawSample>; 4],
}

impl SensorBlocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign blocks to roles in message order: first block is the palm.
    pub fn from_ordered(samples: &[RawSample]) -> Result<Self> {
        if samples.len() > 4 {
            return Err(LibertyError::TooManySensors(samples.len() as u8));
        }
        let mut blocks = Self::new();
        for (role, sample) in SensorRole::ALL.iter().zip(samples) {
            blocks.insert(*role, *sample);
        }
        Ok(blocks)
    }

    pub fn insert(&mut self, role: SensorRole, sample: RawSample) {
        self.blocks[role.index()] = Some(sample);
    }

    pub fn remove(&mut self, role: SensorRole) -> Option<RawSample> {
        self.blocks[role.index()].take()
    }

    pub fn get(&self, role: SensorRole) -> Option<&RawSample> {
        self.blocks[role.index()].as_ref()
    }

    /// Roles that have a block.
    pub fn present(&self) -> RoleSet {
        SensorRole::ALL
            .iter()
            .filter(|role| self.blocks[role.index()].is_some())
            .fold(RoleSet::empty(), |set, role| set | role.flag())
    }
}

/// Decode every configured role into a frame set.
///
/// All configured roles must be present and decodable; otherwise the whole
/// set is rejected and nothing is returned.
pub fn build_frame_set(
    blocks: &SensorBlocks,
    arity: SensorArity,
    mode: EulerMode,
) -> Result<FrameSet> {
    let mut sensors = Vec::with_capacity(arity.count());
    for role in arity.roles().roles() {
        let raw = blocks.get(role).ok_or(LibertyError::MissingRole(role))?;
        let pose = decode(raw, mode)?;
        let frame = build_frame(&pose);
        sensors.push(SensorFrame {
            role,
            raw: *raw,
            pose,
            frame,
        });
    }
    Ok(FrameSet { sensors })
}

/// Palm tilt plus the flexion of every finger sensor in the set.
pub fn compute_angles(set: &FrameSet) -> AngleSet {
    let palm_axis = set.palm().frame.axis;
    let fingers = set
        .fingers()
        .map(|finger| AngleReading {
            role: finger.role,
            degrees: flexion(&finger.frame.axis, &palm_axis),
        })
        .collect();

    AngleSet {
        palm_tilt: palm_tilt(&palm_axis),
        fingers,
    }
}
