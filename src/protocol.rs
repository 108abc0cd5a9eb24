use crate::frameset::SensorBlocks;
use crate::types::{RawSample, SensorRole};
use crate::{LibertyError, Result};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// -- Envelope geometry --
pub const MAGIC: [u8; 2] = [0x4C, 0x42]; // "LB"
pub const HEADER_SIZE: usize = 17;
/// One sensor block: 7 x f64 LE.
pub const BLOCK_VALUES: usize = 7;
pub const BLOCK_SIZE: usize = BLOCK_VALUES * 8;
pub const MAX_SENSORS: usize = 4;
pub const MAX_MESSAGE_SIZE: usize = HEADER_SIZE + MAX_SENSORS * BLOCK_SIZE;

/// Default validity window stamped on outbound messages.
pub const DEFAULT_VALID_FOR: Duration = Duration::from_millis(100);

bitflags::bitflags! {
    /// Envelope metadata flags (byte 2).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MetaFlags: u8 {
        const HAS_META = 1 << 0;
        const HAS_TYPE = 1 << 1;
    }
}

/// Message types that share a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    Liberty = 0x01,
    ForceMoment = 0x02,
    Event = 0x03,
}

impl MsgType {
    pub fn from_tag(tag: u8) -> Result<MsgType> {
        match tag {
            0x01 => Ok(MsgType::Liberty),
            0x02 => Ok(MsgType::ForceMoment),
            0x03 => Ok(MsgType::Event),
            other => Err(LibertyError::UnknownType(other)),
        }
    }
}

/// Decoded envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub msg_type: MsgType,
    pub timestamp_us: u64,
    pub valid_for_us: u32,
    pub sensor_count: u8,
}

/// A decoded Liberty sample message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LibertyMessage {
    pub timestamp_us: u64,
    pub valid_for_us: u32,
    pub sensor_count: u8,
    pub blocks: SensorBlocks,
}

impl LibertyMessage {
    /// Wall-clock time after which the sample is stale. Saturates at `u64::MAX`.
    pub fn valid_until_us(&self) -> u64 {
        self.timestamp_us.saturating_add(self.valid_for_us as u64)
    }
}

/// Microseconds since the Unix epoch.
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Append an envelope to `out`.
///
/// Layout:
/// - `[0..2]`: magic "LB"
/// - `[2]`: meta flags (bit0 has-meta, bit1 has-type)
/// - `[3]`: message type tag
/// - `[4..12]`: u64 LE timestamp (microseconds since epoch)
/// - `[12..16]`: u32 LE validity window (microseconds)
/// - `[16]`: sensor block count (0..=4)
/// - `[17..]`: per sensor 7 x f64 LE `[px, py, pz, qx, qy, qz, qw]`
pub fn encode_message(
    msg_type: MsgType,
    timestamp_us: u64,
    valid_for: Duration,
    samples: &[RawSample],
    out: &mut Vec<u8>,
) -> Result<()> {
    if samples.len() > MAX_SENSORS {
        return Err(LibertyError::TooManySensors(samples.len() as u8));
    }
    let valid_for_us = u32::try_from(valid_for.as_micros()).unwrap_or(u32::MAX);

    out.reserve(HEADER_SIZE + samples.len() * BLOCK_SIZE);
    out.extend_from_slice(&MAGIC);
    out.push((MetaFlags::HAS_META | MetaFlags::HAS_TYPE).bits());
    out.push(msg_type as u8);
    out.extend_from_slice(&timestamp_us.to_le_bytes());
    out.extend_from_slice(&valid_for_us.to_le_bytes());
    out.push(samples.len() as u8);
    for sample in samples {
        for value in sample.to_wire() {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
    Ok(())
}

/// Validate the envelope header and return it.
///
/// Fails on short buffers, bad magic, a missing type tag or an unknown type.
pub fn parse_header(data: &[u8]) -> Result<Header> {
    if data.len() < HEADER_SIZE {
        return Err(LibertyError::Truncated {
            expected: HEADER_SIZE,
            got: data.len(),
        });
    }
    if data[0..2] != MAGIC {
        return Err(LibertyError::BadMagic);
    }

    let flags = MetaFlags::from_bits_truncate(data[2]);
    if !flags.contains(MetaFlags::HAS_META | MetaFlags::HAS_TYPE) {
        return Err(LibertyError::MissingType);
    }
    let msg_type = MsgType::from_tag(data[3])?;

    let timestamp_us = u64::from_le_bytes([
        data[4], data[5], data[6], data[7], data[8], data[9], data[10], data[11],
    ]);
    let valid_for_us = u32::from_le_bytes([data[12], data[13], data[14], data[15]]);

    Ok(Header {
        msg_type,
        timestamp_us,
        valid_for_us,
        sensor_count: data[16],
    })
}

/// Decode a Liberty message. Any other message type is rejected.
pub fn decode_liberty(data: &[u8]) -> Result<LibertyMessage> {
    let header = parse_header(data)?;
    if header.msg_type != MsgType::Liberty {
        return Err(LibertyError::UnexpectedType(header.msg_type));
    }

    let count = header.sensor_count as usize;
    if count > MAX_SENSORS {
        return Err(LibertyError::TooManySensors(header.sensor_count));
    }
    let expected = HEADER_SIZE + count * BLOCK_SIZE;
    if data.len() < expected {
        return Err(LibertyError::Truncated {
            expected,
            got: data.len(),
        });
    }

    let mut blocks = SensorBlocks::new();
    for (i, chunk) in data[HEADER_SIZE..expected].chunks_exact(BLOCK_SIZE).enumerate() {
        let mut values = [0.0; BLOCK_VALUES];
        for (value, bytes) in values.iter_mut().zip(chunk.chunks_exact(8)) {
            let mut le = [0u8; 8];
            le.copy_from_slice(bytes);
            *value = f64::from_le_bytes(le);
        }
        if let Some(role) = SensorRole::from_index(i) {
            blocks.insert(role, RawSample::from_wire(&values));
        }
    }

    Ok(LibertyMessage {
        timestamp_us: header.timestamp_us,
        valid_for_us: header.valid_for_us,
        sensor_count: header.sensor_count,
        blocks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RoleSet;

    fn sample(i: f64) -> RawSample {
        RawSample::new([i, i + 0.1, i + 0.2], [0.9, 0.1, 0.2, 0.3])
    }

    #[test]
    fn test_encode_layout() {
        let mut buf = Vec::new();
        encode_message(MsgType::Liberty, 42, DEFAULT_VALID_FOR, &[sample(1.0)], &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE + BLOCK_SIZE);
        assert_eq!(&buf[0..2], &MAGIC);
        assert_eq!(buf[2], 0x03);
        assert_eq!(buf[3], 0x01);
        assert_eq!(u64::from_le_bytes(buf[4..12].try_into().unwrap()), 42);
        assert_eq!(u32::from_le_bytes(buf[12..16].try_into().unwrap()), 100_000);
        assert_eq!(buf[16], 1);
        // qw is the last value of the block.
        let qw = f64::from_le_bytes(buf[HEADER_SIZE + 48..HEADER_SIZE + 56].try_into().unwrap());
        assert_eq!(qw, 0.9);
    }

    #[test]
    fn test_decode_liberty() {
        let samples = [sample(1.0), sample(2.0), sample(3.0), sample(4.0)];
        let mut buf = Vec::new();
        encode_message(MsgType::Liberty, 7, DEFAULT_VALID_FOR, &samples, &mut buf).unwrap();

        let msg = decode_liberty(&buf).unwrap();
        assert_eq!(msg.timestamp_us, 7);
        assert_eq!(msg.valid_until_us(), 100_007);
        assert_eq!(msg.sensor_count, 4);
        assert_eq!(msg.blocks.present(), RoleSet::all());
        assert_eq!(msg.blocks.get(SensorRole::Finger2), Some(&samples[2]));
    }

    #[test]
    fn test_partial_message_leaves_roles_empty() {
        let mut buf = Vec::new();
        encode_message(MsgType::Liberty, 0, DEFAULT_VALID_FOR, &[sample(1.0), sample(2.0)], &mut buf)
            .unwrap();
        let msg = decode_liberty(&buf).unwrap();
        assert_eq!(msg.blocks.present(), RoleSet::PALM | RoleSet::FINGER1);
        assert!(msg.blocks.get(SensorRole::Finger2).is_none());
    }

    #[test]
    fn test_rejects_other_type() {
        let mut buf = Vec::new();
        encode_message(MsgType::ForceMoment, 0, DEFAULT_VALID_FOR, &[], &mut buf).unwrap();
        assert!(matches!(
            decode_liberty(&buf),
            Err(LibertyError::UnexpectedType(MsgType::ForceMoment))
        ));
    }

    #[test]
    fn test_rejects_missing_type() {
        let mut buf = Vec::new();
        encode_message(MsgType::Liberty, 0, DEFAULT_VALID_FOR, &[sample(1.0)], &mut buf).unwrap();
        buf[2] = MetaFlags::HAS_META.bits();
        assert!(matches!(decode_liberty(&buf), Err(LibertyError::MissingType)));
        buf[2] = 0;
        assert!(matches!(decode_liberty(&buf), Err(LibertyError::MissingType)));
    }

    #[test]
    fn test_rejects_unknown_type_and_magic() {
        let mut buf = Vec::new();
        encode_message(MsgType::Liberty, 0, DEFAULT_VALID_FOR, &[], &mut buf).unwrap();
        buf[3] = 0x7F;
        assert!(matches!(decode_liberty(&buf), Err(LibertyError::UnknownType(0x7F))));
        buf[0] = 0x00;
        assert!(matches!(decode_liberty(&buf), Err(LibertyError::BadMagic)));
    }

    #[test]
    fn test_rejects_truncated() {
        let mut buf = Vec::new();
        encode_message(MsgType::Liberty, 0, DEFAULT_VALID_FOR, &[sample(1.0)], &mut buf).unwrap();
        buf.truncate(buf.len() - 1);
        assert!(matches!(
            decode_liberty(&buf),
            Err(LibertyError::Truncated { expected, .. }) if expected == HEADER_SIZE + BLOCK_SIZE
        ));
        assert!(matches!(
            parse_header(&buf[..5]),
            Err(LibertyError::Truncated { got: 5, .. })
        ));
    }

    #[test]
    fn test_rejects_sensor_count_overflow() {
        let mut buf = Vec::new();
        encode_message(MsgType::Liberty, 0, DEFAULT_VALID_FOR, &[], &mut buf).unwrap();
        buf[16] = 5;
        assert!(matches!(decode_liberty(&buf), Err(LibertyError::TooManySensors(5))));
    }

    #[test]
    fn test_valid_until_saturates() {
        let mut buf = Vec::new();
        encode_message(MsgType::Liberty, u64::MAX, DEFAULT_VALID_FOR, &[], &mut buf).unwrap();
        let msg = decode_liberty(&buf).unwrap();
        assert_eq!(msg.timestamp_us, u64::MAX);
        assert_eq!(msg.valid_until_us(), u64::MAX);
    }
}
