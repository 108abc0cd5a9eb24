use crate::protocol::MsgType;
use crate::types::SensorRole;
use std::fmt;

/// Errors that can occur while acquiring and decoding Liberty data.
#[derive(Debug, thiserror::Error)]
pub enum LibertyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout waiting for data")]
    Timeout,

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Channel full")]
    ChannelFull,

    #[error("No channel given")]
    MissingChannel,

    #[error("Channel name is too long ({0} bytes, max {max})", max = crate::channel::CHANNEL_NAME_MAX)]
    ChannelNameTooLong(usize),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Truncated message: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("Bad message magic")]
    BadMagic,

    #[error("Message carries no type tag")]
    MissingType,

    #[error("Unexpected message type {0:?}")]
    UnexpectedType(MsgType),

    #[error("Unknown message type 0x{0:02x}")]
    UnknownType(u8),

    #[error("Too many sensor blocks: {0}")]
    TooManySensors(u8),

    #[error("Sensor {0:?} missing from payload")]
    MissingRole(SensorRole),

    #[error("Quaternion has zero magnitude")]
    DegenerateQuaternion,

    #[error("Sample contains NaN or infinite values")]
    NonFinite,
}

impl LibertyError {
    /// Errors the acquisition loop swallows: the cycle is dropped and the
    /// loop moves on to the next message.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LibertyError::Timeout
                | LibertyError::Truncated { .. }
                | LibertyError::BadMagic
                | LibertyError::MissingType
                | LibertyError::UnexpectedType(_)
                | LibertyError::UnknownType(_)
                | LibertyError::TooManySensors(_)
                | LibertyError::MissingRole(_)
                | LibertyError::DegenerateQuaternion
                | LibertyError::NonFinite
        )
    }
}

/// Thread-safe last-error storage for the C FFI layer.
pub(crate) struct LastError {
    message: std::sync::Mutex<String>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: std::sync::Mutex::new(String::new()),
        }
    }

    pub fn set(&self, err: &LibertyError) {
        if let Ok(mut msg) = self.message.lock() {
            *msg = fmt::format(format_args!("{}\0", err));
        }
    }

    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        match self.message.lock() {
            Ok(msg) if !msg.is_empty() => msg.as_ptr() as *const std::ffi::c_char,
            _ => std::ptr::null(),
        }
    }
}
