//! # liberty - pose decoding and finger angles for Liberty 6DOF trackers
//!
//! Turns raw Liberty sensor blocks (position + quaternion) into Euler poses,
//! rebuilds per-sensor orientation frames and measures the flexion angle of
//! every finger sensor against the palm sensor. Provides:
//! - A pure decode → frame → angle pipeline
//! - A single-threaded acquisition loop over a pluggable [`Channel`]
//! - A synthetic publisher for running without hardware
//! - C FFI for the downstream controller
//!
//! ## Quick Start
//! ```no_run
//! use liberty::{AcquireConfig, Acquisition, MemoryChannel, Session, ShutdownFlag};
//! use liberty::sink::{ConsolePrinter, PrintMode};
//!
//! let shutdown = ShutdownFlag::new();
//! let channel = MemoryChannel::new("liberty", 16);
//! let mut session = Session::open("liberty_print", channel, shutdown).unwrap();
//! let mut printer = ConsolePrinter::stdout(PrintMode::Angles);
//! let mut acquisition = Acquisition::new(AcquireConfig::default());
//! acquisition.run(&mut session, &mut printer).unwrap();
//! ```

pub mod error;
pub mod types;
pub mod pose;
pub mod frame;
pub mod frameset;
pub mod protocol;
pub mod channel;
pub mod signal;
pub mod session;
pub mod config;
pub mod acquire;
pub mod sink;
pub mod publisher;
pub mod ffi;

pub use acquire::{Acquisition, CycleOutcome, CycleReport, RunStats};
pub use channel::{Channel, MemoryChannel, UdpChannel};
pub use config::{AcquireConfig, FailurePolicy, PublishConfig};
pub use error::LibertyError;
pub use pose::EulerMode;
pub use publisher::SyntheticPublisher;
pub use session::{LifecycleState, Session};
pub use signal::ShutdownFlag;
pub use types::*;

/// Result type alias for liberty operations.
pub type Result<T> = std::result::Result<T, LibertyError>;
