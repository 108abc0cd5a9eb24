use crate::pose::EulerMode;
use crate::protocol::DEFAULT_VALID_FOR;
use crate::types::SensorArity;
use crate::{LibertyError, Result};
use std::time::Duration;

/// Default wait for the next inbound message.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// What the loop does when a message cannot be turned into a frame set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Drop the cycle and wait for the next one.
    #[default]
    SkipCycle,
    /// Keep pulling messages inside the same cycle until one decodes.
    RetryForever,
}

impl FailurePolicy {
    pub fn parse(s: &str) -> Option<FailurePolicy> {
        match s.to_ascii_lowercase().as_str() {
            "skip" | "skip-cycle" => Some(FailurePolicy::SkipCycle),
            "retry" | "forever" | "retry-forever" => Some(FailurePolicy::RetryForever),
            _ => None,
        }
    }
}

/// Settings for the acquisition loop.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquireConfig {
    /// Longest wait for one inbound message.
    pub timeout: Duration,
    /// Emit only every Nth accepted message. 0 disables sampling.
    pub sampling_divisor: u32,
    /// Sensors that must be present in every message.
    pub arity: SensorArity,
    pub on_failure: FailurePolicy,
    pub euler_mode: EulerMode,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            sampling_divisor: 0,
            arity: SensorArity::Four,
            on_failure: FailurePolicy::SkipCycle,
            euler_mode: EulerMode::Observed,
        }
    }
}

impl AcquireConfig {
    /// Apply `LIBERTY_EULER_MODE` and `LIBERTY_TIMEOUT_MS` if set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(value) = read_env("LIBERTY_EULER_MODE") {
            match EulerMode::parse(&value) {
                Some(mode) => self.euler_mode = mode,
                None => log::warn!(
                    "Unknown LIBERTY_EULER_MODE='{}', keeping {:?} (supported: observed|pole-guarded)",
                    value,
                    self.euler_mode
                ),
            }
        }
        if let Some(value) = read_env("LIBERTY_TIMEOUT_MS") {
            match value.parse::<u64>() {
                Ok(ms) if ms > 0 => self.timeout = Duration::from_millis(ms),
                _ => log::warn!(
                    "Invalid LIBERTY_TIMEOUT_MS='{}', keeping {} ms",
                    value,
                    self.timeout.as_millis()
                ),
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(LibertyError::InvalidConfig("timeout must be positive".into()));
        }
        Ok(())
    }
}

/// Settings for the synthetic publisher.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishConfig {
    /// Validity window stamped on every message.
    pub valid_for: Duration,
    /// Messages per second. `None` publishes as fast as the channel takes them.
    pub rate_hz: Option<f64>,
    /// Seed for reproducible payloads.
    pub seed: Option<u64>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            valid_for: DEFAULT_VALID_FOR,
            rate_hz: None,
            seed: None,
        }
    }
}

impl PublishConfig {
    /// Time between messages when rate limited.
    pub fn period(&self) -> Option<Duration> {
        self.rate_hz
            .filter(|hz| *hz > 0.0 && hz.is_finite())
            .map(|hz| Duration::from_secs_f64(1.0 / hz))
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(hz) = self.rate_hz {
            if !(hz > 0.0 && hz.is_finite()) {
                return Err(LibertyError::InvalidConfig(format!(
                    "publish rate must be a positive number (got {})",
                    hz
                )));
            }
        }
        Ok(())
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
