use crate::channel::Channel;
use crate::config::PublishConfig;
use crate::protocol::{encode_message, now_micros, MsgType, MAX_SENSORS};
use crate::session::Session;
use crate::types::RawSample;
use crate::{LibertyError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

/// Counters for a publishing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishStats {
    pub sent: u64,
    pub failed: u64,
}

/// Generates random four-sensor Liberty messages for running without hardware.
pub struct SyntheticPublisher<R: Rng = StdRng> {
    config: PublishConfig,
    rng: R,
    buffer: Vec<u8>,
    stats: PublishStats,
}

impl SyntheticPublisher<StdRng> {
    /// Seeded from `config.seed` when set, from the OS otherwise.
    pub fn new(config: PublishConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::with_rng(config, rng)
    }
}

impl<R: Rng> SyntheticPublisher<R> {
    pub fn with_rng(config: PublishConfig, rng: R) -> Self {
        Self {
            config,
            rng,
            buffer: Vec::new(),
            stats: PublishStats::default(),
        }
    }

    pub fn stats(&self) -> PublishStats {
        self.stats
    }

    /// One random payload. Positions fall in `[0, 1)`; quaternions are
    /// unit length.
    pub fn generate(&mut self) -> [RawSample; MAX_SENSORS] {
        std::array::from_fn(|_| {
            let position = [
                self.rng.random::<f64>(),
                self.rng.random::<f64>(),
                self.rng.random::<f64>(),
            ];
            RawSample::new(position, random_unit_quaternion(&mut self.rng))
        })
    }

    /// Generate, encode and publish one message.
    pub fn publish_once<C: Channel>(&mut self, channel: &mut C) -> Result<()> {
        let samples = self.generate();
        for (i, sample) in samples.iter().enumerate() {
            log::debug!("sensor{} {:6.2?}", i + 1, sample.to_wire());
        }
        self.buffer.clear();
        encode_message(
            MsgType::Liberty,
            now_micros(),
            self.config.valid_for,
            &samples,
            &mut self.buffer,
        )?;
        channel.publish(&self.buffer)
    }

    /// Publish until shutdown is requested or the channel closes.
    ///
    /// A failed publish is logged and the loop carries on.
    pub fn run<C: Channel>(&mut self, session: &mut Session<C>) -> Result<PublishStats> {
        self.config.validate()?;
        let period = self.config.period();

        session.begin();
        while !session.should_stop() {
            let started = Instant::now();
            match self.publish_once(session.channel()) {
                Ok(()) => self.stats.sent += 1,
                Err(LibertyError::ChannelClosed) => {
                    log::warn!("[{}] channel closed, stopping", session.ident());
                    break;
                }
                Err(e) => {
                    self.stats.failed += 1;
                    log::error!("Couldn't send message on {}: {}", session.channel().name(), e);
                }
            }
            if let Some(period) = period {
                if let Some(rest) = period.checked_sub(started.elapsed()) {
                    std::thread::sleep(rest);
                }
            }
        }

        session.stop();
        log::info!(
            "[{}] published {} message(s), {} failed",
            session.ident(),
            self.stats.sent,
            self.stats.failed
        );
        session.close();
        Ok(self.stats)
    }
}

/// Uniform-ish random rotation; falls back to identity for a near-zero draw.
fn random_unit_quaternion<R: Rng>(rng: &mut R) -> [f64; 4] {
    let q: [f64; 4] = std::array::from_fn(|_| rng.random_range(-1.0..1.0));
    let norm = q.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm < 1e-6 {
        return [1.0, 0.0, 0.0, 0.0];
    }
    q.map(|v| v / norm)
}
