use crate::channel::{Channel, FRAME_SIZE};
use crate::config::{AcquireConfig, FailurePolicy};
use crate::frameset::{build_frame_set, compute_angles};
use crate::protocol::{decode_liberty, LibertyMessage};
use crate::session::Session;
use crate::signal::ShutdownFlag;
use crate::sink::FrameSink;
use crate::types::{AngleSet, FrameSet};
use crate::{LibertyError, Result};

/// Receive buffer capacity kept between cycles; anything above is freed.
pub const ARENA_RETAIN: usize = 4 * FRAME_SIZE;

/// Everything one emitted cycle produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Sampler counter value of the message this report came from.
    pub sequence: u64,
    pub timestamp_us: u64,
    pub frames: FrameSet,
    pub angles: AngleSet,
}

/// How a single cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No message before the timeout, or a transport hiccup.
    Idle,
    /// Message was not a well-formed Liberty sample.
    Rejected,
    /// Accepted, but skipped by the sampling divisor.
    SampledOut,
    /// A configured sensor was missing or undecodable.
    Discarded,
    /// Report handed to the sink.
    Emitted,
    /// The channel went away.
    Closed,
}

/// Cycle counters, logged when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub cycles: u64,
    pub idle: u64,
    pub rejected: u64,
    pub sampled_out: u64,
    pub discarded: u64,
    pub emitted: u64,
    pub retries: u64,
    pub sink_errors: u64,
}

impl RunStats {
    fn record(&mut self, outcome: CycleOutcome) {
        self.cycles += 1;
        match outcome {
            CycleOutcome::Idle | CycleOutcome::Closed => self.idle += 1,
            CycleOutcome::Rejected => self.rejected += 1,
            CycleOutcome::SampledOut => self.sampled_out += 1,
            CycleOutcome::Discarded => self.discarded += 1,
            CycleOutcome::Emitted => self.emitted += 1,
        }
    }
}

/// Scratch memory for one cycle.
///
/// Only reachable through [`CycleArena::scope`], whose guard releases the
/// arena when dropped, so every exit path of a cycle frees it.
#[derive(Debug, Default)]
pub struct CycleArena {
    buffer: Vec<u8>,
    releases: u64,
}

impl CycleArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(&mut self) -> CycleScope<'_> {
        CycleScope { arena: self }
    }

    /// Bytes held by the current cycle.
    pub fn in_use(&self) -> usize {
        self.buffer.len()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Number of completed cycle releases.
    pub fn releases(&self) -> u64 {
        self.releases
    }

    fn release(&mut self) {
        self.buffer.clear();
        if self.buffer.capacity() > ARENA_RETAIN {
            self.buffer.shrink_to(ARENA_RETAIN);
        }
        self.releases += 1;
    }
}

/// Guard over the arena for the duration of one cycle.
pub struct CycleScope<'a> {
    arena: &'a mut CycleArena,
}

impl CycleScope<'_> {
    pub fn buffer(&mut self) -> &mut Vec<u8> {
        &mut self.arena.buffer
    }
}

impl Drop for CycleScope<'_> {
    fn drop(&mut self) {
        self.arena.release();
    }
}

/// Throttles output to every Nth accepted message.
#[derive(Debug, Clone, Default)]
pub struct Sampler {
    divisor: u32,
    counter: u64,
}

impl Sampler {
    pub fn new(divisor: u32) -> Self {
        Self {
            divisor,
            counter: 0,
        }
    }

    /// Advance the counter; returns the counter value if this message passes.
    pub fn admit(&mut self) -> Option<u64> {
        let n = self.counter;
        self.counter += 1;
        if self.divisor == 0 || n % self.divisor as u64 == 0 {
            Some(n)
        } else {
            None
        }
    }
}

/// The acquisition loop: one message in, one report out, per cycle.
pub struct Acquisition {
    config: AcquireConfig,
    sampler: Sampler,
    arena: CycleArena,
    stats: RunStats,
}

impl Acquisition {
    pub fn new(config: AcquireConfig) -> Self {
        Self {
            sampler: Sampler::new(config.sampling_divisor),
            config,
            arena: CycleArena::new(),
            stats: RunStats::default(),
        }
    }

    pub fn config(&self) -> &AcquireConfig {
        &self.config
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    pub fn arena(&self) -> &CycleArena {
        &self.arena
    }

    /// Drive the session until shutdown is requested or the channel closes.
    ///
    /// Moves the session through `Running → Stopping → Stopped`; the channel is
    /// closed before returning. Only a bad configuration is an error.
    pub fn run<C, S>(&mut self, session: &mut Session<C>, sink: &mut S) -> Result<RunStats>
    where
        C: Channel,
        S: FrameSink + ?Sized,
    {
        self.config.validate()?;
        let shutdown = session.shutdown().clone();

        session.begin();
        log::info!(
            "[{}] acquiring {} sensor(s), divisor {}, {:?}",
            session.ident(),
            self.config.arity.count(),
            self.config.sampling_divisor,
            self.config.on_failure
        );

        while !shutdown.is_requested() {
            if self.run_cycle(session.channel(), &shutdown, sink) == CycleOutcome::Closed {
                log::warn!("[{}] channel closed, stopping", session.ident());
                break;
            }
        }

        session.stop();
        let s = self.stats;
        log::info!(
            "[{}] {} cycles: {} emitted, {} sampled out, {} discarded, {} rejected, {} idle",
            session.ident(),
            s.cycles,
            s.emitted,
            s.sampled_out,
            s.discarded,
            s.rejected,
            s.idle
        );
        session.close();
        Ok(s)
    }

    /// Run exactly one cycle. The arena is released before this returns,
    /// whatever the outcome.
    pub fn run_cycle<C, S>(
        &mut self,
        channel: &mut C,
        shutdown: &ShutdownFlag,
        sink: &mut S,
    ) -> CycleOutcome
    where
        C: Channel,
        S: FrameSink + ?Sized,
    {
        let Acquisition {
            config,
            sampler,
            arena,
            stats,
        } = self;
        let mut scope = arena.scope();
        let buf = scope.buffer();

        let outcome = cycle(config, sampler, stats, channel, shutdown, sink, buf);
        stats.record(outcome);
        outcome
    }
}

fn cycle<C, S>(
    config: &AcquireConfig,
    sampler: &mut Sampler,
    stats: &mut RunStats,
    channel: &mut C,
    shutdown: &ShutdownFlag,
    sink: &mut S,
    buf: &mut Vec<u8>,
) -> CycleOutcome
where
    C: Channel,
    S: FrameSink + ?Sized,
{
    let mut message = match receive(channel, buf, config) {
        Ok(msg) => msg,
        Err(outcome) => return outcome,
    };

    let sequence = match sampler.admit() {
        Some(n) => n,
        None => return CycleOutcome::SampledOut,
    };

    let frames = loop {
        match build_frame_set(&message.blocks, config.arity, config.euler_mode) {
            Ok(frames) => break frames,
            Err(e) => {
                log::debug!("Discarding message #{}: {}", sequence, e);
                if config.on_failure == FailurePolicy::SkipCycle {
                    return CycleOutcome::Discarded;
                }
            }
        }

        // RetryForever: pull messages until one decodes or shutdown is asked for.
        loop {
            if shutdown.is_requested() {
                return CycleOutcome::Discarded;
            }
            stats.retries += 1;
            match receive(channel, buf, config) {
                Ok(next) => {
                    message = next;
                    break;
                }
                Err(CycleOutcome::Closed) => return CycleOutcome::Closed,
                Err(_) => continue,
            }
        }
    };

    let report = CycleReport {
        sequence,
        timestamp_us: message.timestamp_us,
        angles: compute_angles(&frames),
        frames,
    };
    if let Err(e) = sink.consume(&report) {
        stats.sink_errors += 1;
        log::warn!("Failed to hand off report #{}: {}", sequence, e);
    }
    CycleOutcome::Emitted
}

/// Steps 1 and 2 of a cycle: wait for a message and check it is a Liberty sample.
fn receive<C: Channel>(
    channel: &mut C,
    buf: &mut Vec<u8>,
    config: &AcquireConfig,
) -> std::result::Result<LibertyMessage, CycleOutcome> {
    match channel.recv_timeout(buf, config.timeout) {
        Ok(_) => {}
        Err(LibertyError::Timeout) => {
            log::trace!("No message within {:?}", config.timeout);
            return Err(CycleOutcome::Idle);
        }
        Err(LibertyError::ChannelClosed) => return Err(CycleOutcome::Closed),
        Err(e) => {
            log::warn!("Receive on {} failed: {}", channel.name(), e);
            return Err(CycleOutcome::Idle);
        }
    }

    decode_liberty(buf).map_err(|e| {
        if e.is_transient() {
            log::debug!("Ignoring message: {}", e);
        } else {
            log::warn!("Ignoring message: {}", e);
        }
        CycleOutcome::Rejected
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use crate::protocol::{encode_message, MsgType, DEFAULT_VALID_FOR};
    use crate::session::LifecycleState;
    use crate::sink::Collector;
    use crate::types::{RawSample, SensorArity, SensorRole};
    use std::time::Duration;

    fn identity() -> RawSample {
        RawSample::new([1.0, 2.0, 3.0], [1.0, 0.0, 0.0, 0.0])
    }

    fn send(chan: &mut MemoryChannel, msg_type: MsgType, sensors: usize) {
        let samples = vec![identity(); sensors];
        let mut buf = Vec::new();
        encode_message(msg_type, 1, DEFAULT_VALID_FOR, &samples, &mut buf).unwrap();
        chan.publish(&buf).unwrap();
    }

    fn config() -> AcquireConfig {
        AcquireConfig {
            timeout: Duration::from_millis(5),
            ..AcquireConfig::default()
        }
    }

    #[test]
    fn test_sampler() {
        let mut sampler = Sampler::new(3);
        let passed: Vec<_> = (0..9).filter_map(|_| sampler.admit()).collect();
        assert_eq!(passed, vec![0, 3, 6]);

        let mut off = Sampler::new(0);
        assert_eq!((0..5).filter_map(|_| off.admit()).count(), 5);
    }

    #[test]
    fn test_sampling_divisor_over_cycles() {
        let mut chan = MemoryChannel::new("test", 16);
        for _ in 0..9 {
            send(&mut chan, MsgType::Liberty, 4);
        }
        let mut acq = Acquisition::new(AcquireConfig {
            sampling_divisor: 3,
            ..config()
        });
        let mut sink = Collector::new();
        let shutdown = ShutdownFlag::new();

        let outcomes: Vec<_> = (0..9)
            .map(|_| acq.run_cycle(&mut chan, &shutdown, &mut sink))
            .collect();
        assert_eq!(
            outcomes.iter().filter(|o| **o == CycleOutcome::Emitted).count(),
            3
        );
        let sequences: Vec<_> = sink.reports().iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![0, 3, 6]);
        assert_eq!(acq.stats().sampled_out, 6);
    }

    #[test]
    fn test_timeout_is_idle() {
        let mut chan = MemoryChannel::new("test", 4);
        let mut acq = Acquisition::new(config());
        let mut sink = Collector::new();
        let outcome = acq.run_cycle(&mut chan, &ShutdownFlag::new(), &mut sink);
        assert_eq!(outcome, CycleOutcome::Idle);
        assert!(sink.reports().is_empty());
    }

    #[test]
    fn test_wrong_type_rejected() {
        let mut chan = MemoryChannel::new("test", 4);
        send(&mut chan, MsgType::ForceMoment, 0);
        chan.publish(b"garbage").unwrap();
        let mut acq = Acquisition::new(config());
        let mut sink = Collector::new();
        let shutdown = ShutdownFlag::new();
        assert_eq!(acq.run_cycle(&mut chan, &shutdown, &mut sink), CycleOutcome::Rejected);
        assert_eq!(acq.run_cycle(&mut chan, &shutdown, &mut sink), CycleOutcome::Rejected);
        assert!(sink.reports().is_empty());
    }

    #[test]
    fn test_rejected_messages_do_not_advance_sampler() {
        let mut chan = MemoryChannel::new("test", 8);
        send(&mut chan, MsgType::Event, 0);
        send(&mut chan, MsgType::Liberty, 4);
        let mut acq = Acquisition::new(AcquireConfig {
            sampling_divisor: 2,
            ..config()
        });
        let mut sink = Collector::new();
        let shutdown = ShutdownFlag::new();
        acq.run_cycle(&mut chan, &shutdown, &mut sink);
        assert_eq!(acq.run_cycle(&mut chan, &shutdown, &mut sink), CycleOutcome::Emitted);
        assert_eq!(sink.reports()[0].sequence, 0);
    }

    #[test]
    fn test_missing_role_discards_cycle() {
        let mut chan = MemoryChannel::new("test", 4);
        send(&mut chan, MsgType::Liberty, 2);
        let mut acq = Acquisition::new(config());
        let mut sink = Collector::new();
        let outcome = acq.run_cycle(&mut chan, &ShutdownFlag::new(), &mut sink);
        assert_eq!(outcome, CycleOutcome::Discarded);
        assert!(sink.reports().is_empty());
    }

    #[test]
    fn test_arity_two_accepts_partial_message() {
        let mut chan = MemoryChannel::new("test", 4);
        send(&mut chan, MsgType::Liberty, 2);
        let mut acq = Acquisition::new(AcquireConfig {
            arity: SensorArity::Two,
            ..config()
        });
        let mut sink = Collector::new();
        let outcome = acq.run_cycle(&mut chan, &ShutdownFlag::new(), &mut sink);
        assert_eq!(outcome, CycleOutcome::Emitted);
        let report = &sink.reports()[0];
        assert_eq!(report.frames.len(), 2);
        assert_eq!(report.angles.fingers.len(), 1);
        assert_eq!(report.angles.fingers[0].role, SensorRole::Finger1);
    }

    #[test]
    fn test_retry_forever_waits_for_valid_frame() {
        let mut chan = MemoryChannel::new("test", 8);
        send(&mut chan, MsgType::Liberty, 1);
        send(&mut chan, MsgType::ForceMoment, 0);
        send(&mut chan, MsgType::Liberty, 4);
        let mut acq = Acquisition::new(AcquireConfig {
            on_failure: FailurePolicy::RetryForever,
            ..config()
        });
        let mut sink = Collector::new();
        let outcome = acq.run_cycle(&mut chan, &ShutdownFlag::new(), &mut sink);
        assert_eq!(outcome, CycleOutcome::Emitted);
        assert_eq!(acq.stats().retries, 2);
        assert_eq!(sink.reports().len(), 1);
        assert_eq!(chan.pending(), 0);
    }

    #[test]
    fn test_retry_forever_honours_shutdown() {
        let mut chan = MemoryChannel::new("test", 4);
        send(&mut chan, MsgType::Liberty, 1);
        let mut acq = Acquisition::new(AcquireConfig {
            on_failure: FailurePolicy::RetryForever,
            ..config()
        });
        let shutdown = ShutdownFlag::new();
        shutdown.request();
        let mut sink = Collector::new();
        assert_eq!(acq.run_cycle(&mut chan, &shutdown, &mut sink), CycleOutcome::Discarded);
    }

    #[test]
    fn test_arena_released_on_every_path() {
        let mut chan = MemoryChannel::new("test", 8);
        send(&mut chan, MsgType::Liberty, 4);
        send(&mut chan, MsgType::Liberty, 1);
        send(&mut chan, MsgType::ForceMoment, 0);
        let mut acq = Acquisition::new(config());
        let mut sink = Collector::new();
        let shutdown = ShutdownFlag::new();
        for _ in 0..4 {
            acq.run_cycle(&mut chan, &shutdown, &mut sink);
            assert_eq!(acq.arena().in_use(), 0);
            assert!(acq.arena().capacity() <= ARENA_RETAIN);
        }
        assert_eq!(acq.arena().releases(), 4);
        let stats = acq.stats();
        assert_eq!(
            (stats.emitted, stats.discarded, stats.rejected, stats.idle),
            (1, 1, 1, 1)
        );
    }

    #[test]
    fn test_end_to_end_palm_only() {
        let mut chan = MemoryChannel::new("test", 4);
        send(&mut chan, MsgType::Liberty, 1);
        let mut acq = Acquisition::new(AcquireConfig {
            arity: SensorArity::One,
            ..config()
        });
        let mut sink = Collector::new();
        acq.run_cycle(&mut chan, &ShutdownFlag::new(), &mut sink);

        let report = &sink.reports()[0];
        let palm = report.frames.palm();
        assert_eq!(palm.pose.position, [1.0, -2.0, -3.0]);
        assert!(palm.pose.orientation.iter().all(|a| a.abs() < 1e-12));
        assert!((palm.frame.axis[2] - 1.0).abs() < 1e-12);
        assert!(report.angles.palm_tilt.abs() < 1e-9);
        assert!(report.angles.fingers.is_empty());
    }

    #[test]
    fn test_run_drives_lifecycle() {
        let mut chan = MemoryChannel::new("test", 8);
        for _ in 0..3 {
            send(&mut chan, MsgType::Liberty, 4);
        }
        let shutdown = ShutdownFlag::new();
        let mut session = Session::open("test", chan, shutdown.clone()).unwrap();
        let events = session.subscribe();
        let mut sink = Collector::new().stop_after(3, shutdown);

        let mut acq = Acquisition::new(config());
        let stats = acq.run(&mut session, &mut sink).unwrap();

        assert_eq!(stats.emitted, 3);
        assert_eq!(session.state(), LifecycleState::Stopped);
        let states: Vec<_> = events.try_iter().map(|e| e.state).collect();
        assert_eq!(
            states,
            vec![
                LifecycleState::Running,
                LifecycleState::Stopping,
                LifecycleState::Stopped
            ]
        );
    }

    #[test]
    fn test_run_stops_when_channel_closes() {
        let mut chan = MemoryChannel::new("test", 4);
        chan.close();
        let mut session = Session::open("test", chan, ShutdownFlag::new()).unwrap();
        let mut acq = Acquisition::new(config());
        let stats = acq.run(&mut session, &mut Collector::new()).unwrap();
        assert_eq!(stats.cycles, 1);
        assert_eq!(session.state(), LifecycleState::Stopped);
    }
}
