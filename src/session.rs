use crate::channel::{validate_channel_name, Channel};
use crate::signal::ShutdownFlag;
use crate::{LibertyError, Result};
use crossbeam_channel::{Receiver, Sender};

/// Lifecycle of a daemon session.
///
/// `Starting → Running → Stopping → Stopped`. The one other edge is the
/// startup abort `Starting → Stopped`, taken when a session is closed
/// before it ever ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Notification emitted on each lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEvent {
    pub ident: String,
    pub state: LifecycleState,
}

/// Process-wide daemon state: identity, the open channel, the shutdown flag
/// and event subscribers. Built once at startup and handed to the loop.
///
/// Dropping the session closes the channel if [`Session::close`] was not
/// called.
pub struct Session<C: Channel> {
    ident: String,
    channel: C,
    shutdown: ShutdownFlag,
    state: LifecycleState,
    subscribers: Vec<Sender<ProcessEvent>>,
}

impl<C: Channel> Session<C> {
    /// Take ownership of an open channel. The session starts in `Starting`.
    pub fn open(ident: impl Into<String>, channel: C, shutdown: ShutdownFlag) -> Result<Self> {
        let ident = ident.into();
        if ident.is_empty() {
            return Err(LibertyError::InvalidConfig("session ident is empty".into()));
        }
        validate_channel_name(channel.name())?;

        let session = Session {
            ident,
            channel,
            shutdown,
            state: LifecycleState::Starting,
            subscribers: Vec::new(),
        };
        log::info!(
            "[{}] {:?} on channel {}",
            session.ident,
            session.state,
            session.channel.name()
        );
        Ok(session)
    }

    /// Receive every lifecycle event from now on.
    pub fn subscribe(&mut self) -> Receiver<ProcessEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn ident(&self) -> &str {
        &self.ident
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn channel(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn shutdown(&self) -> &ShutdownFlag {
        &self.shutdown
    }

    pub fn should_stop(&self) -> bool {
        self.shutdown.is_requested()
    }

    /// `Starting → Running`.
    pub fn begin(&mut self) {
        if self.state == LifecycleState::Starting {
            self.transition(LifecycleState::Running);
        }
    }

    /// `Running → Stopping`.
    pub fn stop(&mut self) {
        if self.state == LifecycleState::Running {
            self.transition(LifecycleState::Stopping);
        }
    }

    /// Close the channel and enter `Stopped`. Safe to call more than once.
    ///
    /// A running session passes through `Stopping`; a session that never
    /// began goes straight to `Stopped`.
    pub fn close(&mut self) {
        match self.state {
            LifecycleState::Stopped => return,
            LifecycleState::Running => self.transition(LifecycleState::Stopping),
            LifecycleState::Starting => {
                log::warn!("[{}] closed before start", self.ident);
            }
            LifecycleState::Stopping => {}
        }
        self.channel.close();
        self.transition(LifecycleState::Stopped);
    }

    fn transition(&mut self, state: LifecycleState) {
        self.state = state;
        log::info!("[{}] {:?}", self.ident, state);
        let event = ProcessEvent {
            ident: self.ident.clone(),
            state,
        };
        // Drop subscribers that hung up.
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl<C: Channel> Drop for Session<C> {
    fn drop(&mut self) {
        self.close();
    }
}
