use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Set from the signal handler. Only touched with atomic stores, which is
/// async-signal-safe.
static SIGNAL_RECEIVED: AtomicBool = AtomicBool::new(false);

/// Cooperative shutdown request, checked once per loop iteration.
///
/// Clones share one flag. A flag created with [`ShutdownFlag::with_signals`]
/// also trips on SIGINT and SIGTERM.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag {
    requested: Arc<AtomicBool>,
    watch_signals: bool,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install SIGINT/SIGTERM handlers and return a flag that observes them.
    pub fn with_signals() -> Self {
        install_handlers();
        Self {
            requested: Arc::new(AtomicBool::new(false)),
            watch_signals: true,
        }
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::Relaxed);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Relaxed)
            || (self.watch_signals && SIGNAL_RECEIVED.load(Ordering::Relaxed))
    }
}

#[cfg(unix)]
extern "C" fn on_signal(_signum: libc::c_int) {
    SIGNAL_RECEIVED.store(true, Ordering::Relaxed);
}

#[cfg(unix)]
fn install_handlers() {
    let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    for signum in [libc::SIGINT, libc::SIGTERM] {
        // SAFETY: the handler only performs an atomic store.
        let previous = unsafe { libc::signal(signum, handler) };
        if previous == libc::SIG_ERR {
            log::warn!("Failed to install handler for signal {}", signum);
        }
    }
}

#[cfg(not(unix))]
fn install_handlers() {
    log::warn!("Signal handlers not supported on this platform; only explicit shutdown works");
}
