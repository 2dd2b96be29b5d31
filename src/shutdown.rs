use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// A shared signal telling background threads to stop.
///
/// Threads sleep on the signal instead of `thread::sleep`, so triggering it
/// wakes them up immediately.
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ShutdownSignal {
    /// Creates a signal that has not fired yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the signal, waking every waiting thread.
    pub fn trigger(&self) {
        let (lock, cvar) = self.inner.as_ref();
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    /// Returns `true` once the signal fired.
    pub fn is_triggered(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks for up to `timeout`.
    ///
    /// Returns `true` if the signal fired, `false` if the full timeout
    /// elapsed.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (lock, cvar) = self.inner.as_ref();
        let mut stopped = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            stopped = cvar
                .wait_timeout(stopped, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}
