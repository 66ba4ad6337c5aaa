//! Cancellation token for cooperative interruption of running work.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

/// A callback invoked once when cancellation is requested.
pub type CancelCallback = Box<dyn FnOnce() + Send>;

/// A token for cooperative cancellation.
///
/// Units of work cannot be interrupted preemptively; they observe the token
/// between steps, sleep on it with [`CancellationToken::wait_timeout`], or
/// register an [`on_cancel`](CancellationToken::on_cancel) callback that
/// releases whatever resource they hold (for example killing a child process).
///
/// Cancellation is idempotent - only the first reason is kept.
#[derive(Default)]
pub struct CancellationToken {
    /// Fast-path flag.
    cancelled: AtomicBool,
    /// The reason for cancellation (first one wins).
    reason: Mutex<Option<String>>,
    /// Signalled when cancellation is requested.
    signal: Condvar,
    /// Callbacks to invoke on cancellation.
    callbacks: Mutex<Vec<CancelCallback>>,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation with a reason.
    ///
    /// Callbacks run on the calling thread; panics inside them are logged and
    /// suppressed.
    pub fn cancel(&self, reason: impl Into<String>) {
        {
            let mut current = self.reason.lock();
            if current.is_some() {
                return;
            }
            *current = Some(reason.into());
            self.cancelled.store(true, Ordering::SeqCst);
            self.signal.notify_all();
        }

        let callbacks = std::mem::take(&mut *self.callbacks.lock());
        for callback in callbacks {
            if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback)) {
                warn!("Cancellation callback panicked: {:?}", e);
            }
        }
    }

    /// Registers a callback to be invoked on cancellation.
    ///
    /// If already cancelled, the callback is invoked immediately.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut callbacks = self.callbacks.lock();
            if !self.is_cancelled() {
                callbacks.push(Box::new(callback));
                return;
            }
        }

        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback)) {
            warn!("Cancellation callback panicked: {:?}", e);
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }

    /// Sleeps for up to `timeout`, waking early if cancellation is requested.
    ///
    /// Returns true if the token was cancelled.
    ///
    /// A timeout too large to express as a deadline waits for cancellation.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut reason = self.reason.lock();
        while reason.is_none() {
            match deadline {
                Some(deadline) => {
                    if self.signal.wait_until(&mut reason, deadline).timed_out() {
                        break;
                    }
                }
                None => self.signal.wait(&mut reason),
            }
        }
        reason.is_some()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
