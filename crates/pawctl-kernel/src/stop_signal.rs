//! [`StopSignal`] – cooperative cancellation flag for behaviour tasks.
//!
//! Every long-running task owns one signal.  The task checks
//! [`StopSignal::is_set`] at the top of each loop iteration and uses
//! [`StopSignal::wait_timeout`] for every bounded wait, which returns as
//! soon as the signal is set rather than after the full wait.
//!
//! A signal is never reset: restarting a task means creating a new signal.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use pawctl_kernel::StopSignal;
//!
//! let stop = StopSignal::new();
//! assert!(!stop.wait_timeout(Duration::from_millis(1)));
//!
//! stop.set();
//! assert!(stop.is_set());
//! assert!(stop.wait_timeout(Duration::from_secs(60))); // returns immediately
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct Inner {
    stopped: Mutex<bool>,
    wake: Condvar,
}

/// Shared, clonable stop flag.  All clones observe the same state.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the signal and wake every thread blocked in
    /// [`wait_timeout`][Self::wait_timeout].  Idempotent.
    pub fn set(&self) {
        let mut stopped = self.inner.stopped.lock();
        *stopped = true;
        self.inner.wake.notify_all();
    }

    pub fn is_set(&self) -> bool {
        *self.inner.stopped.lock()
    }

    /// Block for at most `timeout`.  Returns `true` if the signal is set
    /// (before or during the wait), `false` if the wait simply elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.inner.stopped.lock();
        while !*stopped {
            if self
                .inner
                .wake
                .wait_until(&mut stopped, deadline)
                .timed_out()
            {
                break;
            }
        }
        *stopped
    }
}

impl std::fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSignal")
            .field("set", &self.is_set())
            .finish()
    }
}
