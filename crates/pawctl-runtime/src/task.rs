//! Background task handles.
//!
//! A [`TaskHandle`] is one named OS thread plus the [`StopSignal`] it was
//! started with.  A [`TaskSlot`] holds at most one running task of a kind
//! (one patrol, one idle scan, one tail wag) and turns a second start into a
//! no-op, including while a stopped task is still winding down.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use pawctl_kernel::StopSignal;
use tracing::{debug, warn};

/// Poll period used while waiting for a stopped task to finish.
const JOIN_POLL: Duration = Duration::from_millis(5);

pub struct TaskHandle {
    name: String,
    stop: StopSignal,
    handle: Option<JoinHandle<()>>,
}

impl TaskHandle {
    /// Spawn `body` on a named thread, handing it a fresh stop signal.
    pub fn spawn<F>(name: impl Into<String>, body: F) -> io::Result<Self>
    where
        F: FnOnce(StopSignal) + Send + 'static,
    {
        let name = name.into();
        let stop = StopSignal::new();
        let task_stop = stop.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || body(task_stop))?;
        debug!(task = %name, "task started");
        Ok(Self {
            name,
            stop,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    /// Ask the task to stop.  Does not wait.
    pub fn request_stop(&self) {
        self.stop.set();
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Wait up to `timeout` for the thread to exit.  Returns `true` when it
    /// has exited (and was joined), `false` when it is still running.
    pub fn join_timeout(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_running() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(JOIN_POLL);
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!(task = %self.name, "task panicked");
        }
        true
    }
}

/// Holder for at most one running task.
pub struct TaskSlot {
    name: &'static str,
    current: Option<TaskHandle>,
}

impl TaskSlot {
    pub const fn new(name: &'static str) -> Self {
        Self { name, current: None }
    }

    pub fn is_active(&self) -> bool {
        self.current.as_ref().is_some_and(TaskHandle::is_running)
    }

    /// Start `body` unless a task is already running in this slot.
    ///
    /// Returns `Ok(false)` when the call was a no-op.
    pub fn start<F>(&mut self, body: F) -> io::Result<bool>
    where
        F: FnOnce(StopSignal) + Send + 'static,
    {
        if self.is_active() {
            return Ok(false);
        }
        self.reap();
        self.current = Some(TaskHandle::spawn(self.name, body)?);
        Ok(true)
    }

    /// Signal the running task, if any, without waiting for it.
    pub fn request_stop(&self) {
        if let Some(task) = &self.current {
            task.request_stop();
        }
    }

    /// `true` while a task that was asked to stop is still running.
    pub fn is_stopping(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|t| t.is_running() && t.stop_signal().is_set())
    }

    /// Signal the task and wait up to `timeout` for it to exit.
    ///
    /// Returns `false` when the task outlived the timeout.  It keeps its stop
    /// signal set and stays in the slot, so [`TaskSlot::start`] refuses until
    /// it has exited.
    pub fn stop_and_join(&mut self, timeout: Duration) -> bool {
        let Some(task) = self.current.as_mut() else {
            return true;
        };
        task.request_stop();
        if !task.join_timeout(timeout) {
            warn!(
                task = %task.name(),
                ?timeout,
                "task did not stop in time; still waiting on it"
            );
            return false;
        }
        self.current = None;
        true
    }

    fn reap(&mut self) {
        if let Some(mut task) = self.current.take() {
            task.join_timeout(Duration::ZERO);
        }
    }
}
