//! Periodic background threads with prompt, joinable shutdown.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    /// Sleep up to `interval`; returns `true` once stop was requested.
    fn wait(&self, interval: Duration) -> bool {
        let deadline = Instant::now() + interval;
        let mut stopped = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            stopped = self
                .wake
                .wait_timeout(stopped, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    fn raise(&self) {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.wake.notify_all();
    }
}

/// A named thread that runs `tick` once per interval until stopped.
///
/// The first tick runs immediately. [`Worker::stop`] wakes the thread
/// mid-sleep and joins it, so no tick runs after `stop` returns. Dropping a
/// worker stops it.
pub struct Worker {
    name: String,
    signal: Arc<StopSignal>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn<F>(name: impl Into<String>, interval: Duration, mut tick: F) -> std::io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let name = name.into();
        let signal = Arc::new(StopSignal::default());
        let thread_signal = Arc::clone(&signal);

        let handle = thread::Builder::new().name(name.clone()).spawn(move || loop {
            tick();
            if thread_signal.wait(interval) {
                break;
            }
        })?;

        debug!(
            worker = %name,
            interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            "worker started"
        );
        Ok(Self {
            name,
            signal,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signal the thread and wait for it to exit. Idempotent.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.signal.raise();
        if handle.thread().id() == thread::current().id() {
            // Stopped from inside its own tick; the loop exits after this tick.
            return;
        }
        if handle.join().is_err() {
            tracing::warn!(worker = %self.name, "worker thread panicked");
        }
        debug!(worker = %self.name, "worker stopped");
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}
