use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::env::InterruptHandle;
use crate::error::ScriptError;

/// Tracks whether a script call is in flight and when it started. The worker
/// thread opens and closes the bracket; the watchdog thread only reads it.
/// The timestamp is written under the lock before the flag is raised so an
/// observer never pairs a fresh `running` with a stale start time.
pub struct ExecutionBracket {
    running: AtomicBool,
    started: Mutex<Instant>,
}

impl ExecutionBracket {
    pub fn new() -> Self {
        Self { running: AtomicBool::new(false), started: Mutex::new(Instant::now()) }
    }

    /// Opens the bracket. The returned guard closes it on drop, so the
    /// Running -> Idle transition happens even when the call errors out.
    pub fn begin(&self) -> BracketGuard<'_> {
        {
            let mut started = self.started.lock();
            *started = Instant::now();
        }
        self.running.store(true, Ordering::Release);
        BracketGuard { bracket: self }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Consistent snapshot for the watchdog: the start time of the call that
    /// is currently in flight, or `None` when the bracket is idle.
    pub fn running_since(&self) -> Option<Instant> {
        if !self.running.load(Ordering::Acquire) {
            return None;
        }
        let started = *self.started.lock();
        if self.running.load(Ordering::Acquire) {
            Some(started)
        } else {
            None
        }
    }

    fn end(&self) {
        self.running.store(false, Ordering::Release);
    }
}

impl Default for ExecutionBracket {
    fn default() -> Self {
        Self::new()
    }
}

pub struct BracketGuard<'a> {
    bracket: &'a ExecutionBracket,
}

impl Drop for BracketGuard<'_> {
    fn drop(&mut self) {
        self.bracket.end();
    }
}

struct WatchdogShared {
    stop: Mutex<bool>,
    wake: Condvar,
}

/// Background observer of the execution bracket. When a call overruns the
/// timeout it asks the script environment to interrupt and keeps watching;
/// closing the bracket stays the sole responsibility of the call site. The
/// watchdog never runs script code itself.
pub struct Watchdog {
    shared: Arc<WatchdogShared>,
    thread: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub fn spawn(
        bracket: Arc<ExecutionBracket>,
        interrupt: InterruptHandle,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self, ScriptError> {
        let shared = Arc::new(WatchdogShared { stop: Mutex::new(false), wake: Condvar::new() });
        let thread_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("script-watchdog".into())
            .spawn(move || watch_loop(thread_shared, bracket, interrupt, timeout, poll_interval))
            .map_err(|err| ScriptError::Lifecycle(format!("failed to spawn watchdog: {err}")))?;
        debug!(?timeout, ?poll_interval, "watchdog started");
        Ok(Self { shared, thread: Some(thread) })
    }

    /// Signals shutdown and joins the thread.
    pub fn stop(mut self) {
        self.stop_inner();
    }

    fn stop_inner(&mut self) {
        {
            let mut stop = self.shared.stop.lock();
            *stop = true;
        }
        self.shared.wake.notify_all();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("watchdog thread panicked before join");
            } else {
                debug!("watchdog stopped");
            }
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop_inner();
    }
}

fn watch_loop(
    shared: Arc<WatchdogShared>,
    bracket: Arc<ExecutionBracket>,
    interrupt: InterruptHandle,
    timeout: Duration,
    poll_interval: Duration,
) {
    // One interrupt request per overrunning bracket, latched on the observed
    // start time: brackets can close and reopen between polls, so observing
    // idleness is not a reliable re-arm signal.
    let mut fired: Option<Instant> = None;
    let mut stop = shared.stop.lock();
    loop {
        if *stop {
            break;
        }
        let _ = shared.wake.wait_for(&mut stop, poll_interval);
        if *stop {
            break;
        }
        match bracket.running_since() {
            Some(started) => {
                if fired != Some(started) && started.elapsed() > timeout {
                    // The overrunning call may have returned since the read
                    // above; only request while the same call is in flight.
                    if bracket.running_since() == Some(started) {
                        warn!(
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            timeout_ms = timeout.as_millis() as u64,
                            "script call overran; requesting interrupt"
                        );
                        interrupt.request();
                        fired = Some(started);
                    }
                }
            }
            None => fired = None,
        }
    }
}
