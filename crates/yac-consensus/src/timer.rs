//! Delayed-callback timers driving vote retransmission.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

/// Callback run when a timer expires
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Identifies a scheduled callback for cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

/// Single-shot, cancelable delayed callback
pub trait Timer: Send + Sync {
    /// Run `callback` once after `delay`
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;

    /// Cancel a pending callback. No-op if it already ran or was cancelled.
    fn cancel(&self, handle: TimerHandle);
}

/// Timer backed by tokio tasks.
///
/// Each schedule spawns a task that sleeps and then runs the callback;
/// cancel aborts the task.
pub struct TokioTimer {
    runtime: tokio::runtime::Handle,
    next_id: AtomicU64,
    tasks: Arc<Mutex<HashMap<TimerHandle, JoinHandle<()>>>>,
}

impl TokioTimer {
    /// Create a timer on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new() -> Self {
        Self::with_runtime(tokio::runtime::Handle::current())
    }

    /// Create a timer spawning onto `runtime`
    pub fn with_runtime(runtime: tokio::runtime::Handle) -> Self {
        Self {
            runtime,
            next_id: AtomicU64::new(0),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of timers that have neither fired nor been cancelled
    pub fn active_count(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl Default for TokioTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer for TokioTimer {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let handle = TimerHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        let tasks = self.tasks.clone();

        // Hold the lock across spawn so the task's own removal happens after insertion.
        let mut guard = self.tasks.lock();
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            tasks.lock().remove(&handle);
            trace!(timer = handle.0, "Timer fired");
            callback();
        });
        guard.insert(handle, task);
        handle
    }

    fn cancel(&self, handle: TimerHandle) {
        if let Some(task) = self.tasks.lock().remove(&handle) {
            task.abort();
            trace!(timer = handle.0, "Timer cancelled");
        }
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        for (_, task) in self.tasks.lock().drain() {
            task.abort();
        }
    }
}

/// Timer fired explicitly by the caller.
///
/// Used by deterministic simulations and tests: nothing runs until
/// [`ManualTimer::fire_next`] or [`ManualTimer::fire_all`] is called.
#[derive(Default)]
pub struct ManualTimer {
    next_id: AtomicU64,
    pending: Mutex<Vec<(TimerHandle, Duration, TimerCallback)>>,
    cancelled: AtomicU64,
}

impl ManualTimer {
    /// Create an empty manual timer
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of scheduled callbacks not yet fired or cancelled
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Delays of pending callbacks, in scheduling order
    pub fn pending_delays(&self) -> Vec<Duration> {
        self.pending.lock().iter().map(|(_, d, _)| *d).collect()
    }

    /// Total successful cancellations
    pub fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Fire the oldest pending callback. Returns false if none was pending.
    pub fn fire_next(&self) -> bool {
        let next = {
            let mut pending = self.pending.lock();
            if pending.is_empty() {
                None
            } else {
                Some(pending.remove(0))
            }
        };
        match next {
            Some((_, _, callback)) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// Fire every callback pending right now; returns how many ran.
    ///
    /// Callbacks scheduled while firing stay pending.
    pub fn fire_all(&self) -> usize {
        let batch: Vec<_> = self.pending.lock().drain(..).collect();
        let count = batch.len();
        for (_, _, callback) in batch {
            callback();
        }
        count
    }
}

impl Timer for ManualTimer {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let handle = TimerHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.pending.lock().push((handle, delay, callback));
        handle
    }

    fn cancel(&self, handle: TimerHandle) {
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|(h, _, _)| *h != handle);
        if pending.len() < before {
            self.cancelled.fetch_add(1, Ordering::Relaxed);
        }
    }
}
