//! Write-coalescing timer.

use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Callback invoked with the merged batch on each firing.
pub type BatchCallback<T> = Box<dyn Fn(Vec<T>) + Send + Sync>;

/// Coalesces bursts of submissions into batched firings.
///
/// Items submitted within one `window` of the first submission are merged
/// (deduplicated by equality, insertion order preserved) and delivered to
/// the callback in a single firing, bounding the firing rate independent of
/// the submission rate. Items arriving while the callback is executing are
/// captured for exactly one follow-up firing; nothing is lost and nothing
/// is double-scheduled.
///
/// The callback runs on a dedicated worker thread owned by the timer; the
/// thread is joined on drop, after any in-progress firing completes.
pub struct CoalescingTimer<T>
where
    T: Clone + Eq + Hash + Send + 'static,
{
    inner: Arc<TimerInner<T>>,
    worker: Option<JoinHandle<()>>,
}

struct TimerInner<T> {
    window: Duration,
    callback: BatchCallback<T>,
    state: Mutex<TimerState<T>>,
    signal: Condvar,
}

struct TimerState<T> {
    pending: Vec<T>,
    pending_set: HashSet<T>,
    deadline: Option<Instant>,
    firing: bool,
    queued: bool,
    shutdown: bool,
}

impl<T> CoalescingTimer<T>
where
    T: Clone + Eq + Hash + Send + 'static,
{
    /// Creates a timer with a fixed coalescing window.
    pub fn new(window: Duration, callback: BatchCallback<T>) -> Self {
        let inner = Arc::new(TimerInner {
            window,
            callback,
            state: Mutex::new(TimerState {
                pending: Vec::new(),
                pending_set: HashSet::new(),
                deadline: None,
                firing: false,
                queued: false,
                shutdown: false,
            }),
            signal: Condvar::new(),
        });

        let worker_inner = Arc::clone(&inner);
        let worker = thread::spawn(move || Self::run(worker_inner));

        Self {
            inner,
            worker: Some(worker),
        }
    }

    /// Returns the configured window.
    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Merges `items` into the pending batch and guarantees a firing at
    /// most one window after the first submission since the last firing.
    ///
    /// Duplicates of already-pending items are dropped. If a firing is in
    /// flight, the items are delivered by the follow-up firing instead.
    pub fn submit(&self, items: impl IntoIterator<Item = T>) {
        let mut state = self.inner.state.lock();
        for item in items {
            if state.pending_set.insert(item.clone()) {
                state.pending.push(item);
            }
        }
        if state.pending.is_empty() {
            return;
        }

        if state.firing {
            state.queued = true;
        } else if state.deadline.is_none() {
            state.deadline = Some(Instant::now() + self.inner.window);
            self.inner.signal.notify_one();
        }
    }

    /// Forces the pending batch to fire without waiting out the window.
    ///
    /// Uses the same in-flight/queued guard as timed firings: if a firing
    /// is executing, one follow-up firing is scheduled instead.
    pub fn fire_now(&self) {
        let mut state = self.inner.state.lock();
        if state.firing {
            state.queued = true;
        } else {
            state.deadline = Some(Instant::now());
            self.inner.signal.notify_one();
        }
    }

    /// Returns the number of items waiting for the next firing.
    pub fn pending_len(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    fn run(inner: Arc<TimerInner<T>>) {
        loop {
            let batch = {
                let mut state = inner.state.lock();
                loop {
                    if state.shutdown {
                        return;
                    }
                    match state.deadline {
                        None => {
                            inner.signal.wait(&mut state);
                        }
                        Some(deadline) => {
                            if Instant::now() >= deadline {
                                break;
                            }
                            let _ = inner.signal.wait_until(&mut state, deadline);
                        }
                    }
                }
                state.deadline = None;
                state.firing = true;
                state.pending_set.clear();
                std::mem::take(&mut state.pending)
            };

            tracing::debug!(batch_len = batch.len(), "coalescing timer fired");
            (inner.callback)(batch);

            let mut state = inner.state.lock();
            state.firing = false;
            // Submissions that arrived during the firing re-arm the timer
            // for exactly one follow-up window.
            if std::mem::take(&mut state.queued) && state.deadline.is_none() {
                state.deadline = Some(Instant::now() + inner.window);
            }
        }
    }
}

impl<T> Drop for CoalescingTimer<T>
where
    T: Clone + Eq + Hash + Send + 'static,
{
    fn drop(&mut self) {
        {
            let mut state = self.inner.state.lock();
            state.shutdown = true;
            self.inner.signal.notify_one();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
