//! A deterministic, manually-advanced `Scheduler` for tests (§9 Design
//! Notes, §10.4: "tests use a virtual clock" rather than real wall-clock
//! sleeps for timeout-dependent behavior).

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::collab::{CancelHandle, Scheduler};

struct Inner {
    now: Duration,
    next_id: u64,
    pending: BTreeMap<(Duration, u64), Option<Box<dyn FnOnce() + Send>>>,
}

/// A scheduler whose clock only moves when [`VirtualScheduler::advance`] is
/// called, so tests can deterministically trigger (or avoid triggering) a
/// timeout without sleeping in real time.
#[derive(Clone)]
pub struct VirtualScheduler {
    inner: Arc<Mutex<Inner>>,
}

impl VirtualScheduler {
    pub fn new() -> Self {
        VirtualScheduler {
            inner: Arc::new(Mutex::new(Inner {
                now: Duration::ZERO,
                next_id: 0,
                pending: BTreeMap::new(),
            })),
        }
    }

    /// Move the clock forward by `delta`, running (in due-time order) every
    /// callback whose deadline has now passed. Callbacks run outside the
    /// lock so a callback that itself calls `schedule_after` doesn't
    /// deadlock.
    pub fn advance(&self, delta: Duration) {
        let due: Vec<Box<dyn FnOnce() + Send>> = {
            let mut inner = self.inner.lock().expect("virtual scheduler lock poisoned");
            inner.now += delta;
            let now = inner.now;
            let to_fire: Vec<(Duration, u64)> = inner
                .pending
                .range(..=(now, u64::MAX))
                .map(|(k, _)| *k)
                .collect();
            to_fire
                .into_iter()
                .filter_map(|key| inner.pending.remove(&key).flatten())
                .collect()
        };
        for f in due {
            f();
        }
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().expect("virtual scheduler lock poisoned").pending.len()
    }
}

impl Default for VirtualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for VirtualScheduler {
    fn schedule_after(&self, delay: Duration, f: Box<dyn FnOnce() + Send>) -> Box<dyn CancelHandle> {
        let mut inner = self.inner.lock().expect("virtual scheduler lock poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        let due = inner.now + delay;
        inner.pending.insert((due, id), Some(f));
        Box::new(VirtualCancelHandle {
            inner: self.inner.clone(),
            key: (due, id),
        })
    }
}

struct VirtualCancelHandle {
    inner: Arc<Mutex<Inner>>,
    key: (Duration, u64),
}

impl CancelHandle for VirtualCancelHandle {
    fn cancel(self: Box<Self>) {
        let mut inner = self.inner.lock().expect("virtual scheduler lock poisoned");
        inner.pending.remove(&self.key);
    }
}
