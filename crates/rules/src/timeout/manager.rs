//! [`TimeoutManager`]: registry of pending timers backed by tokio tasks.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use beast_core::{Message, MessageSink};

use super::{TimeoutCallback, TimeoutData, TimeoutId, TimeoutReason};

/// A registered, not yet handled timer.
struct TimeoutEntry {
    callback: Arc<dyn TimeoutCallback>,
    data: Option<TimeoutData>,
    deadline: Instant,
    task: Option<JoinHandle<()>>,
}

/// Schedules and cancels one-shot timers.
///
/// Every timer sleeps on its own tokio task, so different timers fire
/// independently of each other. An entry lives in the pending map until
/// exactly one of the firing task or [`cancel`](TimeoutManager::cancel)
/// removes it; the loser of that race finds nothing and does nothing.
pub struct TimeoutManager {
    next_id: AtomicU64,
    entries: Mutex<HashMap<TimeoutId, TimeoutEntry>>,
    runtime: Handle,
    sink: OnceLock<Weak<dyn MessageSink>>,
}

impl TimeoutManager {
    /// Create a manager that spawns its timer tasks on `runtime`.
    ///
    /// `register` may then be called from any thread, inside or outside the runtime.
    pub fn new(runtime: Handle) -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
            runtime,
            sink: OnceLock::new(),
        })
    }

    /// Create a manager on the runtime of the calling task.
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Arc<Self> {
        Self::new(Handle::current())
    }

    /// Set where callback results are submitted. Only the first call takes effect.
    ///
    /// The sink is held weakly so the manager never keeps the dispatcher alive.
    pub fn set_sink(&self, sink: &Arc<dyn MessageSink>) {
        if self.sink.set(Arc::downgrade(sink)).is_err() {
            warn!("timeout manager sink already set, ignoring");
        }
    }

    /// Schedule `callback` to fire after `delay`. Returns immediately.
    pub fn register(
        self: &Arc<Self>,
        callback: Arc<dyn TimeoutCallback>,
        delay: Duration,
        data: Option<TimeoutData>,
    ) -> TimeoutId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + delay;

        // Hold the map lock across spawn so the task cannot look the entry up
        // before it exists.
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let manager = Arc::downgrade(self);
        let task = self.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(manager) = manager.upgrade() {
                manager.fire(id, TimeoutReason::Timeout);
            }
        });
        entries.insert(
            id,
            TimeoutEntry {
                callback,
                data,
                deadline,
                task: Some(task),
            },
        );
        drop(entries);

        debug!(timeout_id = id, delay_ms = delay.as_millis() as u64, "registered timeout");
        id
    }

    /// Cancel a pending timer, invoking its callback with
    /// [`TimeoutReason::Cancelled`] on the calling thread.
    ///
    /// Returns `false` when the timer already fired or was already cancelled.
    pub fn cancel(&self, id: TimeoutId) -> bool {
        self.fire(id, TimeoutReason::Cancelled)
    }

    /// Whether `id` is still waiting to fire.
    pub fn is_pending(&self, id: TimeoutId) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    /// Number of timers still waiting to fire.
    pub fn pending(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Time left before `id` fires, if it is still pending.
    pub fn remaining(&self, id: TimeoutId) -> Option<Duration> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|e| e.deadline.saturating_duration_since(Instant::now()))
    }

    /// Drop every pending timer without invoking callbacks. Used at teardown.
    pub fn clear(&self) {
        let drained: Vec<TimeoutEntry> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, e)| e)
            .collect();
        for entry in &drained {
            if let Some(task) = &entry.task {
                task.abort();
            }
        }
        if !drained.is_empty() {
            debug!(count = drained.len(), "cleared pending timeouts");
        }
    }

    /// Claim the entry for `id` and run its callback. The claim is the removal
    /// from the pending map, so at most one caller ever gets past it.
    fn fire(&self, id: TimeoutId, reason: TimeoutReason) -> bool {
        let claimed = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);

        let Some(mut entry) = claimed else {
            debug!(timeout_id = id, ?reason, "timeout already handled");
            return false;
        };

        if reason == TimeoutReason::Cancelled {
            if let Some(task) = entry.task.take() {
                task.abort();
            }
        }

        let callback = Arc::clone(&entry.callback);
        let data = entry.data.take();
        match catch_unwind(AssertUnwindSafe(|| callback.timeout(id, reason, data))) {
            Ok(Some(message)) => self.forward(id, message),
            Ok(None) => {}
            Err(_) => {
                error!(timeout_id = id, ?reason, "timeout callback panicked");
            }
        }
        true
    }

    fn forward(&self, id: TimeoutId, message: Message) {
        match self.sink.get().and_then(Weak::upgrade) {
            Some(sink) => {
                debug!(timeout_id = id, kind = message.kind(), "forwarding timeout result");
                sink.manage(message);
            }
            None => {
                warn!(
                    timeout_id = id,
                    kind = message.kind(),
                    "no message sink available, dropping timeout result"
                );
            }
        }
    }
}

impl Drop for TimeoutManager {
    fn drop(&mut self) {
        self.clear();
    }
}
