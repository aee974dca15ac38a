//! Per-key accumulation used by the collecting rules.
//!
//! Each accumulation key (area or source plus nominal time) owns its own
//! slot behind its own mutex, so arrivals for different keys of one rule never
//! wait on each other. The collector-wide mutex only guards the key map and
//! is never held while a slot is being evaluated.
//!
//! Lock order: a slot lock may be held while taking the map lock, never the
//! other way round.
//!
//! The open set is bounded. Opening a key past the limit supersedes the least
//! recently touched collecting slot, so a rule that never completes (timeout 0
//! with a source that stopped delivering) cannot grow without bound.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use tracing::debug;

use crate::lock;
use crate::timeout::TimeoutId;

/// How many closed keys a collector remembers to reject late arrivals.
pub const DEFAULT_CLOSED_MEMORY: usize = 256;

/// How many keys a collector keeps collecting at once.
pub const DEFAULT_OPEN_LIMIT: usize = 1024;

/// Lifecycle of one accumulation key. A key with no slot is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotState {
    Collecting,
    /// Completeness criterion met; a generate request was emitted.
    Complete,
    /// The wait bound elapsed before completion.
    TimedOut,
    /// The owning rule was replaced or removed while collecting.
    Superseded,
}

/// Partial inputs collected for one key.
#[derive(Debug)]
pub(crate) struct Slot<S> {
    pub state: SlotState,
    pub timer: Option<TimeoutId>,
    pub data: S,
}

pub(crate) type SlotRef<S> = Arc<Mutex<Slot<S>>>;

struct Slots<K: Hash + Eq, S> {
    open: LruCache<K, SlotRef<S>>,
    closed: LruCache<K, SlotState>,
}

pub(crate) struct SlotCollector<K: Hash + Eq, S> {
    slots: Mutex<Slots<K, S>>,
}

impl<K, S> SlotCollector<K, S>
where
    K: Hash + Eq + Clone,
    S: Default,
{
    pub fn new(closed_memory: usize, open_limit: usize) -> Self {
        let closed = NonZeroUsize::new(closed_memory).unwrap_or(NonZeroUsize::MIN);
        let open = NonZeroUsize::new(open_limit).unwrap_or(NonZeroUsize::MIN);
        Self {
            slots: Mutex::new(Slots {
                open: LruCache::new(open),
                closed: LruCache::new(closed),
            }),
        }
    }

    /// The collecting slot for `key`, created on first use.
    ///
    /// Returns `None` when the key was recently closed; late arrivals for an
    /// already generated slot must not reopen it. The second value is the
    /// pending timer of a slot superseded to stay within the open limit; the
    /// caller cancels it.
    pub fn open(&self, key: &K) -> Option<(SlotRef<S>, Option<TimeoutId>)> {
        let (slot, evicted) = {
            let mut slots = lock(&self.slots);
            if slots.closed.contains(key) {
                return None;
            }
            if let Some(slot) = slots.open.get(key) {
                return Some((Arc::clone(slot), None));
            }
            let slot = Arc::new(Mutex::new(Slot {
                state: SlotState::Collecting,
                timer: None,
                data: S::default(),
            }));
            let evicted = slots.open.push(key.clone(), Arc::clone(&slot)).map(|(_, old)| old);
            (slot, evicted)
        };

        let timer = evicted.and_then(|old| {
            let mut guard = lock(&old);
            if guard.state != SlotState::Collecting {
                return None;
            }
            guard.state = SlotState::Superseded;
            debug!("open slot limit reached, superseded least recently used slot");
            guard.timer.take()
        });
        Some((slot, timer))
    }

    /// The collecting slot for `key` if one is open. Never creates a slot.
    pub fn get(&self, key: &K) -> Option<SlotRef<S>> {
        lock(&self.slots).open.peek(key).cloned()
    }

    /// Close a slot whose lock the caller holds, returning its data and pending timer.
    pub fn close(
        &self,
        key: &K,
        slot: &SlotRef<S>,
        guard: &mut Slot<S>,
        state: SlotState,
    ) -> (S, Option<TimeoutId>) {
        guard.state = state;
        let data = std::mem::take(&mut guard.data);
        let timer = guard.timer.take();

        let mut slots = lock(&self.slots);
        if slots
            .open
            .peek(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
        {
            slots.open.pop(key);
        }
        if state != SlotState::Superseded {
            slots.closed.put(key.clone(), state);
        }
        (data, timer)
    }

    /// Close `key` as timed out if it is still collecting.
    pub fn expire(&self, key: &K) -> Option<S> {
        let slot = self.get(key)?;
        let mut guard = lock(&slot);
        if guard.state != SlotState::Collecting {
            return None;
        }
        let (data, _) = self.close(key, &slot, &mut guard, SlotState::TimedOut);
        Some(data)
    }

    /// Mark every open slot superseded, returning the timers that still need cancelling.
    pub fn supersede_all(&self) -> Vec<TimeoutId> {
        let drained: Vec<SlotRef<S>> = {
            let mut slots = lock(&self.slots);
            std::iter::from_fn(|| slots.open.pop_lru().map(|(_, s)| s)).collect()
        };
        drained
            .iter()
            .filter_map(|slot| {
                let mut guard = lock(slot);
                guard.state = SlotState::Superseded;
                guard.timer.take()
            })
            .collect()
    }

    /// State of `key`: `Collecting`, a remembered terminal state, or `None` when empty.
    pub fn state(&self, key: &K) -> Option<SlotState> {
        let slots = lock(&self.slots);
        if slots.open.contains(key) {
            return Some(SlotState::Collecting);
        }
        slots.closed.peek(key).copied()
    }

    /// Number of keys currently collecting.
    pub fn open_count(&self) -> usize {
        lock(&self.slots).open.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    type Collector = SlotCollector<&'static str, Vec<u32>>;

    #[test]
    fn closed_key_cannot_reopen() {
        let collector = Collector::new(8, 8);
        let slot = collector.open(&"a").unwrap().0;
        {
            let mut guard = slot.lock().unwrap();
            guard.data.push(1);
            let (data, timer) = collector.close(&"a", &slot, &mut guard, SlotState::Complete);
            assert_eq!(data, vec![1]);
            assert!(timer.is_none());
        }
        assert!(collector.open(&"a").is_none());
        assert_eq!(collector.state(&"a"), Some(SlotState::Complete));
        assert_eq!(collector.open_count(), 0);
    }

    #[test]
    fn expire_only_once() {
        let collector = Collector::new(8, 8);
        let slot = collector.open(&"a").unwrap().0;
        slot.lock().unwrap().data.push(7);

        assert_eq!(collector.expire(&"a"), Some(vec![7]));
        assert_eq!(collector.expire(&"a"), None);
        assert_eq!(collector.state(&"a"), Some(SlotState::TimedOut));
    }

    #[test]
    fn stale_handle_sees_terminal_state() {
        let collector = Collector::new(8, 8);
        let first = collector.open(&"a").unwrap().0;
        let second = collector.open(&"a").unwrap().0;
        assert!(Arc::ptr_eq(&first, &second));

        collector.expire(&"a");
        assert_eq!(second.lock().unwrap().state, SlotState::TimedOut);
    }

    #[test]
    fn supersede_returns_pending_timers() {
        let collector = Collector::new(8, 8);
        collector.open(&"a").unwrap().0.lock().unwrap().timer = Some(11);
        collector.open(&"b").unwrap().0;

        let mut timers = collector.supersede_all();
        timers.sort();
        assert_eq!(timers, vec![11]);
        assert_eq!(collector.open_count(), 0);
        // Superseded keys are not remembered, so a replacement rule could reopen them.
        assert!(collector.state(&"a").is_none());
    }

    #[test]
    fn closed_memory_is_bounded() {
        let collector = Collector::new(2, 8);
        for key in ["a", "b", "c"] {
            let slot = collector.open(&key).unwrap().0;
            let mut guard = slot.lock().unwrap();
            collector.close(&key, &slot, &mut guard, SlotState::Complete);
        }
        // "a" was evicted and may be collected again.
        assert!(collector.open(&"a").is_some());
        assert!(collector.open(&"c").is_none());
    }

    #[test]
    fn different_keys_do_not_block_each_other() {
        let collector = Arc::new(Collector::new(8, 8));
        let held = collector.open(&"slow").unwrap().0;
        let _guard = held.lock().unwrap();

        let (tx, rx) = mpsc::channel();
        let worker = {
            let collector = Arc::clone(&collector);
            std::thread::spawn(move || {
                let slot = collector.open(&"fast").unwrap().0;
                let mut guard = slot.lock().unwrap();
                guard.data.push(1);
                let (data, _) = collector.close(&"fast", &slot, &mut guard, SlotState::Complete);
                tx.send(data).unwrap();
            })
        };

        let data = rx
            .recv_timeout(Duration::from_secs(2))
            .expect("second key blocked behind the first");
        assert_eq!(data, vec![1]);
        worker.join().unwrap();
    }

    #[test]
    fn open_set_is_bounded() {
        let collector = SlotCollector::<u32, Vec<u32>>::new(8, 3);
        let (first, _) = collector.open(&0).unwrap();
        first.lock().unwrap().timer = Some(42);
        collector.open(&1).unwrap();
        collector.open(&2).unwrap();
        // Touching 0 makes 1 the least recently used.
        collector.open(&0).unwrap();

        let (_, evicted) = collector.open(&3).unwrap();
        assert_eq!(evicted, None);
        assert!(collector.state(&1).is_none());

        let (_, evicted) = collector.open(&4).unwrap();
        assert_eq!(evicted, None);
        let (_, evicted) = collector.open(&5).unwrap();
        assert_eq!(evicted, Some(42));
        assert_eq!(first.lock().unwrap().state, SlotState::Superseded);

        for key in 6..500 {
            collector.open(&key).unwrap();
        }
        assert_eq!(collector.open_count(), 3);
    }

    #[test]
    fn evicted_slot_closed_meanwhile_keeps_its_state() {
        let collector = SlotCollector::<u32, Vec<u32>>::new(8, 1);
        let (slot, _) = collector.open(&0).unwrap();
        let mut guard = slot.lock().unwrap();
        guard.timer = Some(9);
        let opener = {
            let collector = &collector;
            std::thread::scope(|scope| {
                let handle = scope.spawn(move || collector.open(&1).unwrap().1);
                std::thread::sleep(Duration::from_millis(50));
                let (_, timer) = collector.close(&0, &slot, &mut guard, SlotState::Complete);
                assert_eq!(timer, Some(9));
                drop(guard);
                handle.join().unwrap()
            })
        };
        assert_eq!(opener, None);
        assert_eq!(slot.lock().unwrap().state, SlotState::Complete);
        assert_eq!(collector.state(&0), Some(SlotState::Complete));
    }
}
