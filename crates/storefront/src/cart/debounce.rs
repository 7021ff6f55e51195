//! Per-key cancellable delayed tasks.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::AbortHandle;

/// Schedules at most one delayed task per key.
///
/// Scheduling a key again aborts the previous task if it has not fired yet
/// and restarts the delay. A task claims its slot when the delay elapses;
/// from then on it runs to completion and can no longer be cancelled.
#[derive(Debug)]
pub struct Debouncer<K> {
    slots: Arc<Mutex<Slots<K>>>,
}

#[derive(Debug)]
struct Slots<K> {
    next_generation: u64,
    scheduled: HashMap<K, Slot>,
}

#[derive(Debug)]
struct Slot {
    generation: u64,
    handle: AbortHandle,
}

impl<K> Clone for Debouncer<K> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<K> Default for Debouncer<K> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(Slots {
                next_generation: 0,
                scheduled: HashMap::new(),
            })),
        }
    }
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay`, replacing any undispatched task for `key`.
    ///
    /// Must be called within a Tokio runtime.
    pub fn schedule<F>(&self, key: K, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slots = self.lock();
        slots.next_generation += 1;
        let generation = slots.next_generation;

        let claim_from = self.clone();
        let claim_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if claim_from.claim(&claim_key, generation) {
                task.await;
            }
        })
        .abort_handle();

        if let Some(previous) = slots.scheduled.insert(key, Slot { generation, handle }) {
            previous.handle.abort();
        }
    }

    /// Cancel the undispatched task for `key`. Returns whether one was
    /// cancelled.
    pub fn cancel(&self, key: &K) -> bool {
        self.lock().scheduled.remove(key).is_some_and(|slot| {
            slot.handle.abort();
            true
        })
    }

    /// Cancel every undispatched task, returning their keys.
    pub fn cancel_all(&self) -> Vec<K> {
        self.lock()
            .scheduled
            .drain()
            .map(|(key, slot)| {
                slot.handle.abort();
                key
            })
            .collect()
    }

    /// Whether an undispatched task exists for `key`.
    #[must_use]
    pub fn is_scheduled(&self, key: &K) -> bool {
        self.lock().scheduled.contains_key(key)
    }

    /// Remove the slot if it still belongs to `generation`.
    fn claim(&self, key: &K, generation: u64) -> bool {
        let mut slots = self.lock();
        match slots.scheduled.get(key) {
            Some(slot) if slot.generation == generation => {
                slots.scheduled.remove(key);
                true
            }
            _ => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slots<K>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn counter_task(counter: &Arc<AtomicU32>, value: u32) -> impl Future<Output = ()> + Send + use<> {
        let counter = Arc::clone(counter);
        async move {
            counter.store(value, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_pending_task() {
        let debouncer = Debouncer::new();
        let fired = Arc::new(AtomicU32::new(0));

        debouncer.schedule(1, Duration::from_millis(1000), counter_task(&fired, 1));
        tokio::time::sleep(Duration::from_millis(600)).await;
        debouncer.schedule(1, Duration::from_millis(1000), counter_task(&fired, 2));

        // The first deadline passes without firing.
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert!(!debouncer.is_scheduled(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let debouncer = Debouncer::new();
        let a = Arc::new(AtomicU32::new(0));
        let b = Arc::new(AtomicU32::new(0));

        debouncer.schedule("a", Duration::from_millis(100), counter_task(&a, 1));
        debouncer.schedule("b", Duration::from_millis(300), counter_task(&b, 1));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let debouncer = Debouncer::new();
        let fired = Arc::new(AtomicU32::new(0));

        debouncer.schedule(7, Duration::from_millis(100), counter_task(&fired, 1));
        assert!(debouncer.cancel(&7));
        assert!(!debouncer.cancel(&7));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_returns_keys() {
        let debouncer = Debouncer::new();
        let fired = Arc::new(AtomicU32::new(0));

        debouncer.schedule(1, Duration::from_millis(100), counter_task(&fired, 1));
        debouncer.schedule(2, Duration::from_millis(100), counter_task(&fired, 2));

        let mut keys = debouncer.cancel_all();
        keys.sort_unstable();
        assert_eq!(keys, vec![1, 2]);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
