//! Deduplicating, rate-limited work queue
//!
//! Keys move through three sets:
//! - `queue`: waiting to be handed to a worker (FIFO)
//! - `dirty`: needs processing; a key is never queued twice
//! - `processing`: currently held by a worker
//!
//! A key added while it is processing stays dirty and is queued again when the
//! worker calls [`WorkQueue::done`], so at most one worker ever holds a key.
//!
//! Delayed adds keep one timer per key. A later request for a key that is
//! already waiting is dropped; an earlier one replaces the pending timer.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chaos_common::retry::Backoff;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct State<K> {
    queue: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    failures: HashMap<K, u32>,
    /// Ready time and cancel handle of the single pending timer per key
    waiting: HashMap<K, (Instant, CancellationToken)>,
    shutting_down: bool,
}

impl<K> Default for State<K> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            dirty: HashSet::new(),
            processing: HashSet::new(),
            failures: HashMap::new(),
            waiting: HashMap::new(),
            shutting_down: false,
        }
    }
}

struct Inner<K> {
    state: Mutex<State<K>>,
    notify: Notify,
    backoff: Backoff,
    /// Cancels pending delayed adds on shutdown
    delayed: CancellationToken,
}

/// Work queue shared by the watch loop, the resync ticker and every worker
pub struct WorkQueue<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K> WorkQueue<K>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    /// Queue with the given per-item failure backoff
    pub fn new(backoff: Backoff) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
                backoff,
                delayed: CancellationToken::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State<K>> {
        // The state is a set of plain collections, so a poisoned lock is still consistent
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mark `key` as needing processing
    ///
    /// No-op if the key is already waiting. If it is being processed, it is
    /// queued again once the current holder calls [`done`](Self::done).
    pub fn add(&self, key: K) {
        let mut state = self.state();
        if state.shutting_down || state.dirty.contains(&key) {
            return;
        }
        state.dirty.insert(key.clone());
        if state.processing.contains(&key) {
            return;
        }
        state.queue.push_back(key);
        drop(state);
        self.inner.notify.notify_one();
    }

    /// Add `key` after `delay`
    ///
    /// Keeps only the earliest pending delay per key.
    pub fn add_after(&self, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }

        let ready_at = Instant::now() + delay;
        let timer = {
            let mut state = self.state();
            if state.shutting_down {
                return;
            }
            if let Some((pending_at, pending)) = state.waiting.get(&key) {
                if *pending_at <= ready_at {
                    return;
                }
                pending.cancel();
            }
            let timer = self.inner.delayed.child_token();
            state.waiting.insert(key.clone(), (ready_at, timer.clone()));
            timer
        };

        let queue = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep_until(ready_at) => queue.fire(key, ready_at),
            }
        });
    }

    fn fire(&self, key: K, ready_at: Instant) {
        {
            let mut state = self.state();
            let current = state.waiting.get(&key).map(|(at, _)| *at) == Some(ready_at);
            // Superseded by an earlier timer
            if !current {
                return;
            }
            state.waiting.remove(&key);
        }
        self.add(key);
    }

    /// Number of keys with a pending delayed add
    pub fn num_waiting(&self) -> usize {
        self.state().waiting.len()
    }

    /// Record a failure for `key` and add it after its backoff delay
    pub fn add_rate_limited(&self, key: K) {
        let delay = {
            let mut state = self.state();
            let failures = state.failures.entry(key.clone()).or_insert(0);
            *failures = failures.saturating_add(1);
            self.inner.backoff.delay_for(*failures)
        };
        self.add_after(key, delay);
    }

    /// Clear the failure count for `key`
    pub fn forget(&self, key: &K) {
        self.state().failures.remove(key);
    }

    /// Consecutive failures recorded for `key`
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.state().failures.get(key).copied().unwrap_or(0)
    }

    /// Wait for the next key
    ///
    /// Returns `None` once the queue is shut down and nothing is left waiting.
    /// The caller owns the key until it calls [`done`](Self::done).
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking state so a concurrent add cannot be missed
            notified.as_mut().enable();

            {
                let mut state = self.state();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Release `key`, re-queueing it if it was added while processing
    pub fn done(&self, key: &K) {
        let mut state = self.state();
        state.processing.remove(key);
        if state.dirty.contains(key) {
            state.queue.push_back(key.clone());
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    /// Number of keys waiting to be handed out
    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    /// True when no key is waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting keys and wake every blocked [`get`](Self::get)
    pub fn shutdown(&self) {
        {
            let mut state = self.state();
            state.shutting_down = true;
            state.waiting.clear();
        }
        self.inner.delayed.cancel();
        self.inner.notify.notify_waiters();
    }

    /// True after [`shutdown`](Self::shutdown)
    pub fn is_shutting_down(&self) -> bool {
        self.state().shutting_down
    }
}
