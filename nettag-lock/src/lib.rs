//! Keyed lock groups.
//!
//! A [`LockGroup`] provides mutual exclusion over a dynamically discovered set of keys
//! (for example "the link between interface X and interface Y") without declaring a lock
//! per key up front. Per-key mutexes are created on first use and freed once nobody holds
//! or waits on them anymore.
//!
//! # Lock order
//!
//! [`LockGroup::acquire_many`] sorts the requested keys and acquires them in ascending
//! order, releasing them in descending order. Any operation that needs more than one key
//! of a group must go through it: taking keys one at a time with
//! [`LockGroup::acquire_one`] in caller-defined order can deadlock against another thread
//! doing the same in a different order.
//!
//! Acquisition blocks indefinitely. There is no timeout and no cancellation.
//!
//! ```rust
//! use nettag_lock::LockGroup;
//!
//! let group = LockGroup::new("links");
//!
//! let guard = group.acquire_many(["b", "a"]);
//! assert_eq!(guard.keys().copied().collect::<Vec<_>>(), ["a", "b"]);
//! drop(guard);
//!
//! assert!(group.is_empty());
//! ```

use std::{
    fmt,
    hash::Hash,
    sync::Arc,
    thread::{self, ThreadId},
};

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use rustc_hash::{FxHashMap, FxHashSet};

mod observer;
pub use observer::{LockObserver, TracingObserver};

/// Helper trait alias for lock group keys.
/// Keys must be totally ordered, since that order is the canonical acquisition order.
pub trait LockKey: Ord + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

// Blanket implementation of `LockKey` for any type that satisfies the bounds.
impl<T> LockKey for T where T: Ord + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

/// A reference-counted per-key mutex. `refs` counts holders and waiters.
struct Entry {
    lock: Arc<Mutex<()>>,
    refs: usize,
}

/// Bookkeeping shared by every acquisition in a group.
struct GroupState<K> {
    entries: FxHashMap<K, Entry>,
    /// Keys requested but not yet held, per thread.
    pending: FxHashMap<ThreadId, FxHashSet<K>>,
    /// Keys currently held, per thread.
    active: FxHashMap<ThreadId, FxHashSet<K>>,
}

impl<K: LockKey> GroupState<K> {
    fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
            pending: FxHashMap::default(),
            active: FxHashMap::default(),
        }
    }

    /// Takes a reference to the mutex for `key`, creating it if needed.
    fn lease(&mut self, key: &K) -> Arc<Mutex<()>> {
        let entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| Entry { lock: Arc::new(Mutex::new(())), refs: 0 });
        entry.refs += 1;
        Arc::clone(&entry.lock)
    }

    /// Drops a reference to the mutex for `key`, freeing it on zero.
    fn unlease(&mut self, key: &K) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.refs -= 1;
            if entry.refs == 0 {
                self.entries.remove(key);
            }
        }
    }

    fn activate(&mut self, thread: ThreadId, key: &K) {
        if let Some(pending) = self.pending.get_mut(&thread) {
            pending.remove(key);
            if pending.is_empty() {
                self.pending.remove(&thread);
            }
        }
        self.active.entry(thread).or_default().insert(key.clone());
    }

    fn deactivate(&mut self, thread: ThreadId, key: &K) {
        if let Some(active) = self.active.get_mut(&thread) {
            active.remove(key);
            if active.is_empty() {
                self.active.remove(&thread);
            }
        }
    }
}

/// What a thread already held when it asked for more keys.
struct Nesting<K> {
    held: Vec<K>,
    reacquired: Vec<K>,
}

/// A group of keyed mutexes with canonical multi-key ordering.
pub struct LockGroup<K: LockKey> {
    name: String,
    state: Mutex<GroupState<K>>,
    observer: Arc<dyn LockObserver<K>>,
}

impl<K: LockKey> LockGroup<K> {
    /// Creates an empty group that reports misuse through [`TracingObserver`].
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(GroupState::new()),
            observer: Arc::new(TracingObserver),
        }
    }

    /// Replaces the observer that gets notified of likely misuse.
    pub fn with_observer(mut self, observer: impl LockObserver<K>) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// The name of the group, as it appears in logs and observer reports.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Acquires the lock for a single key, blocking until it is available.
    pub fn acquire_one(&self, key: K) -> GroupGuard<'_, K> {
        self.acquire(vec![key])
    }

    /// Acquires the locks for all `keys` in canonical (ascending) order.
    /// Duplicate keys are only acquired once.
    pub fn acquire_many(&self, keys: impl IntoIterator<Item = K>) -> GroupGuard<'_, K> {
        let mut keys: Vec<K> = keys.into_iter().collect();
        keys.sort_unstable();
        keys.dedup();
        self.acquire(keys)
    }

    /// Returns the number of keys that currently have a live mutex.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns `true` if no key is held or waited on.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `keys` must be sorted and deduplicated.
    fn acquire(&self, keys: Vec<K>) -> GroupGuard<'_, K> {
        let thread = thread::current().id();

        let (locks, nesting) = {
            let mut state = self.state.lock();
            let locks: Vec<_> = keys.iter().map(|key| state.lease(key)).collect();

            let nesting = state.active.get(&thread).map(|held| {
                let reacquired = keys.iter().filter(|key| held.contains(*key)).cloned().collect();
                let mut held: Vec<K> = held.iter().cloned().collect();
                held.sort_unstable();
                Nesting { held, reacquired }
            });

            state.pending.entry(thread).or_default().extend(keys.iter().cloned());
            (locks, nesting)
        };

        // Report outside of the bookkeeping lock, the observer may be slow.
        if let Some(Nesting { held, reacquired }) = nesting {
            self.observer.nested_acquire(&self.name, thread, &keys, &held);
            if !reacquired.is_empty() {
                self.observer.reacquire(&self.name, thread, &reacquired);
            }
        }

        let mut held = Vec::with_capacity(keys.len());
        for (key, lock) in keys.into_iter().zip(locks) {
            let guard = lock.lock_arc();
            self.state.lock().activate(thread, &key);
            held.push((key, guard));
        }

        tracing::trace!(group = %self.name, keys = ?keys_of(&held), "Acquired");

        GroupGuard { group: self, thread, held }
    }

    fn release(&self, thread: ThreadId, key: &K) {
        let mut state = self.state.lock();
        state.unlease(key);
        state.deactivate(thread, key);
    }
}

impl<K: LockKey> fmt::Debug for LockGroup<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGroup").field("name", &self.name).field("keys", &self.len()).finish()
    }
}

fn keys_of<K, G>(held: &[(K, G)]) -> Vec<&K> {
    held.iter().map(|(key, _)| key).collect()
}

/// Holds one or more keys of a [`LockGroup`]. The keys are released in descending order
/// when the guard is dropped or [`released`](GroupGuard::release).
#[must_use = "the keys are released as soon as the guard is dropped"]
pub struct GroupGuard<'a, K: LockKey> {
    group: &'a LockGroup<K>,
    thread: ThreadId,
    /// Held keys in ascending order.
    held: Vec<(K, ArcMutexGuard<RawMutex, ()>)>,
}

impl<K: LockKey> GroupGuard<'_, K> {
    /// Returns the held keys in acquisition order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.held.iter().map(|(key, _)| key)
    }

    /// Releases every held key.
    pub fn release(self) {
        drop(self);
    }
}

impl<K: LockKey> Drop for GroupGuard<'_, K> {
    fn drop(&mut self) {
        while let Some((key, guard)) = self.held.pop() {
            self.group.release(self.thread, &key);
            drop(guard);
        }
    }
}

impl<K: LockKey> fmt::Debug for GroupGuard<'_, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupGuard")
            .field("group", &self.group.name)
            .field("keys", &self.keys().collect::<Vec<_>>())
            .finish()
    }
}
