use std::{fmt, thread::ThreadId};

/// Receives reports about likely misuse of a [`LockGroup`](crate::LockGroup).
///
/// Reports never prevent an acquisition: a thread that re-requests a key it already holds
/// will simply block forever, and the report is the only signal left behind.
pub trait LockObserver<K>: Send + Sync + 'static {
    /// A thread requested `requested` while still holding `held` from the same group.
    fn nested_acquire(&self, group: &str, thread: ThreadId, requested: &[K], held: &[K]);

    /// A thread requested keys it already holds.
    fn reacquire(&self, group: &str, thread: ThreadId, keys: &[K]);
}

/// The default observer, which logs every report at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl<K: fmt::Debug> LockObserver<K> for TracingObserver {
    fn nested_acquire(&self, group: &str, thread: ThreadId, requested: &[K], held: &[K]) {
        tracing::error!(
            group,
            ?thread,
            ?requested,
            ?held,
            "Thread is trying to acquire keys from the same lock group before releasing"
        );
    }

    fn reacquire(&self, group: &str, thread: ThreadId, keys: &[K]) {
        tracing::error!(group, ?thread, ?keys, "Thread is already holding these keys");
    }
}
