//! Callback registry
//!
//! Maps socket descriptors to ordered callback lists under a single mutex.
//! The worker snapshots keys through a wrapping cursor so a registry larger
//! than one poll batch is still covered round-robin, and re-validates
//! membership (plus performs the read and the dispatch) under the same lock
//! that `remove_all` takes — once `remove_all` returns, no dispatch for that
//! descriptor is in flight or will ever start.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::os::unix::io::RawFd;
use std::sync::{Mutex, MutexGuard};

/// A registered read callback. Closure capture replaces the C-style opaque
/// state pointer; the slice is the bytes read (empty = EOF or read error).
pub type ReadCallback = Box<dyn FnMut(&[u8]) + Send>;

/// What the worker's bounded read produced for a ready descriptor.
pub(crate) enum ReadOutcome<'a> {
    /// Bytes were read; dispatch them and keep the registration.
    Data(&'a [u8]),
    /// EOF or read failure; dispatch an empty payload once, then drop the
    /// registration so the event cannot repeat.
    Eof,
    /// Spurious readiness; skip without dispatching.
    WouldBlock,
}

struct RegistrationEntry {
    // Insertion order = invocation order.
    callbacks: Vec<ReadCallback>,
}

struct RegistryInner {
    entries: BTreeMap<RawFd, RegistrationEntry>,
    // Last descriptor handed out by snapshot(); the next snapshot resumes
    // just past it and wraps.
    cursor: RawFd,
}

/// Mutex-protected registry shared by the façade and the worker.
pub(crate) struct CallbackRegistry {
    inner: Mutex<RegistryInner>,
}

impl CallbackRegistry {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                entries: BTreeMap::new(),
                cursor: -1,
            }),
        }
    }

    // A panicking callback poisons the mutex; the registry itself is still
    // consistent, so keep going.
    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a callback for `fd`, creating the entry on first registration.
    pub(crate) fn add(&self, fd: RawFd, callback: ReadCallback) {
        let mut inner = self.lock();
        inner
            .entries
            .entry(fd)
            .or_insert_with(|| RegistrationEntry {
                callbacks: Vec::new(),
            })
            .callbacks
            .push(callback);
    }

    /// Remove every callback for `fd`. No-op (returns false) if absent.
    pub(crate) fn remove_all(&self, fd: RawFd) -> bool {
        self.lock().entries.remove(&fd).is_some()
    }

    /// Number of distinct registered descriptors.
    pub(crate) fn count(&self) -> usize {
        self.lock().entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Drop every registration (reactor teardown).
    pub(crate) fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.cursor = -1;
    }

    /// Up to `max` descriptors for the next poll batch, resuming after the
    /// previous snapshot's last descriptor and wrapping. With N registered
    /// and a batch of B, every descriptor appears within ceil(N/B)
    /// consecutive snapshots.
    pub(crate) fn snapshot(&self, max: usize) -> Vec<RawFd> {
        let mut inner = self.lock();
        let take = inner.entries.len().min(max);
        if take == 0 {
            return Vec::new();
        }
        let cursor = inner.cursor;
        let mut out: Vec<RawFd> = inner
            .entries
            .range((Bound::Excluded(cursor), Bound::Unbounded))
            .map(|(fd, _)| *fd)
            .take(take)
            .collect();
        if out.len() < take {
            let remaining = take - out.len();
            out.extend(
                inner
                    .entries
                    .range(..=cursor)
                    .map(|(fd, _)| *fd)
                    .take(remaining),
            );
        }
        inner.cursor = *out.last().unwrap();
        out
    }

    /// Dispatch one readiness event for `fd`.
    ///
    /// Under the registry lock: skip if the descriptor was unregistered
    /// since the poll set was built, otherwise run `read` and invoke the
    /// callbacks in registration order. Returns the dispatched byte count,
    /// or `None` if nothing was dispatched.
    pub(crate) fn dispatch<'a, R>(&self, fd: RawFd, read: R) -> Option<usize>
    where
        R: FnOnce() -> ReadOutcome<'a>,
    {
        let mut inner = self.lock();
        if !inner.entries.contains_key(&fd) {
            // Unregistered between poll and dispatch; not an error.
            return None;
        }
        match read() {
            ReadOutcome::Data(data) => {
                if let Some(entry) = inner.entries.get_mut(&fd) {
                    for cb in entry.callbacks.iter_mut() {
                        cb(data);
                    }
                }
                Some(data.len())
            }
            ReadOutcome::Eof => {
                // Terminal for this registration: deliver the empty payload
                // once, with the lock still held so remove_all stays
                // serialized against the final dispatch.
                let mut entry = match inner.entries.remove(&fd) {
                    Some(e) => e,
                    None => return None,
                };
                for cb in entry.callbacks.iter_mut() {
                    cb(&[]);
                }
                Some(0)
            }
            ReadOutcome::WouldBlock => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn recorder(log: &Arc<Mutex<Vec<(u32, Vec<u8>)>>>, id: u32) -> ReadCallback {
        let log = log.clone();
        Box::new(move |data: &[u8]| {
            log.lock().unwrap().push((id, data.to_vec()));
        })
    }

    #[test]
    fn test_add_and_count() {
        let reg = CallbackRegistry::new();
        assert!(reg.is_empty());
        reg.add(3, Box::new(|_| {}));
        reg.add(3, Box::new(|_| {}));
        reg.add(7, Box::new(|_| {}));
        // Two callbacks on fd 3 still count as one registration.
        assert_eq!(reg.count(), 2);
    }

    #[test]
    fn test_remove_all() {
        let reg = CallbackRegistry::new();
        reg.add(4, Box::new(|_| {}));
        assert!(reg.remove_all(4));
        assert!(!reg.remove_all(4));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let reg = CallbackRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        reg.add(5, recorder(&log, 1));
        reg.add(5, recorder(&log, 2));

        let n = reg.dispatch(5, || ReadOutcome::Data(b"ping"));
        assert_eq!(n, Some(4));

        let calls = log.lock().unwrap();
        assert_eq!(
            *calls,
            vec![(1, b"ping".to_vec()), (2, b"ping".to_vec())]
        );
    }

    #[test]
    fn test_dispatch_skips_unregistered() {
        let reg = CallbackRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        reg.add(9, Box::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        reg.remove_all(9);

        assert_eq!(reg.dispatch(9, || ReadOutcome::Data(b"x")), None);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_eof_dispatches_once_and_removes() {
        let reg = CallbackRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        reg.add(6, recorder(&log, 1));

        assert_eq!(reg.dispatch(6, || ReadOutcome::Eof), Some(0));
        assert!(reg.is_empty());
        // Second readiness report for the same fd is now a no-op.
        assert_eq!(reg.dispatch(6, || ReadOutcome::Eof), None);

        let calls = log.lock().unwrap();
        assert_eq!(*calls, vec![(1, Vec::new())]);
    }

    #[test]
    fn test_would_block_keeps_registration() {
        let reg = CallbackRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        reg.add(8, Box::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(reg.dispatch(8, || ReadOutcome::WouldBlock), None);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(reg.count(), 1);
    }

    #[test]
    fn test_snapshot_round_robin_fairness() {
        let reg = CallbackRegistry::new();
        for fd in 0..10 {
            reg.add(fd, Box::new(|_| {}));
        }

        // N=10, B=4: all descriptors must appear within ceil(10/4)=3 snapshots.
        let mut seen = Vec::new();
        for _ in 0..3 {
            let batch = reg.snapshot(4);
            assert!(batch.len() <= 4);
            seen.extend(batch);
        }
        let mut uniq = seen.clone();
        uniq.sort_unstable();
        uniq.dedup();
        assert_eq!(uniq, (0..10).collect::<Vec<RawFd>>());
    }

    #[test]
    fn test_snapshot_wraps_after_removal() {
        let reg = CallbackRegistry::new();
        for fd in [2, 4, 6] {
            reg.add(fd, Box::new(|_| {}));
        }
        assert_eq!(reg.snapshot(2), vec![2, 4]);
        reg.remove_all(6);
        // Cursor sits at 4; wrapping must still reach 2.
        assert_eq!(reg.snapshot(2), vec![2, 4]);
    }

    #[test]
    fn test_snapshot_covers_all_when_batch_is_large() {
        let reg = CallbackRegistry::new();
        for fd in [1, 5, 9] {
            reg.add(fd, Box::new(|_| {}));
        }
        assert_eq!(reg.snapshot(1024), vec![1, 5, 9]);
        assert_eq!(reg.snapshot(1024).len(), 3);
    }

    #[test]
    fn test_concurrent_mutation() {
        let reg = Arc::new(CallbackRegistry::new());
        let mut handles = Vec::new();
        // 4 threads, disjoint fd ranges: add two callbacks, remove, re-add one.
        for t in 0..4 {
            let reg = reg.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    let fd = (t * 1000 + i) as RawFd;
                    reg.add(fd, Box::new(|_| {}));
                    reg.add(fd, Box::new(|_| {}));
                    reg.remove_all(fd);
                    reg.add(fd, Box::new(|_| {}));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        // Net effect: every fd registered exactly once.
        assert_eq!(reg.count(), 400);
    }
}
