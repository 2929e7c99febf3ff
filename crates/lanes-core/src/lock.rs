//! Serialization points for position writes.
//!
//! - [`PartitionLocks`]: in-process mutual exclusion keyed by partition, held
//!   around read-siblings → compute → write.
//! - [`StoreLock`]: advisory file lock so separate `lanes` processes take
//!   turns mutating the same store.

use crate::error::{Error, Result};
use crate::model::Partition;
use fs2::FileExt;
use std::{
    collections::HashMap,
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
    thread,
    time::{Duration, Instant},
};

/// One mutex per partition, created on first use and dropped once the
/// last holder or waiter is done with it.
#[derive(Debug, Default)]
pub struct PartitionLocks {
    slots: Mutex<HashMap<Partition, Arc<Mutex<()>>>>,
}

impl PartitionLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, partition: Partition) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(partition).or_default())
    }

    /// Run `f` while holding the lock for `partition`.
    pub fn with<R>(&self, partition: Partition, f: impl FnOnce() -> R) -> R {
        let slot = self.slot(partition);
        let out = {
            let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        drop(slot);
        self.prune(&[partition]);
        out
    }

    /// Run `f` while holding the locks for every partition in `partitions`.
    ///
    /// Locks are taken in sorted order so overlapping callers cannot
    /// deadlock.
    pub fn with_all<R>(&self, partitions: &[Partition], f: impl FnOnce() -> R) -> R {
        let mut ordered = partitions.to_vec();
        ordered.sort_unstable();
        ordered.dedup();
        let slots: Vec<_> = ordered.iter().map(|p| self.slot(*p)).collect();
        let out = {
            let _guards: Vec<_> = slots
                .iter()
                .map(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner))
                .collect();
            f()
        };
        drop(slots);
        self.prune(&ordered);
        out
    }

    /// Forget slots nobody else holds or waits on. A waiter keeps its own
    /// `Arc`, so a count of one means only the map refers to the slot.
    fn prune(&self, partitions: &[Partition]) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        for partition in partitions {
            if slots
                .get(partition)
                .is_some_and(|slot| Arc::strong_count(slot) == 1)
            {
                slots.remove(partition);
            }
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// RAII guard for the store-wide exclusive lock used during writes.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Acquire an exclusive advisory lock on `path`, polling until `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockTimeout`] when another holder keeps the lock past
    /// `timeout`, or [`Error::Io`] when the lock file cannot be opened.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        let parent = path.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "lock path has no parent")
        })?;
        fs::create_dir_all(parent)?;

        let start = Instant::now();
        loop {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(path)?;

            if file.try_lock_exclusive().is_ok() {
                return Ok(Self {
                    file,
                    path: path.to_path_buf(),
                });
            }

            if start.elapsed() >= timeout {
                return Err(Error::LockTimeout {
                    path: path.to_path_buf(),
                    waited: start.elapsed(),
                });
            }

            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Explicitly release the lock. Release also happens automatically on drop.
    pub fn release(self) {
        drop(self);
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::{PartitionLocks, StoreLock};
    use crate::error::{Error, ErrorCode};
    use crate::model::{BoardId, Partition, StageId};
    use std::{
        sync::{
            Arc, Barrier,
            atomic::{AtomicUsize, Ordering},
        },
        thread,
        time::Duration,
    };

    #[test]
    fn store_lock_allows_acquire_and_release() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.lock");
        let lock = StoreLock::acquire(&path, Duration::from_millis(50)).expect("acquire");
        assert_eq!(lock.path(), path.as_path());
        lock.release();
        StoreLock::acquire(&path, Duration::from_millis(50)).expect("reacquire");
    }

    #[test]
    fn store_lock_times_out_when_held() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("held.lock");
        let _guard = StoreLock::acquire(&path, Duration::from_millis(50)).unwrap();
        let err = StoreLock::acquire(&path, Duration::from_millis(20)).unwrap_err();

        assert!(matches!(err, Error::LockTimeout { path: ref p, .. } if *p == path));
        assert_eq!(err.code(), ErrorCode::LockContention);
        assert!(err.hint().is_some());
    }

    #[test]
    fn partition_lock_serializes_same_partition() {
        let locks = Arc::new(PartitionLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let start = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let peak = Arc::clone(&peak);
                let start = Arc::clone(&start);
                thread::spawn(move || {
                    start.wait();
                    locks.with(Partition::Stage(StageId::new(1)), || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(5));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(locks.tracked(), 0);
    }

    #[test]
    fn slots_are_dropped_after_use() {
        let locks = PartitionLocks::new();
        for n in 1..=100 {
            let stage = Partition::Stage(StageId::new(n));
            locks.with(stage, || assert_eq!(locks.tracked(), 1));
        }
        assert_eq!(locks.tracked(), 0);

        let board = Partition::Board(BoardId::new(1));
        let stage = Partition::Stage(StageId::new(1));
        locks.with_all(&[stage, board, stage], || assert_eq!(locks.tracked(), 2));
        assert_eq!(locks.tracked(), 0);
    }

    #[test]
    fn waiting_caller_keeps_its_slot() {
        let locks = Arc::new(PartitionLocks::new());
        let stage = Partition::Stage(StageId::new(1));
        let entered = Arc::new(Barrier::new(2));
        let waiter = {
            let locks = Arc::clone(&locks);
            let entered = Arc::clone(&entered);
            thread::spawn(move || {
                entered.wait();
                locks.with(stage, || 2)
            })
        };
        let first = locks.with(stage, || {
            entered.wait();
            thread::sleep(Duration::from_millis(20));
            1
        });
        assert_eq!(first + waiter.join().unwrap(), 3);
        assert_eq!(locks.tracked(), 0);
    }

    #[test]
    fn with_all_tolerates_duplicates() {
        let locks = PartitionLocks::new();
        let board = Partition::Board(BoardId::new(1));
        let value = locks.with_all(&[board, board], || 7);
        assert_eq!(value, 7);
    }
}
