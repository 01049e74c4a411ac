//!
//! Counting Semaphore
//!
//! A permit count guarded by a std mutex, with a condvar to park threads
//! while the count is zero. `release` wakes one waiter; which waiter runs
//! next is up to the OS scheduler.
//!
//! The count is a plain integer, so a poisoned internal lock is reported by
//! `acquire` / `try_acquire` as a failure of the semaphore itself (the queue
//! surfaces it as `AcquireFailed` / `TryAcquireFailed`). `release` and
//! `count` recover, since returning a permit must never be lost.
//!

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SemaphoreError {
    #[error("semaphore '{name}' is poisoned")]
    Poisoned { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TryAcquireError {
    #[error("no permits available")]
    NoPermits,

    #[error("semaphore '{name}' is poisoned")]
    Poisoned { name: String },
}

#[derive(Debug)]
pub struct Semaphore {
    name: String,
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    pub fn new(name: impl Into<String>, permits: usize) -> Self {
        Self {
            name: name.into(),
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn poisoned(&self) -> SemaphoreError {
        tracing::error!(semaphore = %self.name, "semaphore lock poisoned");
        SemaphoreError::Poisoned {
            name: self.name.clone(),
        }
    }

    /// Blocks while no permit is available, then takes one.
    pub fn acquire(&self) -> Result<(), SemaphoreError> {
        let guard = self.permits.lock().map_err(|_| self.poisoned())?;
        let mut permits = self
            .available
            .wait_while(guard, |permits| *permits == 0)
            .map_err(|_| self.poisoned())?;
        *permits -= 1;
        Ok(())
    }

    /// Takes a permit only if one is available right now.
    pub fn try_acquire(&self) -> Result<(), TryAcquireError> {
        let mut permits = match self.permits.try_lock() {
            Ok(guard) => guard,
            // contended for a few instructions at most
            Err(TryLockError::WouldBlock) => self.permits.lock().map_err(|_| {
                self.poisoned();
                TryAcquireError::Poisoned {
                    name: self.name.clone(),
                }
            })?,
            Err(TryLockError::Poisoned(_)) => {
                self.poisoned();
                return Err(TryAcquireError::Poisoned {
                    name: self.name.clone(),
                });
            }
        };
        if *permits == 0 {
            return Err(TryAcquireError::NoPermits);
        }
        *permits -= 1;
        Ok(())
    }

    /// Bounded `acquire`. Returns `Ok(false)` if no permit showed up in time.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<bool, SemaphoreError> {
        let guard = self.permits.lock().map_err(|_| self.poisoned())?;
        let (mut permits, _) = self
            .available
            .wait_timeout_while(guard, timeout, |permits| *permits == 0)
            .map_err(|_| self.poisoned())?;
        if *permits == 0 {
            return Ok(false);
        }
        *permits -= 1;
        Ok(true)
    }

    pub fn release(&self) {
        let mut permits = self.lock_recovering();
        *permits += 1;
        self.available.notify_one();
    }

    /// Snapshot for diagnostics; may be stale by the time it is read.
    pub fn count(&self) -> usize {
        *self.lock_recovering()
    }

    pub fn entry(&self) -> Result<SemaphoreEntry<'_>, SemaphoreError> {
        self.acquire()?;
        Ok(SemaphoreEntry { semaphore: self })
    }

    fn lock_recovering(&self) -> MutexGuard<'_, usize> {
        self.permits.lock().unwrap_or_else(|poisoned| {
            tracing::error!(semaphore = %self.name, "recovering poisoned semaphore lock");
            PoisonError::into_inner(poisoned)
        })
    }
}

/// Scoped permit, released on drop.
#[must_use = "the permit is released as soon as the entry is dropped"]
pub struct SemaphoreEntry<'a> {
    semaphore: &'a Semaphore,
}

impl Drop for SemaphoreEntry<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;

    #[test]
    fn test_semaphore_counts() {
        let sem = Semaphore::new("slots", 2);
        assert_eq!(sem.count(), 2);
        sem.acquire().unwrap();
        sem.try_acquire().unwrap();
        assert_eq!(sem.count(), 0);
        assert_eq!(sem.try_acquire(), Err(TryAcquireError::NoPermits));

        sem.release();
        assert_eq!(sem.count(), 1);
        sem.release();
        sem.release();
        assert_eq!(sem.count(), 3);
    }

    #[test]
    fn test_acquire_timeout() {
        let sem = Semaphore::new("empty", 0);
        assert!(!sem.acquire_timeout(Duration::from_millis(10)).unwrap());
        sem.release();
        assert!(sem.acquire_timeout(Duration::from_millis(10)).unwrap());
        assert_eq!(sem.count(), 0);
    }

    #[test]
    fn test_release_wakes_blocked_acquirer() {
        let sem = Arc::new(Semaphore::new("handoff", 0));
        let (tx, rx) = mpsc::channel();

        let waiter = {
            let sem = Arc::clone(&sem);
            thread::spawn(move || {
                sem.acquire().unwrap();
                tx.send(()).unwrap();
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(30)).is_err());
        sem.release();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
        assert_eq!(sem.count(), 0);
    }

    #[test]
    fn test_entry_bounds_concurrency() {
        let sem = Arc::new(Semaphore::new("pool", 3));
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let (sem, inside, peak) = (Arc::clone(&sem), Arc::clone(&inside), Arc::clone(&peak));
                thread::spawn(move || {
                    let _permit = sem.entry().unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(sem.count(), 3);
    }

    #[test]
    fn test_poisoned_semaphore_reports_failure() {
        let sem = Arc::new(Semaphore::new("broken", 1));
        let poisoner = Arc::clone(&sem);
        let _ = thread::spawn(move || {
            let _guard = poisoner.permits.lock().unwrap();
            panic!("poison the permit lock");
        })
        .join();

        assert!(matches!(sem.acquire(), Err(SemaphoreError::Poisoned { .. })));
        assert!(matches!(sem.try_acquire(), Err(TryAcquireError::Poisoned { .. })));
        sem.release();
        assert_eq!(sem.count(), 2);
    }
}
