//!
//! Condition variable compatible with `Mutex` and `ReentrantMutex`.
//!
//! `wait` hands the lock over atomically: the ownership record is cleared
//! and the thread blocks while the raw lock's internal std mutex stays held,
//! so a signaller (which must own the lock, and therefore take that std
//! mutex first) cannot slip its signal in between. On wake the lock is
//! reacquired and the caller's recursion depth is put back.
//!
//! A `Condition` must only ever be used with one lock. Wakeups can be
//! spurious; callers re-check their predicate in a loop.
//!

use std::sync::{Condvar, PoisonError};
use std::thread;
use std::time::Duration;

use crate::mutex::sealed::Sealed;
use crate::mutex::{LockError, Lockable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    Signaled,
    TimedOut,
}

impl WaitStatus {
    pub fn timed_out(self) -> bool {
        self == WaitStatus::TimedOut
    }
}

#[derive(Debug, Default)]
pub struct Condition {
    cond: Condvar,
}

impl Condition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until signalled. The caller must hold `lock`.
    pub fn wait<L: Lockable>(&self, lock: &L) -> Result<(), LockError> {
        self.wait_inner(lock, None).map(|_| ())
    }

    /// Blocks until signalled or `timeout` elapses. The lock is held again
    /// on return in both cases.
    pub fn timed_wait<L: Lockable>(
        &self,
        lock: &L,
        timeout: Duration,
    ) -> Result<WaitStatus, LockError> {
        self.wait_inner(lock, Some(timeout))
    }

    pub fn signal(&self) {
        self.cond.notify_one();
    }

    pub fn broadcast(&self) {
        self.cond.notify_all();
    }

    fn wait_inner<L: Lockable>(
        &self,
        lock: &L,
        timeout: Option<Duration>,
    ) -> Result<WaitStatus, LockError> {
        let me = thread::current().id();
        let raw = lock.raw();
        let mut guard = raw.state();
        if !guard.is_held_by(me) {
            tracing::error!(lock = lock.name(), caller = ?me, "condition wait without holding the lock");
            return Err(LockError::NotOwner {
                name: lock.name().to_string(),
                caller: me,
                owner: guard.owner,
            });
        }

        let depth = guard.depth;
        raw.release(&mut guard);

        let (guard, status) = match timeout {
            None => {
                let guard = self.cond.wait(guard).unwrap_or_else(PoisonError::into_inner);
                (guard, WaitStatus::Signaled)
            }
            Some(timeout) => {
                let (guard, result) = self
                    .cond
                    .wait_timeout(guard, timeout)
                    .unwrap_or_else(PoisonError::into_inner);
                let status = if result.timed_out() {
                    WaitStatus::TimedOut
                } else {
                    WaitStatus::Signaled
                };
                (guard, status)
            }
        };

        let _guard = raw.acquire_with(guard, me, depth);
        Ok(status)
    }
}
