//!
//! Queue sides and the pending-caller gate used by the shutdown rendezvous.
//!
//! A `put` / `get` that finds its side open registers with the side's gate,
//! then reads the blocked flag again, and leaves when it returns. `block`
//! sets the flag first and only then counts pending callers under the same
//! gate lock, so a caller is either counted (and released by `block`) or sees
//! the flag and fails fast. Callers arriving after the flag is set fail
//! before registering and do not hold `block` up.
//!

use std::sync::atomic::{AtomicUsize, Ordering};

use strand_sync::{Condition, LockError, Mutex, Semaphore};

use crate::error::QueueError;

/// Which side of a queue an administrative call applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Put,
    Get,
    Both,
}

/// A single side; `Side::Both` expands to both lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lane {
    Put,
    Get,
}

impl Side {
    pub(crate) fn lanes(self) -> &'static [Lane] {
        match self {
            Side::Put => &[Lane::Put],
            Side::Get => &[Lane::Get],
            Side::Both => &[Lane::Put, Lane::Get],
        }
    }
}

impl Lane {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Lane::Put => "put",
            Lane::Get => "get",
        }
    }
}

pub(crate) struct PendingGate {
    lock: Mutex,
    left: Condition,
    // changed only with `lock` held
    pending: AtomicUsize,
}

impl PendingGate {
    pub(crate) fn new(name: String) -> Self {
        Self {
            lock: Mutex::new(name),
            left: Condition::new(),
            pending: AtomicUsize::new(0),
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub(crate) fn enter(&self) -> Result<Pending<'_>, QueueError> {
        let _entry = self.lock.entry().map_err(|err| lock_failure(&err))?;
        self.pending.fetch_add(1, Ordering::SeqCst);
        Ok(Pending { gate: self })
    }

    fn leave(&self) {
        let entry = self.lock.entry();
        if let Err(err) = &entry {
            lock_failure(err);
        }
        self.pending.fetch_sub(1, Ordering::SeqCst);
        self.left.broadcast();
        drop(entry);
    }

    /// Wakes every pending caller by handing out credits on `credits` until
    /// none are left, waiting for one to leave after each credit. Returns the
    /// number of credits handed out; the woken callers give theirs back, so
    /// the caller must take that many back off `credits` afterwards.
    pub(crate) fn release_pending(&self, credits: &Semaphore) -> Result<usize, LockError> {
        let _entry = self.lock.entry()?;
        let mut injected = 0;
        while self.pending() > 0 {
            credits.release();
            injected += 1;
            self.left.wait(&self.lock)?;
        }
        Ok(injected)
    }
}

fn lock_failure(err: &LockError) -> QueueError {
    tracing::error!(%err, "queue gate lock failed");
    QueueError::InternalError
}

/// Registration of one in-flight call; leaves the gate on drop.
pub(crate) struct Pending<'a> {
    gate: &'a PendingGate,
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        self.gate.leave();
    }
}
