//!
//! Raw owner-tracking lock shared by `Mutex` and `ReentrantMutex`.
//!
//! The "real" lock is the `owner` slot. The std mutex only guards the
//! ownership record for the few instructions needed to read or change it,
//! and `released` is signalled whenever the slot becomes free. `Condition`
//! relies on holding the std mutex across release-and-block.
//!

use std::sync::{Condvar, MutexGuard, PoisonError};
use std::thread::ThreadId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ownership {
    pub owner: Option<ThreadId>,
    pub depth: usize,
}

impl Ownership {
    pub fn is_held_by(&self, id: ThreadId) -> bool {
        self.owner == Some(id)
    }
}

#[derive(Debug, Default)]
pub struct RawLock {
    state: std::sync::Mutex<Ownership>,
    released: Condvar,
}

impl RawLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// The ownership record is always left consistent, so poisoning is
    /// recovered from.
    pub fn state(&self) -> MutexGuard<'_, Ownership> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits until the slot is free, then claims it for `me` at `depth`.
    pub fn acquire_with<'a>(
        &'a self,
        mut guard: MutexGuard<'a, Ownership>,
        me: ThreadId,
        depth: usize,
    ) -> MutexGuard<'a, Ownership> {
        while guard.owner.is_some() {
            guard = self
                .released
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
        guard.owner = Some(me);
        guard.depth = depth;
        guard
    }

    pub fn release(&self, guard: &mut Ownership) {
        guard.owner = None;
        guard.depth = 0;
        self.released.notify_one();
    }
}
