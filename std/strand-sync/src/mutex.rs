//!
//! Mutex Implementation for strand
//!
//! Two owner-tracking locks with explicit `lock` / `unlock`:
//!
//! - `Mutex` refuses recursion: the owner calling `lock` again gets
//!   `LockError::Recursive` instead of deadlocking itself.
//! - `ReentrantMutex` counts recursion per owner. The real lock is taken on
//!   the first entry and given up when the depth returns to zero.
//!
//! The depth record lives inside the mutex, keyed by the owning thread, so
//! nothing has to be cleaned out of thread-local storage when a thread exits.
//!
//! Usage:
//! ```
//! use strand_sync::{Lockable, ReentrantMutex};
//!
//! let m = ReentrantMutex::new("config");
//! m.lock().unwrap();
//! m.lock().unwrap();
//! assert_eq!(m.depth(), 2);
//! m.unlock().unwrap();
//! m.unlock().unwrap();
//! assert!(m.try_lock());
//! m.unlock().unwrap();
//! ```
//!

use std::marker::PhantomData;
use std::thread::{self, ThreadId};

use thiserror::Error;

use crate::raw::RawLock;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("lock '{name}': calling thread {caller:?} does not hold the lock (owner {owner:?})")]
    NotOwner {
        name: String,
        caller: ThreadId,
        owner: Option<ThreadId>,
    },

    #[error("lock '{name}': thread {caller:?} already holds this non-recursive lock")]
    Recursive { name: String, caller: ThreadId },
}

pub(crate) mod sealed {
    pub trait Sealed {
        fn raw(&self) -> &crate::raw::RawLock;
    }
}

/// Common surface of `Mutex` and `ReentrantMutex`, used by `Condition` and
/// `LockEntry`.
pub trait Lockable: sealed::Sealed {
    fn name(&self) -> &str;
    fn lock(&self) -> Result<(), LockError>;
    fn try_lock(&self) -> bool;
    fn unlock(&self) -> Result<(), LockError>;
    fn is_locked_by_current(&self) -> bool;
}

fn not_owner(name: &str, caller: ThreadId, owner: Option<ThreadId>) -> LockError {
    let err = LockError::NotOwner {
        name: name.to_string(),
        caller,
        owner,
    };
    tracing::error!(lock = name, ?caller, ?owner, "locking error: unlock without holding the lock");
    err
}

/// Non-recursive mutex.
#[derive(Debug)]
pub struct Mutex {
    name: String,
    raw: RawLock,
}

impl Mutex {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            raw: RawLock::new(),
        }
    }

    pub fn entry(&self) -> Result<LockEntry<'_, Self>, LockError> {
        LockEntry::new(self)
    }
}

impl sealed::Sealed for Mutex {
    fn raw(&self) -> &RawLock {
        &self.raw
    }
}

impl Lockable for Mutex {
    fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> Result<(), LockError> {
        let me = thread::current().id();
        let guard = self.raw.state();
        if guard.is_held_by(me) {
            tracing::error!(lock = %self.name, caller = ?me, "recursive lock attempt on non-recursive mutex");
            return Err(LockError::Recursive {
                name: self.name.clone(),
                caller: me,
            });
        }
        let _guard = self.raw.acquire_with(guard, me, 1);
        Ok(())
    }

    fn try_lock(&self) -> bool {
        let me = thread::current().id();
        let mut guard = self.raw.state();
        if guard.owner.is_some() {
            return false;
        }
        guard.owner = Some(me);
        guard.depth = 1;
        true
    }

    fn unlock(&self) -> Result<(), LockError> {
        let me = thread::current().id();
        let mut guard = self.raw.state();
        if !guard.is_held_by(me) {
            return Err(not_owner(&self.name, me, guard.owner));
        }
        self.raw.release(&mut guard);
        Ok(())
    }

    fn is_locked_by_current(&self) -> bool {
        self.raw.state().is_held_by(thread::current().id())
    }
}

/// Recursive mutex; the owning thread may lock it any number of times and
/// must unlock it the same number of times.
#[derive(Debug)]
pub struct ReentrantMutex {
    name: String,
    raw: RawLock,
}

impl ReentrantMutex {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            raw: RawLock::new(),
        }
    }

    /// Recursion depth of the calling thread, 0 when it is not the owner.
    pub fn depth(&self) -> usize {
        let guard = self.raw.state();
        if guard.is_held_by(thread::current().id()) {
            guard.depth
        } else {
            0
        }
    }

    pub fn entry(&self) -> LockEntry<'_, Self> {
        self.lock_owned();
        LockEntry {
            lock: self,
            _not_send: PhantomData,
        }
    }

    /// Non-blocking variant of `entry`.
    pub fn try_entry(&self) -> Option<LockEntry<'_, Self>> {
        if self.try_lock() {
            Some(LockEntry {
                lock: self,
                _not_send: PhantomData,
            })
        } else {
            None
        }
    }

    fn lock_owned(&self) {
        if self.try_lock() {
            return;
        }
        let guard = self.raw.state();
        let _guard = self.raw.acquire_with(guard, thread::current().id(), 1);
    }
}

impl sealed::Sealed for ReentrantMutex {
    fn raw(&self) -> &RawLock {
        &self.raw
    }
}

impl Lockable for ReentrantMutex {
    fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> Result<(), LockError> {
        self.lock_owned();
        Ok(())
    }

    fn try_lock(&self) -> bool {
        let me = thread::current().id();
        let mut guard = self.raw.state();
        match guard.owner {
            None => {
                guard.owner = Some(me);
                guard.depth = 1;
                true
            }
            Some(owner) if owner == me => {
                guard.depth += 1;
                true
            }
            Some(_) => false,
        }
    }

    fn unlock(&self) -> Result<(), LockError> {
        let me = thread::current().id();
        let mut guard = self.raw.state();
        if !guard.is_held_by(me) {
            return Err(not_owner(&self.name, me, guard.owner));
        }
        guard.depth -= 1;
        if guard.depth == 0 {
            self.raw.release(&mut guard);
        }
        Ok(())
    }

    fn is_locked_by_current(&self) -> bool {
        self.raw.state().is_held_by(thread::current().id())
    }
}

/// Scoped lock: locked on construction, unlocked on drop.
///
/// Not `Send`, since the unlock has to happen on the locking thread.
#[must_use = "the lock is released as soon as the entry is dropped"]
pub struct LockEntry<'a, L: Lockable> {
    lock: &'a L,
    _not_send: PhantomData<*const ()>,
}

impl<'a, L: Lockable> LockEntry<'a, L> {
    pub fn new(lock: &'a L) -> Result<Self, LockError> {
        lock.lock()?;
        Ok(Self {
            lock,
            _not_send: PhantomData,
        })
    }

    pub fn lock(&self) -> &'a L {
        self.lock
    }
}

impl<L: Lockable> Drop for LockEntry<'_, L> {
    fn drop(&mut self) {
        // unlock only fails for non-owners, which an entry never is
        let _ = self.lock.unlock();
    }
}
