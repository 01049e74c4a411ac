//!
//! strand-sync - Blocking Synchronization Primitives
//!
//! Provides the locking layer used by the thread lifecycle and the bounded
//! queue. Everything here blocks the calling OS thread; there is no async
//! runtime involved.
//!
//! ## Semaphore
//!
//! - `Semaphore::new(name, permits)` - counting semaphore
//! - `acquire()` / `try_acquire()` / `acquire_timeout(d)` - take a permit
//! - `release()` - return a permit and wake one waiter
//! - `entry()` - scoped permit, released on drop
//!
//! ## Mutex and ReentrantMutex
//!
//! Explicit `lock` / `try_lock` / `unlock` with owner tracking:
//! - `Mutex` - no recursion, relocking by the owner is an error
//! - `ReentrantMutex` - the owner may lock again, depth is counted
//! - `LockEntry` - scoped lock, unlocked on drop
//!
//! Unlocking a lock the caller does not own returns `LockError::NotOwner`
//! and leaves the lock untouched.
//!
//! ## Condition
//!
//! `wait(&lock)` / `timed_wait(&lock, d)` release the lock while blocked and
//! reacquire it (with the same recursion depth) before returning.
//!

mod raw;

pub mod condition;
pub mod mutex;
pub mod semaphore;

pub use condition::{Condition, WaitStatus};
pub use mutex::{LockEntry, LockError, Lockable, Mutex, ReentrantMutex};
pub use semaphore::{Semaphore, SemaphoreEntry, SemaphoreError, TryAcquireError};
