//!
//! strand-thread - Lifecycle-Managed Threads
//!
//! Wraps a dedicated OS thread in an explicit state machine.
//!
//! ## Lifecycle
//!
//! `Created -> StartRequested -> StartInProgress -> Started -> Running ->
//! TerminationRequested -> TerminatedRunMethod -> Terminated`, plus the
//! `Terminated -> Created` reset so a handle can be started again.
//!
//! - `ThreadHandle::new(name, runnable)` / `from_fn(name, closure)`
//! - `start()` - spawn the thread and walk it up to `Started`
//! - `terminate(timeout)` - request termination and wait for `Terminated`
//! - `check_state(state, timeout)` - wait for an exact milestone
//! - `set_ready()` / `set_working()` - running sub-state
//! - `is_running()` / `is_ready()` / `is_working()` - non-blocking, `None` when contended
//! - `subscribe(observer)` - receive a `StateEvent` for every transition
//!
//! ## Runnable
//!
//! The thread body implements `Runnable::run` and may override one hook per
//! lifecycle step. Hooks run with the state lock held and receive the same
//! `ThreadContext` as the body.
//!

pub mod error;
pub mod handle;
pub mod runnable;
pub mod state;

pub use error::ThreadError;
pub use handle::{live_threads, ThreadHandle};
pub use runnable::{Runnable, ThreadContext};
pub use state::{RunningEvent, RunningState, StateEvent, ThreadState};
