//!
//! The work a `ThreadHandle` runs, and what that work sees of its handle.
//!
//! `Runnable::run` executes on the handle's own OS thread. The lifecycle
//! hooks run on whichever thread drives the transition (the owner for
//! `on_start_requested` / `on_started`, the thread itself for the rest) while
//! the state lock is held. The lock is reentrant, so a hook may query or
//! drive its own handle through the context it is given.
//!

use std::time::Duration;

use crate::handle::Shared;
use crate::state::{RunningState, ThreadState};

pub trait Runnable: Send + Sync + 'static {
    fn run(&self, ctx: &ThreadContext<'_>);

    /// Returning `false` vetoes the start; the handle stays `Created`.
    fn on_start_requested(&self, _ctx: &ThreadContext<'_>) -> bool {
        true
    }

    fn on_started(&self, _ctx: &ThreadContext<'_>) {}

    fn on_running(&self, _ctx: &ThreadContext<'_>) {}

    fn on_termination_requested(&self, _ctx: &ThreadContext<'_>) {}

    fn on_run_method_terminated(&self, _ctx: &ThreadContext<'_>) {}

    fn on_terminated(&self, _ctx: &ThreadContext<'_>) {}

    fn on_ready(&self, _ctx: &ThreadContext<'_>) {}

    fn on_working(&self, _ctx: &ThreadContext<'_>) {}
}

/// Adapter so a plain closure can be a thread body.
pub(crate) struct FnRunnable<F>(pub(crate) F);

impl<F> Runnable for FnRunnable<F>
where
    F: Fn(&ThreadContext<'_>) + Send + Sync + 'static,
{
    fn run(&self, ctx: &ThreadContext<'_>) {
        (self.0)(ctx)
    }
}

/// View of a thread handle from inside its body and hooks.
pub struct ThreadContext<'a> {
    shared: &'a Shared,
}

impl<'a> ThreadContext<'a> {
    pub(crate) fn new(shared: &'a Shared) -> Self {
        Self { shared }
    }

    pub fn name(&self) -> &str {
        self.shared.name()
    }

    pub fn state(&self) -> ThreadState {
        self.shared.state()
    }

    pub fn running_state(&self) -> RunningState {
        self.shared.running_state()
    }

    pub fn termination_requested(&self) -> bool {
        self.shared.state() >= ThreadState::TerminationRequested
    }

    /// Same rules as `ThreadHandle::set_state(TerminationRequested)`.
    pub fn request_termination(&self) -> bool {
        self.shared.set_state(ThreadState::TerminationRequested)
    }

    pub fn set_ready(&self) -> bool {
        self.shared.set_running_state(RunningState::Ready)
    }

    pub fn set_working(&self) -> bool {
        self.shared.set_running_state(RunningState::Working)
    }

    pub fn check_state(&self, target: ThreadState, timeout: Option<Duration>) -> bool {
        self.shared.check_state(target, timeout)
    }

    /// Blocks until termination has been requested or `timeout` elapses.
    /// Returns whether termination was requested.
    pub fn wait_for_termination(&self, timeout: Option<Duration>) -> bool {
        self.shared
            .wait_for(timeout, |shared| {
                (shared.state() >= ThreadState::TerminationRequested).then_some(())
            })
            .is_some()
    }
}
