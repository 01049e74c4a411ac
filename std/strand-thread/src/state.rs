//!
//! Lifecycle states and the events emitted when they change.
//!

use std::fmt;
use std::thread::ThreadId;

/// Lifecycle of a `ThreadHandle`, in transition order.
///
/// The state only ever moves forward, except for the `Terminated -> Created`
/// reset that allows a handle to be started again.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ThreadState {
    Created = 0,
    StartRequested = 1,
    StartInProgress = 2,
    Started = 3,
    Running = 4,
    TerminationRequested = 5,
    TerminatedRunMethod = 6,
    Terminated = 7,
}

impl ThreadState {
    pub const ALL: [ThreadState; 8] = [
        ThreadState::Created,
        ThreadState::StartRequested,
        ThreadState::StartInProgress,
        ThreadState::Started,
        ThreadState::Running,
        ThreadState::TerminationRequested,
        ThreadState::TerminatedRunMethod,
        ThreadState::Terminated,
    ];

    /// The state directly after this one, `None` for `Terminated`.
    pub fn next(self) -> Option<ThreadState> {
        Self::ALL.get(self as usize + 1).copied()
    }

    pub(crate) fn from_u8(raw: u8) -> ThreadState {
        Self::ALL
            .get(raw as usize)
            .copied()
            .unwrap_or(ThreadState::Terminated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ThreadState::Created => "created",
            ThreadState::StartRequested => "start-requested",
            ThreadState::StartInProgress => "start-in-progress",
            ThreadState::Started => "started",
            ThreadState::Running => "running",
            ThreadState::TerminationRequested => "termination-requested",
            ThreadState::TerminatedRunMethod => "terminated-run-method",
            ThreadState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-state that is only meaningful while the thread is `Running`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunningState {
    Ready = 0,
    Working = 1,
}

impl RunningState {
    pub(crate) fn from_u8(raw: u8) -> RunningState {
        if raw == RunningState::Working as u8 {
            RunningState::Working
        } else {
            RunningState::Ready
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunningState::Ready => "ready",
            RunningState::Working => "working",
        }
    }
}

impl fmt::Display for RunningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateEvent {
    /// Name of the thread whose state changed.
    pub thread: String,
    /// Thread that created the handle.
    pub parent: ThreadId,
    pub old: ThreadState,
    pub new: ThreadState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningEvent {
    pub thread: String,
    pub old: RunningState,
    pub new: RunningState,
}
