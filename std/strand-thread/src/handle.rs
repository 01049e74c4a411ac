//!
//! ThreadHandle - an OS thread with an explicit lifecycle
//!
//! All state changes go through `Shared::set_state` under one reentrant
//! state lock. A transition is accepted only if it
//!
//! 1. moves exactly one step forward, or
//! 2. requests termination from any earlier state (collapsing straight to
//!    `Terminated` when the thread never got past `StartRequested`), or
//! 3. resets `Terminated` back to `Created`, or
//! 4. is made by the handle's own thread moving forward to
//!    `TerminatedRunMethod` / `Terminated` after `run` returned.
//!
//! Every accepted transition is logged, reported to observers, broadcast on
//! the state condition and then handed to the matching `Runnable` hook.
//!
//! Readers that must not block (`is_running` and friends) only try the state
//! lock and answer `None` when it is contended.
//!

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use strand_core::ThreadConfig;
use strand_sync::{Condition, ReentrantMutex};

use crate::error::ThreadError;
use crate::runnable::{FnRunnable, Runnable, ThreadContext};
use crate::state::{RunningEvent, RunningState, StateEvent, ThreadState};

/// Number of handle threads currently executing, process-wide.
static LIVE_THREADS: AtomicUsize = AtomicUsize::new(0);

pub fn live_threads() -> usize {
    LIVE_THREADS.load(Ordering::SeqCst)
}

type StateObserver = Arc<dyn Fn(&StateEvent) + Send + Sync>;
type RunningObserver = Arc<dyn Fn(&RunningEvent) + Send + Sync>;

pub(crate) struct Shared {
    name: String,
    parent: ThreadId,
    runnable: Box<dyn Runnable>,
    state_lock: ReentrantMutex,
    state_changed: Condition,
    // written only with `state_lock` held
    state: AtomicU8,
    running: AtomicU8,
    thread_id: Mutex<Option<ThreadId>>,
    alive: AtomicBool,
    state_observers: RwLock<Vec<StateObserver>>,
    running_observers: RwLock<Vec<RunningObserver>>,
}

impl Shared {
    fn new(name: String, runnable: Box<dyn Runnable>) -> Self {
        Self {
            state_lock: ReentrantMutex::new(format!("{}.state", name)),
            name,
            parent: thread::current().id(),
            runnable,
            state_changed: Condition::new(),
            state: AtomicU8::new(ThreadState::Created as u8),
            running: AtomicU8::new(RunningState::Ready as u8),
            thread_id: Mutex::new(None),
            alive: AtomicBool::new(false),
            state_observers: RwLock::new(Vec::new()),
            running_observers: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn state(&self) -> ThreadState {
        ThreadState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn running_state(&self) -> RunningState {
        RunningState::from_u8(self.running.load(Ordering::SeqCst))
    }

    fn thread_id_slot(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.thread_id.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_own_thread(&self) -> bool {
        *self.thread_id_slot() == Some(thread::current().id())
    }

    fn resolve(&self, current: ThreadState, target: ThreadState) -> Option<ThreadState> {
        if current.next() == Some(target) {
            return Some(target);
        }
        if target == ThreadState::TerminationRequested && current < target {
            // never got going, nothing left to wind down
            if current <= ThreadState::StartRequested {
                return Some(ThreadState::Terminated);
            }
            return Some(target);
        }
        if current == ThreadState::Terminated && target == ThreadState::Created {
            return Some(target);
        }
        if matches!(
            target,
            ThreadState::TerminatedRunMethod | ThreadState::Terminated
        ) && target > current
            && self.is_own_thread()
        {
            return Some(target);
        }
        None
    }

    pub(crate) fn set_state(&self, target: ThreadState) -> bool {
        let _entry = self.state_lock.entry();
        let current = self.state();
        let Some(next) = self.resolve(current, target) else {
            tracing::trace!(thread = %self.name, from = %current, to = %target, "state change rejected");
            return false;
        };

        let ctx = ThreadContext::new(self);
        if next == ThreadState::StartRequested {
            if !self.runnable.on_start_requested(&ctx) {
                tracing::debug!(thread = %self.name, "start vetoed");
                return false;
            }
            // the hook itself may have moved the state
            if self.state() != current {
                return false;
            }
        }

        self.state.store(next as u8, Ordering::SeqCst);
        if next == ThreadState::Running {
            self.running.store(RunningState::Ready as u8, Ordering::SeqCst);
        }
        tracing::debug!(thread = %self.name, from = %current, to = %next, "state transition");

        let event = StateEvent {
            thread: self.name.clone(),
            parent: self.parent,
            old: current,
            new: next,
        };
        for observer in snapshot(&self.state_observers) {
            observer(&event);
        }
        self.state_changed.broadcast();

        match next {
            ThreadState::Created | ThreadState::StartRequested | ThreadState::StartInProgress => {}
            ThreadState::Started => self.runnable.on_started(&ctx),
            ThreadState::Running => self.runnable.on_running(&ctx),
            ThreadState::TerminationRequested => self.runnable.on_termination_requested(&ctx),
            ThreadState::TerminatedRunMethod => self.runnable.on_run_method_terminated(&ctx),
            ThreadState::Terminated => {
                if target == ThreadState::TerminationRequested {
                    self.runnable.on_termination_requested(&ctx);
                }
                self.runnable.on_terminated(&ctx);
            }
        }
        true
    }

    pub(crate) fn set_running_state(&self, sub: RunningState) -> bool {
        let _entry = self.state_lock.entry();
        let old = self.running_state();
        if self.state() != ThreadState::Running || old == sub {
            return false;
        }
        self.running.store(sub as u8, Ordering::SeqCst);
        tracing::trace!(thread = %self.name, from = %old, to = %sub, "running state");

        let event = RunningEvent {
            thread: self.name.clone(),
            old,
            new: sub,
        };
        for observer in snapshot(&self.running_observers) {
            observer(&event);
        }
        self.state_changed.broadcast();

        let ctx = ThreadContext::new(self);
        match sub {
            RunningState::Ready => self.runnable.on_ready(&ctx),
            RunningState::Working => self.runnable.on_working(&ctx),
        }
        true
    }

    /// Waits on the state condition until `settled` produces a value.
    /// `None` means the timeout elapsed first; `timeout: None` waits forever.
    pub(crate) fn wait_for<R>(
        &self,
        timeout: Option<Duration>,
        mut settled: impl FnMut(&Self) -> Option<R>,
    ) -> Option<R> {
        let _entry = self.state_lock.entry();
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        loop {
            if let Some(result) = settled(self) {
                return Some(result);
            }
            let waited = match (timeout, deadline) {
                (None, _) | (Some(_), None) => self.state_changed.wait(&self.state_lock),
                (Some(_), Some(deadline)) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    self.state_changed
                        .timed_wait(&self.state_lock, deadline - now)
                        .map(|_| ())
                }
            };
            if let Err(err) = waited {
                tracing::error!(thread = %self.name, %err, "waiting for state change failed");
                return None;
            }
        }
    }

    pub(crate) fn check_state(&self, target: ThreadState, timeout: Option<Duration>) -> bool {
        self.wait_for(timeout, |shared| {
            let current = shared.state();
            (current >= target).then_some(current == target)
        })
        .unwrap_or(false)
    }

    fn check_running_state(&self, sub: RunningState, timeout: Option<Duration>) -> bool {
        self.wait_for(timeout, |shared| match shared.state() {
            ThreadState::Running if shared.running_state() == sub => Some(true),
            state if state > ThreadState::Running => Some(false),
            _ => None,
        })
        .unwrap_or(false)
    }

    /// Non-blocking read of the lifecycle; `None` if the state lock is busy.
    fn try_read(&self, read: impl FnOnce(ThreadState, RunningState) -> bool) -> Option<bool> {
        let _entry = self.state_lock.try_entry()?;
        if !self.alive.load(Ordering::SeqCst) {
            return Some(false);
        }
        Some(read(self.state(), self.running_state()))
    }
}

fn snapshot<O: Clone>(observers: &RwLock<Vec<O>>) -> Vec<O> {
    observers
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Body of every spawned handle thread.
fn thread_main(shared: Arc<Shared>) {
    *shared.thread_id_slot() = Some(thread::current().id());

    if shared.check_state(ThreadState::Started, None) {
        // counted before `Running` becomes visible to waiters
        LIVE_THREADS.fetch_add(1, Ordering::SeqCst);
        if shared.set_state(ThreadState::Running) {
            let ctx = ThreadContext::new(&shared);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| shared.runnable.run(&ctx)));
            if outcome.is_err() {
                tracing::error!(thread = %shared.name, "run method panicked");
            }
        } else {
            tracing::debug!(thread = %shared.name, "terminated before running");
        }
        LIVE_THREADS.fetch_sub(1, Ordering::SeqCst);
    } else {
        tracing::debug!(thread = %shared.name, "terminated before running");
    }

    let _entry = shared.state_lock.entry();
    shared.set_state(ThreadState::TerminatedRunMethod);
    shared.set_state(ThreadState::Terminated);
    shared.alive.store(false, Ordering::SeqCst);
    *shared.thread_id_slot() = None;
}

/// Owner side of a lifecycle-managed OS thread.
///
/// Dropping the handle requests termination and waits for it within the
/// configured bounds. A thread that refuses to stop is logged and detached.
pub struct ThreadHandle {
    shared: Arc<Shared>,
    join: Mutex<Option<JoinHandle<()>>>,
    config: ThreadConfig,
}

impl ThreadHandle {
    pub fn new<R: Runnable>(name: impl Into<String>, runnable: R) -> Self {
        Self::with_config(name, runnable, &ThreadConfig::default())
    }

    pub fn with_config<R: Runnable>(
        name: impl Into<String>,
        runnable: R,
        config: &ThreadConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared::new(name.into(), Box::new(runnable))),
            join: Mutex::new(None),
            config: config.clone(),
        }
    }

    /// Handle whose body is a closure and whose hooks are all no-ops.
    pub fn from_fn<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&ThreadContext<'_>) + Send + Sync + 'static,
    {
        Self::new(name, FnRunnable(body))
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn parent_id(&self) -> ThreadId {
        self.shared.parent
    }

    /// OS thread id, only while the thread is alive.
    pub fn thread_id(&self) -> Option<ThreadId> {
        *self.shared.thread_id_slot()
    }

    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ThreadState {
        let _entry = self.shared.state_lock.entry();
        self.shared.state()
    }

    pub fn try_state(&self) -> Option<ThreadState> {
        let _entry = self.shared.state_lock.try_entry()?;
        Some(self.shared.state())
    }

    pub fn running_state(&self) -> RunningState {
        self.shared.running_state()
    }

    pub fn set_state(&self, target: ThreadState) -> bool {
        self.shared.set_state(target)
    }

    /// Waits until the state reaches `target`. Returns `false` on timeout or
    /// if the state has already moved past `target`.
    pub fn check_state(&self, target: ThreadState, timeout: Option<Duration>) -> bool {
        self.shared.check_state(target, timeout)
    }

    pub fn check_running_state(&self, sub: RunningState, timeout: Option<Duration>) -> bool {
        self.shared.check_running_state(sub, timeout)
    }

    pub fn set_ready(&self) -> bool {
        self.shared.set_running_state(RunningState::Ready)
    }

    pub fn set_working(&self) -> bool {
        self.shared.set_running_state(RunningState::Working)
    }

    pub fn is_running(&self) -> Option<bool> {
        self.shared.try_read(|state, _| state == ThreadState::Running)
    }

    pub fn is_ready(&self) -> Option<bool> {
        self.shared
            .try_read(|state, sub| state == ThreadState::Running && sub == RunningState::Ready)
    }

    pub fn is_working(&self) -> Option<bool> {
        self.shared
            .try_read(|state, sub| state == ThreadState::Running && sub == RunningState::Working)
    }

    pub fn subscribe<F>(&self, observer: F)
    where
        F: Fn(&StateEvent) + Send + Sync + 'static,
    {
        self.shared
            .state_observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(observer));
    }

    pub fn subscribe_running<F>(&self, observer: F)
    where
        F: Fn(&RunningEvent) + Send + Sync + 'static,
    {
        self.shared
            .running_observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(observer));
    }

    fn join_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.join.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Joins the OS thread of a previous run, if it already reached
    /// `Terminated`.
    fn reap(&self) {
        if self.shared.state() != ThreadState::Terminated {
            return;
        }
        let finished = self.join_slot().take();
        if let Some(join) = finished {
            if join.join().is_err() {
                tracing::error!(thread = %self.shared.name, "previous run ended in a panic");
            }
        }
    }

    pub fn start(&self) -> Result<(), ThreadError> {
        self.reap();

        let shared = &self.shared;
        let _entry = shared.state_lock.entry();
        let current = shared.state();
        if current > ThreadState::Created && current < ThreadState::Terminated {
            return Err(ThreadError::AlreadyRunning {
                name: shared.name.clone(),
                state: current,
            });
        }
        if current == ThreadState::Terminated {
            shared.set_state(ThreadState::Created);
        }
        if !shared.set_state(ThreadState::StartRequested) {
            return Err(ThreadError::StartVetoed {
                name: shared.name.clone(),
            });
        }

        shared.alive.store(true, Ordering::SeqCst);
        let body = Arc::clone(shared);
        let spawned = thread::Builder::new()
            .name(shared.name.clone())
            .spawn(move || thread_main(body));
        match spawned {
            Ok(join) => *self.join_slot() = Some(join),
            Err(source) => {
                shared.alive.store(false, Ordering::SeqCst);
                shared.set_state(ThreadState::TerminationRequested);
                tracing::error!(thread = %shared.name, %source, "failed to spawn thread");
                return Err(ThreadError::Spawn {
                    name: shared.name.clone(),
                    source,
                });
            }
        }

        // a hook may already have requested termination, the thread copes
        shared.set_state(ThreadState::StartInProgress);
        shared.set_state(ThreadState::Started);
        Ok(())
    }

    /// Requests termination and waits up to `timeout` (forever for `None`)
    /// for the thread to reach `Terminated`. Returns whether it did.
    pub fn terminate(&self, timeout: Option<Duration>) -> bool {
        self.shared.set_state(ThreadState::TerminationRequested);
        if self.shared.is_own_thread() {
            // the run method has to return before this thread can finish
            return self.shared.state() == ThreadState::Terminated;
        }
        self.shared.check_state(ThreadState::Terminated, timeout)
    }
}

impl std::fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadHandle")
            .field("name", &self.shared.name)
            .field("state", &self.shared.state())
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl Drop for ThreadHandle {
    fn drop(&mut self) {
        let shared = Arc::clone(&self.shared);
        if shared.state() != ThreadState::Terminated
            && !self.terminate(Some(self.config.termination_timeout()))
        {
            tracing::warn!(
                thread = %shared.name,
                state = %shared.state(),
                "thread did not terminate within {:?}",
                self.config.termination_timeout()
            );
        }

        let mut retries = 0;
        while retries < self.config.drop_retries
            && (shared.alive.load(Ordering::SeqCst) || shared.state_lock.try_entry().is_none())
        {
            thread::sleep(self.config.drop_retry_interval());
            retries += 1;
        }

        let join = self.join_slot().take();
        if shared.alive.load(Ordering::SeqCst) {
            tracing::error!(
                thread = %shared.name,
                state = %shared.state(),
                "destroying handle of a thread that is still alive, detaching it"
            );
            return;
        }
        if let Some(join) = join {
            if join.thread().id() != thread::current().id() && join.join().is_err() {
                tracing::error!(thread = %shared.name, "thread ended in a panic");
            }
        }
    }
}
