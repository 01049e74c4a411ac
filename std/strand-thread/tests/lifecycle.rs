use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use strand_core::ThreadConfig;
use strand_thread::{
    Runnable, RunningEvent, RunningState, StateEvent, ThreadContext, ThreadError, ThreadHandle,
    ThreadState,
};

const LONG: Option<Duration> = Some(Duration::from_secs(5));

#[derive(Default)]
struct Recorder {
    hooks: Arc<Mutex<Vec<&'static str>>>,
    veto: bool,
    stop_on_started: bool,
    runs: Arc<AtomicUsize>,
}

impl Recorder {
    fn push(&self, hook: &'static str) {
        self.hooks.lock().unwrap().push(hook);
    }
}

impl Runnable for Recorder {
    fn run(&self, ctx: &ThreadContext<'_>) {
        self.push("run");
        self.runs.fetch_add(1, Ordering::SeqCst);
        ctx.wait_for_termination(None);
    }

    fn on_start_requested(&self, _ctx: &ThreadContext<'_>) -> bool {
        self.push("start_requested");
        !self.veto
    }

    fn on_started(&self, ctx: &ThreadContext<'_>) {
        self.push("started");
        if self.stop_on_started {
            assert!(ctx.request_termination());
        }
    }

    fn on_running(&self, _ctx: &ThreadContext<'_>) {
        self.push("running");
    }

    fn on_termination_requested(&self, _ctx: &ThreadContext<'_>) {
        self.push("termination_requested");
    }

    fn on_run_method_terminated(&self, _ctx: &ThreadContext<'_>) {
        self.push("run_method_terminated");
    }

    fn on_terminated(&self, _ctx: &ThreadContext<'_>) {
        self.push("terminated");
    }

    fn on_ready(&self, _ctx: &ThreadContext<'_>) {
        self.push("ready");
    }

    fn on_working(&self, _ctx: &ThreadContext<'_>) {
        self.push("working");
    }
}

fn quick_config() -> ThreadConfig {
    ThreadConfig {
        termination_timeout_ms: 50,
        drop_retries: 2,
        drop_retry_interval_ms: 5,
    }
}

#[test]
fn test_hooks_follow_the_lifecycle() {
    let hooks = Arc::new(Mutex::new(Vec::new()));
    let handle = ThreadHandle::new(
        "hooks",
        Recorder {
            hooks: Arc::clone(&hooks),
            ..Default::default()
        },
    );

    handle.start().unwrap();
    assert!(handle.check_state(ThreadState::Running, LONG));
    assert!(handle.set_working());
    assert!(handle.set_ready());
    assert!(handle.terminate(LONG));

    let hooks = hooks.lock().unwrap().clone();
    let order = |name: &str| hooks.iter().position(|h| *h == name).unwrap();
    assert!(order("start_requested") < order("started"));
    assert!(order("started") < order("running"));
    assert!(order("running") < order("working"));
    assert!(order("working") < order("ready"));
    assert!(order("ready") < order("termination_requested"));
    assert!(order("termination_requested") < order("run_method_terminated"));
    assert!(order("run_method_terminated") < order("terminated"));
    assert!(hooks.contains(&"run"));
}

#[test]
fn test_vetoed_start_stays_created() {
    let runs = Arc::new(AtomicUsize::new(0));
    let handle = ThreadHandle::new(
        "vetoed",
        Recorder {
            veto: true,
            runs: Arc::clone(&runs),
            ..Default::default()
        },
    );

    assert!(matches!(handle.start(), Err(ThreadError::StartVetoed { .. })));
    assert_eq!(handle.state(), ThreadState::Created);
    assert!(!handle.is_alive());
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[test]
fn test_termination_requested_before_running() {
    let hooks = Arc::new(Mutex::new(Vec::new()));
    let runs = Arc::new(AtomicUsize::new(0));
    let handle = ThreadHandle::new(
        "early-stop",
        Recorder {
            hooks: Arc::clone(&hooks),
            stop_on_started: true,
            runs: Arc::clone(&runs),
            ..Default::default()
        },
    );

    handle.start().unwrap();
    assert!(handle.terminate(LONG));
    assert_eq!(handle.state(), ThreadState::Terminated);
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(!hooks.lock().unwrap().contains(&"running"));
    assert!(!handle.check_state(ThreadState::Running, Some(Duration::ZERO)));
}

#[test]
fn test_observers_see_every_transition() {
    let events: Arc<Mutex<Vec<StateEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let running: Arc<Mutex<Vec<RunningEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let handle = ThreadHandle::from_fn("observed", |ctx| {
        assert!(ctx.set_working());
        ctx.wait_for_termination(None);
    });
    {
        let events = Arc::clone(&events);
        handle.subscribe(move |event| events.lock().unwrap().push(event.clone()));
        let running = Arc::clone(&running);
        handle.subscribe_running(move |event| running.lock().unwrap().push(event.clone()));
    }

    handle.start().unwrap();
    assert!(handle.check_running_state(RunningState::Working, LONG));
    assert!(handle.terminate(LONG));

    let events = events.lock().unwrap();
    let path: Vec<ThreadState> = events.iter().map(|e| e.new).collect();
    assert_eq!(path, ThreadState::ALL[1..].to_vec());
    for pair in events.windows(2) {
        assert_eq!(pair[0].new, pair[1].old);
    }
    assert!(events.iter().all(|e| e.thread == "observed"));
    assert!(events.iter().all(|e| e.parent == thread::current().id()));

    let running = running.lock().unwrap();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].old, RunningState::Ready);
    assert_eq!(running[0].new, RunningState::Working);
}

#[test]
fn test_run_returning_finishes_the_lifecycle() {
    let seen = Arc::new(AtomicBool::new(false));
    let handle = {
        let seen = Arc::clone(&seen);
        ThreadHandle::from_fn("one-shot", move |ctx| {
            let as_expected = ctx.name() == "one-shot"
                && ctx.state() == ThreadState::Running
                && !ctx.termination_requested();
            seen.store(as_expected, Ordering::SeqCst);
        })
    };

    handle.start().unwrap();
    assert!(handle.check_state(ThreadState::Terminated, LONG));
    assert!(seen.load(Ordering::SeqCst));
    assert!(!handle.is_alive());
    assert_eq!(handle.thread_id(), None);
}

#[test]
fn test_panicking_run_still_terminates() {
    let handle = ThreadHandle::from_fn("panics", |_| panic!("body failed"));
    handle.start().unwrap();
    assert!(handle.check_state(ThreadState::Terminated, LONG));
}

#[test]
fn test_restart_after_termination() {
    let runs = Arc::new(AtomicUsize::new(0));
    let handle = ThreadHandle::new(
        "reused",
        Recorder {
            runs: Arc::clone(&runs),
            ..Default::default()
        },
    );

    for round in 1..=3 {
        handle.start().unwrap();
        assert!(handle.check_state(ThreadState::Running, LONG));
        assert!(handle.terminate(LONG));
        assert_eq!(runs.load(Ordering::SeqCst), round);
    }
}

#[test]
fn test_drop_terminates_running_thread() {
    let finished = Arc::new(AtomicBool::new(false));
    let handle = {
        let finished = Arc::clone(&finished);
        ThreadHandle::from_fn("dropped", move |ctx| {
            ctx.wait_for_termination(None);
            finished.store(true, Ordering::SeqCst);
        })
    };
    handle.start().unwrap();
    assert!(handle.check_state(ThreadState::Running, LONG));

    drop(handle);
    assert!(finished.load(Ordering::SeqCst));
}

#[test]
fn test_drop_detaches_stubborn_thread() {
    let finished = Arc::new(AtomicBool::new(false));
    let handle = {
        let finished = Arc::clone(&finished);
        ThreadHandle::with_config(
            "stubborn",
            StubbornRunnable { finished },
            &quick_config(),
        )
    };
    handle.start().unwrap();
    assert!(handle.check_state(ThreadState::Running, LONG));

    let start = Instant::now();
    drop(handle);
    assert!(start.elapsed() < Duration::from_millis(400));
    assert!(!finished.load(Ordering::SeqCst));

    let deadline = Instant::now() + Duration::from_secs(5);
    while !finished.load(Ordering::SeqCst) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(finished.load(Ordering::SeqCst));
}

struct StubbornRunnable {
    finished: Arc<AtomicBool>,
}

impl Runnable for StubbornRunnable {
    fn run(&self, _ctx: &ThreadContext<'_>) {
        thread::sleep(Duration::from_millis(500));
        self.finished.store(true, Ordering::SeqCst);
    }
}

#[test]
fn test_status_queries_follow_the_lifecycle() {
    let handle = ThreadHandle::from_fn("status", |ctx| {
        ctx.wait_for_termination(None);
    });
    assert_eq!(handle.is_running(), Some(false));

    handle.start().unwrap();
    assert!(handle.check_state(ThreadState::Running, LONG));
    assert_ne!(handle.is_running(), Some(false));
    assert_ne!(handle.is_working(), Some(true));
    assert!(handle.terminate(LONG));
    assert_eq!(handle.is_ready(), Some(false));
}

#[test]
fn test_status_queries_report_unknown_while_state_lock_is_held() {
    let handle = Arc::new(ThreadHandle::from_fn("contended", |ctx| {
        ctx.wait_for_termination(None);
    }));

    // parks inside `set_working`, which holds the state lock across observers
    let (entered_tx, entered_rx) = mpsc::channel();
    let (resume_tx, resume_rx) = mpsc::channel::<()>();
    let resume_rx = Mutex::new(resume_rx);
    handle.subscribe_running(move |event: &RunningEvent| {
        if event.new == RunningState::Working {
            entered_tx.send(()).unwrap();
            resume_rx.lock().unwrap().recv().unwrap();
        }
    });

    handle.start().unwrap();
    assert!(handle.check_state(ThreadState::Running, LONG));
    let holder = {
        let handle = Arc::clone(&handle);
        thread::spawn(move || handle.set_working())
    };
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let started = Instant::now();
    assert_eq!(handle.is_running(), None);
    assert_eq!(handle.is_ready(), None);
    assert_eq!(handle.is_working(), None);
    assert!(started.elapsed() < Duration::from_secs(1));

    resume_tx.send(()).unwrap();
    assert!(holder.join().unwrap());
    assert_eq!(handle.is_working(), Some(true));
    assert!(handle.terminate(LONG));
}
