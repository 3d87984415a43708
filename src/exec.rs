use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error};

/// Work that must run on the UI thread. Errors are handed back to the event
/// loop, which shows them in an error popup.
pub type UiTask = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// Creates the execution primitives: the cloneable submission side and the
/// queue owned by the UI thread.
pub fn channel() -> (Executor, UiQueue) {
    let (ui_tx, ui_rx) = mpsc::channel();
    let executor = Executor {
        ui_tx,
        busy: Arc::new(AtomicUsize::new(0)),
        worker_seq: Arc::new(AtomicUsize::new(0)),
    };
    (executor, UiQueue { rx: ui_rx })
}

#[derive(Clone)]
pub struct Executor {
    ui_tx: Sender<UiTask>,
    busy: Arc<AtomicUsize>,
    worker_seq: Arc<AtomicUsize>,
}

impl Executor {
    /// Runs `f` on a fresh background thread and returns immediately. The
    /// thread counts as busy until `f` returns or pauses its [`Task`].
    pub fn on_worker<F>(&self, f: F)
    where
        F: FnOnce(Task) + Send + 'static,
    {
        let task = Task::start(self.busy.clone());
        self.spawn("worker", move || f(task));
    }

    /// Runs `f` on a background thread that is not tracked as busy. Used for
    /// long-lived loops such as tickers and pollers.
    pub fn on_background<F>(&self, name: &str, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn(name, f);
    }

    /// Queues `f` for the UI thread. Tasks from one submitter run in
    /// submission order, each exactly once.
    pub fn on_ui_thread<F>(&self, f: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        if self.ui_tx.send(Box::new(f)).is_err() {
            debug!("ui queue closed; dropping task");
        }
    }

    pub fn is_idle(&self) -> bool {
        self.busy.load(Ordering::SeqCst) == 0
    }

    pub fn busy_count(&self) -> usize {
        self.busy.load(Ordering::SeqCst)
    }

    fn spawn<F>(&self, name: &str, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.worker_seq.fetch_add(1, Ordering::Relaxed);
        let spawned = thread::Builder::new()
            .name(format!("{name}-{id}"))
            .spawn(f);
        if let Err(err) = spawned {
            // The closure (and any guards it owns) is dropped here, so joins
            // waiting on it are still released.
            error!(error = %err, "failed to spawn {name} thread");
        }
    }
}

/// Busy marker for one unit of background work.
#[derive(Debug)]
pub struct Task {
    busy: Arc<AtomicUsize>,
    paused: AtomicBool,
}

impl Task {
    fn start(busy: Arc<AtomicUsize>) -> Self {
        busy.fetch_add(1, Ordering::SeqCst);
        Self {
            busy,
            paused: AtomicBool::new(false),
        }
    }

    /// Marks the task as not busy, e.g. while the terminal is handed to a
    /// subprocess. Pausing twice is a no-op.
    pub fn pause(&self) {
        if !self.paused.swap(true, Ordering::SeqCst) {
            self.busy.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::SeqCst) {
            self.busy.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        if !*self.paused.get_mut() {
            self.busy.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[derive(Debug, Default)]
pub struct UiRun {
    pub executed: usize,
    pub errors: Vec<anyhow::Error>,
}

pub struct UiQueue {
    rx: Receiver<UiTask>,
}

impl UiQueue {
    /// Runs up to `limit` queued tasks on the calling thread without blocking.
    pub fn run_pending(&self, limit: usize) -> UiRun {
        let mut run = UiRun::default();
        while run.executed < limit {
            let Ok(task) = self.rx.try_recv() else {
                break;
            };
            Self::execute(task, &mut run);
        }
        run
    }

    /// Blocks up to `timeout` for the first task, then drains like
    /// [`UiQueue::run_pending`].
    pub fn wait_and_run(&self, timeout: Duration, limit: usize) -> UiRun {
        let mut run = UiRun::default();
        if limit == 0 {
            return run;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(task) => Self::execute(task, &mut run),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return run,
        }
        let rest = self.run_pending(limit - 1);
        run.executed += rest.executed;
        run.errors.extend(rest.errors);
        run
    }

    fn execute(task: UiTask, run: &mut UiRun) {
        run.executed += 1;
        if let Err(err) = task() {
            error!(error = %format!("{err:#}"), "ui task failed");
            run.errors.push(err);
        }
    }
}

/// Counts outstanding work. Each [`WaitGroup::add`] returns a guard that
/// releases its slot when dropped, including during unwinding.
#[derive(Clone, Default)]
pub struct WaitGroup {
    inner: Arc<(Mutex<usize>, Condvar)>,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self) -> WaitGuard {
        let (count, _) = &*self.inner;
        *count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        WaitGuard {
            inner: self.inner.clone(),
        }
    }

    pub fn wait(&self) {
        let (count, cvar) = &*self.inner;
        let mut pending = count.lock().unwrap_or_else(PoisonError::into_inner);
        while *pending > 0 {
            pending = cvar.wait(pending).unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn pending(&self) -> usize {
        let (count, _) = &*self.inner;
        *count.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct WaitGuard {
    inner: Arc<(Mutex<usize>, Condvar)>,
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        let (count, cvar) = &*self.inner;
        let mut pending = count.lock().unwrap_or_else(PoisonError::into_inner);
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            cvar.notify_all();
        }
    }
}

/// Shared cancellation flag. Cancelling does not interrupt running work; it
/// lets pending callbacks and ticking loops notice they are no longer wanted.
#[derive(Clone, Default, Debug)]
pub struct CancellationToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (cancelled, cvar) = &*self.inner;
        *cancelled.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (cancelled, _) = &*self.inner;
        *cancelled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleeps for `interval` (waking early on cancel) and then runs `tick`
    /// unless cancelled. `tick` runs while the flag is held, so once
    /// [`CancellationToken::cancel`] returns no further tick can start.
    /// Returns `false` once cancelled.
    pub fn tick_after(&self, interval: Duration, tick: impl FnOnce()) -> bool {
        let (cancelled, cvar) = &*self.inner;
        let guard = cancelled.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = cvar
            .wait_timeout_while(guard, interval, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        if *guard {
            return false;
        }
        tick();
        true
    }

    pub fn same_as(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Spawns a loop that calls `tick` every `interval` until `token` is
/// cancelled.
pub fn spawn_ticker<F>(executor: &Executor, name: &str, interval: Duration, token: CancellationToken, tick: F)
where
    F: Fn() + Send + 'static,
{
    executor.on_background(name, move || while token.tick_after(interval, &tick) {});
}
