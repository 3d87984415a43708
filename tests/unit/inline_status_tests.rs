use super::*;
use crate::exec::{UiQueue, channel};
use std::thread;
use std::time::Instant;

#[derive(Default)]
struct CountingRenderer {
    renders: Mutex<HashMap<ViewName, usize>>,
}

impl CountingRenderer {
    fn count(&self, view: ViewName) -> usize {
        self.renders.lock().expect("renders").get(&view).copied().unwrap_or(0)
    }
}

impl ContextRenderer for CountingRenderer {
    fn render_context(&self, view: ViewName) {
        *self.renders.lock().expect("renders").entry(view).or_default() += 1;
    }
}

struct Harness {
    executor: Executor,
    queue: UiQueue,
    renderer: Arc<CountingRenderer>,
    tracker: InlineStatusTracker,
}

fn harness() -> Harness {
    let (executor, queue) = channel();
    let renderer = Arc::new(CountingRenderer::default());
    let tracker = InlineStatusTracker::new(
        executor.clone(),
        renderer.clone(),
        ItemOperations::new(),
        Duration::from_millis(5),
    );
    Harness {
        executor,
        queue,
        renderer,
        tracker,
    }
}

fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

fn opts(urn: &str, operation: ItemOperation) -> InlineStatusOpts {
    InlineStatusOpts {
        item_urn: urn.to_string(),
        operation,
        context: ViewName::Branches,
    }
}

#[test]
fn overlapping_operations_share_one_ticker_and_stop_rendering_after_release() {
    let h = harness();
    let gate = CancellationToken::new();
    for (urn, operation) in [("branch-main", ItemOperation::Pushing), ("branch-dev", ItemOperation::Pulling)] {
        let gate = gate.clone();
        h.tracker.with_inline_status(opts(urn, operation), move |_task| {
            while !gate.is_cancelled() {
                thread::sleep(Duration::from_millis(2));
            }
            Ok(())
        });
    }

    assert!(wait_until(|| h.tracker.ref_count(ViewName::Branches) == 2));
    assert_eq!(h.tracker.active_tickers(), 1);
    assert_eq!(h.tracker.operations().get("branch-main"), ItemOperation::Pushing);
    assert_eq!(h.tracker.operations().get("branch-dev"), ItemOperation::Pulling);

    assert!(wait_until(|| {
        h.queue.run_pending(usize::MAX);
        h.renderer.count(ViewName::Branches) >= 2
    }));

    gate.cancel();
    assert!(wait_until(|| h.executor.is_idle()));
    assert_eq!(h.tracker.ref_count(ViewName::Branches), 0);
    assert_eq!(h.tracker.active_tickers(), 0);
    assert!(h.tracker.inner.registry.lock().expect("registry").is_empty());
    assert_eq!(h.tracker.operations().get("branch-main"), ItemOperation::None);

    h.queue.run_pending(usize::MAX);
    let settled = h.renderer.count(ViewName::Branches);
    thread::sleep(Duration::from_millis(40));
    let run = h.queue.run_pending(usize::MAX);
    assert_eq!(run.executed, 0);
    assert_eq!(h.renderer.count(ViewName::Branches), settled);
}

#[test]
fn finished_operation_leaves_no_registry_entry() {
    let h = harness();
    h.tracker
        .with_inline_status(opts("branch-main", ItemOperation::Fetching), |_task| Ok(()));

    assert!(wait_until(|| h.executor.is_idle()));
    assert!(h.tracker.inner.registry.lock().expect("registry").is_empty());

    h.tracker
        .with_inline_status(opts("branch-main", ItemOperation::Fetching), |_task| Ok(()));
    assert!(wait_until(|| h.executor.is_idle()));
    assert!(h.tracker.inner.registry.lock().expect("registry").is_empty());
}

#[test]
fn pause_and_resume_are_idempotent() {
    let h = harness();
    let observed = Arc::new(Mutex::new(Vec::new()));
    let tracker = h.tracker.clone();
    let executor = h.executor.clone();
    let seen = observed.clone();
    h.tracker.with_inline_status(opts("branch-main", ItemOperation::Pushing), move |task| {
        let mut seen = seen.lock().expect("observed");
        task.pause();
        task.pause();
        seen.push((tracker.ref_count(ViewName::Branches), executor.is_idle(), task.is_paused()));
        task.resume();
        task.resume();
        seen.push((tracker.ref_count(ViewName::Branches), executor.is_idle(), task.is_paused()));
        Ok(())
    });

    assert!(wait_until(|| h.executor.is_idle() && observed.lock().expect("observed").len() == 2));
    assert_eq!(
        *observed.lock().expect("observed"),
        vec![(0, true, true), (1, false, false)]
    );
    assert_eq!(h.tracker.ref_count(ViewName::Branches), 0);
    assert_eq!(h.tracker.active_tickers(), 0);
}

#[test]
fn finishing_while_paused_does_not_release_twice() {
    let h = harness();
    let gate = CancellationToken::new();
    let held = gate.clone();
    h.tracker.with_inline_status(opts("branch-dev", ItemOperation::Pulling), move |_task| {
        while !held.is_cancelled() {
            thread::sleep(Duration::from_millis(2));
        }
        Ok(())
    });
    h.tracker.with_inline_status(opts("branch-main", ItemOperation::Pushing), |task| {
        task.pause();
        Ok(())
    });

    assert!(wait_until(|| {
        h.executor.busy_count() == 1 && h.tracker.ref_count(ViewName::Branches) == 1
    }));
    // Let the paused operation run to completion.
    thread::sleep(Duration::from_millis(30));
    assert_eq!(h.tracker.ref_count(ViewName::Branches), 1);
    assert_eq!(h.tracker.active_tickers(), 1);
    gate.cancel();
    assert!(wait_until(|| h.executor.is_idle()));
    assert_eq!(h.tracker.ref_count(ViewName::Branches), 0);
}

#[test]
fn operation_errors_reach_the_ui_queue() {
    let h = harness();
    h.tracker.with_inline_status(opts("branch-main", ItemOperation::Pushing), |_task| {
        Err(anyhow::anyhow!("push rejected"))
    });
    assert!(wait_until(|| h.executor.is_idle()));
    let run = h.queue.run_pending(usize::MAX);
    assert_eq!(run.errors.len(), 1);
    assert_eq!(run.errors[0].to_string(), "push rejected");
    assert!(h.renderer.count(ViewName::Branches) >= 1);
}
