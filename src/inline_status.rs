use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use tracing::debug;

use crate::exec::{CancellationToken, Executor, Task, spawn_ticker};
use crate::views::ViewName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ItemOperation {
    #[default]
    None,
    Pushing,
    Pulling,
    FastForwarding,
    Deleting,
    Fetching,
    CheckingOut,
}

impl ItemOperation {
    pub fn label(self) -> &'static str {
        match self {
            ItemOperation::None => "",
            ItemOperation::Pushing => "Pushing",
            ItemOperation::Pulling => "Pulling",
            ItemOperation::FastForwarding => "Fast-forwarding",
            ItemOperation::Deleting => "Deleting",
            ItemOperation::Fetching => "Fetching",
            ItemOperation::CheckingOut => "Checking out",
        }
    }
}

/// Operation currently running against each item, keyed by item URN.
#[derive(Debug, Clone, Default)]
pub struct ItemOperations {
    inner: Arc<Mutex<HashMap<String, ItemOperation>>>,
}

impl ItemOperations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, urn: &str, operation: ItemOperation) {
        let mut operations = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if operation == ItemOperation::None {
            operations.remove(urn);
        } else {
            operations.insert(urn.to_string(), operation);
        }
    }

    pub fn clear(&self, urn: &str) {
        self.set(urn, ItemOperation::None);
    }

    pub fn get(&self, urn: &str) -> ItemOperation {
        let operations = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        operations.get(urn).copied().unwrap_or_default()
    }
}

/// Re-renders one context. Always invoked from the UI thread.
pub trait ContextRenderer: Send + Sync {
    fn render_context(&self, view: ViewName);
}

#[derive(Debug, Clone)]
pub struct InlineStatusOpts {
    pub item_urn: String,
    pub operation: ItemOperation,
    pub context: ViewName,
}

#[derive(Debug)]
struct InlineStatusInfo {
    ref_count: usize,
    stop: CancellationToken,
}

struct TrackerInner {
    executor: Executor,
    renderer: Arc<dyn ContextRenderer>,
    operations: ItemOperations,
    registry: Mutex<HashMap<ViewName, InlineStatusInfo>>,
    interval: Duration,
}

/// Runs item operations in the background while a ticking indicator
/// re-renders their context. Concurrent operations on one context share a
/// single ticker.
#[derive(Clone)]
pub struct InlineStatusTracker {
    inner: Arc<TrackerInner>,
}

impl InlineStatusTracker {
    pub fn new(
        executor: Executor,
        renderer: Arc<dyn ContextRenderer>,
        operations: ItemOperations,
        interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                executor,
                renderer,
                operations,
                registry: Mutex::new(HashMap::new()),
                interval,
            }),
        }
    }

    pub fn operations(&self) -> &ItemOperations {
        &self.inner.operations
    }

    /// Runs `f` on a worker with `opts.item_urn` marked as `opts.operation`.
    /// Errors from `f` are handed to the UI queue for display.
    pub fn with_inline_status<F>(&self, opts: InlineStatusOpts, f: F)
    where
        F: FnOnce(&InlineTask) -> Result<()> + Send + 'static,
    {
        let tracker = self.clone();
        self.inner.executor.on_worker(move |task| {
            let inline = InlineTask {
                task,
                tracker: tracker.clone(),
                opts,
                paused: AtomicBool::new(false),
            };
            inline.begin();
            let result = f(&inline);
            inline.finish();
            if let Err(err) = result {
                tracker.inner.executor.on_ui_thread(move || Err(err));
            }
        });
    }

    fn acquire(&self, context: ViewName) {
        let mut registry = self.inner.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let info = registry.entry(context).or_insert_with(|| InlineStatusInfo {
            ref_count: 0,
            stop: CancellationToken::new(),
        });
        info.ref_count += 1;
        if info.ref_count > 1 {
            return;
        }
        debug!(context = %context, "starting inline status ticker");
        let executor = self.inner.executor.clone();
        let renderer = self.inner.renderer.clone();
        spawn_ticker(
            &self.inner.executor,
            "inline-status",
            self.inner.interval,
            info.stop.clone(),
            move || {
                let renderer = renderer.clone();
                executor.on_ui_thread(move || {
                    renderer.render_context(context);
                    Ok(())
                });
            },
        );
    }

    fn release(&self, context: ViewName) {
        let mut registry = self.inner.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(info) = registry.get_mut(&context) else {
            return;
        };
        info.ref_count = info.ref_count.saturating_sub(1);
        if info.ref_count == 0 {
            // Blocks until an in-flight tick has finished enqueueing.
            info.stop.cancel();
            registry.remove(&context);
            debug!(context = %context, "stopped inline status ticker");
        }
    }

    fn force_render(&self, context: ViewName) {
        let renderer = self.inner.renderer.clone();
        self.inner.executor.on_ui_thread(move || {
            renderer.render_context(context);
            Ok(())
        });
    }

    pub fn ref_count(&self, context: ViewName) -> usize {
        let registry = self.inner.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.get(&context).map_or(0, |info| info.ref_count)
    }

    /// Number of contexts with a live ticker.
    pub fn active_tickers(&self) -> usize {
        let registry = self.inner.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.len()
    }
}

/// Handle given to an inline-status operation, e.g. to hand the terminal to
/// a credential prompt without the spinner drawing over it.
pub struct InlineTask {
    task: Task,
    tracker: InlineStatusTracker,
    opts: InlineStatusOpts,
    paused: AtomicBool,
}

impl InlineTask {
    fn begin(&self) {
        self.tracker.operations().set(&self.opts.item_urn, self.opts.operation);
        self.tracker.acquire(self.opts.context);
    }

    fn finish(&self) {
        if !self.paused.load(Ordering::SeqCst) {
            self.tracker.release(self.opts.context);
        }
        self.tracker.operations().clear(&self.opts.item_urn);
        self.tracker.force_render(self.opts.context);
    }

    /// Stops the indicator and marks the task as not busy. Pausing an
    /// already paused task does nothing.
    pub fn pause(&self) {
        if self.paused.swap(true, Ordering::SeqCst) {
            return;
        }
        self.tracker.release(self.opts.context);
        self.tracker.operations().clear(&self.opts.item_urn);
        self.task.pause();
        self.tracker.force_render(self.opts.context);
    }

    pub fn resume(&self) {
        if !self.paused.swap(false, Ordering::SeqCst) {
            return;
        }
        self.task.resume();
        self.tracker.operations().set(&self.opts.item_urn, self.opts.operation);
        self.tracker.acquire(self.opts.context);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[path = "../tests/unit/inline_status_tests.rs"]
mod tests;
