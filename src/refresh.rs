use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use anyhow::Result;
use thiserror::Error;
use tracing::{debug, info};

mod plan;
mod units;

pub use plan::{PlannedUnit, RefreshPlan, UnitKind};

use crate::exec::{Executor, WaitGroup, WaitGuard};
use crate::loader::{BranchSortOrder, RepoLoader};
use crate::model::Model;
use crate::presentation::Presenter;
use crate::resource::{RefreshMode, RefreshScope, Resource};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RefreshError {
    #[error("a completion callback cannot be combined with async refresh mode")]
    ThenWithAsync,
}

pub type Continuation = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// Called on the UI thread when a rebase or merge has no conflicts left.
pub type ConflictsResolvedHook = Arc<dyn Fn() -> Result<()> + Send + Sync>;

#[derive(Default)]
pub struct RefreshOptions {
    pub scope: RefreshScope,
    pub mode: RefreshMode,
    /// Keep the branch list's selected index instead of following the
    /// selected branch to its new position.
    pub keep_selection: bool,
    pub then: Option<Continuation>,
}

impl RefreshOptions {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn scope(resources: impl IntoIterator<Item = Resource>) -> Self {
        Self {
            scope: RefreshScope::only(resources),
            ..Self::default()
        }
    }

    pub fn mode(mut self, mode: RefreshMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn keep_selection(mut self) -> Self {
        self.keep_selection = true;
        self
    }

    pub fn then<F>(mut self, f: F) -> Self
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.then = Some(Box::new(f));
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RefresherConfig {
    pub sort_order: BranchSortOrder,
    pub commit_limit: Option<usize>,
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            sort_order: BranchSortOrder::Recency,
            commit_limit: Some(300),
        }
    }
}

struct RefresherInner {
    executor: Executor,
    loader: Arc<dyn RepoLoader>,
    model: Arc<Model>,
    presenter: Presenter,
    sort_order: Mutex<BranchSortOrder>,
    commit_limit: Option<usize>,
    startup_started: AtomicBool,
    startup_complete: AtomicBool,
    on_conflicts_resolved: Mutex<Option<ConflictsResolvedHook>>,
}

/// Schedules resource reloads. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Refresher {
    inner: Arc<RefresherInner>,
}

#[derive(Debug, Clone, Copy)]
struct UnitContext {
    keep_selection: bool,
    worktrees_in_branches: bool,
}

impl Refresher {
    pub fn new(
        executor: Executor,
        loader: Arc<dyn RepoLoader>,
        model: Arc<Model>,
        presenter: Presenter,
        config: RefresherConfig,
    ) -> Self {
        Self {
            inner: Arc::new(RefresherInner {
                executor,
                loader,
                model,
                presenter,
                sort_order: Mutex::new(config.sort_order),
                commit_limit: config.commit_limit,
                startup_started: AtomicBool::new(false),
                startup_complete: AtomicBool::new(false),
                on_conflicts_resolved: Mutex::new(None),
            }),
        }
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.inner.model
    }

    pub fn presenter(&self) -> &Presenter {
        &self.inner.presenter
    }

    pub fn sort_order(&self) -> BranchSortOrder {
        *self.inner.sort_order.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_sort_order(&self, order: BranchSortOrder) {
        *self.inner.sort_order.lock().unwrap_or_else(PoisonError::into_inner) = order;
    }

    pub fn set_on_conflicts_resolved(&self, hook: ConflictsResolvedHook) {
        *self
            .inner
            .on_conflicts_resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(hook);
    }

    pub fn is_startup_complete(&self) -> bool {
        self.inner.startup_complete.load(Ordering::SeqCst)
    }

    /// Reloads the resources in `opts.scope`. Loader failures are logged and
    /// leave the previous value in place; the only error returned is a
    /// misuse of the options or a failing `then`.
    pub fn refresh(&self, opts: RefreshOptions) -> Result<()> {
        if opts.mode == RefreshMode::Async && opts.then.is_some() {
            return Err(RefreshError::ThenWithAsync.into());
        }
        if opts.mode == RefreshMode::BlockUi {
            let refresher = self.clone();
            self.inner.executor.on_ui_thread(move || refresher.run(opts));
            return Ok(());
        }
        self.run(opts)
    }

    fn run(&self, opts: RefreshOptions) -> Result<()> {
        let started = Instant::now();
        let plan = RefreshPlan::build(&opts.scope.resolve(), self.sort_order());
        info!(
            scope = %opts.scope,
            mode = opts.mode.name(),
            units = plan.len(),
            "refresh started"
        );
        let ctx = UnitContext {
            keep_selection: opts.keep_selection,
            worktrees_in_branches: plan.worktrees_in_branches,
        };

        let all_done = WaitGroup::new();
        let groups: HashMap<UnitKind, WaitGroup> = plan
            .units()
            .iter()
            .map(|unit| (unit.kind, WaitGroup::new()))
            .collect();
        // Every guard exists before the first worker starts, so a dependent
        // never sees an empty group for a unit that has not begun.
        let dispatch: Vec<(PlannedUnit, WaitGuard, WaitGuard)> = plan
            .units()
            .iter()
            .map(|unit| (unit.clone(), groups[&unit.kind].add(), all_done.add()))
            .collect();

        for (unit, unit_guard, done_guard) in dispatch {
            let deps: Vec<WaitGroup> = unit
                .depends_on
                .iter()
                .filter_map(|kind| groups.get(kind).cloned())
                .collect();
            let refresher = self.clone();
            self.inner.executor.on_worker(move |_task| {
                let _unit_guard = unit_guard;
                let _done_guard = done_guard;
                for dep in &deps {
                    dep.wait();
                }
                let unit_started = Instant::now();
                refresher.run_unit(unit.kind, ctx);
                debug!(
                    unit = unit.kind.name(),
                    elapsed_ms = unit_started.elapsed().as_millis() as u64,
                    "refresh unit finished"
                );
            });
        }

        if opts.mode == RefreshMode::Async {
            return Ok(());
        }
        all_done.wait();
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "refresh finished"
        );
        match opts.then {
            Some(then) => then(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/refresh_tests.rs"]
mod tests;
