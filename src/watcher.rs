use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::config::RefresherSection;
use crate::exec::{CancellationToken, Executor, spawn_ticker};
use crate::loader::RepoCommands;
use crate::refresh::{RefreshOptions, Refresher};
use crate::resource::{RefreshMode, Resource};

pub const DEBOUNCE: Duration = Duration::from_millis(500);

/// Git metadata files whose change means refs or the index moved.
const GIT_DIR_FILES: [&str; 5] = ["HEAD", "index", "MERGE_HEAD", "REBASE_HEAD", "CHERRY_PICK_HEAD"];

/// Keeps a filesystem watch on the work tree alive. Dropping it stops the
/// watch and, with it, the debounce thread.
pub struct RepoWatcher {
    _watcher: RecommendedWatcher,
}

impl RepoWatcher {
    /// Calls `on_change` once per burst of relevant filesystem events, after
    /// `debounce` of quiet.
    pub fn start<F>(executor: &Executor, work_dir: &Path, git_dir: &Path, debounce: Duration, on_change: F) -> notify::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let (raw_tx, raw_rx) = mpsc::channel::<()>();
        let git_dir_owned = git_dir.to_path_buf();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if is_relevant(&event, &git_dir_owned) => {
                    let _ = raw_tx.send(());
                }
                Ok(_) => {}
                Err(err) => debug!(error = %err, "watch error"),
            },
            Config::default(),
        )?;
        watcher.watch(work_dir, RecursiveMode::Recursive)?;
        if let Err(err) = watcher.watch(git_dir, RecursiveMode::NonRecursive) {
            debug!(error = %err, "cannot watch git dir");
        }

        executor.on_background("fs-debounce", move || debounce_signals(raw_rx, debounce, on_change));
        info!(path = %work_dir.display(), "watching work tree");
        Ok(Self { _watcher: watcher })
    }

    /// Watches the repository and refreshes files in the background whenever
    /// something changes on disk.
    pub fn for_refresher(executor: &Executor, work_dir: &Path, git_dir: &Path, refresher: Refresher) -> notify::Result<Self> {
        Self::start(executor, work_dir, git_dir, DEBOUNCE, move || {
            let opts = RefreshOptions::scope([Resource::Files]).mode(RefreshMode::Async);
            if let Err(err) = refresher.refresh(opts) {
                warn!(error = %err, "file refresh failed");
            }
        })
    }
}

/// Only data changes count. Inside the git dir only ref and index files do;
/// objects and logs churn on every command.
fn is_relevant(event: &Event, git_dir: &Path) -> bool {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)) {
        return false;
    }
    event.paths.iter().any(|path| match path.strip_prefix(git_dir) {
        Ok(relative) => {
            let relative = relative.to_string_lossy();
            GIT_DIR_FILES.contains(&relative.as_ref()) || relative.starts_with("refs")
        }
        Err(_) => true,
    })
}

/// Collapses bursts on `raw` into single `on_change` calls. Returns when the
/// sending side is dropped.
fn debounce_signals<T>(raw: Receiver<T>, quiet: Duration, on_change: impl Fn()) {
    let mut last_event: Option<Instant> = None;
    loop {
        let timeout = match last_event {
            Some(at) => quiet.saturating_sub(at.elapsed()),
            None => Duration::from_secs(60),
        };
        match raw.recv_timeout(timeout) {
            Ok(_) => last_event = Some(Instant::now()),
            Err(RecvTimeoutError::Timeout) => {
                if last_event.take().is_some() {
                    on_change();
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                if last_event.is_some() {
                    on_change();
                }
                return;
            }
        }
    }
}

/// Periodic refresh and fetch. Both stop when this is dropped.
pub struct BackgroundRoutines {
    token: CancellationToken,
}

impl BackgroundRoutines {
    pub fn start(
        executor: &Executor,
        refresher: Refresher,
        commands: Arc<dyn RepoCommands>,
        config: &RefresherSection,
    ) -> Self {
        let token = CancellationToken::new();

        if let Some(interval) = config.refresh_interval() {
            let refresher = refresher.clone();
            spawn_ticker(executor, "auto-refresh", interval, token.clone(), move || {
                let opts = RefreshOptions::scope([Resource::Files, Resource::Submodules]).mode(RefreshMode::Async);
                if let Err(err) = refresher.refresh(opts) {
                    warn!(error = %err, "background refresh failed");
                }
            });
        }

        if let Some(interval) = config.fetch_interval() {
            spawn_ticker(executor, "auto-fetch", interval, token.clone(), move || {
                if let Err(err) = commands.fetch() {
                    warn!(error = %format!("{err:#}"), "background fetch failed");
                    return;
                }
                let opts = RefreshOptions::scope([
                    Resource::Branches,
                    Resource::Commits,
                    Resource::Remotes,
                    Resource::Tags,
                ])
                .mode(RefreshMode::Async);
                if let Err(err) = refresher.refresh(opts) {
                    warn!(error = %err, "refresh after fetch failed");
                }
            });
        }

        Self { token }
    }
}

impl Drop for BackgroundRoutines {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// `<work_dir>/.git` when the git dir cannot be asked for.
pub fn fallback_git_dir(work_dir: &Path) -> PathBuf {
    work_dir.join(".git")
}
