use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::inline_status::{ContextRenderer, ItemOperation, ItemOperations};
use crate::model::{BisectInfo, Branch, Commit, CommitStatus, Model, WorkingTreeState};
use crate::views::{ViewName, Views};

const SPINNER_FRAMES: [&str; 4] = ["|", "/", "-", "\\"];

#[derive(Debug, Clone)]
pub struct Spinner {
    started: Instant,
    rate: Duration,
}

impl Spinner {
    pub fn new(rate: Duration) -> Self {
        Self {
            started: Instant::now(),
            rate: rate.max(Duration::from_millis(1)),
        }
    }

    pub fn frame(&self) -> &'static str {
        let ticks = self.started.elapsed().as_millis() / self.rate.as_millis();
        SPINNER_FRAMES[(ticks % SPINNER_FRAMES.len() as u128) as usize]
    }
}

/// Turns model state into view lines and pushes them into [`Views`].
#[derive(Clone)]
pub struct Presenter {
    model: Arc<Model>,
    views: Views,
    operations: ItemOperations,
    spinner: Spinner,
}

impl Presenter {
    pub fn new(model: Arc<Model>, views: Views, operations: ItemOperations, spinner: Spinner) -> Self {
        Self {
            model,
            views,
            operations,
            spinner,
        }
    }

    pub fn views(&self) -> &Views {
        &self.views
    }

    pub fn spinner(&self) -> &Spinner {
        &self.spinner
    }

    pub fn render(&self, view: ViewName) {
        let lines = self.lines(view);
        self.views.set_content(view, lines);
    }

    pub fn render_all(&self, views: &[ViewName]) {
        for view in views {
            self.render(*view);
        }
    }

    fn lines(&self, view: ViewName) -> Vec<String> {
        let model = &self.model;
        match view {
            ViewName::Status => model.with_status(|status| vec![status.clone()]),
            ViewName::Files => model.with_files(|state| {
                state
                    .files
                    .iter()
                    .map(|file| match &file.previous_path {
                        Some(previous) => format!("{} {} -> {}", file.short_status, previous, file.path),
                        None => format!("{} {}", file.short_status, file.path),
                    })
                    .collect()
            }),
            ViewName::Submodules => model.with_files(|state| {
                state
                    .submodules
                    .iter()
                    .map(|submodule| format!("{} {}", submodule.name, submodule.url))
                    .collect()
            }),
            ViewName::Branches => {
                let branches = model.branches();
                branches.iter().map(|branch| self.branch_line(branch)).collect()
            }
            ViewName::Remotes => model.with_remotes(|remotes| {
                remotes
                    .iter()
                    .map(|remote| {
                        let marker = self.operation_suffix(&remote.urn());
                        format!("{} ({} branches){marker}", remote.name, remote.branches.len())
                    })
                    .collect()
            }),
            ViewName::Tags => model.with_tags(|tags| {
                tags.iter()
                    .map(|tag| format!("{} {}", tag.name, tag.message).trim_end().to_string())
                    .collect()
            }),
            ViewName::Worktrees => model.with_worktrees(|worktrees| {
                worktrees
                    .iter()
                    .map(|worktree| {
                        let marker = if worktree.is_current { "* " } else { "  " };
                        let name = worktree.branch.as_deref().unwrap_or("(detached)");
                        let main = if worktree.is_main { " (main)" } else { "" };
                        format!("{marker}{name}{main} {}", worktree.path)
                    })
                    .collect()
            }),
            ViewName::Commits => {
                let bisect = model.with_bisect(|info| info.clone());
                model.with_commits(|state| {
                    state
                        .commits
                        .iter()
                        .map(|commit| commit_line(commit, &bisect))
                        .collect()
                })
            }
            ViewName::SubCommits => model.with_sub_commits(|state| {
                state
                    .commits
                    .iter()
                    .map(|commit| commit_line(commit, &BisectInfo::default()))
                    .collect()
            }),
            ViewName::Reflog => model.with_reflog(|reflog| {
                reflog
                    .iter()
                    .map(|commit| format!("{} {}", commit.short_hash(), commit.subject))
                    .collect()
            }),
            ViewName::CommitFiles => model.with_commit_files(|state| {
                state
                    .files
                    .iter()
                    .map(|file| format!("{} {}", file.change_status, file.path))
                    .collect()
            }),
            ViewName::Stash => model.with_stash(|stash| {
                stash
                    .iter()
                    .map(|entry| format!("{} {}", entry.ref_name(), entry.name))
                    .collect()
            }),
            ViewName::Staging => model.with_staging(|state| diff_lines(&state.unstaged_diff)),
            ViewName::StagingSecondary => model.with_staging(|state| diff_lines(&state.staged_diff)),
            ViewName::PatchBuilding => model.with_patch_building(|state| diff_lines(&state.diff)),
            ViewName::MergeConflicts => model.with_merge_conflicts(|state| match &state.path {
                Some(path) => vec![format!("{path}: {} conflict(s)", state.conflict_count)],
                None => Vec::new(),
            }),
        }
    }

    fn branch_line(&self, branch: &Branch) -> String {
        let mut line = String::new();
        if !branch.recency.is_empty() {
            line.push_str(&format!("{:<4}", branch.recency));
        }
        if branch.head {
            line.push_str("* ");
        }
        line.push_str(&branch.name);
        if branch.upstream_gone {
            line.push_str(" (upstream gone)");
        } else if let (Some(ahead), Some(behind)) = (branch.ahead, branch.behind) {
            if ahead > 0 || behind > 0 {
                line.push_str(&format!(" ↑{ahead}↓{behind}"));
            } else {
                line.push_str(" ✓");
            }
        } else if branch.upstream.is_some() {
            line.push_str(" ?");
        }
        line.push_str(&self.operation_suffix(&branch.urn()));
        line
    }

    fn operation_suffix(&self, urn: &str) -> String {
        match self.operations.get(urn) {
            ItemOperation::None => String::new(),
            operation => format!(" {} {}", operation.label(), self.spinner.frame()),
        }
    }
}

impl ContextRenderer for Presenter {
    fn render_context(&self, view: ViewName) {
        self.render(view);
    }
}

fn commit_line(commit: &Commit, bisect: &BisectInfo) -> String {
    let marker = match commit.status {
        CommitStatus::Unpushed => "↑",
        CommitStatus::Merged => "✓",
        _ => " ",
    };
    let mut line = match &commit.action {
        Some(action) => format!("{} {action} {}", commit.short_hash(), commit.subject),
        None => format!("{} {marker} {}", commit.short_hash(), commit.subject),
    };
    if !commit.tags.is_empty() {
        line.push_str(&format!(" [{}]", commit.tags.join(", ")));
    }
    if bisect.started() {
        if bisect.current.as_deref() == Some(commit.hash.as_str()) {
            line.push_str(" <-- current");
        } else if bisect.new_hash.as_deref() == Some(commit.hash.as_str()) {
            line.push_str(" <-- bad");
        }
    }
    line
}

fn diff_lines(diff: &str) -> Vec<String> {
    diff.lines().map(str::to_string).collect()
}

/// Summary line for the status panel: tracking counts, repo and branch, plus
/// any in-progress operation.
pub fn format_status(repo_name: &str, branch: &Branch, state: WorkingTreeState, bisect: &BisectInfo) -> String {
    let mut status = String::new();
    match (branch.ahead, branch.behind) {
        (Some(ahead), Some(behind)) => status.push_str(&format!("↑{ahead}↓{behind} ")),
        _ if branch.upstream.is_some() => status.push_str("? "),
        _ => {}
    }
    if let Some(label) = state.label() {
        status.push_str(&format!("({label}) "));
    }
    if bisect.started() {
        status.push_str("(bisecting) ");
    }
    status.push_str(&format!("{repo_name} → {}", branch.name));
    status
}
