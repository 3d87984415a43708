use std::sync::PoisonError;
use std::sync::atomic::Ordering;

use anyhow::Result;
use tracing::{debug, info, warn};

use super::{Refresher, UnitContext, UnitKind};
use crate::loader::{BranchQuery, BranchSortOrder, CommitQuery, ReflogBatch};
use crate::model::{Author, Branch, Commit, CommitFilesSource, WorkingTreeState};
use crate::presentation::format_status;
use crate::views::ViewName;

impl Refresher {
    pub(super) fn run_unit(&self, kind: UnitKind, ctx: UnitContext) {
        let result = match kind {
            UnitKind::CommitsAndCommitFiles => self.refresh_commits_and_commit_files(),
            UnitKind::ReflogAndBranches => self.refresh_reflog_and_branches(ctx),
            UnitKind::Branches => self.refresh_branches(ctx.worktrees_in_branches, ctx.keep_selection, true),
            UnitKind::Reflog => self.refresh_reflog(),
            UnitKind::RebaseCommits => self.refresh_rebase_commits(),
            UnitKind::SubCommits => self.refresh_sub_commits(),
            UnitKind::CommitFiles => self.refresh_commit_files(),
            UnitKind::FilesAndSubmodules => self.refresh_files_and_submodules(),
            UnitKind::Stash => self.refresh_stash(),
            UnitKind::Tags => self.refresh_tags(),
            UnitKind::Remotes => self.refresh_remotes(),
            UnitKind::Worktrees => self.refresh_worktrees(),
            UnitKind::Staging => self.refresh_staging(),
            UnitKind::PatchBuilding => self.refresh_patch_building(),
            UnitKind::MergeConflicts => self.refresh_merge_conflicts(),
            UnitKind::Status => self.refresh_status(),
        };
        if let Err(err) = result {
            warn!(unit = kind.name(), error = %format!("{err:#}"), "refresh unit failed");
        }
    }

    fn render(&self, views: &'static [ViewName]) {
        let presenter = self.inner.presenter.clone();
        self.inner.executor.on_ui_thread(move || {
            presenter.render_all(views);
            Ok(())
        });
    }

    fn refresh_commits_and_commit_files(&self) -> Result<()> {
        let loader = &self.inner.loader;
        let model = &self.inner.model;

        let checked_out_branch = loader.checked_out_branch()?;
        let commits = loader.commits(&CommitQuery {
            limit: self.inner.commit_limit,
            ref_name: "HEAD".to_string(),
            ref_for_pushed_status: Some(format!("{checked_out_branch}@{{u}}")),
            include_rebase_commits: true,
        })?;
        let working_tree_state = loader.working_tree_state()?;
        let bisect = loader.bisect_info()?;

        self.refresh_authors(&commits);
        model.with_commits(|state| {
            state.commits = commits;
            state.checked_out_branch = checked_out_branch;
            state.working_tree_state = working_tree_state;
        });
        model.with_bisect(|info| *info = bisect);
        self.render(&[ViewName::Commits]);

        let shows_local_commit = model.with_commit_files(|state| {
            state
                .target
                .as_ref()
                .is_some_and(|target| target.source == CommitFilesSource::LocalCommits)
        });
        if shows_local_commit {
            self.refresh_commit_files()?;
        }
        Ok(())
    }

    fn refresh_authors(&self, commits: &[Commit]) {
        self.inner.model.with_authors(|authors| {
            for commit in commits {
                let key = format!("{} <{}>", commit.author_name, commit.author_email);
                authors.entry(key).or_insert_with(|| Author {
                    name: commit.author_name.clone(),
                    email: commit.author_email.clone(),
                });
            }
        });
    }

    fn refresh_reflog_and_branches(&self, ctx: UnitContext) -> Result<()> {
        let load_behind_counts = self.is_startup_complete();
        self.refresh_reflog_considering_startup();
        self.refresh_branches(ctx.worktrees_in_branches, ctx.keep_selection, load_behind_counts)
    }

    /// On the very first recency refresh the reflog can be large, so it is
    /// loaded on its own worker and branches are reloaded once it lands.
    fn refresh_reflog_considering_startup(&self) {
        if self.is_startup_complete() {
            if let Err(err) = self.refresh_reflog() {
                warn!(error = %format!("{err:#}"), "reflog refresh failed");
            }
            return;
        }
        if self.inner.startup_started.swap(true, Ordering::SeqCst) {
            debug!("startup reflog load already in flight");
            return;
        }
        let refresher = self.clone();
        self.inner.executor.on_worker(move |_task| {
            if let Err(err) = refresher.refresh_reflog() {
                warn!(error = %format!("{err:#}"), "startup reflog refresh failed");
            }
            if let Err(err) = refresher
                .refresh_branches(false, true, true)
                .and_then(|()| refresher.refresh_status())
            {
                warn!(error = %format!("{err:#}"), "startup branches refresh failed");
            }
            refresher.inner.startup_complete.store(true, Ordering::SeqCst);
            info!("startup refresh complete");
        });
    }

    fn refresh_reflog(&self) -> Result<()> {
        let loader = &self.inner.loader;
        let model = &self.inner.model;
        let newest_known = model.with_reflog(|reflog| reflog.first().cloned());
        let ReflogBatch { commits, only_new } = loader.reflog(newest_known.as_ref())?;

        // New entries only extend the list they were loaded against.
        let stale = model.with_reflog(|reflog| {
            if !only_new {
                *reflog = commits;
                return false;
            }
            if reflog.first() != newest_known.as_ref() {
                return true;
            }
            let mut merged = commits;
            merged.append(reflog);
            *reflog = merged;
            false
        });
        if stale {
            debug!("reflog moved while loading; reloading in full");
            let full = loader.reflog(None)?;
            model.with_reflog(|reflog| *reflog = full.commits);
        }
        self.render(&[ViewName::Reflog]);
        Ok(())
    }

    fn refresh_branches(&self, with_worktrees: bool, keep_selection: bool, load_behind_counts: bool) -> Result<()> {
        let model = &self.inner.model;
        let views = self.inner.presenter.views().clone();
        let sort_order = self.sort_order();
        let reflog = match sort_order {
            BranchSortOrder::Recency => model.with_reflog(|reflog| reflog.clone()),
            BranchSortOrder::Date | BranchSortOrder::Alphabetical => Vec::new(),
        };
        let mut branches = self.inner.loader.branches(&BranchQuery {
            sort_order,
            reflog,
            load_behind_counts,
        })?;

        if with_worktrees {
            let worktrees = self.inner.loader.worktrees()?;
            for branch in &mut branches {
                branch.worktree = worktrees
                    .iter()
                    .find(|worktree| worktree.branch.as_deref() == Some(branch.name.as_str()) && !worktree.is_current)
                    .map(|worktree| worktree.path.clone());
            }
            model.with_worktrees(|stored| *stored = worktrees);
            self.render(&[ViewName::Worktrees]);
        }

        let selected_index = views.selected(ViewName::Branches);
        let previous: Option<Branch> = model.with_branches(|stored| {
            let previous = stored.get(selected_index).cloned();
            *stored = branches;
            previous
        });

        let presenter = self.inner.presenter.clone();
        let model = model.clone();
        self.inner.executor.on_ui_thread(move || {
            presenter.render(ViewName::Branches);
            if keep_selection {
                return Ok(());
            }
            if let Some(previous) = previous {
                let index = model.with_branches(|branches| {
                    branches.iter().position(|branch| branch.name == previous.name)
                });
                if let Some(index) = index {
                    presenter.views().select(ViewName::Branches, index);
                }
            }
            Ok(())
        });
        Ok(())
    }

    fn refresh_rebase_commits(&self) -> Result<()> {
        let loader = &self.inner.loader;
        let model = &self.inner.model;
        let working_tree_state = loader.working_tree_state()?;
        let existing = model.with_commits(|state| state.commits.clone());
        let commits = loader.merge_rebasing_commits(&existing)?;
        model.with_commits(|state| {
            state.commits = commits;
            state.working_tree_state = working_tree_state;
        });
        self.render(&[ViewName::Commits]);
        Ok(())
    }

    fn refresh_sub_commits(&self) -> Result<()> {
        let model = &self.inner.model;
        let Some(ref_name) = model.with_sub_commits(|state| state.ref_name.clone()) else {
            return Ok(());
        };
        let commits = self.inner.loader.commits(&CommitQuery {
            limit: self.inner.commit_limit,
            ref_name: ref_name.clone(),
            ref_for_pushed_status: None,
            include_rebase_commits: false,
        })?;
        model.with_sub_commits(|state| {
            // The user may have moved on to another ref while this loaded.
            if state.ref_name.as_deref() == Some(ref_name.as_str()) {
                state.commits = commits;
            }
        });
        self.render(&[ViewName::SubCommits]);
        Ok(())
    }

    fn refresh_commit_files(&self) -> Result<()> {
        let model = &self.inner.model;
        let Some(target) = model.with_commit_files(|state| state.target.clone()) else {
            return Ok(());
        };
        let files = self.inner.loader.commit_files(&target.ref_name)?;
        model.with_commit_files(|state| {
            if state.target.as_ref() == Some(&target) {
                state.files = files;
            }
        });
        self.render(&[ViewName::CommitFiles]);
        Ok(())
    }

    fn refresh_files_and_submodules(&self) -> Result<()> {
        let loader = &self.inner.loader;
        let model = &self.inner.model;

        let submodules = loader.submodules()?;
        let working_tree_state = loader.working_tree_state()?;
        let files = loader.files()?;
        let conflicts = files.iter().filter(|file| file.has_merge_conflicts).count();

        let previous_conflicts = model.with_files(|state| {
            let previous = state.conflict_count();
            state.files = files;
            state.submodules = submodules;
            previous
        });
        model.with_commits(|state| state.working_tree_state = working_tree_state);
        self.render(&[ViewName::Files, ViewName::Submodules]);

        if working_tree_state != WorkingTreeState::None && previous_conflicts > 0 && conflicts == 0 {
            info!(state = ?working_tree_state, "all conflicts resolved");
            let hook = self
                .inner
                .on_conflicts_resolved
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(hook) = hook {
                self.inner.executor.on_ui_thread(move || hook());
            }
        }
        Ok(())
    }

    fn refresh_stash(&self) -> Result<()> {
        let stash = self.inner.loader.stash()?;
        self.inner.model.with_stash(|stored| *stored = stash);
        self.render(&[ViewName::Stash]);
        Ok(())
    }

    fn refresh_tags(&self) -> Result<()> {
        let tags = self.inner.loader.tags()?;
        self.inner.model.with_tags(|stored| *stored = tags);
        self.render(&[ViewName::Tags]);
        Ok(())
    }

    fn refresh_remotes(&self) -> Result<()> {
        let remotes = self.inner.loader.remotes()?;
        self.inner.model.with_remotes(|stored| *stored = remotes);
        self.render(&[ViewName::Remotes]);
        Ok(())
    }

    fn refresh_worktrees(&self) -> Result<()> {
        let worktrees = self.inner.loader.worktrees()?;
        self.inner.model.with_worktrees(|stored| *stored = worktrees);
        self.render(&[ViewName::Worktrees, ViewName::Branches]);
        Ok(())
    }

    fn refresh_staging(&self) -> Result<()> {
        let model = &self.inner.model;
        let Some(path) = model.with_staging(|state| state.path.clone()) else {
            return Ok(());
        };
        let still_present = model.with_files(|state| state.files.iter().any(|file| file.path == path));
        if !still_present {
            model.with_staging(|state| {
                if state.path.as_deref() == Some(path.as_str()) {
                    state.path = None;
                    state.unstaged_diff.clear();
                    state.staged_diff.clear();
                }
            });
            self.render(&[ViewName::Staging, ViewName::StagingSecondary]);
            return Ok(());
        }
        let unstaged = self.inner.loader.file_diff(&path, false)?;
        let staged = self.inner.loader.file_diff(&path, true)?;
        model.with_staging(|state| {
            if state.path.as_deref() == Some(path.as_str()) {
                state.unstaged_diff = unstaged;
                state.staged_diff = staged;
            }
        });
        self.render(&[ViewName::Staging, ViewName::StagingSecondary]);
        Ok(())
    }

    fn refresh_patch_building(&self) -> Result<()> {
        let model = &self.inner.model;
        let Some(target) = model.with_patch_building(|state| state.target.clone()) else {
            return Ok(());
        };
        let diff = self.inner.loader.commit_file_diff(&target.ref_name, &target.path)?;
        model.with_patch_building(|state| {
            if state.target.as_ref() == Some(&target) {
                state.diff = diff;
            }
        });
        self.render(&[ViewName::PatchBuilding]);
        Ok(())
    }

    fn refresh_merge_conflicts(&self) -> Result<()> {
        let model = &self.inner.model;
        let conflicted: Vec<String> = model.with_files(|state| {
            state
                .files
                .iter()
                .filter(|file| file.has_inline_merge_conflicts)
                .map(|file| file.path.clone())
                .collect()
        });
        let requested = model.with_merge_conflicts(|state| state.path.clone());
        let path = match requested {
            Some(path) if conflicted.contains(&path) => Some(path),
            _ => conflicted.first().cloned(),
        };
        let count = match &path {
            Some(path) => self.inner.loader.conflict_marker_count(path)?,
            None => 0,
        };
        model.with_merge_conflicts(|state| {
            state.path = path;
            state.conflict_count = count;
        });
        self.render(&[ViewName::MergeConflicts]);
        Ok(())
    }

    fn refresh_status(&self) -> Result<()> {
        let model = &self.inner.model;
        let Some(branch) = model.checked_out_branch() else {
            // Branches have not loaded yet; the next status refresh fills this in.
            debug!("no checked out branch yet; skipping status");
            return Ok(());
        };
        let repo_name = self.inner.loader.repo_name()?;
        let working_tree_state = model.with_commits(|state| state.working_tree_state);
        let bisect = model.with_bisect(|info| info.clone());
        let status = format_status(&repo_name, &branch, working_tree_state, &bisect);
        model.with_status(|stored| *stored = status);
        self.render(&[ViewName::Status]);
        Ok(())
    }
}
