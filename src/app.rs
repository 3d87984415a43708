use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use ratatui::layout::Size;
use tracing::{info, warn};

use crate::events::AppEvent;
use crate::exec::Executor;
use crate::inline_status::{InlineStatusOpts, InlineStatusTracker, ItemOperation};
use crate::loader::{BranchSortOrder, RepoCommands};
use crate::model::{Branch, Commit, CommitFilesSource, CommitFilesTarget, File, Model};
use crate::popup::{MenuItem, OpenOutcome, PopupKind, PopupOpts, PopupResponse, PopupStack};
use crate::refresh::{ConflictsResolvedHook, RefreshOptions, Refresher};
use crate::resource::{RefreshMode, RefreshScope, Resource};
use crate::views::{ViewName, Views};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    Status,
    Files,
    Branches,
    Commits,
    Stash,
}

pub const PANES: [Pane; 5] = [Pane::Status, Pane::Files, Pane::Branches, Pane::Commits, Pane::Stash];

impl Pane {
    pub fn view(self) -> ViewName {
        match self {
            Pane::Status => ViewName::Status,
            Pane::Files => ViewName::Files,
            Pane::Branches => ViewName::Branches,
            Pane::Commits => ViewName::Commits,
            Pane::Stash => ViewName::Stash,
        }
    }
}

/// What the main (right-hand) area shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainView {
    Empty,
    Staging,
    CommitFiles,
}

impl MainView {
    pub fn views(self) -> &'static [ViewName] {
        match self {
            MainView::Empty => &[],
            MainView::Staging => &[ViewName::Staging, ViewName::StagingSecondary],
            MainView::CommitFiles => &[ViewName::CommitFiles],
        }
    }
}

/// Commands reachable from every panel and from the `?` menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalAction {
    RefreshAll,
    Push,
    Pull,
    Fetch,
    NewBranch,
    Commit,
    Stash,
    SortBranches,
}

pub const GLOBAL_KEYS: [(char, GlobalAction, &str); 8] = [
    ('R', GlobalAction::RefreshAll, "Refresh everything"),
    ('P', GlobalAction::Push, "Push current branch"),
    ('p', GlobalAction::Pull, "Pull current branch"),
    ('f', GlobalAction::Fetch, "Fetch all remotes"),
    ('n', GlobalAction::NewBranch, "New branch"),
    ('c', GlobalAction::Commit, "Commit staged changes"),
    ('s', GlobalAction::Stash, "Stash all changes"),
    ('o', GlobalAction::SortBranches, "Branch sort order"),
];

const SORT_ORDERS: [(char, BranchSortOrder); 3] = [
    ('r', BranchSortOrder::Recency),
    ('a', BranchSortOrder::Alphabetical),
    ('d', BranchSortOrder::Date),
];

fn scope(resources: &[Resource]) -> RefreshScope {
    RefreshScope::only(resources.iter().copied())
}

/// Shared handles used by key handlers and by the callbacks they leave
/// behind in popups and workers. Cheap to clone.
#[derive(Clone)]
pub struct Actions {
    executor: Executor,
    refresher: Refresher,
    commands: Arc<dyn RepoCommands>,
    popups: PopupStack,
    inline: InlineStatusTracker,
}

impl Actions {
    pub fn new(
        executor: Executor,
        refresher: Refresher,
        commands: Arc<dyn RepoCommands>,
        popups: PopupStack,
        inline: InlineStatusTracker,
    ) -> Self {
        Self {
            executor,
            refresher,
            commands,
            popups,
            inline,
        }
    }

    pub fn popups(&self) -> &PopupStack {
        &self.popups
    }

    pub fn refresher(&self) -> &Refresher {
        &self.refresher
    }

    fn model(&self) -> &Arc<Model> {
        self.refresher.model()
    }

    pub fn dispatch(&self, action: GlobalAction) -> Result<()> {
        match action {
            GlobalAction::RefreshAll => self.refresh_all(),
            GlobalAction::Push => self.push(),
            GlobalAction::Pull => self.pull(),
            GlobalAction::Fetch => self.fetch(),
            GlobalAction::NewBranch => self.new_branch(),
            GlobalAction::Commit => self.commit(),
            GlobalAction::Stash => self.stash(),
            GlobalAction::SortBranches => self.sort_branches_menu(),
        }
    }

    /// Runs a git command on a worker and refreshes `after` whether or not
    /// it succeeded; a failed command may still have changed the repo.
    pub fn run_command<F>(&self, name: &'static str, after: RefreshScope, f: F)
    where
        F: FnOnce(&dyn RepoCommands) -> Result<()> + Send + 'static,
    {
        let actions = self.clone();
        self.executor.on_worker(move |_task| {
            let result = f(actions.commands.as_ref());
            info!(command = name, ok = result.is_ok(), "git command finished");
            let refreshed = actions.refresher.refresh(RefreshOptions {
                scope: after,
                ..RefreshOptions::default()
            });
            if let Err(err) = result.and(refreshed) {
                actions.executor.on_ui_thread(move || Err(err));
            }
        });
    }

    pub fn refresh_all(&self) -> Result<()> {
        self.refresher.refresh(RefreshOptions::all().mode(RefreshMode::Async))
    }

    fn head_branch(&self) -> Result<Branch> {
        self.model()
            .checked_out_branch()
            .context("no branch is checked out")
    }

    /// Runs `f` with an inline spinner next to `branch` in the branch list,
    /// then refreshes everything.
    fn with_branch_status<F>(&self, branch: &Branch, operation: ItemOperation, f: F)
    where
        F: FnOnce(&dyn RepoCommands, &str) -> Result<()> + Send + 'static,
    {
        let opts = InlineStatusOpts {
            item_urn: branch.urn(),
            operation,
            context: ViewName::Branches,
        };
        let actions = self.clone();
        let name = branch.name.clone();
        self.inline.with_inline_status(opts, move |_task| {
            f(actions.commands.as_ref(), &name)?;
            actions.refresher.refresh(RefreshOptions::all())
        });
    }

    pub fn push(&self) -> Result<()> {
        let branch = self.head_branch()?;
        self.with_branch_status(&branch, ItemOperation::Pushing, |commands, name| commands.push(name));
        Ok(())
    }

    pub fn pull(&self) -> Result<()> {
        let branch = self.head_branch()?;
        self.with_branch_status(&branch, ItemOperation::Pulling, |commands, name| commands.pull(name));
        Ok(())
    }

    pub fn checkout(&self, branch: &Branch) -> Result<()> {
        if branch.head {
            return Ok(());
        }
        self.with_branch_status(branch, ItemOperation::CheckingOut, |commands, name| commands.checkout(name));
        Ok(())
    }

    /// Fetches behind a loader popup, which other popups (such as an error)
    /// may stack on top of.
    pub fn fetch(&self) -> Result<()> {
        let opts = PopupOpts::confirm("Fetch", "Fetching from all remotes").with_loader();
        let token = opts.token();
        if self.popups.open(opts) == OpenOutcome::Rejected {
            return Ok(());
        }
        let actions = self.clone();
        self.executor.on_worker(move |_task| {
            let result = actions.commands.fetch();
            let fetched = result.is_ok();
            let popups = actions.popups.clone();
            actions.executor.on_ui_thread(move || {
                popups.remove(&token);
                result
            });
            if fetched {
                let opts = RefreshOptions {
                    scope: scope(&[Resource::Branches, Resource::Commits, Resource::Remotes, Resource::Tags]),
                    ..RefreshOptions::default()
                };
                if let Err(err) = actions.refresher.refresh(opts) {
                    warn!(error = %err, "refresh after fetch failed");
                }
            }
        });
        Ok(())
    }

    pub fn new_branch(&self) -> Result<()> {
        let suggestions: BTreeSet<String> = self.model().with_remotes(|remotes| {
            remotes
                .iter()
                .flat_map(|remote| remote.branches.iter().cloned())
                .collect()
        });
        let actions = self.clone();
        let opts = PopupOpts::prompt("New branch name", "")
            .with_suggestions(suggestions.into_iter().collect())
            .on_confirm(move |response| {
                let PopupResponse::Text(name) = response else {
                    return Ok(());
                };
                let name = name.trim().to_string();
                if name.is_empty() {
                    bail!("branch name cannot be empty");
                }
                actions.run_command("create branch", scope(&[Resource::Branches, Resource::Commits]), move |commands| {
                    commands.create_branch(&name)
                });
                Ok(())
            });
        self.popups.open(opts);
        Ok(())
    }

    pub fn delete_branch(&self, branch: &Branch) -> Result<()> {
        if branch.head {
            bail!("cannot delete the checked out branch '{}'", branch.name);
        }
        let actions = self.clone();
        let target = branch.clone();
        let opts = PopupOpts::confirm(
            "Delete branch",
            format!("Are you sure you want to delete the branch '{}'?", branch.name),
        )
        .on_confirm(move |_| {
            actions.with_branch_status(&target, ItemOperation::Deleting, |commands, name| {
                commands.delete_branch(name)
            });
            Ok(())
        });
        self.popups.open(opts);
        Ok(())
    }

    pub fn toggle_staged(&self, file: &File) {
        let path = file.path.clone();
        let stage = file.has_unstaged_changes || !file.tracked;
        self.run_command("stage", scope(&[Resource::Files, Resource::Staging]), move |commands| {
            if stage { commands.stage(&path) } else { commands.unstage(&path) }
        });
    }

    pub fn commit(&self) -> Result<()> {
        let has_staged = self
            .model()
            .with_files(|state| state.files.iter().any(|file| file.has_staged_changes));
        if !has_staged {
            bail!("there are no staged files to commit");
        }
        let actions = self.clone();
        let opts = PopupOpts::commit_message("", "").on_confirm(move |response| {
            let PopupResponse::CommitMessage {
                summary,
                description,
            } = response
            else {
                return Ok(());
            };
            if summary.trim().is_empty() {
                bail!("commit summary cannot be empty");
            }
            actions.run_command(
                "commit",
                scope(&[Resource::Files, Resource::Staging, Resource::Commits]),
                move |commands| commands.commit(summary.trim(), &description),
            );
            Ok(())
        });
        self.popups.open(opts);
        Ok(())
    }

    pub fn stash(&self) -> Result<()> {
        let has_changes = self.model().with_files(|state| !state.files.is_empty());
        if !has_changes {
            bail!("there are no changes to stash");
        }
        let actions = self.clone();
        let opts = PopupOpts::prompt("Stash changes", "").on_confirm(move |response| {
            let PopupResponse::Text(message) = response else {
                return Ok(());
            };
            actions.run_command(
                "stash",
                scope(&[Resource::Files, Resource::Stash, Resource::Staging]),
                move |commands| commands.stash_push(&message),
            );
            Ok(())
        });
        self.popups.open(opts);
        Ok(())
    }

    pub fn sort_branches_menu(&self) -> Result<()> {
        let current = self.refresher.sort_order();
        let items = SORT_ORDERS
            .iter()
            .map(|(key, order)| MenuItem::new(order.name()).key(*key))
            .collect();
        let selected = SORT_ORDERS
            .iter()
            .position(|(_, order)| *order == current)
            .unwrap_or(0);
        let actions = self.clone();
        let opts = PopupOpts::new("Sort branches by", PopupKind::Menu { items, selected }).on_confirm(move |response| {
            let PopupResponse::MenuItem(index) = response else {
                return Ok(());
            };
            let Some((_, order)) = SORT_ORDERS.get(index) else {
                return Ok(());
            };
            actions.refresher.set_sort_order(*order);
            actions
                .refresher
                .refresh(RefreshOptions::scope([Resource::Branches]).mode(RefreshMode::Async))
        });
        self.popups.open(opts);
        Ok(())
    }

    pub fn keybindings_menu(&self) -> Result<()> {
        let items = GLOBAL_KEYS
            .iter()
            .map(|(key, _, label)| MenuItem::new(*label).key(*key))
            .collect();
        let actions = self.clone();
        let opts = PopupOpts::menu("Keybindings", items).on_confirm(move |response| {
            let PopupResponse::MenuItem(index) = response else {
                return Ok(());
            };
            match GLOBAL_KEYS.get(index) {
                Some((_, action, _)) => actions.dispatch(*action),
                None => Ok(()),
            }
        });
        self.popups.open(opts);
        Ok(())
    }

    /// Asks to continue the rebase or merge once its last conflict is gone.
    pub fn conflicts_resolved_hook(&self) -> ConflictsResolvedHook {
        let actions = self.clone();
        Arc::new(move || {
            let continue_actions = actions.clone();
            let opts = PopupOpts::confirm("Continue", "All merge conflicts resolved. Continue?").on_confirm(move |_| {
                continue_actions.run_command("continue rebase", RefreshScope::all(), |commands| {
                    commands.continue_rebase()
                });
                Ok(())
            });
            actions.popups.open(opts);
            Ok(())
        })
    }
}

pub struct App {
    pub running: bool,
    active_pane: Pane,
    main_view: MainView,
    actions: Actions,
    views: Views,
}

impl App {
    pub fn new(actions: Actions, views: Views) -> Self {
        Self {
            running: true,
            active_pane: Pane::Files,
            main_view: MainView::Empty,
            actions,
            views,
        }
    }

    pub fn active_pane(&self) -> Pane {
        self.active_pane
    }

    pub fn main_view(&self) -> MainView {
        self.main_view
    }

    pub fn actions(&self) -> &Actions {
        &self.actions
    }

    pub fn views(&self) -> &Views {
        &self.views
    }

    fn model(&self) -> &Arc<Model> {
        self.actions.model()
    }

    pub fn show_error(&self, err: &anyhow::Error) {
        self.actions.popups.open(PopupOpts::error(format!("{err:#}")));
    }

    pub fn handle_event(&mut self, event: AppEvent) -> Result<()> {
        match event {
            AppEvent::Tick => Ok(()),
            AppEvent::Quit => {
                self.running = false;
                Ok(())
            }
            AppEvent::Resize(width, height) => {
                self.actions.popups.resize(Size { width, height });
                Ok(())
            }
            _ if !self.actions.popups.is_empty() => self.handle_popup_event(event),
            _ => self.handle_panel_event(event),
        }
    }

    fn handle_popup_event(&mut self, event: AppEvent) -> Result<()> {
        let popups = self.actions.popups.clone();
        match event {
            AppEvent::Escape => popups.close(),
            AppEvent::Submit => {
                let mut added_line = false;
                popups.edit_active(|kind| added_line = kind.newline());
                if added_line { Ok(()) } else { popups.confirm() }
            }
            AppEvent::NextPane | AppEvent::PrevPane => {
                popups.edit_active(PopupKind::toggle_focus);
                Ok(())
            }
            AppEvent::MoveUp | AppEvent::MouseScrollUp => {
                popups.edit_active(|kind| kind.move_selection(-1));
                Ok(())
            }
            AppEvent::MoveDown | AppEvent::MouseScrollDown => {
                popups.edit_active(|kind| kind.move_selection(1));
                Ok(())
            }
            AppEvent::Backspace => {
                popups.edit_active(PopupKind::backspace);
                Ok(())
            }
            AppEvent::InputChar(ch) => {
                let (editable, menu_index) = popups
                    .with_active(|popup| (popup.kind.is_editable(), popup.kind.menu_index_for_key(ch)))
                    .unwrap_or((false, None));
                if editable {
                    popups.edit_active(|kind| kind.insert_char(ch));
                } else if let Some(index) = menu_index {
                    popups.edit_active(|kind| kind.select(index));
                    return popups.confirm();
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn handle_panel_event(&mut self, event: AppEvent) -> Result<()> {
        match event {
            AppEvent::InputChar('q') => {
                self.running = false;
                Ok(())
            }
            AppEvent::NextPane => self.cycle_pane(1),
            AppEvent::PrevPane => self.cycle_pane(-1),
            AppEvent::MoveUp | AppEvent::MouseScrollUp | AppEvent::InputChar('k') => self.move_selection(-1),
            AppEvent::MoveDown | AppEvent::MouseScrollDown | AppEvent::InputChar('j') => self.move_selection(1),
            AppEvent::Escape => {
                if self.main_view == MainView::CommitFiles {
                    self.main_view = MainView::Empty;
                }
                Ok(())
            }
            AppEvent::Submit if self.active_pane == Pane::Commits => self.show_commit_files(),
            AppEvent::InputChar(' ') => match self.active_pane {
                Pane::Files => {
                    if let Some(file) = self.selected_file() {
                        self.actions.toggle_staged(&file);
                    }
                    Ok(())
                }
                Pane::Branches => match self.selected_branch() {
                    Some(branch) => self.actions.checkout(&branch),
                    None => Ok(()),
                },
                _ => Ok(()),
            },
            AppEvent::InputChar('d') if self.active_pane == Pane::Branches => match self.selected_branch() {
                Some(branch) => self.actions.delete_branch(&branch),
                None => Ok(()),
            },
            AppEvent::InputChar('?') => self.actions.keybindings_menu(),
            AppEvent::InputChar(ch) => match GLOBAL_KEYS.iter().find(|(key, _, _)| *key == ch) {
                Some((_, action, _)) => self.actions.dispatch(*action),
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }

    fn cycle_pane(&mut self, delta: isize) -> Result<()> {
        let current = PANES.iter().position(|pane| *pane == self.active_pane).unwrap_or(0);
        let next = (current as isize + delta).rem_euclid(PANES.len() as isize) as usize;
        self.active_pane = PANES[next];
        self.sync_main_view()
    }

    fn move_selection(&mut self, delta: isize) -> Result<()> {
        self.views.move_selection(self.active_pane.view(), delta);
        self.sync_main_view()
    }

    fn selected_file(&self) -> Option<File> {
        let index = self.views.selected(ViewName::Files);
        self.model().with_files(|state| state.files.get(index).cloned())
    }

    fn selected_branch(&self) -> Option<Branch> {
        let index = self.views.selected(ViewName::Branches);
        self.model().with_branches(|branches| branches.get(index).cloned())
    }

    fn selected_commit(&self) -> Option<Commit> {
        let index = self.views.selected(ViewName::Commits);
        self.model().with_commits(|state| state.commits.get(index).cloned())
    }

    /// Points the main view at whatever the active panel has selected.
    pub fn sync_main_view(&mut self) -> Result<()> {
        match self.active_pane {
            Pane::Files => {
                self.main_view = MainView::Staging;
                let path = self.selected_file().map(|file| file.path);
                let changed = self.model().with_staging(|state| {
                    if state.path == path {
                        return false;
                    }
                    state.path = path;
                    state.unstaged_diff.clear();
                    state.staged_diff.clear();
                    true
                });
                if !changed {
                    return Ok(());
                }
                self.actions
                    .refresher
                    .refresh(RefreshOptions::scope([Resource::Staging]).mode(RefreshMode::Async))
            }
            Pane::Commits if self.main_view == MainView::CommitFiles => self.show_commit_files(),
            _ => {
                self.main_view = MainView::Empty;
                Ok(())
            }
        }
    }

    fn show_commit_files(&mut self) -> Result<()> {
        let Some(commit) = self.selected_commit() else {
            return Ok(());
        };
        let target = CommitFilesTarget {
            ref_name: commit.hash,
            source: CommitFilesSource::LocalCommits,
        };
        self.model().with_commit_files(|state| {
            if state.target.as_ref() != Some(&target) {
                state.target = Some(target);
                state.files.clear();
            }
        });
        self.main_view = MainView::CommitFiles;
        self.actions
            .refresher
            .refresh(RefreshOptions::scope([Resource::CommitFiles]).mode(RefreshMode::Async))
    }
}

#[cfg(test)]
#[path = "../tests/unit/app_tests.rs"]
mod tests;
