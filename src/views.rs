use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ViewName {
    Status,
    Files,
    Branches,
    Remotes,
    Tags,
    Worktrees,
    Commits,
    Reflog,
    SubCommits,
    CommitFiles,
    Stash,
    Staging,
    StagingSecondary,
    PatchBuilding,
    MergeConflicts,
    Submodules,
}

impl ViewName {
    pub fn title(self) -> &'static str {
        match self {
            ViewName::Status => "Status",
            ViewName::Files => "Files",
            ViewName::Branches => "Local Branches",
            ViewName::Remotes => "Remotes",
            ViewName::Tags => "Tags",
            ViewName::Worktrees => "Worktrees",
            ViewName::Commits => "Commits",
            ViewName::Reflog => "Reflog",
            ViewName::SubCommits => "Sub-commits",
            ViewName::CommitFiles => "Commit Files",
            ViewName::Stash => "Stash",
            ViewName::Staging => "Unstaged Changes",
            ViewName::StagingSecondary => "Staged Changes",
            ViewName::PatchBuilding => "Patch",
            ViewName::MergeConflicts => "Merge Conflicts",
            ViewName::Submodules => "Submodules",
        }
    }
}

impl fmt::Display for ViewName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

#[derive(Debug, Default)]
struct ViewBuffers {
    content: HashMap<ViewName, Vec<String>>,
    selected: HashMap<ViewName, usize>,
    revision: u64,
}

/// Text buffers the renderer draws from. Written by UI tasks, read by the
/// draw pass; the revision counter tells the event loop a redraw is due.
#[derive(Debug, Clone, Default)]
pub struct Views {
    inner: Arc<Mutex<ViewBuffers>>,
}

impl Views {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked<R>(&self, f: impl FnOnce(&mut ViewBuffers) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn set_content(&self, view: ViewName, lines: Vec<String>) {
        self.locked(|buffers| {
            let len = lines.len();
            buffers.content.insert(view, lines);
            if let Some(selected) = buffers.selected.get_mut(&view) {
                *selected = (*selected).min(len.saturating_sub(1));
            }
            buffers.revision += 1;
        });
    }

    pub fn content(&self, view: ViewName) -> Vec<String> {
        self.locked(|buffers| buffers.content.get(&view).cloned().unwrap_or_default())
    }

    pub fn select(&self, view: ViewName, index: usize) {
        self.locked(|buffers| {
            let len = buffers.content.get(&view).map_or(0, Vec::len);
            buffers.selected.insert(view, index.min(len.saturating_sub(1)));
            buffers.revision += 1;
        });
    }

    pub fn selected(&self, view: ViewName) -> usize {
        self.locked(|buffers| buffers.selected.get(&view).copied().unwrap_or(0))
    }

    pub fn move_selection(&self, view: ViewName, delta: isize) {
        let next = self.selected(view).saturating_add_signed(delta);
        self.select(view, next);
    }

    pub fn revision(&self) -> u64 {
        self.locked(|buffers| buffers.revision)
    }

    /// Forces a redraw without changing content.
    pub fn touch(&self) {
        self.locked(|buffers| buffers.revision += 1);
    }
}
