use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitStatus {
    #[default]
    None,
    Pushed,
    Unpushed,
    Merged,
    Rebasing,
    Reflog,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Commit {
    pub hash: String,
    pub author_name: String,
    pub author_email: String,
    pub unix_timestamp: i64,
    pub subject: String,
    pub parents: Vec<String>,
    pub tags: Vec<String>,
    pub status: CommitStatus,
    /// Rebase todo action (`pick`, `fixup`, ...) for commits still to be
    /// applied.
    pub action: Option<String>,
}

impl Commit {
    pub fn short_hash(&self) -> &str {
        let end = self
            .hash
            .char_indices()
            .nth(7)
            .map(|(idx, _)| idx)
            .unwrap_or(self.hash.len());
        &self.hash[..end]
    }

    /// Reflog entries can repeat hashes, so identity includes the timestamp.
    pub fn same_reflog_entry(&self, other: &Commit) -> bool {
        self.hash == other.hash && self.unix_timestamp == other.unix_timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitFile {
    pub path: String,
    pub change_status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Branch {
    pub name: String,
    pub head: bool,
    pub upstream: Option<String>,
    pub ahead: Option<usize>,
    pub behind: Option<usize>,
    pub upstream_gone: bool,
    pub recency: String,
    pub unix_timestamp: i64,
    pub worktree: Option<String>,
}

impl Branch {
    pub fn urn(&self) -> String {
        format!("branch-{}", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct File {
    pub path: String,
    pub previous_path: Option<String>,
    /// Two-letter porcelain status, index column first.
    pub short_status: String,
    pub has_staged_changes: bool,
    pub has_unstaged_changes: bool,
    pub tracked: bool,
    pub has_merge_conflicts: bool,
    pub has_inline_merge_conflicts: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submodule {
    pub name: String,
    pub path: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StashEntry {
    pub index: usize,
    pub name: String,
}

impl StashEntry {
    pub fn ref_name(&self) -> String {
        format!("stash@{{{}}}", self.index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub message: String,
}

impl Tag {
    pub fn urn(&self) -> String {
        format!("tag-{}", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    pub name: String,
    pub urls: Vec<String>,
    pub branches: Vec<String>,
}

impl Remote {
    pub fn urn(&self) -> String {
        format!("remote-{}", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worktree {
    pub path: String,
    pub branch: Option<String>,
    pub head: String,
    pub is_main: bool,
    pub is_current: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BisectInfo {
    /// Ref that was checked out when the bisect started.
    pub start: Option<String>,
    pub new_hash: Option<String>,
    pub current: Option<String>,
}

impl BisectInfo {
    pub fn started(&self) -> bool {
        self.start.is_some()
    }

    pub fn bisecting(&self) -> bool {
        self.started() && self.new_hash.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkingTreeState {
    #[default]
    None,
    Rebasing,
    Merging,
    CherryPicking,
    Reverting,
}

impl WorkingTreeState {
    pub fn label(self) -> Option<&'static str> {
        match self {
            WorkingTreeState::None => None,
            WorkingTreeState::Rebasing => Some("rebasing"),
            WorkingTreeState::Merging => Some("merging"),
            WorkingTreeState::CherryPicking => Some("cherry-picking"),
            WorkingTreeState::Reverting => Some("reverting"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Default)]
pub struct CommitsState {
    pub commits: Vec<Commit>,
    pub checked_out_branch: String,
    pub working_tree_state: WorkingTreeState,
}

#[derive(Debug, Default)]
pub struct SubCommitsState {
    pub ref_name: Option<String>,
    pub commits: Vec<Commit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitFilesSource {
    LocalCommits,
    SubCommits,
    Stash,
    Reflog,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitFilesTarget {
    pub ref_name: String,
    pub source: CommitFilesSource,
}

#[derive(Debug, Default)]
pub struct CommitFilesState {
    pub target: Option<CommitFilesTarget>,
    pub files: Vec<CommitFile>,
}

#[derive(Debug, Default)]
pub struct FilesState {
    pub files: Vec<File>,
    pub submodules: Vec<Submodule>,
}

impl FilesState {
    pub fn conflict_count(&self) -> usize {
        self.files.iter().filter(|file| file.has_merge_conflicts).count()
    }
}

#[derive(Debug, Default)]
pub struct StagingState {
    pub path: Option<String>,
    pub unstaged_diff: String,
    pub staged_diff: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchTarget {
    pub ref_name: String,
    pub path: String,
}

#[derive(Debug, Default)]
pub struct PatchBuildingState {
    pub target: Option<PatchTarget>,
    pub diff: String,
}

#[derive(Debug, Default)]
pub struct MergeConflictsState {
    /// File the user is resolving; falls back to the first conflicted file.
    pub path: Option<String>,
    pub conflict_count: usize,
}

/// Shared repository state. Each resource category sits behind its own lock
/// and is reachable only through the matching `with_*` accessor, which holds
/// the lock for the duration of the closure.
#[derive(Debug, Default)]
pub struct Model {
    commits: Mutex<CommitsState>,
    sub_commits: Mutex<SubCommitsState>,
    commit_files: Mutex<CommitFilesState>,
    branches: Mutex<Vec<Branch>>,
    files: Mutex<FilesState>,
    stash: Mutex<Vec<StashEntry>>,
    reflog: Mutex<Vec<Commit>>,
    tags: Mutex<Vec<Tag>>,
    remotes: Mutex<Vec<Remote>>,
    worktrees: Mutex<Vec<Worktree>>,
    status: Mutex<String>,
    bisect: Mutex<BisectInfo>,
    staging: Mutex<StagingState>,
    patch_building: Mutex<PatchBuildingState>,
    merge_conflicts: Mutex<MergeConflictsState>,
    authors: Mutex<BTreeMap<String, Author>>,
}

/// A unit that panicked mid-swap must not wedge the resource for everyone
/// else, so poisoning is ignored.
fn locked<T, R>(lock: &Mutex<T>, f: impl FnOnce(&mut T) -> R) -> R {
    let mut guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_commits<R>(&self, f: impl FnOnce(&mut CommitsState) -> R) -> R {
        locked(&self.commits, f)
    }

    pub fn with_sub_commits<R>(&self, f: impl FnOnce(&mut SubCommitsState) -> R) -> R {
        locked(&self.sub_commits, f)
    }

    pub fn with_commit_files<R>(&self, f: impl FnOnce(&mut CommitFilesState) -> R) -> R {
        locked(&self.commit_files, f)
    }

    pub fn with_branches<R>(&self, f: impl FnOnce(&mut Vec<Branch>) -> R) -> R {
        locked(&self.branches, f)
    }

    pub fn with_files<R>(&self, f: impl FnOnce(&mut FilesState) -> R) -> R {
        locked(&self.files, f)
    }

    pub fn with_stash<R>(&self, f: impl FnOnce(&mut Vec<StashEntry>) -> R) -> R {
        locked(&self.stash, f)
    }

    pub fn with_reflog<R>(&self, f: impl FnOnce(&mut Vec<Commit>) -> R) -> R {
        locked(&self.reflog, f)
    }

    pub fn with_tags<R>(&self, f: impl FnOnce(&mut Vec<Tag>) -> R) -> R {
        locked(&self.tags, f)
    }

    pub fn with_remotes<R>(&self, f: impl FnOnce(&mut Vec<Remote>) -> R) -> R {
        locked(&self.remotes, f)
    }

    pub fn with_worktrees<R>(&self, f: impl FnOnce(&mut Vec<Worktree>) -> R) -> R {
        locked(&self.worktrees, f)
    }

    pub fn with_status<R>(&self, f: impl FnOnce(&mut String) -> R) -> R {
        locked(&self.status, f)
    }

    pub fn with_bisect<R>(&self, f: impl FnOnce(&mut BisectInfo) -> R) -> R {
        locked(&self.bisect, f)
    }

    pub fn with_staging<R>(&self, f: impl FnOnce(&mut StagingState) -> R) -> R {
        locked(&self.staging, f)
    }

    pub fn with_patch_building<R>(&self, f: impl FnOnce(&mut PatchBuildingState) -> R) -> R {
        locked(&self.patch_building, f)
    }

    pub fn with_merge_conflicts<R>(&self, f: impl FnOnce(&mut MergeConflictsState) -> R) -> R {
        locked(&self.merge_conflicts, f)
    }

    pub fn with_authors<R>(&self, f: impl FnOnce(&mut BTreeMap<String, Author>) -> R) -> R {
        locked(&self.authors, f)
    }

    pub fn commits(&self) -> Vec<Commit> {
        self.with_commits(|state| state.commits.clone())
    }

    pub fn branches(&self) -> Vec<Branch> {
        self.with_branches(|branches| branches.clone())
    }

    pub fn files(&self) -> Vec<File> {
        self.with_files(|state| state.files.clone())
    }

    pub fn checked_out_branch(&self) -> Option<Branch> {
        self.with_branches(|branches| branches.iter().find(|branch| branch.head).cloned())
    }
}
