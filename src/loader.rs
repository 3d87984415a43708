use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::model::{
    BisectInfo, Branch, Commit, CommitFile, File, Remote, StashEntry, Submodule, Tag,
    WorkingTreeState, Worktree,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchSortOrder {
    #[default]
    Recency,
    Date,
    Alphabetical,
}

impl BranchSortOrder {
    pub fn name(self) -> &'static str {
        match self {
            BranchSortOrder::Recency => "recency",
            BranchSortOrder::Date => "date",
            BranchSortOrder::Alphabetical => "alphabetical",
        }
    }

    pub fn next(self) -> Self {
        match self {
            BranchSortOrder::Recency => BranchSortOrder::Alphabetical,
            BranchSortOrder::Alphabetical => BranchSortOrder::Date,
            BranchSortOrder::Date => BranchSortOrder::Recency,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitQuery {
    pub limit: Option<usize>,
    pub ref_name: String,
    /// Ref whose history counts as pushed; usually the upstream.
    pub ref_for_pushed_status: Option<String>,
    pub include_rebase_commits: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchQuery {
    pub sort_order: BranchSortOrder,
    /// Reflog used to compute recency; only read for recency sorting.
    pub reflog: Vec<Commit>,
    pub load_behind_counts: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReflogBatch {
    pub commits: Vec<Commit>,
    /// `true` when `commits` only holds entries newer than the requested
    /// head, so they must be prepended rather than replace the list.
    pub only_new: bool,
}

/// One loader per refreshable resource. Every method runs on a worker thread
/// outside any model lock.
pub trait RepoLoader: Send + Sync {
    fn commits(&self, query: &CommitQuery) -> Result<Vec<Commit>>;
    /// Merges the pending rebase todo into an existing commit list.
    fn merge_rebasing_commits(&self, existing: &[Commit]) -> Result<Vec<Commit>>;
    fn commit_files(&self, ref_name: &str) -> Result<Vec<CommitFile>>;
    fn branches(&self, query: &BranchQuery) -> Result<Vec<Branch>>;
    /// Loads reflog entries, stopping at `newest_known` when given.
    fn reflog(&self, newest_known: Option<&Commit>) -> Result<ReflogBatch>;
    fn files(&self) -> Result<Vec<File>>;
    fn submodules(&self) -> Result<Vec<Submodule>>;
    fn stash(&self) -> Result<Vec<StashEntry>>;
    fn tags(&self) -> Result<Vec<Tag>>;
    fn remotes(&self) -> Result<Vec<Remote>>;
    fn worktrees(&self) -> Result<Vec<Worktree>>;
    fn bisect_info(&self) -> Result<BisectInfo>;
    fn working_tree_state(&self) -> Result<WorkingTreeState>;
    fn checked_out_branch(&self) -> Result<String>;
    fn repo_name(&self) -> Result<String>;
    fn file_diff(&self, path: &str, staged: bool) -> Result<String>;
    fn commit_file_diff(&self, ref_name: &str, path: &str) -> Result<String>;
    fn conflict_marker_count(&self, path: &str) -> Result<usize>;
}

/// Mutating git operations issued by key handlers.
pub trait RepoCommands: Send + Sync {
    fn stage(&self, path: &str) -> Result<()>;
    fn unstage(&self, path: &str) -> Result<()>;
    fn commit(&self, summary: &str, description: &str) -> Result<()>;
    fn push(&self, branch: &str) -> Result<()>;
    fn pull(&self, branch: &str) -> Result<()>;
    fn fetch(&self) -> Result<()>;
    fn checkout(&self, branch: &str) -> Result<()>;
    fn create_branch(&self, name: &str) -> Result<()>;
    fn delete_branch(&self, name: &str) -> Result<()>;
    fn stash_push(&self, message: &str) -> Result<()>;
    fn continue_rebase(&self) -> Result<()>;
}
