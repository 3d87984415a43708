use std::collections::BTreeSet;
use std::fmt;

/// A unit of shared repository state that is reloaded as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resource {
    Commits,
    SubCommits,
    CommitFiles,
    Branches,
    Files,
    Submodules,
    Stash,
    Reflog,
    Tags,
    Remotes,
    Worktrees,
    Status,
    BisectInfo,
    Staging,
    PatchBuilding,
    MergeConflicts,
    RebaseCommits,
}

impl Resource {
    pub const ALL: [Resource; 17] = [
        Resource::Commits,
        Resource::SubCommits,
        Resource::CommitFiles,
        Resource::Branches,
        Resource::Files,
        Resource::Submodules,
        Resource::Stash,
        Resource::Reflog,
        Resource::Tags,
        Resource::Remotes,
        Resource::Worktrees,
        Resource::Status,
        Resource::BisectInfo,
        Resource::Staging,
        Resource::PatchBuilding,
        Resource::MergeConflicts,
        Resource::RebaseCommits,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Resource::Commits => "commits",
            Resource::SubCommits => "subCommits",
            Resource::CommitFiles => "commitFiles",
            Resource::Branches => "branches",
            Resource::Files => "files",
            Resource::Submodules => "submodules",
            Resource::Stash => "stash",
            Resource::Reflog => "reflog",
            Resource::Tags => "tags",
            Resource::Remotes => "remotes",
            Resource::Worktrees => "worktrees",
            Resource::Status => "status",
            Resource::BisectInfo => "bisect",
            Resource::Staging => "staging",
            Resource::PatchBuilding => "patchBuilding",
            Resource::MergeConflicts => "mergeConflicts",
            Resource::RebaseCommits => "rebaseCommits",
        }
    }

    /// Staging and patch building are only meaningful while focused, and
    /// expensive, so they are left out of the default scope.
    fn in_default_scope(self) -> bool {
        !matches!(self, Resource::Staging | Resource::PatchBuilding)
    }
}

/// The set of resources one refresh request targets. Empty means the
/// default scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshScope(BTreeSet<Resource>);

impl RefreshScope {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only(resources: impl IntoIterator<Item = Resource>) -> Self {
        resources.into_iter().collect()
    }

    pub fn is_default(&self) -> bool {
        self.0.is_empty()
    }

    /// The resources this scope actually refreshes.
    pub fn resolve(&self) -> BTreeSet<Resource> {
        if self.0.is_empty() {
            Resource::ALL
                .into_iter()
                .filter(|resource| resource.in_default_scope())
                .collect()
        } else {
            self.0.clone()
        }
    }
}

impl FromIterator<Resource> for RefreshScope {
    fn from_iter<I: IntoIterator<Item = Resource>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for RefreshScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("all");
        }
        let names: Vec<&str> = self.0.iter().map(|resource| resource.name()).collect();
        f.write_str(&names.join(","))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshMode {
    /// Units run concurrently on workers; the caller waits for all of them.
    #[default]
    Sync,
    /// Units are submitted to workers and the caller returns immediately.
    Async,
    /// The whole refresh runs as one UI task, so no input is processed
    /// until it completes.
    BlockUi,
}

impl RefreshMode {
    pub fn name(self) -> &'static str {
        match self {
            RefreshMode::Sync => "sync",
            RefreshMode::Async => "async",
            RefreshMode::BlockUi => "block-ui",
        }
    }
}
