use std::collections::BTreeSet;

use crate::loader::BranchSortOrder;
use crate::resource::Resource;

/// One reload unit. A unit may cover several resources when their data
/// depends on each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnitKind {
    CommitsAndCommitFiles,
    ReflogAndBranches,
    Branches,
    Reflog,
    RebaseCommits,
    SubCommits,
    CommitFiles,
    FilesAndSubmodules,
    Stash,
    Tags,
    Remotes,
    Worktrees,
    Staging,
    PatchBuilding,
    MergeConflicts,
    Status,
}

impl UnitKind {
    pub fn name(self) -> &'static str {
        match self {
            UnitKind::CommitsAndCommitFiles => "commits and commit files",
            UnitKind::ReflogAndBranches => "reflog and branches",
            UnitKind::Branches => "branches",
            UnitKind::Reflog => "reflog",
            UnitKind::RebaseCommits => "rebase commits",
            UnitKind::SubCommits => "sub commits",
            UnitKind::CommitFiles => "commit files",
            UnitKind::FilesAndSubmodules => "files",
            UnitKind::Stash => "stash",
            UnitKind::Tags => "tags",
            UnitKind::Remotes => "remotes",
            UnitKind::Worktrees => "worktrees",
            UnitKind::Staging => "staging",
            UnitKind::PatchBuilding => "patch building",
            UnitKind::MergeConflicts => "merge conflicts",
            UnitKind::Status => "status",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUnit {
    pub kind: UnitKind,
    /// Units that must finish before this one starts.
    pub depends_on: Vec<UnitKind>,
}

/// The units one refresh dispatches, in dispatch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshPlan {
    units: Vec<PlannedUnit>,
    /// Worktrees are loaded by the branches unit so branch rows can show
    /// which worktree has them checked out.
    pub worktrees_in_branches: bool,
}

impl RefreshPlan {
    pub fn build(scope: &BTreeSet<Resource>, sort_order: BranchSortOrder) -> Self {
        let has = |resource: Resource| scope.contains(&resource);
        let mut plan = Self {
            units: Vec::new(),
            worktrees_in_branches: false,
        };

        if has(Resource::Commits) || has(Resource::Branches) || has(Resource::Reflog) || has(Resource::BisectInfo) {
            plan.push(UnitKind::CommitsAndCommitFiles);
            plan.worktrees_in_branches = has(Resource::Worktrees);
            if sort_order == BranchSortOrder::Recency {
                plan.push(UnitKind::ReflogAndBranches);
            } else {
                plan.push(UnitKind::Branches);
                plan.push(UnitKind::Reflog);
            }
        } else if has(Resource::RebaseCommits) {
            plan.push(UnitKind::RebaseCommits);
        }

        if has(Resource::SubCommits) {
            plan.push(UnitKind::SubCommits);
        }
        if has(Resource::CommitFiles) && !has(Resource::Commits) {
            plan.push(UnitKind::CommitFiles);
        }
        if has(Resource::Files) || has(Resource::Submodules) {
            plan.push(UnitKind::FilesAndSubmodules);
        }
        if has(Resource::Stash) {
            plan.push(UnitKind::Stash);
        }
        if has(Resource::Tags) {
            plan.push(UnitKind::Tags);
        }
        if has(Resource::Remotes) {
            plan.push(UnitKind::Remotes);
        }
        if has(Resource::Worktrees) && !plan.worktrees_in_branches {
            plan.push(UnitKind::Worktrees);
        }
        if has(Resource::Staging) {
            plan.push_after(UnitKind::Staging, &[UnitKind::FilesAndSubmodules]);
        }
        if has(Resource::PatchBuilding) {
            plan.push(UnitKind::PatchBuilding);
        }
        if has(Resource::Files) || has(Resource::MergeConflicts) {
            plan.push_after(UnitKind::MergeConflicts, &[UnitKind::FilesAndSubmodules]);
        }

        let everything: Vec<UnitKind> = plan.units.iter().map(|unit| unit.kind).collect();
        plan.units.push(PlannedUnit {
            kind: UnitKind::Status,
            depends_on: everything,
        });
        plan
    }

    fn push(&mut self, kind: UnitKind) {
        self.push_after(kind, &[]);
    }

    /// Adds `kind`, keeping only dependencies that are part of this plan.
    fn push_after(&mut self, kind: UnitKind, after: &[UnitKind]) {
        let depends_on = after.iter().copied().filter(|dep| self.contains(*dep)).collect();
        self.units.push(PlannedUnit { kind, depends_on });
    }

    pub fn units(&self) -> &[PlannedUnit] {
        &self.units
    }

    pub fn kinds(&self) -> Vec<UnitKind> {
        self.units.iter().map(|unit| unit.kind).collect()
    }

    pub fn contains(&self, kind: UnitKind) -> bool {
        self.units.iter().any(|unit| unit.kind == kind)
    }

    pub fn unit(&self, kind: UnitKind) -> Option<&PlannedUnit> {
        self.units.iter().find(|unit| unit.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
