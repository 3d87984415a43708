use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use tracing::debug;

mod parse;

pub use parse::time_ago;

use crate::loader::{BranchQuery, BranchSortOrder, CommitQuery, ReflogBatch, RepoCommands, RepoLoader};
use crate::model::{
    BisectInfo, Branch, Commit, CommitFile, CommitStatus, File, Remote, StashEntry, Submodule,
    Tag, WorkingTreeState, Worktree,
};

/// Talks to a repository through the `git` binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    work_dir: PathBuf,
}

impl GitCli {
    pub fn open(path: &Path) -> Result<Self> {
        let probe = Self {
            work_dir: path.to_path_buf(),
        };
        let top_level = probe
            .run(&["rev-parse", "--show-toplevel"])
            .with_context(|| format!("{} is not inside a git repository", path.display()))?;
        Ok(Self {
            work_dir: PathBuf::from(top_level.trim()),
        })
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut command = Command::new("git");
        command
            .args(args)
            .current_dir(&self.work_dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_EDITOR", "true")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }

    fn output(&self, args: &[&str]) -> Result<Output> {
        debug!(args = %args.join(" "), "running git");
        self.command(args)
            .output()
            .with_context(|| format!("failed to start git {}", args.join(" ")))
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let output = self.output(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git {} failed: {}", args.join(" "), stderr.trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Like [`GitCli::run`] but treats a non-zero exit as "no output". Used
    /// for probes such as `rev-parse @{u}` where failure is an answer.
    fn run_allow_exit(&self, args: &[&str]) -> Result<Option<String>> {
        let output = self.output(args)?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
    }

    pub fn git_dir(&self) -> Result<PathBuf> {
        let dir = self.run(&["rev-parse", "--absolute-git-dir"])?;
        Ok(PathBuf::from(dir.trim()))
    }

    fn unpushed_hashes(&self, ref_for_pushed_status: &str, ref_name: &str) -> Result<Option<Vec<String>>> {
        let range = format!("{ref_for_pushed_status}..{ref_name}");
        Ok(self
            .run_allow_exit(&["rev-list", &range])?
            .map(|output| output.lines().map(str::to_string).collect()))
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

impl RepoLoader for GitCli {
    fn commits(&self, query: &CommitQuery) -> Result<Vec<Commit>> {
        let limit_arg = query.limit.map(|limit| format!("-{limit}"));
        let mut args = vec!["-c", "log.showSignature=false", "log", query.ref_name.as_str(), "--topo-order", parse::LOG_FORMAT];
        if let Some(limit) = limit_arg.as_deref() {
            args.push(limit);
        }
        args.push("--");
        // An unborn branch has no history yet.
        let Some(output) = self.run_allow_exit(&args)? else {
            return Ok(Vec::new());
        };
        let mut commits = parse::parse_log(&output);

        // Without an upstream everything counts as pushed.
        let unpushed = match &query.ref_for_pushed_status {
            Some(upstream) => self.unpushed_hashes(upstream, &query.ref_name)?.unwrap_or_default(),
            None => Vec::new(),
        };
        for commit in &mut commits {
            commit.status = if unpushed.contains(&commit.hash) {
                CommitStatus::Unpushed
            } else {
                CommitStatus::Pushed
            };
        }

        if query.include_rebase_commits {
            commits = self.merge_rebasing_commits(&commits)?;
        }
        Ok(commits)
    }

    fn merge_rebasing_commits(&self, existing: &[Commit]) -> Result<Vec<Commit>> {
        let mut merged = self.rebasing_commits()?;
        merged.extend(
            existing
                .iter()
                .skip_while(|commit| commit.status == CommitStatus::Rebasing)
                .cloned(),
        );
        Ok(merged)
    }

    fn commit_files(&self, ref_name: &str) -> Result<Vec<CommitFile>> {
        let output = self.run(&["diff-tree", "--no-commit-id", "--name-status", "-r", "--root", ref_name])?;
        Ok(parse::parse_name_status(&output))
    }

    fn branches(&self, query: &BranchQuery) -> Result<Vec<Branch>> {
        let sort = match query.sort_order {
            BranchSortOrder::Alphabetical => "--sort=refname",
            BranchSortOrder::Date | BranchSortOrder::Recency => "--sort=-committerdate",
        };
        let output = self.run(&["for-each-ref", sort, parse::BRANCH_FORMAT, "refs/heads"])?;
        let mut branches: Vec<Branch> = output.lines().filter_map(parse::parse_branch_line).collect();
        if !query.load_behind_counts {
            for branch in &mut branches {
                branch.behind = None;
            }
        }
        let now = now_unix();
        match query.sort_order {
            BranchSortOrder::Recency => Ok(parse::sort_by_recency(branches, &query.reflog, now)),
            BranchSortOrder::Date | BranchSortOrder::Alphabetical => {
                for branch in &mut branches {
                    branch.recency = time_ago(now, branch.unix_timestamp);
                }
                Ok(branches)
            }
        }
    }

    fn reflog(&self, newest_known: Option<&Commit>) -> Result<ReflogBatch> {
        let Some(output) = self.run_allow_exit(&["-c", "log.showSignature=false", "log", "-g", "--abbrev=40", parse::REFLOG_FORMAT])? else {
            return Ok(ReflogBatch::default());
        };
        let (commits, only_new) = parse::parse_reflog(&output, newest_known);
        Ok(ReflogBatch { commits, only_new })
    }

    fn files(&self) -> Result<Vec<File>> {
        let output = self.run(&["status", "--untracked-files=all", "--porcelain", "-z"])?;
        Ok(parse::parse_status(&output))
    }

    fn submodules(&self) -> Result<Vec<Submodule>> {
        let path = self.work_dir.join(".gitmodules");
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
        Ok(parse::parse_gitmodules(&content))
    }

    fn stash(&self) -> Result<Vec<StashEntry>> {
        let output = self.run(&["stash", "list", "--format=%gs"])?;
        Ok(parse::parse_stash(&output))
    }

    fn tags(&self) -> Result<Vec<Tag>> {
        let output = self.run(&["for-each-ref", "--sort=-creatordate", parse::TAG_FORMAT, "refs/tags"])?;
        Ok(parse::parse_tags(&output))
    }

    fn remotes(&self) -> Result<Vec<Remote>> {
        let remotes = self.run(&["remote", "-v"])?;
        let branches = self.run(&["for-each-ref", "--format=%(refname:short)", "refs/remotes"])?;
        Ok(parse::parse_remotes(&remotes, &branches))
    }

    fn worktrees(&self) -> Result<Vec<Worktree>> {
        let output = self.run(&["worktree", "list", "--porcelain"])?;
        Ok(parse::parse_worktrees(&output, &self.work_dir.to_string_lossy()))
    }

    fn bisect_info(&self) -> Result<BisectInfo> {
        let git_dir = self.git_dir()?;
        let Ok(start) = fs::read_to_string(git_dir.join("BISECT_START")) else {
            return Ok(BisectInfo::default());
        };
        let new_hash = self
            .run_allow_exit(&["rev-parse", "--verify", "refs/bisect/bad"])?
            .map(|hash| hash.trim().to_string());
        let current = self
            .run_allow_exit(&["rev-parse", "HEAD"])?
            .map(|hash| hash.trim().to_string());
        Ok(BisectInfo {
            start: Some(start.trim().to_string()),
            new_hash,
            current,
        })
    }

    fn working_tree_state(&self) -> Result<WorkingTreeState> {
        let git_dir = self.git_dir()?;
        let state = if git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists() {
            WorkingTreeState::Rebasing
        } else if git_dir.join("MERGE_HEAD").exists() {
            WorkingTreeState::Merging
        } else if git_dir.join("CHERRY_PICK_HEAD").exists() {
            WorkingTreeState::CherryPicking
        } else if git_dir.join("REVERT_HEAD").exists() {
            WorkingTreeState::Reverting
        } else {
            WorkingTreeState::None
        };
        Ok(state)
    }

    fn checked_out_branch(&self) -> Result<String> {
        if let Some(name) = self.run_allow_exit(&["symbolic-ref", "-q", "--short", "HEAD"])? {
            return Ok(name.trim().to_string());
        }
        let hash = self.run(&["rev-parse", "--short", "HEAD"])?;
        Ok(format!("(HEAD detached at {})", hash.trim()))
    }

    fn repo_name(&self) -> Result<String> {
        Ok(self
            .work_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.work_dir.display().to_string()))
    }

    fn file_diff(&self, path: &str, staged: bool) -> Result<String> {
        let mut args = vec!["diff", "--no-color", "--no-ext-diff"];
        if staged {
            args.push("--cached");
        }
        args.extend(["--", path]);
        let diff = self.run(&args)?;
        if !diff.is_empty() || staged {
            return Ok(diff);
        }
        // Untracked files only show up against /dev/null; that diff exits 1.
        let output = self.output(&["diff", "--no-color", "--no-index", "--", "/dev/null", path])?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn commit_file_diff(&self, ref_name: &str, path: &str) -> Result<String> {
        self.run(&["show", "--no-color", "--format=", ref_name, "--", path])
    }

    fn conflict_marker_count(&self, path: &str) -> Result<usize> {
        let full = self.work_dir.join(path);
        let content = fs::read_to_string(&full).with_context(|| format!("failed to read {}", full.display()))?;
        Ok(parse::count_conflict_markers(&content))
    }
}

impl GitCli {
    fn rebasing_commits(&self) -> Result<Vec<Commit>> {
        let git_dir = self.git_dir()?;
        let todo = git_dir.join("rebase-merge").join("git-rebase-todo");
        match fs::read_to_string(&todo) {
            Ok(content) => Ok(parse::parse_rebase_todo(&content)),
            Err(_) => Ok(Vec::new()),
        }
    }
}

impl RepoCommands for GitCli {
    fn stage(&self, path: &str) -> Result<()> {
        self.run(&["add", "--", path]).map(drop)
    }

    fn unstage(&self, path: &str) -> Result<()> {
        self.run(&["reset", "-q", "HEAD", "--", path]).map(drop)
    }

    fn commit(&self, summary: &str, description: &str) -> Result<()> {
        let mut args = vec!["commit", "-m", summary];
        if !description.trim().is_empty() {
            args.extend(["-m", description]);
        }
        self.run(&args).map(drop)
    }

    fn push(&self, branch: &str) -> Result<()> {
        let upstream = format!("{branch}@{{u}}");
        if self.run_allow_exit(&["rev-parse", "--abbrev-ref", &upstream])?.is_some() {
            self.run(&["push"]).map(drop)
        } else {
            self.run(&["push", "--set-upstream", "origin", branch]).map(drop)
        }
    }

    fn pull(&self, branch: &str) -> Result<()> {
        debug!(branch, "pulling");
        self.run(&["pull", "--no-edit"]).map(drop)
    }

    fn fetch(&self) -> Result<()> {
        self.run(&["fetch", "--all"]).map(drop)
    }

    fn checkout(&self, branch: &str) -> Result<()> {
        self.run(&["checkout", branch]).map(drop)
    }

    fn create_branch(&self, name: &str) -> Result<()> {
        self.run(&["checkout", "-b", name]).map(drop)
    }

    fn delete_branch(&self, name: &str) -> Result<()> {
        self.run(&["branch", "-d", name]).map(drop)
    }

    fn stash_push(&self, message: &str) -> Result<()> {
        let mut args = vec!["stash", "push"];
        if !message.trim().is_empty() {
            args.extend(["-m", message]);
        }
        self.run(&args).map(drop)
    }

    fn continue_rebase(&self) -> Result<()> {
        self.run(&["-c", "core.editor=true", "rebase", "--continue"]).map(drop)
    }
}
