use std::collections::{HashMap, HashSet};

use crate::model::{
    Branch, Commit, CommitFile, CommitStatus, File, Remote, StashEntry, Submodule, Tag, Worktree,
};

pub const FIELD_SEP: char = '\0';

/// `%H %at %aN %ae %p %D %s` joined by NUL.
pub const LOG_FORMAT: &str = "--format=%H%x00%at%x00%aN%x00%ae%x00%p%x00%D%x00%s";
/// `%H %ct %gs %p` joined by NUL.
pub const REFLOG_FORMAT: &str = "--format=%H%x00%ct%x00%gs%x00%p";
pub const BRANCH_FORMAT: &str = "--format=%(HEAD)%00%(refname:short)%00%(upstream:short)%00%(upstream:track)%00%(committerdate:unix)";
pub const TAG_FORMAT: &str = "--format=%(refname:short)%00%(contents:subject)";

pub fn parse_log_line(line: &str) -> Option<Commit> {
    let mut fields = line.splitn(7, FIELD_SEP);
    let hash = fields.next()?.trim().to_string();
    if hash.is_empty() {
        return None;
    }
    let unix_timestamp = fields.next()?.parse().unwrap_or(0);
    let author_name = fields.next()?.to_string();
    let author_email = fields.next()?.to_string();
    let parents = split_words(fields.next()?);
    let tags = fields
        .next()?
        .split(", ")
        .filter_map(|decoration| decoration.strip_prefix("tag: "))
        .map(str::to_string)
        .collect();
    let subject = fields.next().unwrap_or_default().to_string();
    Some(Commit {
        hash,
        author_name,
        author_email,
        unix_timestamp,
        subject,
        parents,
        tags,
        status: CommitStatus::None,
        action: None,
    })
}

pub fn parse_log(output: &str) -> Vec<Commit> {
    output.lines().filter_map(parse_log_line).collect()
}

pub fn parse_reflog_line(line: &str) -> Option<Commit> {
    let mut fields = line.splitn(4, FIELD_SEP);
    let hash = fields.next()?.trim().to_string();
    if hash.is_empty() {
        return None;
    }
    let unix_timestamp = fields.next()?.parse().unwrap_or(0);
    let subject = fields.next()?.to_string();
    let parents = split_words(fields.next().unwrap_or_default());
    Some(Commit {
        hash,
        unix_timestamp,
        subject,
        parents,
        status: CommitStatus::Reflog,
        ..Commit::default()
    })
}

/// Parses reflog output, stopping at `newest_known`. The flag is `true` when
/// that entry was reached, so only newer entries were returned.
pub fn parse_reflog(output: &str, newest_known: Option<&Commit>) -> (Vec<Commit>, bool) {
    let mut commits = Vec::new();
    for commit in output.lines().filter_map(parse_reflog_line) {
        if let Some(known) = newest_known
            && commit.same_reflog_entry(known)
        {
            return (commits, true);
        }
        commits.push(commit);
    }
    (commits, false)
}

pub fn parse_branch_line(line: &str) -> Option<Branch> {
    let fields: Vec<&str> = line.split(FIELD_SEP).collect();
    if fields.len() < 5 || fields[1].is_empty() {
        return None;
    }
    let upstream = Some(fields[2]).filter(|name| !name.is_empty()).map(str::to_string);
    let (ahead, behind, upstream_gone) = parse_track(upstream.is_some(), fields[3]);
    Some(Branch {
        name: fields[1].trim_start_matches("heads/").to_string(),
        head: fields[0] == "*",
        upstream,
        ahead,
        behind,
        upstream_gone,
        recency: String::new(),
        unix_timestamp: fields[4].trim().parse().unwrap_or(0),
        worktree: None,
    })
}

/// Parses `%(upstream:track)` such as `[ahead 2, behind 1]` or `[gone]`.
pub fn parse_track(has_upstream: bool, track: &str) -> (Option<usize>, Option<usize>, bool) {
    if !has_upstream {
        return (None, None, false);
    }
    if track == "[gone]" {
        return (None, None, true);
    }
    let inner = track.trim_start_matches('[').trim_end_matches(']');
    let mut ahead = 0;
    let mut behind = 0;
    for part in inner.split(", ") {
        if let Some(count) = part.strip_prefix("ahead ") {
            ahead = count.trim().parse().unwrap_or(0);
        } else if let Some(count) = part.strip_prefix("behind ") {
            behind = count.trim().parse().unwrap_or(0);
        }
    }
    (Some(ahead), Some(behind), false)
}

/// Branch names in the order they were last checked out, with the time of
/// that checkout.
pub fn reflog_branch_recency(reflog: &[Commit]) -> Vec<(String, i64)> {
    let mut seen = HashSet::new();
    let mut ordered = Vec::new();
    for commit in reflog {
        let Some(rest) = commit.subject.strip_prefix("checkout: moving from ") else {
            continue;
        };
        let Some((from, to)) = rest.split_once(" to ") else {
            continue;
        };
        for name in [to.trim(), from.trim()] {
            if !name.is_empty() && seen.insert(name.to_string()) {
                ordered.push((name.to_string(), commit.unix_timestamp));
            }
        }
    }
    ordered
}

/// Orders branches by reflog recency: the checked out branch first, then
/// recently visited branches, then the rest by commit date.
pub fn sort_by_recency(mut branches: Vec<Branch>, reflog: &[Commit], now: i64) -> Vec<Branch> {
    let recency = reflog_branch_recency(reflog);
    let rank: HashMap<&str, usize> = recency
        .iter()
        .enumerate()
        .map(|(idx, (name, _))| (name.as_str(), idx))
        .collect();
    for branch in &mut branches {
        branch.recency = match recency.iter().find(|(name, _)| *name == branch.name) {
            Some((_, timestamp)) => time_ago(now, *timestamp),
            None => String::new(),
        };
    }
    branches.sort_by(|left, right| {
        right
            .head
            .cmp(&left.head)
            .then_with(|| {
                let left_rank = rank.get(left.name.as_str()).copied().unwrap_or(usize::MAX);
                let right_rank = rank.get(right.name.as_str()).copied().unwrap_or(usize::MAX);
                left_rank.cmp(&right_rank)
            })
            .then_with(|| right.unix_timestamp.cmp(&left.unix_timestamp))
    });
    branches
}

pub fn time_ago(now: i64, timestamp: i64) -> String {
    const PERIODS: [(&str, i64); 7] = [
        ("y", 60 * 60 * 24 * 365),
        ("M", 60 * 60 * 24 * 30),
        ("w", 60 * 60 * 24 * 7),
        ("d", 60 * 60 * 24),
        ("h", 60 * 60),
        ("m", 60),
        ("s", 1),
    ];
    let elapsed = (now - timestamp).max(0);
    for (label, seconds) in PERIODS {
        if elapsed >= seconds {
            return format!("{}{label}", elapsed / seconds);
        }
    }
    "0s".to_string()
}

/// Parses `git status --porcelain -z`. Renames carry the old path as an
/// extra NUL-terminated field.
pub fn parse_status(output: &str) -> Vec<File> {
    let mut files = Vec::new();
    let mut entries = output.split(FIELD_SEP).filter(|entry| !entry.is_empty());
    while let Some(entry) = entries.next() {
        if entry.len() < 4 {
            continue;
        }
        let (short_status, path) = entry.split_at(2);
        let path = path[1..].to_string();
        let previous_path = if short_status.starts_with('R') || short_status.starts_with('C') {
            entries.next().map(str::to_string)
        } else {
            None
        };
        files.push(file_from_status(short_status, path, previous_path));
    }
    files
}

fn file_from_status(short_status: &str, path: String, previous_path: Option<String>) -> File {
    let mut chars = short_status.chars();
    let index = chars.next().unwrap_or(' ');
    let worktree = chars.next().unwrap_or(' ');
    let has_merge_conflicts = matches!(
        short_status,
        "DD" | "AA" | "UU" | "AU" | "UA" | "UD" | "DU"
    );
    File {
        path,
        previous_path,
        short_status: short_status.to_string(),
        has_staged_changes: !matches!(index, ' ' | 'U' | '?'),
        has_unstaged_changes: worktree != ' ',
        tracked: !matches!(short_status, "??" | "A " | "AM"),
        has_merge_conflicts,
        has_inline_merge_conflicts: matches!(short_status, "UU" | "AA"),
    }
}

pub fn parse_stash(output: &str) -> Vec<StashEntry> {
    output
        .lines()
        .enumerate()
        .map(|(index, name)| StashEntry {
            index,
            name: name.to_string(),
        })
        .collect()
}

pub fn parse_tags(output: &str) -> Vec<Tag> {
    output
        .lines()
        .filter_map(|line| {
            let (name, message) = line.split_once(FIELD_SEP).unwrap_or((line, ""));
            (!name.is_empty()).then(|| Tag {
                name: name.to_string(),
                message: message.to_string(),
            })
        })
        .collect()
}

/// Builds remotes from `git remote -v` and the short names of
/// `refs/remotes`.
pub fn parse_remotes(remote_output: &str, remote_branches: &str) -> Vec<Remote> {
    let mut remotes: Vec<Remote> = Vec::new();
    for line in remote_output.lines() {
        let mut parts = line.split_whitespace();
        let (Some(name), Some(url)) = (parts.next(), parts.next()) else {
            continue;
        };
        match remotes.iter_mut().find(|remote| remote.name == name) {
            Some(remote) => {
                if !remote.urls.iter().any(|known| known == url) {
                    remote.urls.push(url.to_string());
                }
            }
            None => remotes.push(Remote {
                name: name.to_string(),
                urls: vec![url.to_string()],
                branches: Vec::new(),
            }),
        }
    }
    for line in remote_branches.lines() {
        let Some((remote_name, branch)) = line.trim().split_once('/') else {
            continue;
        };
        if branch == "HEAD" {
            continue;
        }
        if let Some(remote) = remotes.iter_mut().find(|remote| remote.name == remote_name) {
            remote.branches.push(branch.to_string());
        }
    }
    remotes
}

pub fn parse_worktrees(output: &str, current_path: &str) -> Vec<Worktree> {
    let mut worktrees = Vec::new();
    for block in output.split("\n\n") {
        let mut path = None;
        let mut head = String::new();
        let mut branch = None;
        for line in block.lines() {
            if let Some(value) = line.strip_prefix("worktree ") {
                path = Some(value.to_string());
            } else if let Some(value) = line.strip_prefix("HEAD ") {
                head = value.to_string();
            } else if let Some(value) = line.strip_prefix("branch ") {
                branch = Some(value.trim_start_matches("refs/heads/").to_string());
            }
        }
        let Some(path) = path else {
            continue;
        };
        worktrees.push(Worktree {
            is_main: worktrees.is_empty(),
            is_current: path == current_path,
            path,
            branch,
            head,
        });
    }
    worktrees
}

pub fn parse_gitmodules(content: &str) -> Vec<Submodule> {
    let mut submodules = Vec::new();
    let mut current: Option<Submodule> = None;
    for line in content.lines().map(str::trim) {
        if let Some(header) = line.strip_prefix("[submodule \"") {
            if let Some(done) = current.take() {
                submodules.push(done);
            }
            current = Some(Submodule {
                name: header.trim_end_matches("\"]").to_string(),
                path: String::new(),
                url: String::new(),
            });
            continue;
        }
        let Some(submodule) = current.as_mut() else {
            continue;
        };
        if let Some((key, value)) = line.split_once('=') {
            match key.trim() {
                "path" => submodule.path = value.trim().to_string(),
                "url" => submodule.url = value.trim().to_string(),
                _ => {}
            }
        }
    }
    if let Some(done) = current {
        submodules.push(done);
    }
    submodules
}

pub fn parse_name_status(output: &str) -> Vec<CommitFile> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split('\t');
            let status = parts.next()?.trim();
            // Renames list old and new path; the new one is what exists.
            let path = parts.last()?;
            (!status.is_empty()).then(|| CommitFile {
                path: path.to_string(),
                change_status: status.chars().next().unwrap_or('M').to_string(),
            })
        })
        .collect()
}

/// Parses a `git-rebase-todo` file into the commits still to be applied,
/// newest first like `git log`.
pub fn parse_rebase_todo(content: &str) -> Vec<Commit> {
    let mut commits: Vec<Commit> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut parts = line.splitn(3, ' ');
            let action = parts.next()?;
            if matches!(action, "exec" | "x" | "break" | "b" | "label" | "l" | "reset" | "t") {
                return None;
            }
            let hash = parts.next()?.to_string();
            Some(Commit {
                hash,
                subject: parts.next().unwrap_or_default().to_string(),
                status: CommitStatus::Rebasing,
                action: Some(action.to_string()),
                ..Commit::default()
            })
        })
        .collect();
    commits.reverse();
    commits
}

pub fn count_conflict_markers(content: &str) -> usize {
    content
        .lines()
        .filter(|line| line.starts_with("<<<<<<< "))
        .count()
}

fn split_words(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}
