use super::*;
use crate::exec::{self, UiQueue};
use crate::inline_status::ItemOperations;
use crate::loader::{BranchQuery, CommitQuery, ReflogBatch, RepoLoader};
use crate::model::{
    BisectInfo, CommitFile, Remote, StashEntry, Submodule, Tag, WorkingTreeState, Worktree,
};
use crate::popup::PopupLayout;
use crate::presentation::{Presenter, Spinner};
use crate::refresh::RefresherConfig;
use pretty_assertions::assert_eq;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

struct StubRepo {
    files: Vec<File>,
    fail_fetch: bool,
    calls: Mutex<Vec<String>>,
}

impl StubRepo {
    fn new() -> Self {
        Self {
            files: vec![
                File {
                    path: "a.txt".into(),
                    short_status: " M".into(),
                    has_unstaged_changes: true,
                    tracked: true,
                    ..File::default()
                },
                File {
                    path: "b.txt".into(),
                    short_status: "M ".into(),
                    has_staged_changes: true,
                    tracked: true,
                    ..File::default()
                },
            ],
            fail_fetch: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, call: String) -> Result<()> {
        self.calls.lock().expect("calls").push(call);
        Ok(())
    }
}

impl RepoLoader for StubRepo {
    fn commits(&self, _query: &CommitQuery) -> Result<Vec<Commit>> {
        Ok(vec![
            Commit {
                hash: "1111111aaaa".into(),
                subject: "second".into(),
                ..Commit::default()
            },
            Commit {
                hash: "2222222bbbb".into(),
                subject: "first".into(),
                ..Commit::default()
            },
        ])
    }

    fn merge_rebasing_commits(&self, existing: &[Commit]) -> Result<Vec<Commit>> {
        Ok(existing.to_vec())
    }

    fn commit_files(&self, ref_name: &str) -> Result<Vec<CommitFile>> {
        Ok(vec![CommitFile {
            path: format!("{ref_name}.rs"),
            change_status: "M".into(),
        }])
    }

    fn branches(&self, _query: &BranchQuery) -> Result<Vec<Branch>> {
        Ok(vec![
            Branch {
                name: "main".into(),
                head: true,
                ..Branch::default()
            },
            Branch {
                name: "feature".into(),
                ..Branch::default()
            },
        ])
    }

    fn reflog(&self, _newest_known: Option<&Commit>) -> Result<ReflogBatch> {
        Ok(ReflogBatch::default())
    }

    fn files(&self) -> Result<Vec<File>> {
        Ok(self.files.clone())
    }

    fn submodules(&self) -> Result<Vec<Submodule>> {
        Ok(Vec::new())
    }

    fn stash(&self) -> Result<Vec<StashEntry>> {
        Ok(Vec::new())
    }

    fn tags(&self) -> Result<Vec<Tag>> {
        Ok(Vec::new())
    }

    fn remotes(&self) -> Result<Vec<Remote>> {
        Ok(vec![Remote {
            name: "origin".into(),
            urls: vec!["git@example.com:repo.git".into()],
            branches: vec!["main".into(), "release".into()],
        }])
    }

    fn worktrees(&self) -> Result<Vec<Worktree>> {
        Ok(Vec::new())
    }

    fn bisect_info(&self) -> Result<BisectInfo> {
        Ok(BisectInfo::default())
    }

    fn working_tree_state(&self) -> Result<WorkingTreeState> {
        Ok(WorkingTreeState::None)
    }

    fn checked_out_branch(&self) -> Result<String> {
        Ok("main".into())
    }

    fn repo_name(&self) -> Result<String> {
        Ok("repo".into())
    }

    fn file_diff(&self, path: &str, staged: bool) -> Result<String> {
        Ok(format!("diff {path} staged={staged}"))
    }

    fn commit_file_diff(&self, _ref_name: &str, _path: &str) -> Result<String> {
        Ok(String::new())
    }

    fn conflict_marker_count(&self, _path: &str) -> Result<usize> {
        Ok(0)
    }
}

impl RepoCommands for StubRepo {
    fn stage(&self, path: &str) -> Result<()> {
        self.record(format!("stage {path}"))
    }

    fn unstage(&self, path: &str) -> Result<()> {
        self.record(format!("unstage {path}"))
    }

    fn commit(&self, summary: &str, description: &str) -> Result<()> {
        self.record(format!("commit {summary}|{description}"))
    }

    fn push(&self, branch: &str) -> Result<()> {
        self.record(format!("push {branch}"))
    }

    fn pull(&self, branch: &str) -> Result<()> {
        self.record(format!("pull {branch}"))
    }

    fn fetch(&self) -> Result<()> {
        self.record("fetch".into())?;
        if self.fail_fetch {
            bail!("could not read from remote");
        }
        Ok(())
    }

    fn checkout(&self, branch: &str) -> Result<()> {
        self.record(format!("checkout {branch}"))
    }

    fn create_branch(&self, name: &str) -> Result<()> {
        self.record(format!("create {name}"))
    }

    fn delete_branch(&self, name: &str) -> Result<()> {
        self.record(format!("delete {name}"))
    }

    fn stash_push(&self, message: &str) -> Result<()> {
        self.record(format!("stash {message}"))
    }

    fn continue_rebase(&self) -> Result<()> {
        self.record("continue rebase".into())
    }
}

struct Harness {
    app: App,
    queue: UiQueue,
    repo: Arc<StubRepo>,
}

impl Harness {
    fn new() -> Self {
        Self::with_repo(StubRepo::new())
    }

    fn with_repo(repo: StubRepo) -> Self {
        let (executor, queue) = exec::channel();
        let repo = Arc::new(repo);
        let model = Arc::new(Model::new());
        let views = Views::new();
        let operations = ItemOperations::new();
        let presenter = Presenter::new(
            model.clone(),
            views.clone(),
            operations.clone(),
            Spinner::new(Duration::from_millis(50)),
        );
        let refresher = Refresher::new(
            executor.clone(),
            repo.clone(),
            model,
            presenter.clone(),
            RefresherConfig {
                sort_order: BranchSortOrder::Date,
                commit_limit: Some(300),
            },
        );
        let popups = PopupStack::new(
            executor.clone(),
            views.clone(),
            Size {
                width: 120,
                height: 40,
            },
            Duration::from_millis(20),
        );
        let inline = InlineStatusTracker::new(
            executor.clone(),
            Arc::new(presenter),
            operations,
            Duration::from_millis(20),
        );
        refresher
            .refresh(RefreshOptions::all())
            .expect("initial refresh");
        let actions = Actions::new(executor, refresher, repo.clone(), popups, inline);
        let harness = Self {
            app: App::new(actions, views),
            queue,
            repo,
        };
        harness.queue.run_pending(usize::MAX);
        harness
    }

    fn press(&mut self, event: AppEvent) {
        self.app.handle_event(event).expect("event should be handled");
    }

    fn type_text(&mut self, text: &str) {
        for ch in text.chars() {
            self.press(AppEvent::InputChar(ch));
        }
    }

    fn calls(&self) -> Vec<String> {
        self.repo.calls.lock().expect("calls").clone()
    }

    fn popups(&self) -> &PopupStack {
        self.app.actions().popups()
    }

    fn active_kind(&self) -> Option<PopupKind> {
        self.popups().with_active(|popup| popup.kind.clone())
    }

    fn active_title(&self) -> Option<String> {
        self.popups().with_active(|popup| popup.title.clone())
    }

    /// Drains the UI queue until `done` holds, returning any UI task errors.
    fn pump_until(&self, what: &str, done: impl Fn(&Self) -> bool) -> Vec<anyhow::Error> {
        let deadline = Instant::now() + Duration::from_secs(3);
        let mut errors = Vec::new();
        loop {
            errors.extend(self.queue.run_pending(usize::MAX).errors);
            if done(self) {
                return errors;
            }
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn wait_for_call(&self, call: &str) {
        self.pump_until(call, |h| h.calls().iter().any(|c| c == call));
    }
}

#[test]
fn q_quits_only_when_no_popup_is_open() {
    let mut h = Harness::new();
    h.press(AppEvent::InputChar('n'));
    h.press(AppEvent::InputChar('q'));
    assert!(h.app.running);
    match h.active_kind() {
        Some(PopupKind::Prompt { input, .. }) => assert_eq!(input, "q"),
        other => panic!("expected prompt, got {other:?}"),
    }

    h.press(AppEvent::Escape);
    assert!(h.popups().is_empty());
    h.press(AppEvent::InputChar('q'));
    assert!(!h.app.running);
}

#[test]
fn tab_cycles_panes_and_wraps() {
    let mut h = Harness::new();
    assert_eq!(h.app.active_pane(), Pane::Files);
    h.press(AppEvent::NextPane);
    assert_eq!(h.app.active_pane(), Pane::Branches);
    h.press(AppEvent::PrevPane);
    h.press(AppEvent::PrevPane);
    assert_eq!(h.app.active_pane(), Pane::Status);
    h.press(AppEvent::PrevPane);
    assert_eq!(h.app.active_pane(), Pane::Stash);
}

#[test]
fn file_selection_drives_the_staging_view() {
    let mut h = Harness::new();
    h.app.sync_main_view().expect("sync");
    assert_eq!(h.app.main_view(), MainView::Staging);
    let model = h.app.actions().refresher().model().clone();
    assert_eq!(model.with_staging(|state| state.path.clone()), Some("a.txt".into()));

    h.press(AppEvent::InputChar('j'));
    assert_eq!(model.with_staging(|state| state.path.clone()), Some("b.txt".into()));
    h.pump_until("staged diff", |h| {
        h.app.views().content(ViewName::StagingSecondary) == vec!["diff b.txt staged=true".to_string()]
    });
}

#[test]
fn space_stages_and_unstages_the_selected_file() {
    let mut h = Harness::new();
    h.press(AppEvent::InputChar(' '));
    h.wait_for_call("stage a.txt");

    h.press(AppEvent::MoveDown);
    h.press(AppEvent::InputChar(' '));
    h.wait_for_call("unstage b.txt");
}

#[test]
fn deleting_a_branch_asks_first() {
    let mut h = Harness::new();
    h.press(AppEvent::NextPane);

    let err = h
        .app
        .handle_event(AppEvent::InputChar('d'))
        .expect_err("head branch cannot be deleted");
    assert!(err.to_string().contains("checked out"));
    assert!(h.popups().is_empty());

    h.press(AppEvent::MoveDown);
    h.press(AppEvent::InputChar('d'));
    match h.active_kind() {
        Some(PopupKind::Confirm { message }) => assert!(message.contains("'feature'")),
        other => panic!("expected confirm, got {other:?}"),
    }
    assert!(h.calls().is_empty());

    h.press(AppEvent::Submit);
    h.wait_for_call("delete feature");
}

#[test]
fn commit_message_popup_commits_summary_and_description() {
    let mut h = Harness::new();
    h.press(AppEvent::InputChar('c'));
    h.type_text("fix bug");
    h.press(AppEvent::NextPane);
    h.type_text("details");
    h.press(AppEvent::Submit);
    assert_eq!(h.popups().depth(), 1, "enter in the description adds a line");

    h.press(AppEvent::NextPane);
    h.press(AppEvent::Submit);
    assert!(h.popups().is_empty());
    h.wait_for_call("commit fix bug|details\n");
}

#[test]
fn commit_requires_staged_files_and_a_summary() {
    let mut repo = StubRepo::new();
    repo.files.retain(|file| !file.has_staged_changes);
    let mut h = Harness::with_repo(repo);
    let err = h
        .app
        .handle_event(AppEvent::InputChar('c'))
        .expect_err("nothing staged");
    assert!(err.to_string().contains("no staged files"));

    let mut h = Harness::new();
    h.press(AppEvent::InputChar('c'));
    let err = h.app.handle_event(AppEvent::Submit).expect_err("empty summary");
    assert!(err.to_string().contains("summary cannot be empty"));
    assert!(h.popups().is_empty());
}

#[test]
fn fetch_shows_a_loader_until_it_finishes() {
    let mut h = Harness::new();
    h.press(AppEvent::InputChar('f'));
    assert_eq!(h.active_title().as_deref(), Some("Fetch"));
    assert_eq!(h.popups().with_active(|popup| popup.has_loader), Some(true));

    let errors = h.pump_until("loader removed", |h| h.popups().is_empty());
    assert!(errors.is_empty());
    assert_eq!(h.calls(), vec!["fetch".to_string()]);
}

#[test]
fn error_stacks_on_the_fetch_loader_and_outlives_it() {
    let mut repo = StubRepo::new();
    repo.fail_fetch = true;
    let mut h = Harness::with_repo(repo);
    h.press(AppEvent::InputChar('f'));
    h.app.show_error(&anyhow::anyhow!("unrelated failure"));
    assert_eq!(h.popups().depth(), 2);

    let errors = h.pump_until("loader removed", |h| h.popups().depth() == 1);
    assert_eq!(h.active_title().as_deref(), Some("Error"));
    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().contains("could not read from remote"));
}

#[test]
fn push_and_pull_run_against_the_checked_out_branch() {
    let mut h = Harness::new();
    h.press(AppEvent::InputChar('P'));
    h.wait_for_call("push main");
    h.press(AppEvent::InputChar('p'));
    h.wait_for_call("pull main");
}

#[test]
fn new_branch_prompt_suggests_remote_branches() {
    let mut h = Harness::new();
    h.press(AppEvent::InputChar('n'));
    h.type_text("rel");
    let suggestions: Vec<String> = h
        .active_kind()
        .expect("prompt")
        .visible_suggestions()
        .into_iter()
        .map(str::to_string)
        .collect();
    assert_eq!(suggestions, vec!["release".to_string()]);

    h.press(AppEvent::MoveDown);
    h.press(AppEvent::Submit);
    h.wait_for_call("create release");
}

#[test]
fn keybindings_menu_runs_the_chosen_action() {
    let mut h = Harness::new();
    h.press(AppEvent::InputChar('?'));
    assert_eq!(h.active_title().as_deref(), Some("Keybindings"));
    h.press(AppEvent::InputChar('f'));
    assert_eq!(h.active_title().as_deref(), Some("Fetch"));
    h.pump_until("fetch finished", |h| h.popups().is_empty());
}

#[test]
fn sort_menu_switches_branch_order() {
    let mut h = Harness::new();
    h.press(AppEvent::InputChar('o'));
    match h.active_kind() {
        Some(PopupKind::Menu { selected, .. }) => assert_eq!(selected, 2),
        other => panic!("expected menu, got {other:?}"),
    }
    h.press(AppEvent::InputChar('a'));
    assert!(h.popups().is_empty());
    assert_eq!(h.app.actions().refresher().sort_order(), BranchSortOrder::Alphabetical);
}

#[test]
fn resolved_conflicts_offer_to_continue() {
    let mut h = Harness::new();
    let hook = h.app.actions().conflicts_resolved_hook();
    hook().expect("hook");
    assert_eq!(h.active_title().as_deref(), Some("Continue"));
    h.press(AppEvent::Submit);
    h.wait_for_call("continue rebase");
}

#[test]
fn enter_on_a_commit_shows_its_files() {
    let mut h = Harness::new();
    h.press(AppEvent::NextPane);
    h.press(AppEvent::NextPane);
    assert_eq!(h.app.active_pane(), Pane::Commits);
    assert_eq!(h.app.main_view(), MainView::Empty);

    h.press(AppEvent::Submit);
    assert_eq!(h.app.main_view(), MainView::CommitFiles);
    h.pump_until("commit files", |h| {
        h.app.views().content(ViewName::CommitFiles) == vec!["M 1111111aaaa.rs".to_string()]
    });

    h.press(AppEvent::Escape);
    assert_eq!(h.app.main_view(), MainView::Empty);
}

#[test]
fn resize_moves_open_popups() {
    let mut h = Harness::new();
    h.press(AppEvent::InputChar('?'));
    h.press(AppEvent::Resize(200, 60));
    match h.popups().with_active(|popup| popup.layout()) {
        Some(PopupLayout::Plain { panel }) => assert_eq!((panel.x0, panel.x1), (43, 157)),
        other => panic!("expected plain layout, got {other:?}"),
    }
}
