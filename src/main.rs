use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::prelude::*;
use tracing::{info, warn};

mod app;
mod config;
mod events;
mod exec;
mod git;
mod inline_status;
mod loader;
mod logging;
mod model;
mod popup;
mod presentation;
mod refresh;
mod resource;
mod theme;
mod ui;
mod views;
mod watcher;

use app::{Actions, App};
use config::AppConfig;
use events::AppEvent;
use exec::UiQueue;
use git::GitCli;
use inline_status::{InlineStatusTracker, ItemOperations};
use model::Model;
use popup::PopupStack;
use presentation::{Presenter, Spinner};
use refresh::{RefreshOptions, Refresher};
use theme::Theme;
use views::Views;
use watcher::{BackgroundRoutines, RepoWatcher};

const EVENT_POLL: Duration = Duration::from_millis(16);
const MAX_UI_TASKS_PER_LOOP: usize = 128;

/// Terminal UI for git.
#[derive(Debug, Parser)]
#[command(name = "gitloom", version)]
struct Cli {
    /// Repository to open; any directory inside the work tree works.
    #[arg(short, long, default_value = ".")]
    path: PathBuf,
    /// Config file. Defaults to $XDG_CONFIG_HOME/gitloom/config.toml.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Print the effective config and exit.
    #[arg(long)]
    print_config: bool,
    /// With --print-config, print JSON instead of TOML.
    #[arg(long, requires = "print_config")]
    json: bool,
    /// Log file. Defaults to $XDG_STATE_HOME/gitloom/gitloom.log.
    #[arg(long)]
    log_file: Option<PathBuf>,
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.config.clone().or_else(AppConfig::default_path) {
        Some(path) => AppConfig::load_or_default(&path),
        None => AppConfig::default(),
    };
    if cli.print_config {
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&config)?);
        } else {
            print!("{}", config.to_toml()?);
        }
        return Ok(());
    }

    let _log_guard = match cli.log_file.clone().or_else(logging::default_log_path) {
        Some(path) => Some(logging::init(&path, cli.debug)?),
        None => None,
    };

    let repo = Arc::new(GitCli::open(&cli.path)?);
    info!(path = %repo.work_dir().display(), "opening repository");

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let result = run_app(&mut terminal, repo, &config);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableMouseCapture,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    repo: Arc<GitCli>,
    config: &AppConfig,
) -> Result<()> {
    let (executor, queue) = exec::channel();
    let interval = config.gui.inline_status_interval();
    let model = Arc::new(Model::new());
    let views = Views::new();
    let operations = ItemOperations::new();
    let presenter = Presenter::new(
        model.clone(),
        views.clone(),
        operations.clone(),
        Spinner::new(interval),
    );
    let refresher = Refresher::new(
        executor.clone(),
        repo.clone(),
        model,
        presenter.clone(),
        config.refresher_config(),
    );
    let popups = PopupStack::new(executor.clone(), views.clone(), terminal.size()?, interval);
    let inline = InlineStatusTracker::new(executor.clone(), Arc::new(presenter), operations, interval);
    let actions = Actions::new(executor.clone(), refresher.clone(), repo.clone(), popups, inline);
    refresher.set_on_conflicts_resolved(actions.conflicts_resolved_hook());

    let mut app = App::new(actions, views);
    refresher
        .refresh(RefreshOptions::all())
        .context("initial refresh failed")?;
    app.sync_main_view()?;

    let _watcher = if config.refresher.watch_files {
        let git_dir = repo
            .git_dir()
            .unwrap_or_else(|_| watcher::fallback_git_dir(repo.work_dir()));
        match RepoWatcher::for_refresher(&executor, repo.work_dir(), &git_dir, refresher.clone()) {
            Ok(watcher) => Some(watcher),
            Err(err) => {
                warn!(error = %err, "file watching disabled");
                None
            }
        }
    } else {
        None
    };
    let _routines = BackgroundRoutines::start(&executor, refresher, repo, &config.refresher);

    let theme = Theme::from_config(&config.gui.theme);
    let mut drawn_revision = None;
    while app.running {
        // Views bump their revision on every content change, including
        // spinner frames; input and UI tasks force a redraw too.
        let revision = app.views().revision();
        if drawn_revision != Some(revision) {
            terminal.draw(|frame| ui::render(frame, &app, &theme))?;
            drawn_revision = Some(revision);
        }

        let event = events::next_event(EVENT_POLL)?;
        if event != AppEvent::Tick {
            drawn_revision = None;
        }
        if let Err(err) = app.handle_event(event) {
            app.show_error(&err);
        }
        if drain_ui_tasks(&queue, &mut app) > 0 {
            drawn_revision = None;
        }
    }

    info!("exiting");
    Ok(())
}

/// Runs work posted to the UI thread, then lets the main view follow
/// whatever the refreshes changed. Returns how many tasks ran.
fn drain_ui_tasks(queue: &UiQueue, app: &mut App) -> usize {
    let run = queue.run_pending(MAX_UI_TASKS_PER_LOOP);
    for err in &run.errors {
        app.show_error(err);
    }
    if run.executed > 0
        && let Err(err) = app.sync_main_view()
    {
        app.show_error(&err);
    }
    run.executed
}
