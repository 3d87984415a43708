use super::*;
use crate::exec;
use crate::popup::{MenuItem, OpenOutcome, PopupOpts};
use ratatui::Terminal;
use ratatui::backend::TestBackend;
use ratatui::buffer::Buffer;
use std::time::Duration;

const WIDTH: u16 = 100;
const HEIGHT: u16 = 30;

fn draw(f: impl FnOnce(&mut Frame)) -> Buffer {
    let backend = TestBackend::new(WIDTH, HEIGHT);
    let mut terminal = Terminal::new(backend).expect("test terminal should initialize");
    terminal.draw(f).expect("render should succeed");
    terminal.backend().buffer().clone()
}

fn buffer_to_string(buffer: &Buffer) -> String {
    let mut text = String::new();
    for y in 0..buffer.area.height {
        for x in 0..buffer.area.width {
            text.push_str(buffer[(x, y)].symbol());
        }
        text.push('\n');
    }
    text
}

fn render_panels_text(views: &Views, active: Pane, main: MainView) -> String {
    let theme = Theme::default();
    buffer_to_string(&draw(|frame| render_panels(frame, views, active, main, &theme)))
}

fn render_popups_text(popups: &PopupStack, spinner: &str) -> String {
    let theme = Theme::default();
    buffer_to_string(&draw(|frame| render_popups(frame, popups, spinner, &theme)))
}

fn popup_stack() -> PopupStack {
    let (executor, _queue) = exec::channel();
    PopupStack::new(
        executor,
        Views::new(),
        Size::new(WIDTH, HEIGHT),
        Duration::from_secs(60),
    )
}

fn seeded_views() -> Views {
    let views = Views::new();
    views.set_content(ViewName::Status, vec!["gitloom → main".to_string()]);
    views.set_content(
        ViewName::Files,
        vec![" M a.txt".to_string(), "M  b.txt".to_string()],
    );
    views.set_content(
        ViewName::Branches,
        vec!["* main".to_string(), "  feature".to_string()],
    );
    views.set_content(ViewName::Commits, vec!["1111111 initial".to_string()]);
    views
}

#[test]
fn panels_show_titles_content_and_footer() {
    let text = render_panels_text(&seeded_views(), Pane::Files, MainView::Empty);
    for needle in [
        "Status",
        "Files",
        "Local Branches",
        "Commits",
        "Stash",
        "Main",
        "a.txt",
        "* main",
        "1111111 initial",
        "? keybindings",
    ] {
        assert!(text.contains(needle), "missing {needle:?} in:\n{text}");
    }
}

#[test]
fn selected_line_of_active_pane_is_highlighted() {
    let views = seeded_views();
    views.select(ViewName::Files, 1);
    let buffer = draw(|frame| {
        render_panels(frame, &views, Pane::Files, MainView::Empty, &Theme::default())
    });
    let text = buffer_to_string(&buffer);

    let cell_of = |needle: &str| {
        let (y, row) = text
            .lines()
            .enumerate()
            .find(|(_, row)| row.contains(needle))
            .expect("needle rendered");
        let x = row[..row.find(needle).expect("needle in row")].chars().count();
        buffer[(x as u16, y as u16)].clone()
    };
    let theme = Theme::default();
    assert_eq!(cell_of("b.txt").bg, theme.selected_bg);
    assert_ne!(cell_of("a.txt").bg, theme.selected_bg);
    // Inactive panes keep their selection unpainted.
    assert_ne!(cell_of("* main").bg, theme.selected_bg);
}

#[test]
fn staging_main_view_shows_both_diffs() {
    let views = seeded_views();
    views.set_content(ViewName::Staging, vec!["+added line".to_string()]);
    views.set_content(ViewName::StagingSecondary, vec!["-removed line".to_string()]);

    let text = render_panels_text(&views, Pane::Files, MainView::Staging);

    assert!(text.contains("Unstaged Changes"));
    assert!(text.contains("Staged Changes"));
    assert!(text.contains("+added line"));
    assert!(text.contains("-removed line"));
}

#[test]
fn commit_files_replace_the_main_area() {
    let views = seeded_views();
    views.set_content(ViewName::CommitFiles, vec!["M  src/lib.rs".to_string()]);

    let text = render_panels_text(&views, Pane::Commits, MainView::CommitFiles);

    assert!(text.contains("Commit Files"));
    assert!(text.contains("M  src/lib.rs"));
    assert!(!text.contains("Unstaged Changes"));
}

#[test]
fn confirm_popup_shows_title_and_message() {
    let popups = popup_stack();
    assert_eq!(
        popups.open(PopupOpts::confirm("Delete branch", "Delete feature?")),
        OpenOutcome::Opened
    );

    let text = render_popups_text(&popups, "|");

    assert!(text.contains("Delete branch"));
    assert!(text.contains("Delete feature?"));
}

#[test]
fn loader_popup_title_carries_the_spinner() {
    let popups = popup_stack();
    popups.open(PopupOpts::confirm("Fetching", "Fetching remotes").with_loader());

    let text = render_popups_text(&popups, "/");

    assert!(text.contains("Fetching /"), "{text}");
}

#[test]
fn error_stacked_on_loader_is_drawn_on_top() {
    let popups = popup_stack();
    popups.open(PopupOpts::confirm("Fetching", "Fetching remotes").with_loader());
    popups.open(PopupOpts::error("remote hung up"));

    let text = render_popups_text(&popups, "-");

    assert!(text.contains("Error"));
    assert!(text.contains("remote hung up"));
}

#[test]
fn masked_prompt_hides_its_input() {
    let popups = popup_stack();
    popups.open(PopupOpts::prompt("Password", "secret").masked());

    let text = render_popups_text(&popups, "|");

    assert!(text.contains("******"));
    assert!(!text.contains("secret"));
}

#[test]
fn prompt_lists_matching_suggestions_only() {
    let popups = popup_stack();
    popups.open(PopupOpts::prompt("New branch", "ma").with_suggestions(vec![
        "main".to_string(),
        "master".to_string(),
        "feature".to_string(),
    ]));

    let text = render_popups_text(&popups, "|");

    assert!(text.contains("Suggestions"));
    assert!(text.contains("main"));
    assert!(text.contains("master"));
    assert!(!text.contains("feature"));
}

#[test]
fn commit_message_popup_shows_both_fields() {
    let popups = popup_stack();
    popups.open(PopupOpts::commit_message("Fix parser", "handles empty input"));

    let text = render_popups_text(&popups, "|");

    assert!(text.contains("Commit summary"));
    assert!(text.contains("Fix parser"));
    assert!(text.contains("Description"));
    assert!(text.contains("handles empty input"));
}

#[test]
fn menu_shows_keys_and_selected_tooltip() {
    let popups = popup_stack();
    popups.open(PopupOpts::menu(
        "Sort branches",
        vec![
            MenuItem::new("Recency").key('r').tooltip("Most recently checked out first"),
            MenuItem::new("Alphabetical").key('a').tooltip("By name"),
        ],
    ));

    let text = render_popups_text(&popups, "|");

    assert!(text.contains("r Recency"));
    assert!(text.contains("a Alphabetical"));
    assert!(text.contains("Most recently checked out first"));
    assert!(!text.contains("By name"));
}
