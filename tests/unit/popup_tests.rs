use super::geometry::{self, Bounds, PopupLayout};
use super::*;
use crate::exec::{self, UiQueue};
use pretty_assertions::assert_eq;
use ratatui::layout::Rect;
use std::sync::atomic::{AtomicUsize, Ordering};

const TERM: Size = Size {
    width: 100,
    height: 40,
};

fn stack() -> (PopupStack, UiQueue, Views) {
    let (executor, queue) = exec::channel();
    let views = Views::new();
    let stack = PopupStack::new(executor, views.clone(), TERM, Duration::from_millis(10));
    (stack, queue, views)
}

fn active_title(stack: &PopupStack) -> Option<String> {
    stack.with_active(|popup| popup.title.clone())
}

#[test]
fn second_popup_is_rejected_while_a_plain_popup_is_open() {
    let (stack, _queue, _views) = stack();
    let first = PopupOpts::confirm("Delete branch", "Delete feature?");
    let first_token = first.token();
    assert_eq!(stack.open(first), OpenOutcome::Opened);

    let second = PopupOpts::prompt("New branch", "");
    let second_token = second.token();
    assert_eq!(stack.open(second), OpenOutcome::Rejected);

    assert!(second_token.is_cancelled());
    assert!(!first_token.is_cancelled());
    assert_eq!(stack.depth(), 1);
    assert_eq!(active_title(&stack).as_deref(), Some("Delete branch"));
}

#[test]
fn popups_stack_on_top_of_a_loader() {
    let (stack, queue, _views) = stack();
    let loader = PopupOpts::confirm("Fetching", "fetching remotes").with_loader();
    let loader_token = loader.token();
    assert_eq!(stack.open(loader), OpenOutcome::Opened);
    assert_eq!(stack.open(PopupOpts::error("auth failed")), OpenOutcome::Opened);
    assert_eq!(stack.depth(), 2);
    assert_eq!(active_title(&stack).as_deref(), Some("Error"));

    let ticked = queue.wait_and_run(Duration::from_millis(500), 8);
    assert!(ticked.executed > 0, "loader ticker should post redraws");

    stack.close().expect("close error popup");
    assert_eq!(active_title(&stack).as_deref(), Some("Fetching"));
    assert!(stack.remove(&loader_token));
    assert!(loader_token.is_cancelled());
    assert!(stack.is_empty());
}

#[test]
fn closing_cancels_the_token_and_runs_the_close_handler() {
    let (stack, _queue, _views) = stack();
    let closed = Arc::new(AtomicUsize::new(0));
    let counter = closed.clone();
    let opts = PopupOpts::confirm("Push", "Force push?").on_close(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let token = opts.token();
    stack.open(opts);

    stack.close().expect("close");
    assert!(token.is_cancelled());
    assert_eq!(closed.load(Ordering::SeqCst), 1);
    stack.close().expect("closing an empty stack is a no-op");
}

#[test]
fn confirm_handler_can_open_the_next_popup() {
    let (stack, _queue, _views) = stack();
    let inner = stack.clone();
    let opts = PopupOpts::prompt("New branch", "feat").on_confirm(move |response| {
        let PopupResponse::Text(name) = response else {
            anyhow::bail!("expected a text response");
        };
        inner.open(PopupOpts::confirm("Created", name));
        Ok(())
    });
    stack.open(opts);
    stack.edit_active(|kind| kind.insert_char('x'));

    stack.confirm().expect("confirm");
    let message = stack.with_active(|popup| popup.kind.clone());
    assert_eq!(
        message,
        Some(PopupKind::Confirm {
            message: "featx".to_string()
        })
    );
}

#[test]
fn prompt_response_prefers_the_selected_suggestion() {
    let mut kind = PopupOpts::prompt("Checkout", "ma")
        .with_suggestions(vec!["main".into(), "feature".into(), "master".into()])
        .kind;
    assert_eq!(kind.visible_suggestions(), vec!["main", "master"]);
    assert_eq!(kind.response(), PopupResponse::Text("ma".into()));

    kind.move_selection(1);
    kind.move_selection(1);
    kind.move_selection(1);
    assert_eq!(kind.response(), PopupResponse::Text("master".into()));

    kind.insert_char('s');
    assert_eq!(kind.response(), PopupResponse::Text("mas".into()));
}

#[test]
fn menu_selection_clamps_and_keys_resolve() {
    let mut kind = PopupOpts::menu(
        "Sort branches",
        vec![
            MenuItem::new("recency").key('r'),
            MenuItem::new("date").key('d').tooltip("by committer date"),
        ],
    )
    .kind;
    kind.move_selection(-1);
    assert_eq!(kind.response(), PopupResponse::MenuItem(0));
    kind.move_selection(5);
    assert_eq!(kind.response(), PopupResponse::MenuItem(1));
    assert_eq!(kind.menu_index_for_key('r'), Some(0));
    assert_eq!(kind.menu_index_for_key('x'), None);
}

#[test]
fn commit_message_enter_adds_lines_only_in_description() {
    let mut kind = PopupOpts::commit_message("fix", "").kind;
    assert!(!kind.newline());
    kind.toggle_focus();
    kind.insert_char('a');
    assert!(kind.newline());
    kind.insert_char('b');
    assert_eq!(
        kind.response(),
        PopupResponse::CommitMessage {
            summary: "fix".into(),
            description: "a\nb".into()
        }
    );
}

#[test]
fn panel_width_follows_terminal_width() {
    assert_eq!(geometry::panel_width(Size { width: 100, height: 40 }), 80);
    assert_eq!(geometry::panel_width(Size { width: 200, height: 40 }), 114);
    assert_eq!(geometry::panel_width(Size { width: 60, height: 40 }), 58);
}

#[test]
fn message_height_counts_wrapped_rows() {
    assert_eq!(geometry::message_height(true, &"a".repeat(160), 80), 3);
    assert_eq!(geometry::message_height(true, "ab\ncd", 80), 2);
    assert_eq!(geometry::message_height(false, &"a".repeat(160), 80), 1);
    assert_eq!(geometry::message_height(true, "日本", 3), 2);
}

#[test]
fn plain_popup_is_centred() {
    let layout = geometry::plain(TERM, 0, "hello", true);
    assert_eq!(
        layout,
        PopupLayout::Plain {
            panel: Bounds::new(10, 18, 90, 20)
        }
    );
    let PopupLayout::Plain { panel } = layout else {
        unreachable!()
    };
    assert_eq!(panel.to_rect(Rect::new(0, 0, 100, 40)), Rect::new(10, 18, 81, 3));
}

#[test]
fn tall_content_is_capped_at_three_quarters() {
    let content = vec!["line"; 100].join("\n");
    let layout = geometry::plain(TERM, 0, &content, false);
    assert_eq!(
        layout,
        PopupLayout::Plain {
            panel: Bounds::new(10, 4, 90, 35)
        }
    );
}

#[test]
fn suggestions_sit_below_the_prompt() {
    assert_eq!(
        geometry::with_suggestions(TERM, 0, "", true),
        PopupLayout::WithSuggestions {
            panel: Bounds::new(10, 13, 90, 15),
            suggestions: Some(Bounds::new(10, 16, 90, 27)),
        }
    );
    assert_eq!(
        geometry::with_suggestions(TERM, 0, "", false),
        PopupLayout::WithSuggestions {
            panel: Bounds::new(10, 18, 90, 20),
            suggestions: None,
        }
    );
}

#[test]
fn commit_message_has_fixed_summary_and_minimum_description() {
    assert_eq!(
        geometry::commit_message(TERM, 0, ""),
        PopupLayout::CommitMessage {
            summary: Bounds::new(10, 15, 90, 17),
            description: Bounds::new(10, 18, 90, 26),
        }
    );
}

#[test]
fn nested_popups_are_offset_and_kept_on_screen() {
    assert_eq!(
        geometry::plain(TERM, 1, "hello", true),
        PopupLayout::Plain {
            panel: Bounds::new(12, 19, 92, 21)
        }
    );
    let small = Size { width: 20, height: 10 };
    assert_eq!(
        geometry::plain(small, 3, "x", true),
        PopupLayout::Plain {
            panel: Bounds::new(1, 6, 19, 8)
        }
    );
}

#[test]
fn resize_recomputes_every_layout() {
    let (stack, _queue, _views) = stack();
    stack.open(PopupOpts::confirm("Loading", "please wait").with_loader());
    stack.open(PopupOpts::confirm("Quit", "Really quit?"));
    stack.resize(Size { width: 200, height: 60 });
    let layouts = stack.with_all(|popups| popups.iter().map(Popup::layout).collect::<Vec<_>>());
    assert_eq!(
        layouts,
        vec![
            PopupLayout::Plain {
                panel: Bounds::new(43, 28, 157, 30)
            },
            PopupLayout::Plain {
                panel: Bounds::new(45, 29, 159, 31)
            },
        ]
    );
    while !stack.is_empty() {
        stack.close().expect("close");
    }
}
