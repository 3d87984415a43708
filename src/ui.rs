use ratatui::prelude::*;
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Clear, List, ListItem, ListState, Paragraph, Wrap};
use unicode_width::UnicodeWidthStr;

use crate::app::{App, MainView, PANES, Pane};
use crate::popup::{Bounds, CommitField, Popup, PopupKind, PopupLayout, PopupStack};
use crate::theme::Theme;
use crate::views::{ViewName, Views};

const STATUS_HEIGHT: u16 = 3;
const FOOTER_HEIGHT: u16 = 1;
const SIDE_PERCENT: u16 = 35;
const MASK_CHAR: char = '*';
const FOOTER_TEXT: &str = "q quit | Tab panels | j/k move | space stage/checkout | ? keybindings";

const ADDED_FG: Color = Color::Rgb(120, 200, 120);
const REMOVED_FG: Color = Color::Rgb(230, 100, 100);

pub fn render(frame: &mut Frame, app: &App, theme: &Theme) {
    let spinner = app.actions().refresher().presenter().spinner().frame();
    render_panels(frame, app.views(), app.active_pane(), app.main_view(), theme);
    render_popups(frame, app.actions().popups(), spinner, theme);
}

/// Side panels, the main area and the footer. Popups draw on top of this.
pub fn render_panels(frame: &mut Frame, views: &Views, active: Pane, main: MainView, theme: &Theme) {
    let [body, footer] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(FOOTER_HEIGHT)]).areas(frame.area());
    let [side, main_area] = Layout::horizontal([
        Constraint::Percentage(SIDE_PERCENT),
        Constraint::Percentage(100 - SIDE_PERCENT),
    ])
    .areas(body);

    let constraints = PANES.iter().map(|pane| match pane {
        Pane::Status => Constraint::Length(STATUS_HEIGHT),
        _ => Constraint::Fill(1),
    });
    let areas = Layout::vertical(constraints).split(side);
    for (pane, area) in PANES.iter().zip(areas.iter()) {
        let is_active = *pane == active;
        let highlight = is_active && *pane != Pane::Status;
        render_list_view(frame, *area, views, pane.view(), is_active, highlight, theme);
    }

    render_main(frame, main_area, views, main, theme);

    frame.render_widget(
        Paragraph::new(FOOTER_TEXT).style(Style::default().fg(theme.muted_fg)),
        footer,
    );
}

fn render_main(frame: &mut Frame, area: Rect, views: &Views, main: MainView, theme: &Theme) {
    let shown = main.views();
    if shown.is_empty() {
        frame.render_widget(panel_block("Main", false, theme), area);
        return;
    }
    let constraints = shown.iter().map(|_| Constraint::Fill(1));
    let areas = Layout::vertical(constraints).split(area);
    for (view, area) in shown.iter().zip(areas.iter()) {
        render_list_view(frame, *area, views, *view, false, *view == ViewName::CommitFiles, theme);
    }
}

fn render_list_view(
    frame: &mut Frame,
    area: Rect,
    views: &Views,
    view: ViewName,
    active: bool,
    highlight: bool,
    theme: &Theme,
) {
    let items: Vec<ListItem> = views
        .content(view)
        .into_iter()
        .map(|line| ListItem::new(styled_line(line, theme)))
        .collect();
    let mut state = ListState::default();
    if highlight && !items.is_empty() {
        state.select(Some(views.selected(view)));
    }
    let list = List::new(items)
        .block(panel_block(view.title(), active, theme))
        .highlight_style(Style::default().bg(theme.selected_bg));
    frame.render_stateful_widget(list, area, &mut state);
}

/// Diff lines get their +/- colour, everything else plain text.
fn styled_line(line: String, theme: &Theme) -> Line<'static> {
    let fg = if line.starts_with('+') && !line.starts_with("+++") {
        ADDED_FG
    } else if line.starts_with('-') && !line.starts_with("---") {
        REMOVED_FG
    } else {
        theme.text_fg
    };
    Line::from(Span::styled(line, Style::default().fg(fg)))
}

fn panel_block<'a>(title: impl Into<Line<'a>>, active: bool, theme: &Theme) -> Block<'a> {
    let border_fg = if active {
        theme.active_border_fg
    } else {
        theme.border_fg
    };
    Block::bordered()
        .title(title)
        .border_style(Style::default().fg(border_fg))
        .style(Style::default().bg(theme.panel_bg))
}

fn popup_block<'a>(title: String, focused: bool, theme: &Theme) -> Block<'a> {
    let border_fg = if focused {
        theme.active_border_fg
    } else {
        theme.border_fg
    };
    Block::bordered()
        .title(title)
        .border_style(Style::default().fg(border_fg))
        .style(Style::default().bg(theme.popup_bg).fg(theme.text_fg))
}

/// Every open popup, bottom first, so the active one ends up on top.
pub fn render_popups(frame: &mut Frame, popups: &PopupStack, spinner: &str, theme: &Theme) {
    popups.with_all(|all| {
        let top = all.len().saturating_sub(1);
        for (index, popup) in all.iter().enumerate() {
            render_popup(frame, popup, index == top, spinner, theme);
        }
    });
}

fn render_popup(frame: &mut Frame, popup: &Popup, active: bool, spinner: &str, theme: &Theme) {
    let screen = frame.area();
    let title = if popup.has_loader {
        format!("{} {spinner}", popup.title)
    } else {
        popup.title.clone()
    };

    match (popup.layout(), &popup.kind) {
        (
            PopupLayout::CommitMessage {
                summary: summary_bounds,
                description: description_bounds,
            },
            PopupKind::CommitMessage {
                summary,
                description,
                focus,
            },
        ) => {
            let summary_area = clear(frame, summary_bounds, screen);
            let description_area = clear(frame, description_bounds, screen);
            let summary_focused = *focus == CommitField::Summary;
            frame.render_widget(
                Paragraph::new(summary.as_str()).block(popup_block(title, summary_focused, theme)),
                summary_area,
            );
            frame.render_widget(
                Paragraph::new(description.as_str())
                    .wrap(Wrap { trim: false })
                    .block(popup_block("Description".to_string(), !summary_focused, theme)),
                description_area,
            );
            if active {
                let (area, text) = if summary_focused {
                    (summary_area, summary.as_str())
                } else {
                    (description_area, description.as_str())
                };
                place_cursor(frame, area, text);
            }
        }
        (
            PopupLayout::WithSuggestions { panel, suggestions },
            PopupKind::Prompt {
                input,
                mask,
                selected_suggestion,
                ..
            },
        ) => {
            let area = clear(frame, panel, screen);
            let shown = if *mask {
                MASK_CHAR.to_string().repeat(input.chars().count())
            } else {
                input.clone()
            };
            frame.render_widget(
                Paragraph::new(shown.as_str()).block(popup_block(title, true, theme)),
                area,
            );
            if let Some(bounds) = suggestions {
                let list_area = clear(frame, bounds, screen);
                let items: Vec<ListItem> = popup
                    .kind
                    .visible_suggestions()
                    .into_iter()
                    .map(|suggestion| ListItem::new(suggestion.to_string()))
                    .collect();
                let mut state = ListState::default();
                state.select(*selected_suggestion);
                let list = List::new(items)
                    .block(popup_block("Suggestions".to_string(), false, theme))
                    .highlight_style(Style::default().bg(theme.selected_bg));
                frame.render_stateful_widget(list, list_area, &mut state);
            }
            if active {
                place_cursor(frame, area, &shown);
            }
        }
        (PopupLayout::Plain { panel }, PopupKind::Menu { items, selected }) => {
            let area = clear(frame, panel, screen);
            let rows: Vec<ListItem> = items
                .iter()
                .map(|item| {
                    let key = item.key.map(|key| key.to_string()).unwrap_or_default();
                    ListItem::new(Line::from(vec![
                        Span::styled(format!("{key:<2}"), Style::default().fg(theme.active_border_fg)),
                        Span::raw(item.label.clone()),
                    ]))
                })
                .collect();
            let mut block = popup_block(title, active, theme);
            if let Some(tooltip) = items.get(*selected).and_then(|item| item.tooltip.as_deref()) {
                block = block.title_bottom(Line::from(tooltip.to_string()).style(Style::default().fg(theme.muted_fg)));
            }
            let mut state = ListState::default().with_selected(Some(*selected));
            let list = List::new(rows)
                .block(block)
                .highlight_style(Style::default().bg(theme.selected_bg));
            frame.render_stateful_widget(list, area, &mut state);
        }
        (layout, kind) => {
            let area = clear(frame, layout_panel(layout), screen);
            let (message, fg) = match kind {
                PopupKind::Error { message } => (message.as_str(), theme.error_fg),
                PopupKind::Confirm { message } => (message.as_str(), theme.text_fg),
                _ => ("", theme.text_fg),
            };
            frame.render_widget(
                Paragraph::new(Text::styled(message, Style::default().fg(fg)))
                    .wrap(Wrap { trim: false })
                    .block(popup_block(title, active, theme)),
                area,
            );
        }
    }
}

fn layout_panel(layout: PopupLayout) -> Bounds {
    match layout {
        PopupLayout::Plain { panel } | PopupLayout::WithSuggestions { panel, .. } => panel,
        PopupLayout::CommitMessage { summary, .. } => summary,
    }
}

fn clear(frame: &mut Frame, bounds: Bounds, screen: Rect) -> Rect {
    let area = bounds.to_rect(screen);
    frame.render_widget(Clear, area);
    area
}

/// Puts the terminal cursor after the last character of `text` inside the
/// bordered `area`.
fn place_cursor(frame: &mut Frame, area: Rect, text: &str) {
    if area.width < 3 || area.height < 3 {
        return;
    }
    let row = text.matches('\n').count() as u16;
    let last_line = text.rsplit('\n').next().unwrap_or_default();
    let col = (last_line.width() as u16).min(area.width - 3);
    let row = row.min(area.height - 3);
    frame.set_cursor_position(Position::new(area.x + 1 + col, area.y + 1 + row));
}

#[cfg(test)]
#[path = "../tests/unit/ui_tests.rs"]
mod tests;
