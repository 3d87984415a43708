use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use ratatui::layout::Size;
use tracing::{debug, warn};

pub mod geometry;

pub use geometry::{Bounds, PopupLayout};

use crate::exec::{CancellationToken, Executor, spawn_ticker};
use crate::views::Views;

pub type ConfirmHandler = Box<dyn FnOnce(PopupResponse) -> Result<()> + Send + 'static>;
pub type CloseHandler = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// What the user submitted when confirming a popup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopupResponse {
    Confirmed,
    Text(String),
    MenuItem(usize),
    CommitMessage { summary: String, description: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub label: String,
    pub key: Option<char>,
    pub tooltip: Option<String>,
}

impl MenuItem {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            key: None,
            tooltip: None,
        }
    }

    pub fn key(mut self, key: char) -> Self {
        self.key = Some(key);
        self
    }

    pub fn tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip = Some(tooltip.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitField {
    #[default]
    Summary,
    Description,
}

/// Popup content together with its editable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopupKind {
    Confirm {
        message: String,
    },
    Prompt {
        input: String,
        mask: bool,
        suggestions: Vec<String>,
        selected_suggestion: Option<usize>,
    },
    Menu {
        items: Vec<MenuItem>,
        selected: usize,
    },
    CommitMessage {
        summary: String,
        description: String,
        focus: CommitField,
    },
    Error {
        message: String,
    },
}

impl PopupKind {
    /// Suggestions that contain the current input, case-insensitively.
    pub fn visible_suggestions(&self) -> Vec<&str> {
        let PopupKind::Prompt {
            input, suggestions, ..
        } = self
        else {
            return Vec::new();
        };
        let needle = input.to_lowercase();
        suggestions
            .iter()
            .filter(|suggestion| suggestion.to_lowercase().contains(&needle))
            .map(String::as_str)
            .collect()
    }

    pub fn is_editable(&self) -> bool {
        matches!(self, PopupKind::Prompt { .. } | PopupKind::CommitMessage { .. })
    }

    pub fn insert_char(&mut self, ch: char) {
        match self {
            PopupKind::Prompt {
                input,
                selected_suggestion,
                ..
            } => {
                input.push(ch);
                *selected_suggestion = None;
            }
            PopupKind::CommitMessage {
                summary,
                description,
                focus,
            } => match focus {
                CommitField::Summary => summary.push(ch),
                CommitField::Description => description.push(ch),
            },
            _ => {}
        }
    }

    pub fn backspace(&mut self) {
        match self {
            PopupKind::Prompt {
                input,
                selected_suggestion,
                ..
            } => {
                input.pop();
                *selected_suggestion = None;
            }
            PopupKind::CommitMessage {
                summary,
                description,
                focus,
            } => {
                match focus {
                    CommitField::Summary => summary.pop(),
                    CommitField::Description => description.pop(),
                };
            }
            _ => {}
        }
    }

    /// Enter inside the description adds a line instead of confirming.
    pub fn newline(&mut self) -> bool {
        if let PopupKind::CommitMessage {
            description,
            focus: CommitField::Description,
            ..
        } = self
        {
            description.push('\n');
            return true;
        }
        false
    }

    pub fn toggle_focus(&mut self) {
        if let PopupKind::CommitMessage { focus, .. } = self {
            *focus = match *focus {
                CommitField::Summary => CommitField::Description,
                CommitField::Description => CommitField::Summary,
            };
        }
    }

    pub fn move_selection(&mut self, delta: isize) {
        let visible = self.visible_suggestions().len();
        match self {
            PopupKind::Menu { items, selected } if !items.is_empty() => {
                *selected = selected.saturating_add_signed(delta).min(items.len() - 1);
            }
            PopupKind::Prompt {
                selected_suggestion,
                ..
            } if visible > 0 => {
                let next = match *selected_suggestion {
                    None if delta < 0 => None,
                    None => Some(0),
                    Some(0) if delta < 0 => None,
                    Some(index) => Some(index.saturating_add_signed(delta).min(visible - 1)),
                };
                *selected_suggestion = next;
            }
            _ => {}
        }
    }

    pub fn select(&mut self, index: usize) {
        if let PopupKind::Menu { items, selected } = self
            && index < items.len()
        {
            *selected = index;
        }
    }

    /// Index of the menu item bound to `key`.
    pub fn menu_index_for_key(&self, key: char) -> Option<usize> {
        let PopupKind::Menu { items, .. } = self else {
            return None;
        };
        items.iter().position(|item| item.key == Some(key))
    }

    pub fn response(&self) -> PopupResponse {
        match self {
            PopupKind::Confirm { .. } | PopupKind::Error { .. } => PopupResponse::Confirmed,
            PopupKind::Prompt {
                input,
                selected_suggestion,
                ..
            } => {
                let chosen = selected_suggestion
                    .and_then(|index| self.visible_suggestions().get(index).map(|s| s.to_string()));
                PopupResponse::Text(chosen.unwrap_or_else(|| input.clone()))
            }
            PopupKind::Menu { selected, .. } => PopupResponse::MenuItem(*selected),
            PopupKind::CommitMessage {
                summary,
                description,
                ..
            } => PopupResponse::CommitMessage {
                summary: summary.clone(),
                description: description.clone(),
            },
        }
    }

    /// Recomputes where this popup sits for the given terminal and depth.
    pub fn layout(&self, term: Size, depth: usize) -> PopupLayout {
        match self {
            PopupKind::Confirm { message } | PopupKind::Error { message } => {
                geometry::plain(term, depth, message, true)
            }
            PopupKind::Prompt { input, .. } => {
                let visible = !self.visible_suggestions().is_empty();
                geometry::with_suggestions(term, depth, input, visible)
            }
            PopupKind::Menu { items, .. } => {
                let labels: Vec<&str> = items.iter().map(|item| item.label.as_str()).collect();
                geometry::plain(term, depth, &labels.join("\n"), false)
            }
            PopupKind::CommitMessage { description, .. } => {
                geometry::commit_message(term, depth, description)
            }
        }
    }
}

/// A request to open a popup.
pub struct PopupOpts {
    pub title: String,
    pub kind: PopupKind,
    /// Loader popups animate a spinner and may have other popups stacked on
    /// top of them.
    pub has_loader: bool,
    token: CancellationToken,
    on_confirm: Option<ConfirmHandler>,
    on_close: Option<CloseHandler>,
}

impl PopupOpts {
    pub fn new(title: impl Into<String>, kind: PopupKind) -> Self {
        Self {
            title: title.into(),
            kind,
            has_loader: false,
            token: CancellationToken::new(),
            on_confirm: None,
            on_close: None,
        }
    }

    pub fn confirm(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            title,
            PopupKind::Confirm {
                message: message.into(),
            },
        )
    }

    pub fn prompt(title: impl Into<String>, initial: impl Into<String>) -> Self {
        Self::new(
            title,
            PopupKind::Prompt {
                input: initial.into(),
                mask: false,
                suggestions: Vec::new(),
                selected_suggestion: None,
            },
        )
    }

    pub fn menu(title: impl Into<String>, items: Vec<MenuItem>) -> Self {
        Self::new(title, PopupKind::Menu { items, selected: 0 })
    }

    pub fn commit_message(summary: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(
            "Commit summary",
            PopupKind::CommitMessage {
                summary: summary.into(),
                description: description.into(),
                focus: CommitField::Summary,
            },
        )
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(
            "Error",
            PopupKind::Error {
                message: message.into(),
            },
        )
    }

    pub fn with_loader(mut self) -> Self {
        self.has_loader = true;
        self
    }

    pub fn masked(mut self) -> Self {
        if let PopupKind::Prompt { mask, .. } = &mut self.kind {
            *mask = true;
        }
        self
    }

    pub fn with_suggestions(mut self, list: Vec<String>) -> Self {
        if let PopupKind::Prompt { suggestions, .. } = &mut self.kind {
            *suggestions = list;
        }
        self
    }

    pub fn on_confirm<F>(mut self, f: F) -> Self
    where
        F: FnOnce(PopupResponse) -> Result<()> + Send + 'static,
    {
        self.on_confirm = Some(Box::new(f));
        self
    }

    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.on_close = Some(Box::new(f));
        self
    }

    /// Cancelled when the popup closes or is rejected.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

pub struct Popup {
    pub title: String,
    pub kind: PopupKind,
    pub has_loader: bool,
    layout: PopupLayout,
    token: CancellationToken,
    on_confirm: Option<ConfirmHandler>,
    on_close: Option<CloseHandler>,
}

impl Popup {
    pub fn layout(&self) -> PopupLayout {
        self.layout
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    Opened,
    /// Another popup without a loader was already active; the request's
    /// token has been cancelled.
    Rejected,
}

struct StackState {
    popups: Vec<Popup>,
    terminal: Size,
}

impl StackState {
    fn relayout(&mut self) {
        let terminal = self.terminal;
        for (depth, popup) in self.popups.iter_mut().enumerate() {
            popup.layout = popup.kind.layout(terminal, depth);
        }
    }
}

/// Open popups, newest last. Cloning shares the stack.
#[derive(Clone)]
pub struct PopupStack {
    state: Arc<Mutex<StackState>>,
    executor: Executor,
    views: Views,
    loader_interval: Duration,
}

impl PopupStack {
    pub fn new(executor: Executor, views: Views, terminal: Size, loader_interval: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(StackState {
                popups: Vec::new(),
                terminal,
            })),
            executor,
            views,
            loader_interval,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pushes a popup unless one without a loader is already showing. A
    /// rejected request is logged and its token cancelled; the active popup
    /// is left alone.
    pub fn open(&self, opts: PopupOpts) -> OpenOutcome {
        let mut state = self.lock();
        if let Some(active) = state.popups.last()
            && !active.has_loader
        {
            warn!(
                requested = %opts.title,
                active = %active.title,
                "popup already open; dropping request"
            );
            opts.token.cancel();
            return OpenOutcome::Rejected;
        }

        let depth = state.popups.len();
        let layout = opts.kind.layout(state.terminal, depth);
        if opts.has_loader {
            let executor = self.executor.clone();
            let views = self.views.clone();
            spawn_ticker(
                &self.executor,
                "popup-loader",
                self.loader_interval,
                opts.token.clone(),
                move || {
                    let views = views.clone();
                    executor.on_ui_thread(move || {
                        views.touch();
                        Ok(())
                    });
                },
            );
        }
        debug!(title = %opts.title, depth, loader = opts.has_loader, "popup opened");
        state.popups.push(Popup {
            title: opts.title,
            kind: opts.kind,
            has_loader: opts.has_loader,
            layout,
            token: opts.token,
            on_confirm: opts.on_confirm,
            on_close: opts.on_close,
        });
        self.views.touch();
        OpenOutcome::Opened
    }

    fn pop(&self) -> Option<Popup> {
        let popup = self.lock().popups.pop()?;
        popup.token.cancel();
        self.views.touch();
        Some(popup)
    }

    /// Closes the active popup and runs its close handler.
    pub fn close(&self) -> Result<()> {
        match self.pop().and_then(|popup| popup.on_close) {
            Some(on_close) => on_close(),
            None => Ok(()),
        }
    }

    /// Closes the active popup and hands its response to the confirm
    /// handler. Handlers run after the popup is gone, so they may open
    /// another one.
    pub fn confirm(&self) -> Result<()> {
        let Some(popup) = self.pop() else {
            return Ok(());
        };
        let response = popup.kind.response();
        match popup.on_confirm {
            Some(on_confirm) => on_confirm(response),
            None => Ok(()),
        }
    }

    /// Removes the popup owning `token` wherever it sits in the stack,
    /// without running handlers. Used when a loader's work finishes.
    pub fn remove(&self, token: &CancellationToken) -> bool {
        let mut state = self.lock();
        let Some(index) = state.popups.iter().position(|popup| popup.token.same_as(token)) else {
            return false;
        };
        let popup = state.popups.remove(index);
        popup.token.cancel();
        state.relayout();
        drop(state);
        self.views.touch();
        true
    }

    pub fn with_active<R>(&self, f: impl FnOnce(&Popup) -> R) -> Option<R> {
        self.lock().popups.last().map(f)
    }

    pub fn with_all<R>(&self, f: impl FnOnce(&[Popup]) -> R) -> R {
        f(&self.lock().popups)
    }

    /// Mutates the active popup's content and recomputes its layout.
    pub fn edit_active(&self, f: impl FnOnce(&mut PopupKind)) -> bool {
        let mut state = self.lock();
        let terminal = state.terminal;
        let depth = state.popups.len().saturating_sub(1);
        let Some(popup) = state.popups.last_mut() else {
            return false;
        };
        f(&mut popup.kind);
        popup.layout = popup.kind.layout(terminal, depth);
        true
    }

    pub fn resize(&self, terminal: Size) {
        let mut state = self.lock();
        state.terminal = terminal;
        state.relayout();
    }

    pub fn depth(&self) -> usize {
        self.lock().popups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.depth() == 0
    }
}

#[cfg(test)]
#[path = "../tests/unit/popup_tests.rs"]
mod tests;
