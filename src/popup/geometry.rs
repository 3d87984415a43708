use ratatui::layout::{Rect, Size};
use unicode_width::UnicodeWidthStr;

/// Rows taken by the suggestion list under a prompt when it is visible.
pub const SUGGESTIONS_HEIGHT: i32 = 11;
pub const COMMIT_SUMMARY_HEIGHT: i32 = 3;
pub const COMMIT_DESCRIPTION_MIN_HEIGHT: i32 = 7;
const MIN_PANEL_WIDTH: i32 = 80;

/// Frame corners, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl Bounds {
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    fn shifted(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x0 + dx, self.y0 + dy, self.x1 + dx, self.y1 + dy)
    }

    /// Converts to a ratatui rect clipped to `area`.
    pub fn to_rect(self, area: Rect) -> Rect {
        let x0 = self.x0.max(0);
        let y0 = self.y0.max(0);
        let width = (self.x1 - x0 + 1).max(0);
        let height = (self.y1 - y0 + 1).max(0);
        Rect::new(
            x0.min(u16::MAX as i32) as u16,
            y0.min(u16::MAX as i32) as u16,
            width.min(u16::MAX as i32) as u16,
            height.min(u16::MAX as i32) as u16,
        )
        .intersection(area)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupLayout {
    Plain {
        panel: Bounds,
    },
    WithSuggestions {
        panel: Bounds,
        suggestions: Option<Bounds>,
    },
    CommitMessage {
        summary: Bounds,
        description: Bounds,
    },
}

impl PopupLayout {
    fn shifted(self, dx: i32, dy: i32) -> Self {
        match self {
            PopupLayout::Plain { panel } => PopupLayout::Plain {
                panel: panel.shifted(dx, dy),
            },
            PopupLayout::WithSuggestions { panel, suggestions } => PopupLayout::WithSuggestions {
                panel: panel.shifted(dx, dy),
                suggestions: suggestions.map(|bounds| bounds.shifted(dx, dy)),
            },
            PopupLayout::CommitMessage {
                summary,
                description,
            } => PopupLayout::CommitMessage {
                summary: summary.shifted(dx, dy),
                description: description.shifted(dx, dy),
            },
        }
    }

    fn outer(self) -> Bounds {
        match self {
            PopupLayout::Plain { panel } => panel,
            PopupLayout::WithSuggestions { panel, suggestions } => match suggestions {
                Some(list) => Bounds::new(panel.x0, panel.y0, list.x1, list.y1),
                None => panel,
            },
            PopupLayout::CommitMessage {
                summary,
                description,
            } => Bounds::new(summary.x0, summary.y0, description.x1, description.y1),
        }
    }

    /// Offsets a nested popup diagonally from its parent, then pulls it back
    /// inside the terminal if the offset pushed it over the edge.
    pub fn nested(self, term: Size, depth: usize) -> Self {
        let depth = depth as i32;
        let moved = self.shifted(2 * depth, depth);
        let outer = moved.outer();
        let overflow_x = (outer.x1 - (term.width as i32 - 1)).max(0).min(outer.x0.max(0));
        let overflow_y = (outer.y1 - (term.height as i32 - 1)).max(0).min(outer.y0.max(0));
        moved.shifted(-overflow_x, -overflow_y)
    }
}

/// Popups take 4/7 of the terminal, but never less than 80 columns unless
/// the terminal itself is narrower.
pub fn panel_width(term: Size) -> i32 {
    let width = term.width as i32;
    let panel = 4 * width / 7;
    if panel >= MIN_PANEL_WIDTH {
        panel
    } else if width - 2 < MIN_PANEL_WIDTH {
        width - 2
    } else {
        MIN_PANEL_WIDTH
    }
}

/// Rows needed to show `message` at `width` columns.
pub fn message_height(wrap: bool, message: &str, width: i32) -> i32 {
    let lines = message.split('\n');
    if !wrap {
        return lines.count() as i32;
    }
    let width = width.max(1);
    lines
        .map(|line| UnicodeWidthStr::width(line) as i32 / width + 1)
        .sum()
}

/// Centres a panel of `panel_width` x `content_height`; the height is capped
/// at 3/4 of the terminal.
pub fn dimensions(term: Size, panel_width: i32, content_height: i32) -> Bounds {
    let width = term.width as i32;
    let height = term.height as i32;
    let panel_height = content_height.min(height * 3 / 4);
    Bounds::new(
        width / 2 - panel_width / 2,
        height / 2 - panel_height / 2 - panel_height % 2 - 1,
        width / 2 + panel_width / 2,
        height / 2 + panel_height / 2,
    )
}

pub fn plain(term: Size, depth: usize, content: &str, wrap: bool) -> PopupLayout {
    let width = panel_width(term);
    let panel = dimensions(term, width, message_height(wrap, content, width));
    PopupLayout::Plain { panel }.nested(term, depth)
}

/// Prompt box with an optional suggestion list directly below it.
pub fn with_suggestions(term: Size, depth: usize, content: &str, suggestions_visible: bool) -> PopupLayout {
    let width = panel_width(term);
    let list_height = if suggestions_visible { SUGGESTIONS_HEIGHT } else { 0 };
    let outer = dimensions(term, width, message_height(false, content, width) + list_height);
    let panel_bottom = outer.y1 - list_height;
    let panel = Bounds::new(outer.x0, outer.y0, outer.x1, panel_bottom);
    let suggestions = suggestions_visible.then(|| {
        let top = panel_bottom + 1;
        Bounds::new(outer.x0, top, outer.x1, top + list_height)
    });
    PopupLayout::WithSuggestions { panel, suggestions }.nested(term, depth)
}

/// Fixed-height summary field stacked on a description field that grows
/// with its content.
pub fn commit_message(term: Size, depth: usize, description: &str) -> PopupLayout {
    let width = panel_width(term);
    let content_height = message_height(false, description, width).max(COMMIT_DESCRIPTION_MIN_HEIGHT);
    let outer = dimensions(term, width, content_height);
    let summary = Bounds::new(outer.x0, outer.y0, outer.x1, outer.y0 + COMMIT_SUMMARY_HEIGHT - 1);
    let description = Bounds::new(
        outer.x0,
        outer.y0 + COMMIT_SUMMARY_HEIGHT,
        outer.x1,
        outer.y1 + COMMIT_SUMMARY_HEIGHT,
    );
    PopupLayout::CommitMessage {
        summary,
        description,
    }
    .nested(term, depth)
}
