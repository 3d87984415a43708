use ratatui::style::Color;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct Theme {
    pub panel_bg: Color,
    pub popup_bg: Color,
    pub border_fg: Color,
    pub active_border_fg: Color,
    pub selected_bg: Color,
    pub text_fg: Color,
    pub muted_fg: Color,
    pub error_fg: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            panel_bg: Color::Rgb(36, 36, 36),
            popup_bg: Color::Rgb(48, 48, 48),
            border_fg: Color::Rgb(110, 110, 110),
            active_border_fg: Color::Rgb(120, 200, 120),
            selected_bg: Color::Rgb(60, 70, 90),
            text_fg: Color::Rgb(225, 225, 225),
            muted_fg: Color::Rgb(150, 150, 150),
            error_fg: Color::Rgb(230, 100, 100),
        }
    }
}

impl Theme {
    /// Applies the colours set in `config` on top of the defaults.
    pub fn from_config(config: &ThemeConfig) -> Self {
        let base = Self::default();
        let pick = |rgb: Option<Rgb>, fallback: Color| rgb.map_or(fallback, Rgb::to_color);
        Self {
            panel_bg: pick(config.panel_bg, base.panel_bg),
            popup_bg: pick(config.popup_bg, base.popup_bg),
            border_fg: pick(config.border_fg, base.border_fg),
            active_border_fg: pick(config.active_border_fg, base.active_border_fg),
            selected_bg: pick(config.selected_bg, base.selected_bg),
            text_fg: pick(config.text_fg, base.text_fg),
            muted_fg: pick(config.muted_fg, base.muted_fg),
            error_fg: pick(config.error_fg, base.error_fg),
        }
    }
}

/// `[gui.theme]` table; unset colours keep their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub panel_bg: Option<Rgb>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popup_bg: Option<Rgb>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub border_fg: Option<Rgb>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_border_fg: Option<Rgb>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_bg: Option<Rgb>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_fg: Option<Rgb>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub muted_fg: Option<Rgb>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_fg: Option<Rgb>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    fn to_color(self) -> Color {
        Color::Rgb(self.r, self.g, self.b)
    }
}
