use ratatui::style::{Color, Modifier, Style};

/// Colours shared by every page. Built once and handed to render calls.
#[derive(Clone, Debug)]
pub(crate) struct Theme {
    pub(crate) title_fg: Color,
    pub(crate) text: Color,
    pub(crate) muted: Color,
    pub(crate) faint: Color,
    pub(crate) error: Color,
    pub(crate) warning: Color,
    pub(crate) success: Color,
    pub(crate) selected: Color,
    pub(crate) heat_done: Color,
    pub(crate) heat_missed: Color,
    pub(crate) dot_active: Color,
    pub(crate) dot_inactive: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            title_fg: Color::White,
            text: Color::Reset,
            muted: Color::Rgb(0x88, 0x88, 0x88),
            faint: Color::Rgb(0x55, 0x55, 0x55),
            error: Color::Rgb(0xFF, 0x6B, 0x6B),
            warning: Color::Rgb(0xF5, 0x9E, 0x0B),
            success: Color::Rgb(0x04, 0xB5, 0x75),
            selected: Color::Rgb(0xEE, 0x6F, 0xF8),
            heat_done: Color::Rgb(0x04, 0xB5, 0x75),
            heat_missed: Color::Rgb(0x3C, 0x3C, 0x3C),
            dot_active: Color::Gray,
            dot_inactive: Color::DarkGray,
        }
    }
}

impl Theme {
    pub(crate) fn muted(&self) -> Style {
        Style::default().fg(self.muted)
    }

    pub(crate) fn faint(&self) -> Style {
        Style::default().fg(self.faint)
    }

    pub(crate) fn error(&self) -> Style {
        Style::default().fg(self.error)
    }

    pub(crate) fn selected(&self) -> Style {
        Style::default()
            .fg(self.selected)
            .add_modifier(Modifier::BOLD)
    }

    pub(crate) fn heading(&self) -> Style {
        Style::default().add_modifier(Modifier::BOLD)
    }
}
