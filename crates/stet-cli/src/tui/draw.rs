use super::app_core::LOG_PANEL_HEIGHT;
use super::pages::Binding;
use super::*;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

const LOG_PANEL_BORDER_HEIGHT: u16 = 2;
const BINDING_SEPARATOR: &str = " • ";

const GLOBAL_BINDINGS: [Binding; 3] = [
    Binding::new("←/→", "switch page"),
    Binding::new("?", "toggle help"),
    Binding::new("q", "quit"),
];

impl App {
    pub(in crate::tui) fn draw(&self, frame: &mut Frame) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(2)
            .vertical_margin(1)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
                Constraint::Length(self.help_height()),
                Constraint::Length(1),
            ])
            .split(frame.area());

        let Some(page) = self.pages.get(self.active) else {
            return;
        };
        let title = page.title();
        frame.render_widget(
            Paragraph::new(Line::from(Span::styled(
                format!(" {} ", title.text),
                Style::default()
                    .fg(self.theme.title_fg)
                    .bg(title.color)
                    .add_modifier(Modifier::BOLD),
            ))),
            layout[0],
        );

        page.render(frame, layout[2], &self.theme);

        if self.show_full_help {
            self.draw_full_help(frame, layout[4], &page.bindings());
        } else {
            frame.render_widget(
                Paragraph::new(self.short_help(&page.bindings())),
                layout[4],
            );
        }
        frame.render_widget(Paragraph::new(self.paginator()), layout[5]);
    }

    fn binding_spans(&self, bindings: &[Binding]) -> Vec<Span<'static>> {
        let mut spans = Vec::new();
        for (index, binding) in bindings.iter().enumerate() {
            if index > 0 {
                spans.push(Span::styled(BINDING_SEPARATOR, self.theme.faint()));
            }
            spans.push(Span::styled(binding.keys, self.theme.muted()));
            spans.push(Span::raw(" "));
            spans.push(Span::styled(binding.help, self.theme.faint()));
        }
        spans
    }

    /// Page bindings followed by help and quit on one line.
    fn short_help(&self, page_bindings: &[Binding]) -> Line<'static> {
        let mut bindings = page_bindings.to_vec();
        bindings.push(Binding::new("?", "more"));
        bindings.push(Binding::new("q", "quit"));
        Line::from(self.binding_spans(&bindings))
    }

    fn draw_full_help(&self, frame: &mut Frame, area: Rect, page_bindings: &[Binding]) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(LOG_PANEL_HEIGHT),
            ])
            .split(area);
        frame.render_widget(
            Paragraph::new(Line::from(self.binding_spans(page_bindings))),
            rows[0],
        );
        frame.render_widget(
            Paragraph::new(Line::from(self.binding_spans(&GLOBAL_BINDINGS))),
            rows[1],
        );
        self.draw_log_panel(frame, rows[2]);
    }

    fn draw_log_panel(&self, frame: &mut Frame, area: Rect) {
        let max_lines = area.height.saturating_sub(LOG_PANEL_BORDER_HEIGHT) as usize;
        if max_lines == 0 {
            return;
        }
        let entries = self.log_buffer.entries();
        let lines: Vec<Line> = if entries.is_empty() {
            vec![Line::styled("No log messages yet.", self.theme.faint())]
        } else {
            let start = entries.len().saturating_sub(max_lines);
            entries[start..]
                .iter()
                .map(|entry| Line::raw(entry.format_compact()))
                .collect()
        };
        let widget = Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(self.theme.faint())
                .title("Logs"),
        );
        frame.render_widget(widget, area);
    }

    fn paginator(&self) -> Line<'static> {
        let spans: Vec<Span> = (0..self.pages.len())
            .map(|index| {
                let color = if index == self.active {
                    self.theme.dot_active
                } else {
                    self.theme.dot_inactive
                };
                Span::styled("• ", Style::default().fg(color))
            })
            .collect();
        Line::from(spans)
    }
}
