use super::{Binding, Page, PageEvent, PageId, PageMsg, PageTitle};
use crate::tui::Message;
use crate::tui::effect::Effect;
use crate::tui::keys::{clamp_index, is_down, is_up, plain_char, scroll_for};
use crate::tui::theme::Theme;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, Paragraph};
use stet_core::Store;
use stet_core::clock;
use stet_core::config::{HISTORY_MAX_DAYS, HISTORY_MIN_DAYS};
use stet_core::model::{HistoryTask, JournalEntry};
use time::macros::format_description;
use time::{Date, Duration};
use tracing::{debug, warn};

const DEFAULT_DAYS: usize = 30;
const TITLE_WIDTH: usize = 20;
const TITLE_GAP: usize = 2;
const ROW_PADDING: usize = 6;
const JOURNAL_LIST_HEIGHT: u16 = 7;
const COMPARISON_BOX_HEIGHT: u16 = 4;

/// Heat-map columns that fit next to the task titles.
pub(crate) fn days_for_width(width: u16) -> usize {
    (width as usize)
        .saturating_sub(TITLE_WIDTH + TITLE_GAP + ROW_PADDING)
        .clamp(HISTORY_MIN_DAYS, HISTORY_MAX_DAYS)
}

#[derive(Debug)]
pub(crate) enum HistoryMsg {
    Loaded {
        days: usize,
        result: Result<Vec<HistoryTask>, String>,
    },
    JournalLoaded(Result<Vec<JournalEntry>, String>),
    Saved {
        task_id: String,
        date: Date,
        completed: bool,
    },
    SaveFailed {
        task_id: String,
        date: Date,
        completed: bool,
        error: String,
    },
}

fn deliver(msg: HistoryMsg) -> Message {
    Message::Page(PageId::History, PageMsg::History(msg))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum HistoryMode {
    Tasks,
    Journal,
    Pager,
}

/// Completion heat-map plus a browser over past journal entries.
pub(crate) struct HistoryPage {
    store: Store,
    tasks: Vec<HistoryTask>,
    task_selected: usize,
    cell: usize,
    days: usize,
    started: bool,
    mode: HistoryMode,
    entries: Vec<JournalEntry>,
    journal_selected: usize,
    pager_scroll: usize,
    status: Option<String>,
    width: u16,
    height: u16,
}

impl HistoryPage {
    pub(crate) fn new(store: Store) -> Self {
        Self {
            store,
            tasks: Vec::new(),
            task_selected: 0,
            cell: 0,
            days: DEFAULT_DAYS,
            started: false,
            mode: HistoryMode::Tasks,
            entries: Vec::new(),
            journal_selected: 0,
            pager_scroll: 0,
            status: None,
            width: 0,
            height: 0,
        }
    }

    /// Column dates, newest first, starting yesterday.
    fn dates(&self) -> Vec<Date> {
        let yesterday = clock::yesterday();
        (0..self.days)
            .map(|offset| yesterday.saturating_sub(Duration::days(offset as i64)))
            .collect()
    }

    fn load_history(&self) -> Effect {
        let store = self.store.clone();
        let days = self.days;
        Effect::blocking(move || {
            let to = clock::yesterday();
            let from = to.saturating_sub(Duration::days(days as i64 - 1));
            let result = store.load_history(from, to).map_err(|err| err.to_string());
            deliver(HistoryMsg::Loaded { days, result })
        })
    }

    fn load_journal(&self) -> Effect {
        let store = self.store.clone();
        Effect::blocking(move || {
            let result = store.list_journal_entries().map_err(|err| err.to_string());
            deliver(HistoryMsg::JournalLoaded(result))
        })
    }

    fn toggle_cell(&mut self) -> Vec<Effect> {
        let Some(date) = self.dates().get(self.cell).copied() else {
            return Vec::new();
        };
        let Some(task) = self.tasks.get_mut(self.task_selected) else {
            return Vec::new();
        };
        let completed = !task.completed_on(date);
        task.set_completed(date, completed);
        let task_id = task.id.clone();
        debug!(
            task_id = %task_id,
            date = %clock::format_date(date),
            completed,
            "History cell toggled"
        );

        let store = self.store.clone();
        vec![Effect::blocking(move || {
            match store.set_completion(&task_id, date, completed) {
                Ok(()) => deliver(HistoryMsg::Saved {
                    task_id,
                    date,
                    completed,
                }),
                Err(err) => deliver(HistoryMsg::SaveFailed {
                    task_id,
                    date,
                    completed,
                    error: err.to_string(),
                }),
            }
        })]
    }

    fn handle_msg(&mut self, msg: HistoryMsg) {
        match msg {
            HistoryMsg::Loaded { days, result } => {
                if days != self.days {
                    debug!(days, current = self.days, "Dropping stale history load");
                    return;
                }
                match result {
                    Ok(tasks) => {
                        self.tasks = tasks;
                        self.task_selected = clamp_index(self.task_selected, self.tasks.len());
                    }
                    Err(err) => {
                        warn!(error = %err, "Loading history failed");
                        self.status = Some(format!("load failed: {err}"));
                    }
                }
            }
            HistoryMsg::JournalLoaded(Ok(entries)) => {
                self.entries = entries;
                self.journal_selected = clamp_index(self.journal_selected, self.entries.len());
            }
            HistoryMsg::JournalLoaded(Err(err)) => {
                warn!(error = %err, "Loading journal history failed");
                self.status = Some(format!("journal load failed: {err}"));
            }
            HistoryMsg::Saved {
                date, completed, ..
            } => {
                let state = if completed {
                    "marked completed"
                } else {
                    "marked incomplete"
                };
                self.status = Some(format!("{}: {state}", clock::format_date(date)));
            }
            HistoryMsg::SaveFailed {
                task_id,
                date,
                completed,
                error,
            } => {
                warn!(task_id = %task_id, error = %error, "Saving history completion failed");
                if let Some(task) = self.tasks.iter_mut().find(|task| task.id == task_id) {
                    task.set_completed(date, !completed);
                }
                self.status = Some(format!("save failed: {error}"));
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Vec<Effect> {
        match self.mode {
            HistoryMode::Tasks => self.handle_task_keys(key),
            HistoryMode::Journal => {
                self.handle_journal_keys(key);
                Vec::new()
            }
            HistoryMode::Pager => {
                self.handle_pager_keys(key);
                Vec::new()
            }
        }
    }

    fn handle_task_keys(&mut self, key: KeyEvent) -> Vec<Effect> {
        match (key.code, plain_char(&key)) {
            (_, Some('[')) => self.cell = self.cell.saturating_sub(1),
            (_, Some(']')) => self.cell = clamp_index(self.cell + 1, self.days),
            (_, Some(' ')) => return self.toggle_cell(),
            (KeyCode::Tab, _) => self.mode = HistoryMode::Journal,
            _ if is_down(&key) => {
                if self.task_selected + 1 >= self.tasks.len() {
                    self.mode = HistoryMode::Journal;
                } else {
                    self.task_selected += 1;
                }
            }
            _ if is_up(&key) => self.task_selected = self.task_selected.saturating_sub(1),
            _ => {}
        }
        Vec::new()
    }

    fn handle_journal_keys(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Tab => self.mode = HistoryMode::Tasks,
            KeyCode::Enter => {
                if !self.entries.is_empty() {
                    self.mode = HistoryMode::Pager;
                    self.pager_scroll = 0;
                }
            }
            _ if is_up(&key) => {
                if self.journal_selected == 0 {
                    self.mode = HistoryMode::Tasks;
                } else {
                    self.journal_selected -= 1;
                }
            }
            _ if is_down(&key) => {
                self.journal_selected = clamp_index(self.journal_selected + 1, self.entries.len());
            }
            _ => {}
        }
    }

    fn handle_pager_keys(&mut self, key: KeyEvent) {
        let page = self.pager_height().max(1);
        let max_scroll = self.pager_lines(&Theme::default()).len().saturating_sub(page);
        match key.code {
            KeyCode::Esc => self.mode = HistoryMode::Journal,
            KeyCode::PageUp => self.pager_scroll = self.pager_scroll.saturating_sub(page),
            KeyCode::PageDown => self.pager_scroll = (self.pager_scroll + page).min(max_scroll),
            _ if plain_char(&key) == Some('q') => self.mode = HistoryMode::Journal,
            _ if is_up(&key) => self.pager_scroll = self.pager_scroll.saturating_sub(1),
            _ if is_down(&key) => self.pager_scroll = (self.pager_scroll + 1).min(max_scroll),
            _ => {}
        }
    }

    fn selected_date(&self) -> Date {
        self.entries
            .get(self.journal_selected)
            .map_or_else(clock::today, |entry| entry.entry_date)
    }

    /// Entries sharing the selected entry's month and day, newest year first.
    fn same_day_entries(&self) -> Vec<&JournalEntry> {
        let selected = self.selected_date();
        let mut matches: Vec<&JournalEntry> = self
            .entries
            .iter()
            .filter(|entry| {
                entry.entry_date.month() == selected.month()
                    && entry.entry_date.day() == selected.day()
            })
            .collect();
        matches.sort_by_key(|entry| std::cmp::Reverse(entry.entry_date.year()));
        matches
    }

    fn comparison(&self) -> [(String, Option<&str>); 3] {
        let year = self.selected_date().year();
        let same_day = self.same_day_entries();
        let content_for = |target: i32| {
            same_day
                .iter()
                .find(|entry| entry.entry_date.year() == target)
                .map(|entry| entry.content.as_str())
        };
        [
            (format!("This Year ({year})"), content_for(year)),
            (format!("Last Year ({})", year - 1), content_for(year - 1)),
            (format!("2 Years Ago ({})", year - 2), content_for(year - 2)),
        ]
    }

    fn pager_height(&self) -> usize {
        self.height.saturating_sub(4) as usize
    }

    fn pager_lines(&self, theme: &Theme) -> Vec<Line<'static>> {
        let day_month = self
            .selected_date()
            .format(format_description!("[month repr:long] [day padding:none]"))
            .unwrap_or_else(|_| clock::format_date(self.selected_date()));
        let entries = self.same_day_entries();
        if entries.is_empty() {
            return vec![Line::raw(format!("No journal entries for {day_month}"))];
        }
        let accent = Style::default()
            .fg(theme.success)
            .add_modifier(Modifier::BOLD);
        let mut lines = vec![
            Line::styled(format!("Journal Entries for {day_month}"), accent),
            Line::raw(""),
        ];
        for (index, entry) in entries.iter().enumerate() {
            if index > 0 {
                lines.push(Line::raw(""));
                lines.push(Line::styled("─".repeat(40), theme.faint()));
                lines.push(Line::raw(""));
            }
            lines.push(Line::styled(entry.entry_date.year().to_string(), accent));
            lines.push(Line::raw(""));
            lines.extend(entry.content.split('\n').map(|line| Line::raw(line.to_string())));
        }
        lines
    }

    fn heatmap_row(
        &self,
        index: usize,
        task: &HistoryTask,
        dates: &[Date],
        theme: &Theme,
    ) -> Line<'static> {
        let selected_row = index == self.task_selected && self.mode == HistoryMode::Tasks;
        let title_width = (self.width as usize)
            .saturating_sub(self.days + TITLE_GAP + 2)
            .max(TITLE_WIDTH);
        let mut title: String = task.title.chars().take(title_width).collect();
        if task.title.chars().count() > title_width {
            title = task.title.chars().take(title_width - 1).collect::<String>() + "…";
        }
        let padded = format!("{title:<title_width$}{}", " ".repeat(TITLE_GAP));
        let title_style = if selected_row {
            theme.selected()
        } else {
            Style::default()
        };

        let mut spans = vec![Span::styled(padded, title_style)];
        for (column, date) in dates.iter().enumerate() {
            let (glyph, color) = if task.completed_on(*date) {
                ("■", theme.heat_done)
            } else {
                ("□", theme.heat_missed)
            };
            let mut style = Style::default().fg(color);
            if selected_row && column == self.cell {
                style = style.add_modifier(Modifier::UNDERLINED | Modifier::REVERSED);
            }
            spans.push(Span::styled(glyph, style));
        }
        Line::from(spans)
    }

    fn render_tables(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let boxes_height = if self.entries.is_empty() {
            0
        } else {
            COMPARISON_BOX_HEIGHT * 3
        };
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(3),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(JOURNAL_LIST_HEIGHT),
                Constraint::Length(boxes_height),
                Constraint::Length(1),
            ])
            .split(area);

        frame.render_widget(
            Paragraph::new(Line::styled("Completion History", theme.heading())),
            chunks[0],
        );
        let dates = self.dates();
        let rows = chunks[1].height as usize;
        let offset = scroll_for(self.task_selected, rows, self.tasks.len());
        let mut task_lines: Vec<Line> = self
            .tasks
            .iter()
            .enumerate()
            .skip(offset)
            .take(rows)
            .map(|(index, task)| self.heatmap_row(index, task, &dates, theme))
            .collect();
        if self.tasks.is_empty() {
            task_lines.push(Line::styled("No active tasks.", theme.muted()));
        }
        frame.render_widget(Paragraph::new(task_lines), chunks[1]);

        frame.render_widget(
            Paragraph::new(Line::styled(
                "─".repeat(area.width as usize),
                Style::default().fg(Color::Rgb(0x44, 0x44, 0x44)),
            )),
            chunks[2],
        );
        frame.render_widget(
            Paragraph::new(Line::styled("Journal History", theme.heading())),
            chunks[3],
        );

        let visible = JOURNAL_LIST_HEIGHT as usize;
        let offset = scroll_for(self.journal_selected, visible, self.entries.len());
        let journal_lines: Vec<Line> = self
            .entries
            .iter()
            .enumerate()
            .skip(offset)
            .take(visible)
            .map(|(index, entry)| {
                let selected = index == self.journal_selected && self.mode == HistoryMode::Journal;
                let style = if selected {
                    theme.selected()
                } else {
                    Style::default()
                };
                let marker = if selected { "> " } else { "  " };
                Line::styled(format!("{marker}{}", clock::format_date(entry.entry_date)), style)
            })
            .collect();
        frame.render_widget(Paragraph::new(journal_lines), chunks[4]);

        if !self.entries.is_empty() {
            self.render_comparison(frame, chunks[5], theme);
        }

        if let Some(status) = &self.status {
            let style = if status.contains("failed") {
                theme.error()
            } else {
                theme.muted()
            };
            frame.render_widget(
                Paragraph::new(Line::styled(status.clone(), style)),
                chunks[6],
            );
        }
    }

    fn render_comparison(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(COMPARISON_BOX_HEIGHT); 3])
            .split(area);
        let inner_width = area.width.saturating_sub(2) as usize;
        for ((title, content), row) in self.comparison().into_iter().zip(rows.iter()) {
            let block = Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(theme.faint())
                .title(Span::styled(title, theme.muted().add_modifier(Modifier::BOLD)));
            let body = match content {
                Some(text) if !text.is_empty() => preview(text, inner_width, 2)
                    .into_iter()
                    .map(Line::raw)
                    .collect(),
                _ => vec![Line::styled(
                    "No entry",
                    theme.faint().add_modifier(Modifier::ITALIC),
                )],
            };
            frame.render_widget(Paragraph::new(body).block(block), *row);
        }
    }

    fn render_pager(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(2),
                Constraint::Min(1),
                Constraint::Length(1),
            ])
            .split(area);
        frame.render_widget(
            Paragraph::new(Line::from(vec![
                Span::styled(
                    "Journal Entry Viewer ",
                    Style::default()
                        .fg(theme.success)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled("(press esc or q to return)", theme.faint()),
            ])),
            chunks[0],
        );

        let lines = self.pager_lines(theme);
        let total = lines.len();
        let height = chunks[1].height as usize;
        let scroll = self.pager_scroll.min(total.saturating_sub(height));
        let visible: Vec<Line> = lines.into_iter().skip(scroll).take(height).collect();
        frame.render_widget(Paragraph::new(visible), chunks[1]);

        let max_scroll = total.saturating_sub(height);
        let percent = if max_scroll == 0 {
            100
        } else {
            scroll * 100 / max_scroll
        };
        frame.render_widget(
            Paragraph::new(Line::styled(format!("{percent}%"), theme.faint())),
            chunks[2],
        );
    }

    #[cfg(test)]
    pub(crate) fn mode(&self) -> HistoryMode {
        self.mode
    }
}

/// First `max_lines` lines of `content`, each cut to `width` characters.
fn preview(content: &str, width: usize, max_lines: usize) -> Vec<String> {
    let lines: Vec<&str> = content.split('\n').collect();
    let mut out: Vec<String> = lines
        .iter()
        .take(max_lines)
        .map(|line| {
            if line.chars().count() > width && width > 3 {
                line.chars().take(width - 3).collect::<String>() + "..."
            } else {
                line.to_string()
            }
        })
        .collect();
    if lines.len() > max_lines {
        if let Some(last) = out.last_mut() {
            *last = "...".to_string();
        }
    }
    out
}

impl Page for HistoryPage {
    fn id(&self) -> PageId {
        PageId::History
    }

    fn title(&self) -> PageTitle {
        PageTitle {
            text: "History",
            color: Color::LightBlue,
        }
    }

    fn resize(&mut self, width: u16, height: u16) -> Vec<Effect> {
        self.width = width;
        self.height = height;
        let days = days_for_width(width);
        if days == self.days {
            return Vec::new();
        }
        self.days = days;
        self.cell = clamp_index(self.cell, days);
        if self.started {
            vec![self.load_history()]
        } else {
            Vec::new()
        }
    }

    fn init(&mut self) -> Option<Vec<Effect>> {
        self.started = true;
        Some(vec![self.load_history(), self.load_journal()])
    }

    fn update(&mut self, event: PageEvent) -> Vec<Effect> {
        match event {
            PageEvent::Key(key) => self.handle_key(key),
            PageEvent::Msg(PageMsg::History(msg)) => {
                self.handle_msg(msg);
                Vec::new()
            }
            PageEvent::Msg(_) => Vec::new(),
        }
    }

    fn render(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        if self.mode == HistoryMode::Pager {
            self.render_pager(frame, area, theme);
        } else {
            self.render_tables(frame, area, theme);
        }
    }

    fn bindings(&self) -> Vec<Binding> {
        match self.mode {
            HistoryMode::Tasks => vec![
                Binding::new("[", "earlier"),
                Binding::new("]", "later"),
                Binding::new("space", "toggle"),
                Binding::new("tab", "switch table"),
            ],
            HistoryMode::Journal => vec![
                Binding::new("tab", "switch table"),
                Binding::new("enter", "view entries"),
            ],
            HistoryMode::Pager => vec![Binding::new("esc/q", "back")],
        }
    }

    fn captures_navigation(&self) -> bool {
        self.mode == HistoryMode::Pager
    }

    fn captures_global_keys(&self) -> bool {
        self.mode == HistoryMode::Pager
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tui::keys::{ch, press};
    use std::collections::BTreeSet;
    use time::macros::date;

    fn history_task(id: &str) -> HistoryTask {
        HistoryTask {
            id: id.to_string(),
            title: id.to_uppercase(),
            completions: BTreeSet::new(),
        }
    }

    fn entry(day: Date, content: &str) -> JournalEntry {
        JournalEntry {
            id: clock::format_date(day),
            entry_date: day,
            content: content.to_string(),
            updated_at: 0,
        }
    }

    fn page_with(tasks: Vec<HistoryTask>, entries: Vec<JournalEntry>) -> HistoryPage {
        let mut page = HistoryPage::new(Store::open_in_memory().unwrap());
        let days = page.days;
        page.update(PageEvent::Msg(PageMsg::History(HistoryMsg::Loaded {
            days,
            result: Ok(tasks),
        })));
        page.update(PageEvent::Msg(PageMsg::History(HistoryMsg::JournalLoaded(Ok(
            entries,
        )))));
        page
    }

    #[test]
    fn day_count_follows_width() {
        assert_eq!(days_for_width(10), HISTORY_MIN_DAYS);
        assert_eq!(days_for_width(60), 32);
        assert_eq!(days_for_width(500), HISTORY_MAX_DAYS);
    }

    #[test]
    fn resize_reloads_only_after_init_and_on_change() {
        let mut page = HistoryPage::new(Store::open_in_memory().unwrap());
        assert!(page.resize(60, 40).is_empty());
        assert_eq!(page.days, 32);

        page.init();
        assert!(page.resize(60, 30).is_empty());
        page.cell = 31;
        assert_eq!(page.resize(30, 30).len(), 1);
        assert_eq!(page.cell, HISTORY_MIN_DAYS - 1);
    }

    #[test]
    fn stale_load_for_other_width_is_dropped() {
        let mut page = page_with(vec![history_task("a")], Vec::new());
        page.update(PageEvent::Msg(PageMsg::History(HistoryMsg::Loaded {
            days: 7,
            result: Ok(Vec::new()),
        })));
        assert_eq!(page.tasks.len(), 1);
    }

    #[test]
    fn failed_toggle_rolls_back_cell() {
        let mut page = page_with(vec![history_task("a")], Vec::new());
        page.update(PageEvent::Key(ch(']')));
        let date = page.dates()[1];
        assert_eq!(page.update(PageEvent::Key(ch(' '))).len(), 1);
        assert!(page.tasks[0].completed_on(date));

        page.update(PageEvent::Msg(PageMsg::History(HistoryMsg::SaveFailed {
            task_id: "a".to_string(),
            date,
            completed: true,
            error: "locked".to_string(),
        })));
        assert!(!page.tasks[0].completed_on(date));
        assert_eq!(page.status.as_deref(), Some("save failed: locked"));
    }

    #[test]
    fn moving_past_last_row_switches_tables() {
        let mut page = page_with(
            vec![history_task("a"), history_task("b")],
            vec![entry(date!(2026 - 03 - 02), "x")],
        );
        page.update(PageEvent::Key(ch('j')));
        assert_eq!(page.mode(), HistoryMode::Tasks);
        page.update(PageEvent::Key(ch('j')));
        assert_eq!(page.mode(), HistoryMode::Journal);
        page.update(PageEvent::Key(press(KeyCode::Up)));
        assert_eq!(page.mode(), HistoryMode::Tasks);
        page.update(PageEvent::Key(press(KeyCode::Tab)));
        assert_eq!(page.mode(), HistoryMode::Journal);
    }

    #[test]
    fn pager_lists_same_day_across_years_and_captures_keys() {
        let mut page = page_with(
            Vec::new(),
            vec![
                entry(date!(2026 - 03 - 02), "now"),
                entry(date!(2025 - 07 - 01), "other day"),
                entry(date!(2025 - 03 - 02), "last year"),
                entry(date!(2023 - 03 - 02), "long ago"),
            ],
        );
        let comparison = page.comparison();
        assert_eq!(comparison[0], ("This Year (2026)".to_string(), Some("now")));
        assert_eq!(comparison[1].1, Some("last year"));
        assert_eq!(comparison[2].1, None);

        page.update(PageEvent::Key(press(KeyCode::Tab)));
        page.update(PageEvent::Key(press(KeyCode::Enter)));
        assert_eq!(page.mode(), HistoryMode::Pager);
        assert!(page.captures_navigation());
        assert!(page.captures_global_keys());
        let years: Vec<i32> = page
            .same_day_entries()
            .iter()
            .map(|entry| entry.entry_date.year())
            .collect();
        assert_eq!(years, [2026, 2025, 2023]);

        page.update(PageEvent::Key(ch('q')));
        assert_eq!(page.mode(), HistoryMode::Journal);
    }

    #[test]
    fn preview_truncates_long_content() {
        assert_eq!(preview("abcdefgh", 6, 2), ["abc..."]);
        assert_eq!(preview("one\ntwo\nthree", 10, 2), ["one", "..."]);
    }

    #[tokio::test]
    async fn toggling_twice_leaves_no_history_row() {
        let store = Store::open_in_memory().unwrap();
        store.add_task_definition("Walk", "").unwrap();
        let mut page = HistoryPage::new(store.clone());
        for effect in page.init().unwrap() {
            let Some(Message::Page(_, msg)) = effect.resolve().await else {
                panic!("load produced no page message");
            };
            page.update(PageEvent::Msg(msg));
        }
        let date = page.dates()[0];

        for expected in [1, 0] {
            let save = page.update(PageEvent::Key(ch(' '))).remove(0);
            let Some(Message::Page(_, msg)) = save.resolve().await else {
                panic!("save produced no page message");
            };
            page.update(PageEvent::Msg(msg));
            assert_eq!(store.completions_in_range(date, date).unwrap().len(), expected);
        }
        assert_eq!(page.status, Some(format!("{}: marked incomplete", clock::format_date(date))));
    }
}
