use super::text_buffer::TextBuffer;
use super::{Binding, Page, PageEvent, PageId, PageMsg, PageTitle};
use crate::tui::Message;
use crate::tui::effect::Effect;
use crate::tui::keys::{is_ctrl, plain_char};
use crate::tui::theme::Theme;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use stet_core::Store;
use stet_core::clock;
use stet_core::config::JOURNAL_DEBOUNCE;
use stet_core::model::JournalEntry;
use time::macros::format_description;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum JournalMode {
    View,
    Normal,
    Insert,
}

#[derive(Debug)]
pub(crate) enum JournalMsg {
    Loaded(Result<JournalEntry, String>),
    DebounceFired(u64),
    Saved(String),
    SaveFailed(String),
}

fn deliver(msg: JournalMsg) -> Message {
    Message::Page(PageId::Journal, PageMsg::Journal(msg))
}

/// Today's journal entry with a small modal editor and debounced autosave.
pub(crate) struct JournalPage {
    store: Store,
    text: TextBuffer,
    mode: JournalMode,
    entry_id: Option<String>,
    version: u64,
    last_saved: String,
    saving: bool,
    save_queued: bool,
    pending_key: Option<char>,
    error: Option<String>,
    height: u16,
}

impl JournalPage {
    pub(crate) fn new(store: Store) -> Self {
        Self {
            store,
            text: TextBuffer::default(),
            mode: JournalMode::View,
            entry_id: None,
            version: 0,
            last_saved: String::new(),
            saving: false,
            save_queued: false,
            pending_key: None,
            error: None,
            height: 0,
        }
    }

    fn modified(&self) -> bool {
        self.text.value() != self.last_saved
    }

    /// Bumps the version and arms a timer carrying it.
    fn debounce(&mut self) -> Vec<Effect> {
        self.version += 1;
        vec![Effect::after(
            JOURNAL_DEBOUNCE,
            deliver(JournalMsg::DebounceFired(self.version)),
        )]
    }

    /// One write in flight at a time. A save requested meanwhile is queued
    /// and runs with the latest content once the current write reports back.
    fn save(&mut self) -> Vec<Effect> {
        let Some(entry_id) = self.entry_id.clone() else {
            return Vec::new();
        };
        if self.saving {
            self.save_queued = true;
            return Vec::new();
        }
        self.saving = true;
        let content = self.text.value();
        let store = self.store.clone();
        debug!(entry_id = %entry_id, chars = content.len(), "Saving journal entry");
        vec![Effect::blocking(move || {
            match store.update_journal_content(&entry_id, &content) {
                Ok(()) => deliver(JournalMsg::Saved(content)),
                Err(err) => deliver(JournalMsg::SaveFailed(err.to_string())),
            }
        })]
    }

    fn save_if_modified(&mut self) -> Vec<Effect> {
        if self.modified() {
            self.save()
        } else {
            Vec::new()
        }
    }

    fn run_queued_save(&mut self) -> Vec<Effect> {
        if std::mem::take(&mut self.save_queued) {
            self.save_if_modified()
        } else {
            Vec::new()
        }
    }

    fn handle_msg(&mut self, msg: JournalMsg) -> Vec<Effect> {
        match msg {
            JournalMsg::Loaded(Ok(entry)) => {
                // Unsaved edits win over a reload.
                if self.entry_id.is_some() && self.modified() {
                    return Vec::new();
                }
                self.text.set_value(&entry.content);
                self.last_saved = entry.content;
                self.entry_id = Some(entry.id);
                self.error = None;
                Vec::new()
            }
            JournalMsg::Loaded(Err(err)) => {
                warn!(error = %err, "Loading journal entry failed");
                self.error = Some(err);
                Vec::new()
            }
            JournalMsg::DebounceFired(version) => {
                if version == self.version {
                    self.save_if_modified()
                } else {
                    Vec::new()
                }
            }
            JournalMsg::Saved(content) => {
                self.saving = false;
                self.last_saved = content;
                self.run_queued_save()
            }
            JournalMsg::SaveFailed(err) => {
                warn!(error = %err, "Saving journal entry failed");
                self.saving = false;
                self.error = Some(err);
                self.run_queued_save()
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Vec<Effect> {
        match self.mode {
            JournalMode::View => {
                if is_ctrl(&key, 'v') {
                    if self.entry_id.is_some() {
                        self.mode = JournalMode::Normal;
                    } else if self.error.is_none() {
                        self.error = Some("journal entry not loaded yet".to_string());
                    }
                }
                Vec::new()
            }
            JournalMode::Normal => self.handle_normal(key),
            JournalMode::Insert => self.handle_insert(key),
        }
    }

    fn handle_normal(&mut self, key: KeyEvent) -> Vec<Effect> {
        let typed = plain_char(&key);
        if let Some(pending) = self.pending_key.take() {
            return match (pending, typed) {
                ('g', Some('g')) => {
                    self.text.text_start();
                    Vec::new()
                }
                ('d', Some('d')) => {
                    self.text.delete_line();
                    self.debounce()
                }
                _ => Vec::new(),
            };
        }

        if is_ctrl(&key, 'v') {
            self.mode = JournalMode::View;
            return self.save_if_modified();
        }
        let Some(ch) = typed else {
            return Vec::new();
        };
        match ch {
            'h' => self.text.move_left(),
            'j' => self.text.move_down(),
            'k' => self.text.move_up(),
            'l' => self.text.move_right(),
            'w' => self.text.word_forward(),
            'b' => self.text.word_backward(),
            '0' => self.text.line_start(),
            '$' => self.text.line_end(),
            'G' => self.text.text_end(),
            'g' | 'd' => self.pending_key = Some(ch),
            'x' => {
                self.text.delete_forward();
                return self.debounce();
            }
            'i' => self.mode = JournalMode::Insert,
            'I' => {
                self.text.line_start();
                self.mode = JournalMode::Insert;
            }
            'a' => {
                self.text.move_right();
                self.mode = JournalMode::Insert;
            }
            'A' => {
                self.text.line_end();
                self.mode = JournalMode::Insert;
            }
            'o' => {
                self.text.open_below();
                self.mode = JournalMode::Insert;
                return self.debounce();
            }
            'O' => {
                self.text.open_above();
                self.mode = JournalMode::Insert;
                return self.debounce();
            }
            _ => {}
        }
        Vec::new()
    }

    fn handle_insert(&mut self, key: KeyEvent) -> Vec<Effect> {
        if key.code == KeyCode::Esc {
            self.mode = JournalMode::Normal;
            return self.save_if_modified();
        }
        let before = self.text.value();
        match key.code {
            KeyCode::Enter => self.text.insert_newline(),
            KeyCode::Backspace => self.text.backspace(),
            KeyCode::Delete => self.text.delete_forward(),
            KeyCode::Left => self.text.move_left(),
            KeyCode::Right => self.text.move_right(),
            KeyCode::Up => self.text.move_up(),
            KeyCode::Down => self.text.move_down(),
            KeyCode::Home => self.text.line_start(),
            KeyCode::End => self.text.line_end(),
            _ => {
                if let Some(ch) = plain_char(&key) {
                    self.text.insert_char(ch);
                }
            }
        }
        if self.text.value() != before {
            self.debounce()
        } else {
            Vec::new()
        }
    }

    fn mode_indicator(&self) -> String {
        match (self.mode, self.pending_key) {
            (JournalMode::View, _) => "Press ctrl+v for vim mode".to_string(),
            (JournalMode::Normal, Some(pending)) => format!("-- NORMAL -- ({pending}...)"),
            (JournalMode::Normal, None) => "-- NORMAL --".to_string(),
            (JournalMode::Insert, _) => "-- INSERT --".to_string(),
        }
    }

    fn save_status(&self) -> Option<&'static str> {
        if self.saving {
            Some("Saving...")
        } else if self.modified() {
            Some("Modified")
        } else if !self.last_saved.is_empty() {
            Some("Saved")
        } else {
            None
        }
    }

    fn text_lines(&self, theme: &Theme, height: usize) -> Vec<Line<'static>> {
        if self.mode == JournalMode::View && self.text.value().is_empty() {
            return vec![Line::styled(
                "Start writing your journal entry...",
                theme.faint(),
            )];
        }
        let (row, col) = self.text.cursor();
        let editing = self.mode != JournalMode::View;
        let offset = crate::tui::keys::scroll_for(row, height, self.text.lines().len());
        self.text
            .lines()
            .iter()
            .enumerate()
            .skip(offset)
            .take(height.max(1))
            .map(|(index, line)| {
                if !editing || index != row {
                    return Line::raw(line.clone());
                }
                let chars: Vec<char> = line.chars().collect();
                let before: String = chars.iter().take(col).collect();
                let at = chars.get(col).map_or(" ".to_string(), char::to_string);
                let after: String = chars.iter().skip(col + 1).collect();
                let cursor = if self.mode == JournalMode::Insert {
                    Style::default().add_modifier(Modifier::UNDERLINED | Modifier::REVERSED)
                } else {
                    Style::default().add_modifier(Modifier::REVERSED)
                };
                Line::from(vec![
                    Span::raw(before),
                    Span::styled(at, cursor),
                    Span::raw(after),
                ])
            })
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn mode(&self) -> JournalMode {
        self.mode
    }

    #[cfg(test)]
    pub(crate) fn content(&self) -> String {
        self.text.value()
    }
}

impl Page for JournalPage {
    fn id(&self) -> PageId {
        PageId::Journal
    }

    fn title(&self) -> PageTitle {
        PageTitle {
            text: "Journal",
            color: Color::Rgb(0x00, 0xCE, 0xD1),
        }
    }

    fn resize(&mut self, _width: u16, height: u16) -> Vec<Effect> {
        self.height = height;
        Vec::new()
    }

    fn init(&mut self) -> Option<Vec<Effect>> {
        let store = self.store.clone();
        Some(vec![Effect::blocking(move || {
            let result = store
                .load_or_create_journal_entry(clock::today())
                .map_err(|err| err.to_string());
            deliver(JournalMsg::Loaded(result))
        })])
    }

    fn update(&mut self, event: PageEvent) -> Vec<Effect> {
        match event {
            PageEvent::Key(key) => self.handle_key(key),
            PageEvent::Msg(PageMsg::Journal(msg)) => self.handle_msg(msg),
            PageEvent::Msg(_) => Vec::new(),
        }
    }

    fn render(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(2),
                Constraint::Min(1),
                Constraint::Length(1),
            ])
            .split(area);

        let today = clock::today()
            .format(format_description!(
                "[weekday], [month repr:long] [day padding:none], [year]"
            ))
            .unwrap_or_else(|_| clock::format_date(clock::today()));
        frame.render_widget(
            Paragraph::new(Line::styled(today, theme.heading())),
            chunks[0],
        );
        frame.render_widget(
            Paragraph::new(Line::styled(self.mode_indicator(), theme.muted())),
            chunks[1],
        );
        frame.render_widget(
            Paragraph::new(self.text_lines(theme, chunks[2].height as usize)),
            chunks[2],
        );

        let footer = match (&self.error, self.save_status()) {
            (Some(err), _) => Line::styled(format!("Error: {err}"), theme.error()),
            (None, Some(status)) => Line::styled(status, theme.faint()),
            (None, None) => Line::raw(""),
        };
        frame.render_widget(Paragraph::new(footer), chunks[3]);
    }

    fn bindings(&self) -> Vec<Binding> {
        match self.mode {
            JournalMode::View => vec![Binding::new("ctrl+v", "vim mode")],
            JournalMode::Normal => vec![
                Binding::new("hjkl", "navigate"),
                Binding::new("i", "insert"),
                Binding::new("x/dd", "delete"),
                Binding::new("ctrl+v", "vim mode"),
            ],
            JournalMode::Insert => vec![Binding::new("esc", "normal")],
        }
    }

    fn captures_navigation(&self) -> bool {
        self.mode != JournalMode::View
    }

    fn captures_global_keys(&self) -> bool {
        self.mode == JournalMode::Insert
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tui::keys::{ch, ctrl, press};

    async fn resolve(effect: Effect) -> PageEvent {
        match effect.resolve().await {
            Some(Message::Page(PageId::Journal, msg)) => PageEvent::Msg(msg),
            other => panic!("unexpected message {other:?}"),
        }
    }

    async fn loaded_page(store: &Store) -> JournalPage {
        let mut page = JournalPage::new(store.clone());
        let load = page.init().unwrap().remove(0);
        let event = resolve(load).await;
        page.update(event);
        page
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_edits_writes_once_with_last_content() {
        let store = Store::open_in_memory().unwrap();
        let mut page = loaded_page(&store).await;
        page.update(PageEvent::Key(ctrl('v')));
        page.update(PageEvent::Key(ch('i')));

        let mut timers = Vec::new();
        for key in ['a', 'b', 'c'] {
            timers.extend(page.update(PageEvent::Key(ch(key))));
        }
        assert_eq!(timers.len(), 3);

        let mut writes = Vec::new();
        for timer in timers {
            let event = resolve(timer).await;
            writes.extend(page.update(event));
        }
        assert_eq!(writes.len(), 1);

        let saved = resolve(writes.remove(0)).await;
        page.update(saved);
        let entry = store.load_or_create_journal_entry(clock::today()).unwrap();
        assert_eq!(entry.content, "abc");
        assert_eq!(page.save_status(), Some("Saved"));
    }

    #[tokio::test(start_paused = true)]
    async fn escape_saves_immediately_when_modified() {
        let store = Store::open_in_memory().unwrap();
        let mut page = loaded_page(&store).await;
        page.update(PageEvent::Key(ctrl('v')));
        page.update(PageEvent::Key(ch('i')));
        page.update(PageEvent::Key(ch('q')));

        let effects = page.update(PageEvent::Key(press(KeyCode::Esc)));
        assert_eq!(page.mode(), JournalMode::Normal);
        assert_eq!(effects.len(), 1);
        assert!(matches!(effects[0], Effect::Blocking(_)));
        assert_eq!(page.save_status(), Some("Saving..."));

        // Unmodified content leaves vim mode without another write.
        let saved = resolve(effects.into_iter().next().unwrap()).await;
        page.update(saved);
        assert!(page.update(PageEvent::Key(ctrl('v'))).is_empty());
        assert_eq!(page.mode(), JournalMode::View);
    }

    fn page_with_entry() -> JournalPage {
        let mut page = JournalPage::new(Store::open_in_memory().unwrap());
        page.entry_id = Some("entry".to_string());
        page
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_saves_run_one_at_a_time_and_keep_last_edit() {
        let store = Store::open_in_memory().unwrap();
        let mut page = loaded_page(&store).await;
        page.update(PageEvent::Key(ctrl('v')));
        page.update(PageEvent::Key(ch('i')));

        let first_timer = page.update(PageEvent::Key(ch('a'))).remove(0);
        let event = resolve(first_timer).await;
        let first_write = page.update(event).remove(0);

        let second_timer = page.update(PageEvent::Key(ch('b'))).remove(0);
        assert!(page.update(PageEvent::Key(press(KeyCode::Esc))).is_empty());
        assert_eq!(page.save_status(), Some("Saving..."));

        let saved = resolve(first_write).await;
        let mut queued = page.update(saved);
        assert_eq!(queued.len(), 1);
        let saved = resolve(queued.remove(0)).await;
        assert!(page.update(saved).is_empty());

        let event = resolve(second_timer).await;
        assert!(page.update(event).is_empty());
        let entry = store.load_or_create_journal_entry(clock::today()).unwrap();
        assert_eq!(entry.content, "ab");
        assert_eq!(page.save_status(), Some("Saved"));
    }

    #[test]
    fn vim_mode_waits_for_the_entry_to_load() {
        let mut page = JournalPage::new(Store::open_in_memory().unwrap());
        page.update(PageEvent::Key(ctrl('v')));
        assert_eq!(page.mode(), JournalMode::View);
        assert_eq!(page.error.as_deref(), Some("journal entry not loaded yet"));

        page.update(PageEvent::Msg(PageMsg::Journal(JournalMsg::Loaded(Ok(JournalEntry {
            id: "entry".to_string(),
            entry_date: clock::today(),
            content: "morning".to_string(),
            updated_at: 0,
        })))));
        assert_eq!(page.error, None);
        page.update(PageEvent::Key(ctrl('v')));
        assert_eq!(page.mode(), JournalMode::Normal);
        assert_eq!(page.content(), "morning");
    }

    #[test]
    fn modes_decide_capture() {
        let mut page = page_with_entry();
        assert!(!page.captures_navigation());
        page.update(PageEvent::Key(ctrl('v')));
        assert!(page.captures_navigation());
        assert!(!page.captures_global_keys());
        page.update(PageEvent::Key(ch('A')));
        assert!(page.captures_global_keys());
    }

    #[test]
    fn pending_key_is_cleared_on_mismatch() {
        let mut page = page_with_entry();
        page.text.set_value("one\ntwo");
        page.update(PageEvent::Key(ctrl('v')));
        page.update(PageEvent::Key(ch('d')));
        assert_eq!(page.mode_indicator(), "-- NORMAL -- (d...)");
        page.update(PageEvent::Key(ch('j')));
        assert_eq!(page.pending_key, None);
        assert_eq!(page.content(), "one\ntwo");

        page.update(PageEvent::Key(ch('d')));
        let effects = page.update(PageEvent::Key(ch('d')));
        assert_eq!(effects.len(), 1);
        assert_eq!(page.content(), "one");
    }
}
