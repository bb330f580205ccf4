use super::{Binding, Page, PageEvent, PageId, PageMsg, PageTitle};
use crate::tui::Message;
use crate::tui::effect::Effect;
use crate::tui::keys::{clamp_index, is_down, is_up, plain_char, scroll_for};
use crate::tui::theme::Theme;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use stet_core::Store;
use stet_core::clock;
use stet_core::model::{Task, sort_by_completion};
use tracing::{debug, warn};

#[derive(Debug)]
pub(crate) enum TodayMsg {
    Loaded(Result<Vec<Task>, String>),
    Saved {
        task_id: String,
        completed: bool,
    },
    SaveFailed {
        task_id: String,
        completed: bool,
        error: String,
    },
}

fn deliver(msg: TodayMsg) -> Message {
    Message::Page(PageId::Today, PageMsg::Today(msg))
}

/// Today's active tasks with completion checkboxes.
pub(crate) struct TodayPage {
    store: Store,
    tasks: Vec<Task>,
    selected: usize,
    filter: Option<String>,
    filtering: bool,
    loaded: bool,
    status: Option<String>,
    height: u16,
}

impl TodayPage {
    pub(crate) fn new(store: Store) -> Self {
        Self {
            store,
            tasks: Vec::new(),
            selected: 0,
            filter: None,
            filtering: false,
            loaded: false,
            status: None,
            height: 0,
        }
    }

    fn load(&self) -> Effect {
        let store = self.store.clone();
        Effect::blocking(move || {
            let result = store
                .load_today_tasks(clock::today())
                .map_err(|err| err.to_string());
            deliver(TodayMsg::Loaded(result))
        })
    }

    /// Indices into `tasks` that match the filter, in display order.
    fn visible(&self) -> Vec<usize> {
        let needle = self
            .filter
            .as_deref()
            .map(str::to_lowercase)
            .unwrap_or_default();
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| needle.is_empty() || task.title.to_lowercase().contains(&needle))
            .map(|(index, _)| index)
            .collect()
    }

    fn clamp_selection(&mut self) {
        self.selected = clamp_index(self.selected, self.visible().len());
    }

    fn toggle_selected(&mut self) -> Vec<Effect> {
        let Some(&index) = self.visible().get(self.selected) else {
            return Vec::new();
        };
        let Some(task) = self.tasks.get_mut(index) else {
            return Vec::new();
        };
        task.toggle_completed();
        let task_id = task.id.clone();
        let completed = task.completed;
        sort_by_completion(&mut self.tasks);
        debug!(task_id = %task_id, completed, "Task completion toggled");

        let store = self.store.clone();
        vec![Effect::blocking(move || {
            match store.set_completion(&task_id, clock::today(), completed) {
                Ok(()) => deliver(TodayMsg::Saved { task_id, completed }),
                Err(err) => deliver(TodayMsg::SaveFailed {
                    task_id,
                    completed,
                    error: err.to_string(),
                }),
            }
        })]
    }

    fn handle_msg(&mut self, msg: TodayMsg) {
        match msg {
            TodayMsg::Loaded(Ok(mut tasks)) => {
                sort_by_completion(&mut tasks);
                self.tasks = tasks;
                self.clamp_selection();
                self.loaded = true;
            }
            TodayMsg::Loaded(Err(err)) => {
                warn!(error = %err, "Loading today's tasks failed");
                self.status = Some(format!("load failed: {err}"));
            }
            TodayMsg::Saved { completed, .. } => {
                self.status = Some(
                    if completed {
                        "marked completed"
                    } else {
                        "marked incomplete"
                    }
                    .to_string(),
                );
            }
            TodayMsg::SaveFailed {
                task_id,
                completed,
                error,
            } => {
                warn!(task_id = %task_id, error = %error, "Saving task completion failed");
                // The task may have been reloaded away in the meantime.
                if let Some(task) = self.tasks.iter_mut().find(|task| task.id == task_id) {
                    task.completed = !completed;
                }
                self.status = Some(format!("save failed: {error}"));
            }
        }
    }

    /// Typing into the filter line. Enter keeps the filter, esc drops it.
    fn handle_filter_key(&mut self, key: KeyEvent) {
        let filter = self.filter.get_or_insert_with(String::new);
        match key.code {
            KeyCode::Enter => {
                self.filtering = false;
                if filter.is_empty() {
                    self.filter = None;
                }
            }
            KeyCode::Esc => {
                self.filtering = false;
                self.filter = None;
            }
            KeyCode::Backspace => {
                filter.pop();
            }
            _ => {
                if let Some(ch) = plain_char(&key) {
                    filter.push(ch);
                }
            }
        }
        self.selected = 0;
    }

    fn handle_key(&mut self, key: KeyEvent) -> Vec<Effect> {
        if self.filtering {
            self.handle_filter_key(key);
            return Vec::new();
        }
        if is_up(&key) {
            self.selected = self.selected.saturating_sub(1);
        } else if is_down(&key) {
            self.selected = clamp_index(self.selected + 1, self.visible().len());
        } else if key.code == KeyCode::Esc && self.filter.is_some() {
            self.filter = None;
            self.clamp_selection();
        } else {
            match plain_char(&key) {
                Some(' ') => return self.toggle_selected(),
                Some('/') => {
                    self.filtering = true;
                    self.filter.get_or_insert_with(String::new);
                }
                _ => {}
            }
        }
        Vec::new()
    }

    #[cfg(test)]
    pub(crate) fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    #[cfg(test)]
    pub(crate) fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}

impl Page for TodayPage {
    fn id(&self) -> PageId {
        PageId::Today
    }

    fn title(&self) -> PageTitle {
        PageTitle {
            text: "Today",
            color: Color::Rgb(0x04, 0xB5, 0x75),
        }
    }

    fn resize(&mut self, _width: u16, height: u16) -> Vec<Effect> {
        self.height = height;
        Vec::new()
    }

    fn init(&mut self) -> Option<Vec<Effect>> {
        Some(vec![self.load()])
    }

    fn update(&mut self, event: PageEvent) -> Vec<Effect> {
        match event {
            PageEvent::Msg(PageMsg::Today(msg)) => {
                self.handle_msg(msg);
                Vec::new()
            }
            PageEvent::Key(key) => self.handle_key(key),
            PageEvent::Msg(_) => Vec::new(),
        }
    }

    fn render(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let filter_rows = u16::from(self.filter.is_some());
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(filter_rows),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(area);

        if let Some(filter) = &self.filter {
            let cursor = if self.filtering { "_" } else { "" };
            frame.render_widget(
                Paragraph::new(Line::from(vec![
                    Span::styled("Filter: ", theme.muted()),
                    Span::raw(format!("{filter}{cursor}")),
                ])),
                chunks[0],
            );
        }

        let visible = self.visible();
        let mut lines = Vec::new();
        if self.tasks.is_empty() {
            let hint = if self.loaded {
                "No active tasks. Add some on the Configure page."
            } else {
                "Loading tasks..."
            };
            lines.push(Line::styled(hint, theme.muted()));
        } else if visible.is_empty() {
            lines.push(Line::styled("No tasks match the filter.", theme.muted()));
        }
        let rows = (chunks[1].height / 2).max(1) as usize;
        let offset = scroll_for(self.selected, rows, visible.len());
        for (index, task) in visible
            .iter()
            .enumerate()
            .skip(offset)
            .take(rows)
            .filter_map(|(index, &task)| self.tasks.get(task).map(|task| (index, task)))
        {
            let checkbox = if task.completed { "[x]" } else { "[ ]" };
            let title_style = if index == self.selected {
                theme.selected()
            } else if task.completed {
                theme.muted()
            } else {
                Style::default()
            };
            let marker = if index == self.selected { "> " } else { "  " };
            lines.push(Line::from(vec![
                Span::styled(marker, title_style),
                Span::styled(format!("{checkbox} {}", task.title), title_style),
            ]));
            lines.push(Line::styled(format!("      {}", task.description), theme.faint()));
        }
        frame.render_widget(Paragraph::new(lines), chunks[1]);

        if let Some(status) = &self.status {
            let failed = status.starts_with("save failed") || status.starts_with("load failed");
            let style = if failed {
                theme.error()
            } else {
                theme.muted()
            };
            frame.render_widget(
                Paragraph::new(Line::styled(status.clone(), style)),
                chunks[2],
            );
        }
    }

    fn bindings(&self) -> Vec<Binding> {
        if self.filtering {
            return vec![
                Binding::new("enter", "apply filter"),
                Binding::new("esc", "clear"),
            ];
        }
        let mut bindings = vec![
            Binding::new("space", "toggle"),
            Binding::new("↑/↓", "move"),
            Binding::new("/", "filter"),
        ];
        if self.filter.is_some() {
            bindings.push(Binding::new("esc", "clear filter"));
        }
        bindings
    }

    fn captures_navigation(&self) -> bool {
        self.filtering
    }

    fn captures_global_keys(&self) -> bool {
        self.filtering
    }
}
