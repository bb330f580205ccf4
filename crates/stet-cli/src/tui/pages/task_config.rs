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
use stet_core::model::TaskDefinition;
use tracing::{info, warn};

/// Single-line text entry with a character cap.
#[derive(Debug)]
struct InputField {
    label: &'static str,
    placeholder: &'static str,
    value: String,
    limit: usize,
}

impl InputField {
    fn new(label: &'static str, placeholder: &'static str, limit: usize) -> Self {
        Self {
            label,
            placeholder,
            value: String::new(),
            limit,
        }
    }

    fn push(&mut self, ch: char) {
        if self.value.chars().count() < self.limit {
            self.value.push(ch);
        }
    }

    fn pop(&mut self) {
        self.value.pop();
    }

    fn reset(&mut self) {
        self.value.clear();
    }

    fn trimmed(&self) -> String {
        self.value.trim().to_string()
    }

    fn line(&self, theme: &Theme) -> Line<'static> {
        if self.value.is_empty() {
            Line::from(vec![
                Span::raw("> "),
                Span::styled(self.placeholder, theme.faint()),
            ])
        } else {
            Line::raw(format!("> {}_", self.value))
        }
    }
}

#[derive(Debug)]
pub(crate) enum ConfigureMsg {
    Loaded(Result<Vec<TaskDefinition>, String>),
    Added(Result<TaskDefinition, String>),
    ActiveSet {
        task_id: String,
        active: bool,
    },
    ActiveFailed {
        task_id: String,
        active: bool,
        error: String,
    },
    Deleted(String),
    DeleteFailed(String),
}

fn deliver(msg: ConfigureMsg) -> Message {
    Message::Page(PageId::Configure, PageMsg::Configure(msg))
}

/// Pages whose content derives from task definitions.
fn invalidate_dependents() -> Vec<Effect> {
    vec![
        Effect::now(Message::Invalidate(PageId::Today)),
        Effect::now(Message::Invalidate(PageId::History)),
    ]
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ConfigMode {
    List,
    AddTitle,
    AddDescription,
    ConfirmDelete { id: String, title: String },
}

/// Task definition management: add, activate or deactivate, delete.
pub(crate) struct TaskConfigPage {
    store: Store,
    tasks: Vec<TaskDefinition>,
    selected: usize,
    mode: ConfigMode,
    title_input: InputField,
    description_input: InputField,
    status: Option<String>,
    height: u16,
}

impl TaskConfigPage {
    pub(crate) fn new(store: Store) -> Self {
        Self {
            store,
            tasks: Vec::new(),
            selected: 0,
            mode: ConfigMode::List,
            title_input: InputField::new("Title", "Task title...", 100),
            description_input: InputField::new(
                "Description",
                "Description (optional, press enter to skip)...",
                200,
            ),
            status: None,
            height: 0,
        }
    }

    fn handle_msg(&mut self, msg: ConfigureMsg) -> Vec<Effect> {
        match msg {
            ConfigureMsg::Loaded(Ok(tasks)) => {
                self.tasks = tasks;
                self.selected = clamp_index(self.selected, self.tasks.len());
                Vec::new()
            }
            ConfigureMsg::Loaded(Err(err)) => {
                warn!(error = %err, "Loading task definitions failed");
                self.status = Some(format!("load failed: {err}"));
                Vec::new()
            }
            ConfigureMsg::Added(Ok(task)) => {
                info!(task_id = %task.id, "Task definition added");
                self.tasks.push(task);
                self.status = Some("Task added".to_string());
                invalidate_dependents()
            }
            ConfigureMsg::Added(Err(err)) => {
                self.status = Some(format!("add failed: {err}"));
                Vec::new()
            }
            ConfigureMsg::ActiveSet { active, .. } => {
                self.status = Some(if active { "activated" } else { "deactivated" }.to_string());
                invalidate_dependents()
            }
            ConfigureMsg::ActiveFailed {
                task_id,
                active,
                error,
            } => {
                warn!(task_id = %task_id, error = %error, "Toggling task failed");
                if let Some(task) = self.tasks.iter_mut().find(|task| task.id == task_id) {
                    task.active = !active;
                }
                self.status = Some(format!("toggle failed: {error}"));
                Vec::new()
            }
            ConfigureMsg::Deleted(task_id) => {
                info!(task_id = %task_id, "Task definition deleted");
                self.tasks.retain(|task| task.id != task_id);
                self.selected = clamp_index(self.selected, self.tasks.len());
                self.status = Some("Task deleted".to_string());
                invalidate_dependents()
            }
            ConfigureMsg::DeleteFailed(err) => {
                self.status = Some(format!("delete failed: {err}"));
                Vec::new()
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Vec<Effect> {
        match self.mode.clone() {
            ConfigMode::List => self.handle_list_key(key),
            ConfigMode::AddTitle => {
                match key.code {
                    KeyCode::Esc => self.mode = ConfigMode::List,
                    KeyCode::Enter => {
                        if !self.title_input.trimmed().is_empty() {
                            self.description_input.reset();
                            self.mode = ConfigMode::AddDescription;
                        }
                    }
                    KeyCode::Backspace => self.title_input.pop(),
                    _ => {
                        if let Some(ch) = plain_char(&key) {
                            self.title_input.push(ch);
                        }
                    }
                }
                Vec::new()
            }
            ConfigMode::AddDescription => match key.code {
                KeyCode::Esc => {
                    self.mode = ConfigMode::List;
                    Vec::new()
                }
                KeyCode::Enter => {
                    self.mode = ConfigMode::List;
                    self.add_task()
                }
                KeyCode::Backspace => {
                    self.description_input.pop();
                    Vec::new()
                }
                _ => {
                    if let Some(ch) = plain_char(&key) {
                        self.description_input.push(ch);
                    }
                    Vec::new()
                }
            },
            ConfigMode::ConfirmDelete { id, .. } => match (key.code, plain_char(&key)) {
                (_, Some('y' | 'Y')) => {
                    self.mode = ConfigMode::List;
                    self.delete_task(id)
                }
                (KeyCode::Esc, _) | (_, Some('n' | 'N')) => {
                    self.mode = ConfigMode::List;
                    Vec::new()
                }
                _ => Vec::new(),
            },
        }
    }

    fn handle_list_key(&mut self, key: KeyEvent) -> Vec<Effect> {
        if is_up(&key) {
            self.selected = self.selected.saturating_sub(1);
            return Vec::new();
        }
        if is_down(&key) {
            self.selected = clamp_index(self.selected + 1, self.tasks.len());
            return Vec::new();
        }
        match plain_char(&key) {
            Some('a') => {
                self.title_input.reset();
                self.mode = ConfigMode::AddTitle;
                Vec::new()
            }
            Some(' ') => self.toggle_selected(),
            Some('d') => {
                if let Some(task) = self.tasks.get(self.selected) {
                    self.mode = ConfigMode::ConfirmDelete {
                        id: task.id.clone(),
                        title: task.title.clone(),
                    };
                }
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn add_task(&mut self) -> Vec<Effect> {
        let title = self.title_input.trimmed();
        let description = self.description_input.trimmed();
        let store = self.store.clone();
        vec![Effect::blocking(move || {
            let result = store
                .add_task_definition(&title, &description)
                .map_err(|err| err.to_string());
            deliver(ConfigureMsg::Added(result))
        })]
    }

    fn toggle_selected(&mut self) -> Vec<Effect> {
        let Some(task) = self.tasks.get_mut(self.selected) else {
            return Vec::new();
        };
        task.active = !task.active;
        let task_id = task.id.clone();
        let active = task.active;
        let store = self.store.clone();
        vec![Effect::blocking(move || {
            match store.set_task_active(&task_id, active) {
                Ok(()) => deliver(ConfigureMsg::ActiveSet { task_id, active }),
                Err(err) => deliver(ConfigureMsg::ActiveFailed {
                    task_id,
                    active,
                    error: err.to_string(),
                }),
            }
        })]
    }

    fn delete_task(&mut self, task_id: String) -> Vec<Effect> {
        let store = self.store.clone();
        vec![Effect::blocking(move || {
            match store.soft_delete_task(&task_id) {
                Ok(()) => deliver(ConfigureMsg::Deleted(task_id)),
                Err(err) => deliver(ConfigureMsg::DeleteFailed(err.to_string())),
            }
        })]
    }

    fn list_lines(&self, theme: &Theme, height: usize) -> Vec<Line<'static>> {
        let mut lines = vec![
            Line::styled("Task Definitions", theme.heading()),
            Line::raw(""),
        ];
        if self.tasks.is_empty() {
            lines.push(Line::styled("No tasks yet. Press a to add one.", theme.muted()));
            return lines;
        }
        let visible = (height.saturating_sub(2) / 2).max(1);
        let offset = scroll_for(self.selected, visible, self.tasks.len());
        for (index, task) in self.tasks.iter().enumerate().skip(offset).take(visible) {
            let selected = index == self.selected;
            let (indicator, indicator_style) = if task.active {
                ("✓", Style::default().fg(theme.success))
            } else {
                ("○", Style::default().fg(Color::Rgb(0x66, 0x66, 0x66)))
            };
            let title_style = if selected {
                theme.selected()
            } else if task.active {
                Style::default()
            } else {
                Style::default().fg(Color::Rgb(0x66, 0x66, 0x66))
            };
            let marker = if selected { "> " } else { "  " };
            lines.push(Line::from(vec![
                Span::styled(marker, title_style),
                Span::styled(indicator, indicator_style),
                Span::styled(format!(" {}", task.title), title_style),
            ]));
            lines.push(Line::styled(format!("    {}", task.description), theme.faint()));
        }
        lines
    }

    fn form_lines(&self, theme: &Theme) -> Vec<Line<'static>> {
        match &self.mode {
            ConfigMode::AddTitle => vec![
                Line::styled("Add New Task", theme.heading()),
                Line::raw(""),
                Line::raw(format!("{}:", self.title_input.label)),
                self.title_input.line(theme),
                Line::raw(""),
                Line::styled("(enter to continue, esc to cancel)", theme.muted()),
            ],
            ConfigMode::AddDescription => vec![
                Line::styled("Add New Task", theme.heading()),
                Line::raw(""),
                Line::raw(format!("{}: {}", self.title_input.label, self.title_input.value)),
                Line::raw(""),
                Line::raw(format!("{}:", self.description_input.label)),
                self.description_input.line(theme),
                Line::raw(""),
                Line::styled("(enter to save, esc to cancel)", theme.muted()),
            ],
            ConfigMode::ConfirmDelete { title, .. } => vec![
                Line::styled("Delete Task", theme.heading()),
                Line::raw(""),
                Line::raw(format!("Are you sure you want to delete \"{title}\"?")),
                Line::raw(""),
                Line::styled("(y to confirm, n or esc to cancel)", theme.muted()),
            ],
            ConfigMode::List => Vec::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn mode(&self) -> &ConfigMode {
        &self.mode
    }
}

impl Page for TaskConfigPage {
    fn id(&self) -> PageId {
        PageId::Configure
    }

    fn title(&self) -> PageTitle {
        PageTitle {
            text: "Configure",
            color: Color::Rgb(0xFF, 0x6B, 0x6B),
        }
    }

    fn resize(&mut self, _width: u16, height: u16) -> Vec<Effect> {
        self.height = height;
        Vec::new()
    }

    fn init(&mut self) -> Option<Vec<Effect>> {
        let store = self.store.clone();
        Some(vec![Effect::blocking(move || {
            let result = store.list_task_definitions().map_err(|err| err.to_string());
            deliver(ConfigureMsg::Loaded(result))
        })])
    }

    fn update(&mut self, event: PageEvent) -> Vec<Effect> {
        match event {
            PageEvent::Key(key) => self.handle_key(key),
            PageEvent::Msg(PageMsg::Configure(msg)) => self.handle_msg(msg),
            PageEvent::Msg(_) => Vec::new(),
        }
    }

    fn render(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(area);
        let lines = if self.mode == ConfigMode::List {
            self.list_lines(theme, chunks[0].height as usize)
        } else {
            self.form_lines(theme)
        };
        frame.render_widget(Paragraph::new(lines), chunks[0]);

        if let Some(status) = &self.status {
            let style = if status.contains("failed") {
                theme.error()
            } else {
                theme.muted()
            };
            frame.render_widget(
                Paragraph::new(Line::styled(status.clone(), style)),
                chunks[1],
            );
        }
    }

    fn bindings(&self) -> Vec<Binding> {
        match self.mode {
            ConfigMode::List => vec![
                Binding::new("a", "add"),
                Binding::new("space", "toggle"),
                Binding::new("d", "delete"),
                Binding::new("↑/↓", "move"),
            ],
            ConfigMode::AddTitle | ConfigMode::AddDescription => vec![
                Binding::new("enter", "confirm"),
                Binding::new("esc", "cancel"),
            ],
            ConfigMode::ConfirmDelete { .. } => vec![
                Binding::new("y", "delete"),
                Binding::new("n/esc", "cancel"),
            ],
        }
    }

    fn captures_navigation(&self) -> bool {
        self.mode != ConfigMode::List
    }

    fn captures_global_keys(&self) -> bool {
        matches!(self.mode, ConfigMode::AddTitle | ConfigMode::AddDescription)
    }
}
