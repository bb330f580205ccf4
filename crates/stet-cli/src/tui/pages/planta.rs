use super::{Binding, Page, PageEvent, PageId, PageMsg, PageTitle};
use crate::tui::Message;
use crate::tui::effect::Effect;
use crate::tui::keys::{clamp_index, is_down, is_up, plain_char, scroll_for};
use crate::tui::theme::Theme;
use crossterm::event::KeyCode;
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use stet_core::clock;
use stet_core::config::{PLANTA_DUE_WINDOW_DAYS, PLANTA_POLL_INTERVAL};
use stet_providers::planta::{ActionType, PlantTask};
use stet_providers::{ApiError, PlantaClient};
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{info, warn};

const ACCENT: Color = Color::Rgb(0x22, 0xC5, 0x5E);
const OVERDUE: Color = Color::Rgb(0xFF, 0x6B, 0x6B);
const DUE_TODAY: Color = Color::Rgb(0xFB, 0xBF, 0x24);
const MANUAL: Color = Color::Rgb(0x66, 0x66, 0x66);

#[derive(Debug)]
pub(crate) enum PlantaMsg {
    Tick,
    Loaded(Result<Vec<PlantTask>, ApiError>),
    Completed {
        plant_id: String,
        action: ActionType,
    },
    CompleteFailed(ApiError),
}

fn deliver(msg: PlantaMsg) -> Message {
    Message::Page(PageId::Planta, PageMsg::Planta(msg))
}

fn tick() -> Effect {
    Effect::after(PLANTA_POLL_INTERVAL, deliver(PlantaMsg::Tick))
}

fn icon(action: ActionType) -> &'static str {
    match action {
        ActionType::Watering => "W",
        ActionType::Fertilizing => "F",
        ActionType::Misting => "M",
        ActionType::Cleaning => "C",
        ActionType::Repotting => "R",
        ActionType::ProgressUpdate => "P",
    }
}

fn due_label(task: &PlantTask) -> String {
    if task.today {
        return "Today".to_string();
    }
    if task.overdue {
        let day = task
            .due
            .format(format_description!("[month repr:short] [day padding:none]"))
            .unwrap_or_else(|_| clock::format_date(task.due));
        return format!("{day} (overdue)");
    }
    task.due
        .format(format_description!(
            "[weekday repr:short] [month repr:short] [day padding:none]"
        ))
        .unwrap_or_else(|_| clock::format_date(task.due))
}

fn short_name(name: &str) -> String {
    if name.chars().count() > 15 {
        name.chars().take(12).collect::<String>() + "..."
    } else {
        name.to_string()
    }
}

/// Plant care actions due within the next few days.
pub(crate) struct PlantaPage {
    client: PlantaClient,
    tasks: Vec<PlantTask>,
    cursor: usize,
    poll_count: u64,
    last_poll: Option<OffsetDateTime>,
    error: Option<String>,
    loading: bool,
    completing: bool,
    needs_auth: bool,
    height: u16,
}

impl PlantaPage {
    pub(crate) fn new(client: PlantaClient) -> Self {
        let needs_auth = !client.has_app_code();
        Self {
            client,
            tasks: Vec::new(),
            cursor: 0,
            poll_count: 0,
            last_poll: None,
            error: None,
            loading: false,
            completing: false,
            needs_auth,
            height: 0,
        }
    }

    fn fetch(&mut self) -> Effect {
        self.loading = true;
        let client = self.client.clone();
        Effect::task(async move {
            let result = match client.ensure_authenticated().await {
                Ok(()) => {
                    client
                        .due_tasks(PLANTA_DUE_WINDOW_DAYS, clock::today())
                        .await
                }
                Err(err) => Err(err),
            };
            deliver(PlantaMsg::Loaded(result))
        })
    }

    fn complete_selected(&mut self) -> Vec<Effect> {
        if self.completing || self.needs_auth {
            return Vec::new();
        }
        let Some(task) = self.tasks.get(self.cursor) else {
            return Vec::new();
        };
        if !task.completable() {
            self.error = Some(format!("{} cannot be completed via API", task.action));
            return Vec::new();
        }
        self.completing = true;
        self.error = None;
        let client = self.client.clone();
        let plant_id = task.plant_id.clone();
        let action = task.action;
        vec![Effect::task(async move {
            match client.complete_action(&plant_id, action).await {
                Ok(()) => deliver(PlantaMsg::Completed { plant_id, action }),
                Err(err) => deliver(PlantaMsg::CompleteFailed(err)),
            }
        })]
    }

    fn handle_msg(&mut self, msg: PlantaMsg) -> Vec<Effect> {
        match msg {
            PlantaMsg::Tick => {
                if self.needs_auth || self.completing {
                    return vec![tick()];
                }
                self.poll_count += 1;
                vec![self.fetch(), tick()]
            }
            PlantaMsg::Loaded(Ok(tasks)) => {
                self.tasks = tasks;
                self.cursor = clamp_index(self.cursor, self.tasks.len());
                self.last_poll = Some(clock::now_local());
                self.loading = false;
                self.error = None;
                Vec::new()
            }
            PlantaMsg::Loaded(Err(err)) => {
                warn!(error = %err, "Planta poll failed");
                self.loading = false;
                if err.requires_auth() && !self.client.has_app_code() {
                    self.needs_auth = true;
                }
                self.error = Some(err.user_message("Planta"));
                Vec::new()
            }
            PlantaMsg::Completed { plant_id, action } => {
                info!(plant_id = %plant_id, action = %action, "Plant task completed");
                self.completing = false;
                if let Some(position) = self
                    .tasks
                    .iter()
                    .position(|task| task.plant_id == plant_id && task.action == action)
                {
                    self.tasks.remove(position);
                }
                self.cursor = clamp_index(self.cursor, self.tasks.len());
                Vec::new()
            }
            PlantaMsg::CompleteFailed(err) => {
                warn!(error = %err, "Completing plant task failed");
                self.completing = false;
                self.error = Some(err.user_message("Planta"));
                Vec::new()
            }
        }
    }

    fn task_line(&self, index: usize, task: &PlantTask) -> Line<'static> {
        let color = if task.overdue {
            OVERDUE
        } else if task.today {
            DUE_TODAY
        } else {
            ACCENT
        };
        let text = format!(
            "[{}] {:<15} {:<14} {}",
            icon(task.action),
            short_name(&task.plant_name),
            task.action.api_name(),
            due_label(task)
        );
        let selected = index == self.cursor;
        let background = if selected {
            Style::default().bg(Color::Rgb(0x33, 0x33, 0x33))
        } else {
            Style::default()
        };
        let mut spans = vec![
            Span::styled(if selected { "> " } else { "  " }, background),
            Span::styled(text, background.fg(color)),
        ];
        if !task.completable() {
            spans.push(Span::styled(" [manual]", background.fg(MANUAL)));
        }
        Line::from(spans)
    }

    fn status_line(&self) -> String {
        let mut parts = vec![format!("Tasks: {}", self.tasks.len())];
        if let Some(last) = self.last_poll {
            if let Ok(at) = last.format(format_description!("[hour]:[minute]:[second]")) {
                parts.push(format!("Updated: {at}"));
            }
        }
        if self.loading {
            parts.push("Refreshing...".to_string());
        }
        parts.join(" | ")
    }
}

impl Page for PlantaPage {
    fn id(&self) -> PageId {
        PageId::Planta
    }

    fn title(&self) -> PageTitle {
        PageTitle {
            text: "Planta",
            color: ACCENT,
        }
    }

    fn resize(&mut self, _width: u16, height: u16) -> Vec<Effect> {
        self.height = height;
        Vec::new()
    }

    fn init(&mut self) -> Option<Vec<Effect>> {
        self.needs_auth = !self.client.has_app_code();
        if self.needs_auth {
            return Some(Vec::new());
        }
        Some(vec![self.fetch(), tick()])
    }

    fn update(&mut self, event: PageEvent) -> Vec<Effect> {
        match event {
            PageEvent::Msg(PageMsg::Planta(msg)) => self.handle_msg(msg),
            PageEvent::Msg(_) => Vec::new(),
            PageEvent::Key(key) => {
                if is_up(&key) {
                    self.cursor = self.cursor.saturating_sub(1);
                } else if is_down(&key) {
                    self.cursor = clamp_index(self.cursor + 1, self.tasks.len());
                } else if key.code == KeyCode::Enter || plain_char(&key) == Some('c') {
                    return self.complete_selected();
                } else if plain_char(&key) == Some('r') && !self.needs_auth && !self.completing {
                    return vec![self.fetch()];
                }
                Vec::new()
            }
        }
    }

    fn render(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let heading = Style::default().fg(ACCENT).add_modifier(Modifier::BOLD);
        if self.needs_auth {
            let lines = vec![
                Line::styled("Planta - Plant Care", heading),
                Line::raw(""),
                Line::styled("Missing PLANTA_APP_CODE", theme.error()),
                Line::raw(""),
                Line::raw("1. Get your Planta app code"),
                Line::raw("2. Add to your .env file:"),
                Line::raw("   PLANTA_APP_CODE=your_planta_app_code"),
                Line::raw("3. Restart the app"),
            ];
            frame.render_widget(Paragraph::new(lines), area);
            return;
        }

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(2),
                Constraint::Min(1),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(area);
        frame.render_widget(
            Paragraph::new(Line::styled("Planta - Plant Care Tasks", heading)),
            chunks[0],
        );

        let body: Vec<Line> = if self.tasks.is_empty() {
            if self.loading {
                vec![Line::raw("Loading...")]
            } else {
                vec![Line::styled(
                    format!("No tasks due in the next {PLANTA_DUE_WINDOW_DAYS} days."),
                    theme.muted(),
                )]
            }
        } else {
            let rows = chunks[1].height as usize;
            let offset = scroll_for(self.cursor, rows, self.tasks.len());
            self.tasks
                .iter()
                .enumerate()
                .skip(offset)
                .take(rows)
                .map(|(index, task)| self.task_line(index, task))
                .collect()
        };
        frame.render_widget(Paragraph::new(body), chunks[1]);

        if let (Some(err), false) = (&self.error, self.loading) {
            frame.render_widget(
                Paragraph::new(Line::styled(format!("Error: {err}"), theme.error())),
                chunks[2],
            );
        }
        if self.completing {
            frame.render_widget(
                Paragraph::new(Line::styled("Completing task...", theme.muted())),
                chunks[3],
            );
        }
        frame.render_widget(
            Paragraph::new(Line::styled(self.status_line(), theme.muted())),
            chunks[4],
        );
    }

    fn bindings(&self) -> Vec<Binding> {
        if self.needs_auth {
            return Vec::new();
        }
        vec![
            Binding::new("k/up", "move up"),
            Binding::new("j/down", "move down"),
            Binding::new("enter/c", "complete"),
            Binding::new("r", "refresh"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tui::keys::{ch, press};
    use stet_providers::{OAuthManager, PlantaExchange, TokenStore, http_client};
    use tempfile::TempDir;
    use time::macros::date;

    fn client(tmp: &TempDir, app_code: Option<&str>) -> PlantaClient {
        let app_code = app_code.map(str::to_string);
        let auth = OAuthManager::new(
            PlantaExchange::new(app_code.clone()),
            TokenStore::new(tmp.path().join("planta_tokens.json")),
            http_client().unwrap(),
        );
        PlantaClient::new(auth, app_code)
    }

    fn task(plant: &str, action: ActionType) -> PlantTask {
        PlantTask {
            plant_id: plant.to_string(),
            plant_name: plant.to_uppercase(),
            action,
            due: date!(2026 - 05 - 01),
            overdue: false,
            today: true,
        }
    }

    fn loaded(tmp: &TempDir, tasks: Vec<PlantTask>) -> PlantaPage {
        let mut page = PlantaPage::new(client(tmp, Some("code")));
        page.update(PageEvent::Msg(PageMsg::Planta(PlantaMsg::Loaded(Ok(tasks)))));
        page
    }

    #[test]
    fn missing_app_code_shows_setup_without_polling() {
        let tmp = TempDir::new().unwrap();
        let mut page = PlantaPage::new(client(&tmp, None));
        assert!(page.init().unwrap().is_empty());
        assert!(page.needs_auth);
        assert!(page.bindings().is_empty());
        assert_eq!(
            page.update(PageEvent::Msg(PageMsg::Planta(PlantaMsg::Tick)))
                .len(),
            1
        );
    }

    #[test]
    fn manual_actions_are_refused_locally() {
        let tmp = TempDir::new().unwrap();
        let mut page = loaded(&tmp, vec![task("fern", ActionType::Repotting)]);
        assert!(page.update(PageEvent::Key(ch('c'))).is_empty());
        assert_eq!(
            page.error.as_deref(),
            Some("repotting cannot be completed via API")
        );
        assert!(!page.completing);
    }

    #[test]
    fn completion_blocks_ticks_and_removes_task() {
        let tmp = TempDir::new().unwrap();
        let mut page = loaded(
            &tmp,
            vec![
                task("fern", ActionType::Watering),
                task("ivy", ActionType::Misting),
            ],
        );
        page.update(PageEvent::Key(ch('j')));
        assert_eq!(page.update(PageEvent::Key(press(KeyCode::Enter))).len(), 1);
        assert!(page.completing);
        assert!(page.update(PageEvent::Key(ch('c'))).is_empty());

        let tick_effects = page.update(PageEvent::Msg(PageMsg::Planta(PlantaMsg::Tick)));
        assert_eq!(tick_effects.len(), 1);
        assert_eq!(page.poll_count, 0);

        page.update(PageEvent::Msg(PageMsg::Planta(PlantaMsg::Completed {
            plant_id: "ivy".to_string(),
            action: ActionType::Misting,
        })));
        assert!(!page.completing);
        assert_eq!(page.tasks.len(), 1);
        assert_eq!(page.cursor, 0);
    }

    #[test]
    fn due_labels_flag_today_and_overdue() {
        let mut due = task("fern", ActionType::Watering);
        assert_eq!(due_label(&due), "Today");
        due.today = false;
        due.overdue = true;
        assert_eq!(due_label(&due), "May 1 (overdue)");
        due.overdue = false;
        assert_eq!(due_label(&due), "Fri May 1");
        assert_eq!(short_name("Monstera deliciosa"), "Monstera del...");
    }
}
