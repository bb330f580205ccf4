use super::{Binding, Page, PageEvent, PageId, PageMsg, PageTitle};
use crate::tui::Message;
use crate::tui::effect::Effect;
use crate::tui::keys::{clamp_index, is_down, is_up, plain_char, scroll_for};
use crate::tui::theme::Theme;
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Paragraph, Sparkline};
use stet_core::clock;
use stet_core::config::{AUTH_TIMEOUT, CALLBACK_PATH, CALLBACK_PORT, OURA_POLL_INTERVAL};
use stet_providers::oura::{DailyReadiness, HeartRatePoint};
use stet_providers::{ApiError, AuthError, AuthState, OuraClient};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use tracing::{info, warn};

const ACCENT: Color = Color::Rgb(0x8B, 0x5C, 0xF6);
const CHART_HEIGHT: u16 = 8;

#[derive(Debug)]
pub(crate) struct OuraSnapshot {
    readiness: Option<DailyReadiness>,
    heart_rate: Vec<HeartRatePoint>,
}

#[derive(Debug)]
pub(crate) enum OuraMsg {
    Tick,
    AuthChecked(AuthState),
    Fetched(Result<OuraSnapshot, ApiError>),
    AuthDone(Result<(), AuthError>),
}

fn deliver(msg: OuraMsg) -> Message {
    Message::Page(PageId::Oura, PageMsg::Oura(msg))
}

fn tick() -> Effect {
    Effect::after(OURA_POLL_INTERVAL, deliver(OuraMsg::Tick))
}

/// Readiness first; heart rate is best effort and never fails the poll.
async fn fetch_snapshot(client: &OuraClient) -> Result<OuraSnapshot, ApiError> {
    let readiness = client.readiness(clock::today()).await?;
    let now = clock::now_local();
    let heart_rate = match client.heart_rate(clock::start_of_day(now), now).await {
        Ok(points) => points,
        Err(err) => {
            warn!(error = %err, "Heart rate fetch failed");
            Vec::new()
        }
    };
    Ok(OuraSnapshot {
        readiness,
        heart_rate,
    })
}

fn sample_time(timestamp: &str) -> String {
    OffsetDateTime::parse(timestamp, &Rfc3339)
        .ok()
        .and_then(|at| {
            at.to_offset(clock::local_offset())
                .format(format_description!("[hour]:[minute]:[second]"))
                .ok()
        })
        .unwrap_or_else(|| timestamp.to_string())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct HeartRateStats {
    min: u32,
    avg: u32,
    max: u32,
    count: usize,
}

fn heart_rate_stats(points: &[HeartRatePoint]) -> Option<HeartRateStats> {
    let min = points.iter().map(|point| point.bpm).min()?;
    let max = points.iter().map(|point| point.bpm).max()?;
    let sum: u64 = points.iter().map(|point| u64::from(point.bpm)).sum();
    Some(HeartRateStats {
        min,
        avg: (sum / points.len() as u64) as u32,
        max,
        count: points.len(),
    })
}

/// Daily readiness and today's heart rate, polled every few seconds.
pub(crate) struct OuraPage {
    client: OuraClient,
    readiness: Option<DailyReadiness>,
    heart_rate: Vec<HeartRatePoint>,
    sample_selected: usize,
    poll_count: u64,
    last_poll: Option<OffsetDateTime>,
    error: Option<String>,
    loading: bool,
    needs_auth: bool,
    checking_auth: bool,
    auth_pending: bool,
    width: u16,
    height: u16,
}

impl OuraPage {
    pub(crate) fn new(client: OuraClient) -> Self {
        Self {
            client,
            readiness: None,
            heart_rate: Vec::new(),
            sample_selected: 0,
            poll_count: 0,
            last_poll: None,
            error: None,
            loading: false,
            needs_auth: true,
            checking_auth: false,
            auth_pending: false,
            width: 0,
            height: 0,
        }
    }

    fn fetch(&mut self) -> Effect {
        self.loading = true;
        let client = self.client.clone();
        Effect::task(async move {
            let result = fetch_snapshot(&client).await;
            deliver(OuraMsg::Fetched(result))
        })
    }

    /// Reads the token file off the loop.
    fn check_auth(&mut self) -> Effect {
        self.checking_auth = true;
        let auth = self.client.auth().clone();
        Effect::blocking(move || deliver(OuraMsg::AuthChecked(auth.auth_state())))
    }

    fn authorize(&mut self) -> Vec<Effect> {
        if !self.client.auth().has_credentials() {
            self.error =
                Some("missing OURA_CLIENT_ID and OURA_CLIENT_SECRET in .env".to_string());
            return Vec::new();
        }
        if self.auth_pending {
            return Vec::new();
        }
        self.auth_pending = true;
        self.error = None;
        let auth = self.client.auth().clone();
        vec![Effect::task(async move {
            let result = auth.authorize(AUTH_TIMEOUT).await.map(|_| ());
            deliver(OuraMsg::AuthDone(result))
        })]
    }

    fn handle_msg(&mut self, msg: OuraMsg) -> Vec<Effect> {
        match msg {
            OuraMsg::Tick => {
                if self.needs_auth || self.auth_pending {
                    return vec![tick()];
                }
                self.poll_count += 1;
                vec![self.fetch(), tick()]
            }
            OuraMsg::AuthChecked(state) => {
                self.checking_auth = false;
                if self.auth_pending {
                    return Vec::new();
                }
                self.needs_auth = state != AuthState::Authenticated;
                if self.needs_auth {
                    Vec::new()
                } else {
                    vec![self.fetch()]
                }
            }
            OuraMsg::Fetched(Ok(snapshot)) => {
                self.readiness = snapshot.readiness;
                self.heart_rate = snapshot.heart_rate;
                self.sample_selected = clamp_index(self.sample_selected, self.heart_rate.len());
                self.last_poll = Some(clock::now_local());
                self.loading = false;
                self.error = None;
                Vec::new()
            }
            OuraMsg::Fetched(Err(err)) => {
                warn!(error = %err, "Oura poll failed");
                self.loading = false;
                if err.requires_auth() {
                    self.needs_auth = true;
                }
                self.error = Some(err.user_message("Oura"));
                Vec::new()
            }
            OuraMsg::AuthDone(Ok(())) => {
                info!("Oura authorization completed");
                self.auth_pending = false;
                self.needs_auth = false;
                self.error = None;
                vec![self.fetch()]
            }
            OuraMsg::AuthDone(Err(err)) => {
                warn!(error = %err, "Oura authorization failed");
                self.auth_pending = false;
                self.error = Some(err.to_string());
                Vec::new()
            }
        }
    }

    /// Samples newest first, matching the table order.
    fn samples_newest_first(&self) -> impl Iterator<Item = &HeartRatePoint> {
        self.heart_rate.iter().rev()
    }

    fn render_setup(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let lines = vec![
            Line::styled("Oura Ring", self.heading()),
            Line::raw(""),
            Line::styled("Missing OAuth2 credentials", theme.error()),
            Line::raw(""),
            Line::raw("1. Create an app at https://cloud.ouraring.com/oauth/applications"),
            Line::raw(format!(
                "2. Set redirect URI to: http://localhost:{CALLBACK_PORT}{CALLBACK_PATH}"
            )),
            Line::raw("3. Copy credentials to your .env file:"),
            Line::raw("   OURA_CLIENT_ID=your_client_id"),
            Line::raw("   OURA_CLIENT_SECRET=your_client_secret"),
            Line::raw("4. Restart the app"),
        ];
        frame.render_widget(Paragraph::new(lines), area);
    }

    fn heading(&self) -> Style {
        Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
    }

    fn readiness_lines(&self, theme: &Theme) -> Vec<Line<'static>> {
        let mut lines = vec![
            Line::styled("Oura Ring - Daily Readiness", self.heading()),
            Line::raw(""),
        ];
        let Some(readiness) = &self.readiness else {
            if self.loading {
                lines.push(Line::raw("Loading..."));
            } else if self.error.is_none() {
                lines.push(Line::raw("No readiness data available for today yet."));
            }
            return lines;
        };

        let score = readiness
            .score
            .map_or_else(|| "-".to_string(), |score| score.to_string());
        lines.push(Line::styled(
            format!("  Readiness Score: {score}  "),
            Style::default()
                .fg(Color::White)
                .bg(ACCENT)
                .add_modifier(Modifier::BOLD),
        ));
        lines.push(Line::raw(""));
        lines.push(Line::styled("Contribution Scores:", theme.muted()));
        let half = (self.width / 2) as usize;
        let entries = readiness.contributors.entries();
        for pair in entries.chunks(2) {
            let cells: Vec<String> = pair
                .iter()
                .map(|(label, value)| {
                    let value = value.map_or_else(|| "-".to_string(), |v| v.to_string());
                    format!("{label:<22} {value:>3}")
                })
                .collect();
            let left = cells.first().cloned().unwrap_or_default();
            let right = cells.get(1).cloned().unwrap_or_default();
            lines.push(Line::raw(format!("{left:<half$}{right}")));
        }
        lines
    }

    fn render_heart_rate(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let Some(stats) = heart_rate_stats(&self.heart_rate) else {
            return;
        };
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(CHART_HEIGHT),
                Constraint::Length(2),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Min(1),
            ])
            .split(area);

        frame.render_widget(
            Paragraph::new(Line::styled("Heart Rate (BPM):", theme.muted())),
            chunks[0],
        );
        let width = chunks[1].width as usize;
        let data: Vec<u64> = self
            .heart_rate
            .iter()
            .skip(self.heart_rate.len().saturating_sub(width))
            .map(|point| u64::from(point.bpm.saturating_sub(stats.min.saturating_sub(1))))
            .collect();
        frame.render_widget(
            Sparkline::default()
                .data(&data)
                .style(Style::default().fg(ACCENT)),
            chunks[1],
        );
        frame.render_widget(
            Paragraph::new(Line::styled(
                format!(
                    "Min: {}  Avg: {}  Max: {}  ({} readings)",
                    stats.min, stats.avg, stats.max, stats.count
                ),
                theme.muted(),
            )),
            chunks[2],
        );
        frame.render_widget(
            Paragraph::new(Line::styled("Recent Samples:", theme.muted())),
            chunks[3],
        );
        frame.render_widget(
            Paragraph::new(Line::styled(
                format!("{:<10} {:>6} {:<10}", "Time", "BPM", "Source"),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            chunks[4],
        );

        let rows = chunks[5].height as usize;
        let offset = scroll_for(self.sample_selected, rows, self.heart_rate.len());
        let sample_lines: Vec<Line> = self
            .samples_newest_first()
            .enumerate()
            .skip(offset)
            .take(rows)
            .map(|(index, point)| {
                let text = format!(
                    "{:<10} {:>6} {:<10}",
                    sample_time(&point.timestamp),
                    point.bpm,
                    point.source
                );
                if index == self.sample_selected {
                    Line::styled(text, Style::default().fg(Color::White).bg(ACCENT))
                } else {
                    Line::raw(text)
                }
            })
            .collect();
        frame.render_widget(Paragraph::new(sample_lines), chunks[5]);
    }

    fn status_line(&self) -> String {
        let mut parts = vec![format!("Poll count: {}", self.poll_count)];
        if let Some(last) = self.last_poll {
            if let Ok(at) = last.format(format_description!("[hour]:[minute]:[second]")) {
                parts.push(format!("Last updated: {at}"));
            }
        }
        if self.loading {
            parts.push("Refreshing...".to_string());
        }
        parts.join(" | ")
    }
}

impl Page for OuraPage {
    fn id(&self) -> PageId {
        PageId::Oura
    }

    fn title(&self) -> PageTitle {
        PageTitle {
            text: "Oura",
            color: ACCENT,
        }
    }

    fn resize(&mut self, width: u16, height: u16) -> Vec<Effect> {
        self.width = width;
        self.height = height;
        Vec::new()
    }

    /// Arms the poll timer whenever credentials exist, so a later sign-in
    /// joins the running cadence instead of starting a second one.
    fn init(&mut self) -> Option<Vec<Effect>> {
        if !self.client.auth().has_credentials() {
            self.needs_auth = true;
            return Some(Vec::new());
        }
        Some(vec![self.check_auth(), tick()])
    }

    fn update(&mut self, event: PageEvent) -> Vec<Effect> {
        match event {
            PageEvent::Msg(PageMsg::Oura(msg)) => self.handle_msg(msg),
            PageEvent::Msg(_) => Vec::new(),
            PageEvent::Key(key) => match plain_char(&key) {
                Some('a') => self.authorize(),
                Some('r') => {
                    if self.needs_auth || self.auth_pending {
                        Vec::new()
                    } else {
                        vec![self.fetch()]
                    }
                }
                _ => {
                    if is_up(&key) {
                        self.sample_selected = self.sample_selected.saturating_sub(1);
                    } else if is_down(&key) {
                        self.sample_selected =
                            clamp_index(self.sample_selected + 1, self.heart_rate.len());
                    }
                    Vec::new()
                }
            },
        }
    }

    fn render(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        if !self.client.auth().has_credentials() {
            self.render_setup(frame, area, theme);
            return;
        }
        if self.checking_auth {
            let lines = vec![
                Line::styled("Oura Ring", self.heading()),
                Line::raw(""),
                Line::styled("Checking stored credentials...", theme.muted()),
            ];
            frame.render_widget(Paragraph::new(lines), area);
            return;
        }
        if self.auth_pending {
            let lines = vec![
                Line::styled("Oura Ring", self.heading()),
                Line::raw(""),
                Line::raw("Opening browser for authentication..."),
                Line::raw("Please authorize the app in your browser."),
            ];
            frame.render_widget(Paragraph::new(lines), area);
            return;
        }
        if self.needs_auth {
            let mut lines = vec![
                Line::styled("Oura Ring", self.heading()),
                Line::raw(""),
                Line::raw("Authentication required."),
                Line::raw(""),
                Line::raw("Press 'a' to authenticate with Oura."),
            ];
            if let Some(err) = &self.error {
                lines.push(Line::raw(""));
                lines.push(Line::styled(format!("Error: {err}"), theme.error()));
            }
            frame.render_widget(Paragraph::new(lines), area);
            return;
        }

        let readiness = self.readiness_lines(theme);
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(readiness.len() as u16 + 1),
                Constraint::Min(0),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(area);
        frame.render_widget(Paragraph::new(readiness), chunks[0]);
        if self.readiness.is_some() {
            self.render_heart_rate(frame, chunks[1], theme);
        }
        if let (Some(err), false) = (&self.error, self.loading) {
            frame.render_widget(
                Paragraph::new(Line::from(Span::styled(
                    format!("Error: {err}"),
                    theme.error(),
                ))),
                chunks[2],
            );
        }
        frame.render_widget(
            Paragraph::new(Line::styled(self.status_line(), theme.muted())),
            chunks[3],
        );
    }

    fn bindings(&self) -> Vec<Binding> {
        if self.needs_auth && self.client.auth().has_credentials() {
            vec![Binding::new("a", "authenticate")]
        } else if !self.needs_auth && !self.auth_pending {
            vec![Binding::new("r", "refresh"), Binding::new("↑/↓", "samples")]
        } else {
            Vec::new()
        }
    }
}
