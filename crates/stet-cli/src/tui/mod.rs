use crate::logging::LogBuffer;
use anyhow::Context;
use crossterm::{
    event::{self, Event, KeyEvent},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::collections::HashSet;
use std::io::{self, Stdout};
use std::sync::mpsc;
use std::time::Duration;
use stet_core::Store;
use stet_providers::{OuraClient, PlantaClient};
use tokio::runtime::Handle;
use tracing::{debug, error, info};

mod app_core;
mod draw;
mod effect;
mod keys;
mod pages;
#[cfg(test)]
mod tests;
mod theme;

use effect::EffectScheduler;
use pages::{Page, PageId, PageMsg};
use theme::Theme;

const INPUT_POLL: Duration = Duration::from_millis(50);

/// Everything the loop reacts to. Page results carry the id of the page
/// that issued the effect.
#[derive(Debug)]
pub(crate) enum Message {
    Key(KeyEvent),
    Resize { width: u16, height: u16 },
    Invalidate(PageId),
    Page(PageId, PageMsg),
}

/// Runtime state: the page set, the active index and the chrome.
struct App {
    pages: Vec<Box<dyn Page>>,
    active: usize,
    initialized: HashSet<PageId>,
    show_full_help: bool,
    quit: bool,
    width: u16,
    height: u16,
    log_buffer: LogBuffer,
    theme: Theme,
}

pub fn run_tui(
    handle: Handle,
    store: Store,
    oura: OuraClient,
    planta: PlantaClient,
    log_buffer: LogBuffer,
) -> anyhow::Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    info!("Starting TUI");
    let app = App::new(pages::default_pages(store, oura, planta), log_buffer);
    let result = run_app(&mut terminal, handle, app);

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    if let Err(err) = &result {
        error!(error = %err, "TUI exited with error");
    } else {
        info!("TUI exited");
    }
    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    handle: Handle,
    mut app: App,
) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel();
    let scheduler = EffectScheduler::new(handle, tx);

    let size = terminal.size().context("read terminal size")?;
    scheduler.spawn_all(app.dispatch(Message::Resize {
        width: size.width,
        height: size.height,
    }));
    scheduler.spawn_all(app.start());
    debug!(poll_ms = INPUT_POLL.as_millis(), "TUI event loop started");

    loop {
        terminal.draw(|frame| app.draw(frame))?;

        if event::poll(INPUT_POLL)? {
            let message = match event::read()? {
                Event::Key(key) => Some(Message::Key(key)),
                Event::Resize(width, height) => Some(Message::Resize { width, height }),
                _ => None,
            };
            if let Some(message) = message {
                scheduler.spawn_all(app.dispatch(message));
            }
        }

        while let Ok(message) = rx.try_recv() {
            scheduler.spawn_all(app.dispatch(message));
        }

        if app.should_quit() {
            return Ok(());
        }
    }
}
