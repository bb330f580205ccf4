use super::effect::Effect;
use super::theme::Theme;
use crossterm::event::KeyEvent;
use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::Color;
use stet_core::Store;
use stet_providers::{OuraClient, PlantaClient};

mod history;
mod journal;
mod oura;
mod planta;
mod task_config;
mod text_buffer;
mod today;

pub(crate) use history::{HistoryMsg, HistoryPage};
pub(crate) use journal::{JournalMsg, JournalPage};
pub(crate) use oura::{OuraMsg, OuraPage};
pub(crate) use planta::{PlantaMsg, PlantaPage};
pub(crate) use task_config::{ConfigureMsg, TaskConfigPage};
pub(crate) use today::{TodayMsg, TodayPage};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum PageId {
    Today,
    Journal,
    Oura,
    Planta,
    History,
    Configure,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct PageTitle {
    pub(crate) text: &'static str,
    pub(crate) color: Color,
}

/// One entry of the help line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Binding {
    pub(crate) keys: &'static str,
    pub(crate) help: &'static str,
}

impl Binding {
    pub(crate) const fn new(keys: &'static str, help: &'static str) -> Self {
        Self { keys, help }
    }
}

/// Results of a page's own effects. Each page matches only its own variant.
#[derive(Debug)]
pub(crate) enum PageMsg {
    Today(TodayMsg),
    Journal(JournalMsg),
    Oura(OuraMsg),
    Planta(PlantaMsg),
    History(HistoryMsg),
    Configure(ConfigureMsg),
}

#[derive(Debug)]
pub(crate) enum PageEvent {
    Key(KeyEvent),
    Msg(PageMsg),
}

pub(crate) trait Page {
    fn id(&self) -> PageId;

    fn title(&self) -> PageTitle;

    /// Content area size in cells. Most pages only record it.
    fn resize(&mut self, width: u16, height: u16) -> Vec<Effect>;

    fn update(&mut self, event: PageEvent) -> Vec<Effect>;

    fn render(&self, frame: &mut Frame, area: Rect, theme: &Theme);

    fn bindings(&self) -> Vec<Binding>;

    /// Work to run the first time the page becomes active. `None` for pages
    /// that need no loading.
    fn init(&mut self) -> Option<Vec<Effect>> {
        None
    }

    /// Suspends left/right page switching while true.
    fn captures_navigation(&self) -> bool {
        false
    }

    /// Routes quit and help keys to the page while true.
    fn captures_global_keys(&self) -> bool {
        false
    }
}

/// The fixed page order of the dashboard.
pub(crate) fn default_pages(
    store: Store,
    oura: OuraClient,
    planta: PlantaClient,
) -> Vec<Box<dyn Page>> {
    vec![
        Box::new(TodayPage::new(store.clone())),
        Box::new(JournalPage::new(store.clone())),
        Box::new(OuraPage::new(oura)),
        Box::new(PlantaPage::new(planta)),
        Box::new(HistoryPage::new(store.clone())),
        Box::new(TaskConfigPage::new(store)),
    ]
}
