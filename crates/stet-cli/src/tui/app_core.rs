use super::effect::Effect;
use super::keys::{is_ctrl, plain_char};
use super::pages::{Page, PageEvent, PageId};
use super::*;
use crossterm::event::{KeyCode, KeyEventKind};
use tracing::warn;

/// Title row, the gaps around the content and the paginator row.
const CHROME_ROWS: u16 = 4;
const MARGIN_ROWS: u16 = 2;
const MARGIN_COLUMNS: u16 = 4;
pub(in crate::tui) const SHORT_HELP_HEIGHT: u16 = 1;
pub(in crate::tui) const LOG_PANEL_HEIGHT: u16 = 7;
pub(in crate::tui) const FULL_HELP_HEIGHT: u16 = 2 + LOG_PANEL_HEIGHT;

impl App {
    pub(in crate::tui) fn new(pages: Vec<Box<dyn Page>>, log_buffer: LogBuffer) -> Self {
        Self {
            pages,
            active: 0,
            initialized: HashSet::new(),
            show_full_help: false,
            quit: false,
            width: 0,
            height: 0,
            log_buffer,
            theme: Theme::default(),
        }
    }

    /// Activates the first page.
    pub(in crate::tui) fn start(&mut self) -> Vec<Effect> {
        self.activate(0)
    }

    pub(in crate::tui) fn should_quit(&self) -> bool {
        self.quit
    }

    pub(in crate::tui) fn active_id(&self) -> Option<PageId> {
        self.pages.get(self.active).map(|page| page.id())
    }

    pub(in crate::tui) fn dispatch(&mut self, message: Message) -> Vec<Effect> {
        match message {
            Message::Key(key) => self.handle_key(key),
            Message::Resize { width, height } => {
                self.width = width;
                self.height = height;
                self.resize_pages()
            }
            Message::Invalidate(id) => {
                if self.initialized.remove(&id) {
                    debug!(page = ?id, "Page invalidated");
                }
                Vec::new()
            }
            Message::Page(id, msg) => match self.pages.iter_mut().find(|page| page.id() == id) {
                Some(page) => page.update(PageEvent::Msg(msg)),
                None => {
                    warn!(page = ?id, "Message for unknown page dropped");
                    Vec::new()
                }
            },
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Vec<Effect> {
        if key.kind != KeyEventKind::Press {
            return Vec::new();
        }
        if is_ctrl(&key, 'c') {
            self.quit = true;
            return Vec::new();
        }
        let Some(page) = self.pages.get(self.active) else {
            return Vec::new();
        };
        let captures_globals = page.captures_global_keys();
        let captures_navigation = captures_globals || page.captures_navigation();

        if !captures_globals {
            match plain_char(&key) {
                Some('q') => {
                    self.quit = true;
                    return Vec::new();
                }
                Some('?') => {
                    self.show_full_help = !self.show_full_help;
                    return self.resize_pages();
                }
                _ => {}
            }
        }
        if !captures_navigation {
            match key.code {
                KeyCode::Left => return self.navigate_to(self.active.saturating_sub(1)),
                KeyCode::Right => {
                    let last = self.pages.len().saturating_sub(1);
                    return self.navigate_to((self.active + 1).min(last));
                }
                _ => {}
            }
        }
        match self.pages.get_mut(self.active) {
            Some(page) => page.update(PageEvent::Key(key)),
            None => Vec::new(),
        }
    }

    fn navigate_to(&mut self, index: usize) -> Vec<Effect> {
        if index == self.active {
            return Vec::new();
        }
        self.active = index;
        debug!(page = ?self.active_id(), "Switched page");
        self.activate(index)
    }

    /// Runs a page's init the first time it becomes active, and again after
    /// an invalidation.
    fn activate(&mut self, index: usize) -> Vec<Effect> {
        let Some(page) = self.pages.get_mut(index) else {
            return Vec::new();
        };
        let id = page.id();
        if self.initialized.contains(&id) {
            return Vec::new();
        }
        match page.init() {
            Some(effects) => {
                self.initialized.insert(id);
                debug!(page = ?id, effects = effects.len(), "Page initialized");
                effects
            }
            None => Vec::new(),
        }
    }

    pub(in crate::tui) fn help_height(&self) -> u16 {
        if self.show_full_help {
            FULL_HELP_HEIGHT
        } else {
            SHORT_HELP_HEIGHT
        }
    }

    /// Size left for page content once the chrome is laid out.
    pub(in crate::tui) fn content_size(&self) -> (u16, u16) {
        let width = self.width.saturating_sub(MARGIN_COLUMNS);
        let height = self
            .height
            .saturating_sub(MARGIN_ROWS + CHROME_ROWS + self.help_height());
        (width, height)
    }

    fn resize_pages(&mut self) -> Vec<Effect> {
        let (width, height) = self.content_size();
        self.pages
            .iter_mut()
            .flat_map(|page| page.resize(width, height))
            .collect()
    }
}
