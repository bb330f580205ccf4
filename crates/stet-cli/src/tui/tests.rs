use super::effect::Effect;
use super::keys::{ch, ctrl, press};
use super::pages::{JournalPage, OuraMsg, TaskConfigPage, TodayMsg, TodayPage};
use super::*;
use crossterm::event::{KeyCode, KeyEventKind};
use ratatui::backend::TestBackend;

fn app() -> App {
    app_with(Store::open_in_memory().unwrap())
}

fn app_with(store: Store) -> App {
    let pages: Vec<Box<dyn Page>> = vec![
        Box::new(TodayPage::new(store.clone())),
        Box::new(JournalPage::new(store.clone())),
        Box::new(TaskConfigPage::new(store)),
    ];
    let mut app = App::new(pages, LogBuffer::new(50));
    app.dispatch(Message::Resize {
        width: 100,
        height: 40,
    });
    app
}

fn key(app: &mut App, event: KeyEvent) -> usize {
    app.dispatch(Message::Key(event)).len()
}

/// Runs effects to completion and feeds their messages back, one level deep.
async fn settle(app: &mut App, effects: Vec<Effect>) {
    for effect in effects {
        if let Some(message) = effect.resolve().await {
            app.dispatch(message);
        }
    }
}

async fn press_and_settle(app: &mut App, event: KeyEvent) {
    let effects = app.dispatch(Message::Key(event));
    settle(app, effects).await;
}

fn screen(app: &App) -> String {
    let mut terminal = Terminal::new(TestBackend::new(100, 40)).unwrap();
    terminal.draw(|frame| app.draw(frame)).unwrap();
    terminal
        .backend()
        .buffer()
        .content()
        .iter()
        .map(|cell| cell.symbol())
        .collect()
}

#[test]
fn init_runs_once_until_invalidated() {
    let mut app = app();
    assert_eq!(app.start().len(), 1);
    assert_eq!(key(&mut app, press(KeyCode::Right)), 1);
    assert_eq!(key(&mut app, press(KeyCode::Left)), 0);
    assert_eq!(key(&mut app, press(KeyCode::Right)), 0);

    app.dispatch(Message::Invalidate(PageId::Today));
    assert_eq!(key(&mut app, press(KeyCode::Left)), 1);
    assert_eq!(app.active_id(), Some(PageId::Today));
}

#[test]
fn navigation_stops_at_both_ends() {
    let mut app = app();
    app.start();
    key(&mut app, press(KeyCode::Left));
    assert_eq!(app.active_id(), Some(PageId::Today));
    for _ in 0..5 {
        key(&mut app, press(KeyCode::Right));
    }
    assert_eq!(app.active_id(), Some(PageId::Configure));
}

#[tokio::test]
async fn editing_journal_captures_navigation() {
    let mut app = app();
    app.start();
    press_and_settle(&mut app, press(KeyCode::Right)).await;
    key(&mut app, ctrl('v'));
    key(&mut app, press(KeyCode::Right));
    assert_eq!(app.active_id(), Some(PageId::Journal));

    key(&mut app, ctrl('v'));
    key(&mut app, press(KeyCode::Right));
    assert_eq!(app.active_id(), Some(PageId::Configure));
}

#[tokio::test]
async fn quit_key_is_text_while_inserting() {
    let mut app = app();
    app.start();
    press_and_settle(&mut app, press(KeyCode::Right)).await;
    key(&mut app, ctrl('v'));
    key(&mut app, ch('i'));
    assert_eq!(key(&mut app, ch('q')), 1);
    assert!(!app.should_quit());

    key(&mut app, ch('?'));
    assert!(!app.show_full_help);

    key(&mut app, ctrl('c'));
    assert!(app.should_quit());
}

#[test]
fn q_quits_outside_text_entry() {
    let mut app = app();
    app.start();
    key(&mut app, ch('q'));
    assert!(app.should_quit());
}

#[test]
fn help_toggle_shrinks_content() {
    let mut app = app();
    let (_, short) = app.content_size();
    key(&mut app, ch('?'));
    let (_, full) = app.content_size();
    assert_eq!(short - full, app_core::FULL_HELP_HEIGHT - app_core::SHORT_HELP_HEIGHT);
}

#[test]
fn key_releases_are_ignored() {
    let mut app = app();
    app.start();
    let mut release = press(KeyCode::Right);
    release.kind = KeyEventKind::Release;
    key(&mut app, release);
    assert_eq!(app.active_id(), Some(PageId::Today));
}

#[test]
fn messages_for_absent_pages_are_dropped() {
    let mut app = app();
    let effects = app.dispatch(Message::Page(PageId::Oura, PageMsg::Oura(OuraMsg::Tick)));
    assert!(effects.is_empty());
}

#[tokio::test]
async fn inactive_page_keeps_state_and_receives_its_results() {
    let store = Store::open_in_memory().unwrap();
    store.add_task_definition("Stretch", "").unwrap();
    let read = store.add_task_definition("Read", "").unwrap();
    let mut app = app_with(store);
    let effects = app.start();
    settle(&mut app, effects).await;

    key(&mut app, press(KeyCode::Down));
    assert_eq!(key(&mut app, ch(' ')), 1);
    assert!(screen(&app).contains("> [x] Read"));

    key(&mut app, press(KeyCode::Right));
    assert_eq!(app.active_id(), Some(PageId::Journal));
    let effects = app.dispatch(Message::Page(
        PageId::Today,
        PageMsg::Today(TodayMsg::SaveFailed {
            task_id: read.id,
            completed: true,
            error: "disk full".to_string(),
        }),
    ));
    assert!(effects.is_empty());

    assert_eq!(key(&mut app, press(KeyCode::Left)), 0);
    let text = screen(&app);
    assert!(text.contains("  [ ] Stretch"));
    assert!(text.contains("> [ ] Read"));
    assert!(text.contains("save failed: disk full"));
}

#[test]
fn chrome_shows_title_help_and_paginator() {
    let mut app = app();
    app.start();
    let text = screen(&app);
    assert!(text.contains(" Today "));
    assert!(text.contains("? more"));
    assert!(text.contains("•"));
}
