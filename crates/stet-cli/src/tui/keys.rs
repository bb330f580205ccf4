use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// A typed character with no control or alt modifier.
pub(crate) fn plain_char(key: &KeyEvent) -> Option<char> {
    match key.code {
        KeyCode::Char(ch)
            if !key
                .modifiers
                .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
        {
            Some(ch)
        }
        _ => None,
    }
}

pub(crate) fn is_ctrl(key: &KeyEvent, ch: char) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char(ch)
}

pub(crate) fn is_up(key: &KeyEvent) -> bool {
    key.code == KeyCode::Up || plain_char(key) == Some('k')
}

pub(crate) fn is_down(key: &KeyEvent) -> bool {
    key.code == KeyCode::Down || plain_char(key) == Some('j')
}

pub(crate) fn is_quit(key: &KeyEvent) -> bool {
    plain_char(key) == Some('q') || is_ctrl(key, 'c')
}

pub(crate) fn clamp_index(index: usize, len: usize) -> usize {
    if len == 0 { 0 } else { index.min(len - 1) }
}

/// First visible row so that `selected` stays within a window of `height`.
pub(crate) fn scroll_for(selected: usize, height: usize, len: usize) -> usize {
    if height == 0 || len <= height {
        return 0;
    }
    selected
        .saturating_sub(height - 1)
        .min(len.saturating_sub(height))
}

#[cfg(test)]
pub(crate) fn press(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
}

#[cfg(test)]
pub(crate) fn ch(c: char) -> KeyEvent {
    KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
}

#[cfg(test)]
pub(crate) fn ctrl(c: char) -> KeyEvent {
    KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
}
