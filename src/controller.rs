use std::time::Duration;
use tracing::trace;

use crate::domain::{AppConfig, Field, Message, WSError};
use crate::model::Model;
use ratatui::crossterm::event::{self, Event, KeyCode, KeyModifiers};

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(cfg: &AppConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
        }
    }

    pub fn handle_event(&self, model: &Model) -> Result<Option<Message>, WSError> {
        if event::poll(Duration::from_millis(self.event_poll_time))?
            && let Event::Key(key) = event::read()?
            && key.kind == event::KeyEventKind::Press
        {
            return Ok(self.handle_key(key, model.raw_keyevents()));
        }
        Ok(None)
    }

    fn handle_key(&self, key: event::KeyEvent, raw: bool) -> Option<Message> {
        if raw {
            return Some(Message::RawKey(key));
        }
        let message = match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Message::Quit),
            (KeyCode::Char('q'), _) => Some(Message::Quit),
            (KeyCode::Esc, _) => Some(Message::Exit),
            (KeyCode::Char('?'), _) => Some(Message::Help),
            (KeyCode::Tab, _) | (KeyCode::BackTab, _) => Some(Message::NextScreen),
            (KeyCode::Char('j'), _) | (KeyCode::Down, _) => Some(Message::MoveDown),
            (KeyCode::Char('k'), _) | (KeyCode::Up, _) => Some(Message::MoveUp),
            (KeyCode::PageDown, _) => Some(Message::MovePageDown),
            (KeyCode::PageUp, _) => Some(Message::MovePageUp),
            (KeyCode::Char('g'), _) | (KeyCode::Home, _) => Some(Message::MoveBeginning),
            (KeyCode::Char('G'), _) | (KeyCode::End, _) => Some(Message::MoveEnd),
            (KeyCode::Enter, _) => Some(Message::ToggleDetails),
            (KeyCode::Char(' '), _) | (KeyCode::Char('f'), _) => Some(Message::ToggleFavorite),
            (KeyCode::Char('h'), _) => Some(Message::Edit(Field::Host)),
            (KeyCode::Char('p'), _) => Some(Message::Edit(Field::Port)),
            (KeyCode::Char('/'), _) => Some(Message::Edit(Field::Search)),
            (KeyCode::Char('e'), _) => Some(Message::Edit(Field::Meet)),
            (KeyCode::Char('t'), _) => Some(Message::SaveAndTest),
            (KeyCode::Char('s'), _) => Some(Message::SaveMeet),
            (KeyCode::Char('F'), _) => Some(Message::SetFavoriteText),
            (KeyCode::Char('c'), _) => Some(Message::ClearMeetText),
            (KeyCode::Char('r'), _) => Some(Message::Refresh),
            (KeyCode::Char('y'), _) => Some(Message::CopyRow),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyEvent;

    fn map(code: KeyCode, modifiers: KeyModifiers, raw: bool) -> Option<Message> {
        Controller::new(&AppConfig::default()).handle_key(KeyEvent::new(code, modifiers), raw)
    }

    #[test]
    fn browse_keys() {
        assert!(matches!(map(KeyCode::Char('q'), KeyModifiers::NONE, false), Some(Message::Quit)));
        assert!(matches!(map(KeyCode::Char('c'), KeyModifiers::CONTROL, false), Some(Message::Quit)));
        assert!(matches!(map(KeyCode::Char('c'), KeyModifiers::NONE, false), Some(Message::ClearMeetText)));
        assert!(matches!(map(KeyCode::Char('F'), KeyModifiers::SHIFT, false), Some(Message::SetFavoriteText)));
        assert!(matches!(map(KeyCode::Char(' '), KeyModifiers::NONE, false), Some(Message::ToggleFavorite)));
        assert!(matches!(map(KeyCode::Char('/'), KeyModifiers::NONE, false), Some(Message::Edit(Field::Search))));
        assert!(matches!(map(KeyCode::Tab, KeyModifiers::NONE, false), Some(Message::NextScreen)));
        assert!(map(KeyCode::Char('x'), KeyModifiers::NONE, false).is_none());
    }

    #[test]
    fn input_mode_forwards_raw_keys() {
        assert!(matches!(
            map(KeyCode::Char('q'), KeyModifiers::NONE, true),
            Some(Message::RawKey(KeyEvent { code: KeyCode::Char('q'), .. }))
        ));
    }
}
