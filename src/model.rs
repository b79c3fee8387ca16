use arboard::Clipboard;
use ratatui::crossterm::event::KeyEvent;
use tracing::{debug, info, trace, warn};

use crate::card::RowCard;
use crate::client::BaseUrlConfig;
use crate::domain::{AppConfig, Field, HELP_TEXT, Message, Screen};
use crate::inputter::{InputResult, Inputter};
use crate::query::{Fetched, Request};
use crate::screens::{DataScreen, FavoritesScreen, RowScreen};

const PAGE_STEP: usize = 10;

#[derive(Debug, PartialEq)]
pub enum Status {
    Ready,
    Quitting,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    Browse,
    Input(Field),
    Popup,
}

pub struct Model {
    pub status: Status,
    base_url: BaseUrlConfig,
    screen: Screen,
    modus: Modus,
    data: DataScreen,
    favorites: FavoritesScreen,
    input: Inputter,
    last_input: InputResult,
    meet_target: Option<String>,
    popup_message: String,
    status_message: String,
    clipboard: Option<Clipboard>,
    outbox: Vec<Request>,
}

impl Model {
    /// Applies the stored base url and queues the initial fetches of the Data screen.
    pub fn init(config: &AppConfig, base_url: BaseUrlConfig, clipboard: Option<Clipboard>) -> Self {
        let url = base_url.hydrate_api_base_url();
        info!("Using api at {url}");
        let mut model = Self {
            status: Status::Ready,
            base_url,
            screen: Screen::Data,
            modus: Modus::Browse,
            data: DataScreen::new(&url, config.browse_page_size),
            favorites: FavoritesScreen::new(config.favorites_page_size),
            input: Inputter::default(),
            last_input: InputResult::default(),
            meet_target: None,
            popup_message: String::new(),
            status_message: format!("Connected to {url}"),
            clipboard,
            outbox: Vec::new(),
        };
        let requests = model.data.sync();
        model.queue(requests);
        let requests = model.data.refresh_service();
        model.queue(requests);
        model
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn data(&self) -> &DataScreen {
        &self.data
    }

    pub fn favorites(&self) -> &FavoritesScreen {
        &self.favorites
    }

    pub fn active(&self) -> &dyn RowScreen {
        match self.screen {
            Screen::Data => &self.data,
            Screen::Favorites => &self.favorites,
        }
    }

    fn active_mut(&mut self) -> &mut dyn RowScreen {
        match self.screen {
            Screen::Data => &mut self.data,
            Screen::Favorites => &mut self.favorites,
        }
    }

    /// Field being edited together with the editor state.
    pub fn editing(&self) -> Option<(Field, &InputResult)> {
        match self.modus {
            Modus::Input(field) => Some((field, &self.last_input)),
            _ => None,
        }
    }

    /// Key of the card whose meet text is being edited.
    pub fn meet_target(&self) -> Option<&str> {
        match self.modus {
            Modus::Input(Field::Meet) => self.meet_target.as_deref(),
            _ => None,
        }
    }

    pub fn popup(&self) -> Option<&str> {
        match self.modus {
            Modus::Popup => Some(&self.popup_message),
            _ => None,
        }
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    /// While a text field has focus every key is passed on unmapped.
    pub fn raw_keyevents(&self) -> bool {
        matches!(self.modus, Modus::Input(_))
    }

    /// Requests queued since the last call.
    pub fn take_requests(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.outbox)
    }

    pub fn quit(&mut self) {
        info!("Quitting ...");
        self.status = Status::Quitting;
    }

    pub fn update(&mut self, message: Message) {
        trace!("Update {:?} with {message:?}", self.modus);
        if let Message::Fetched(fetched) = message {
            self.apply_fetched(fetched);
            return;
        }
        match self.modus {
            Modus::Browse => match message {
                Message::Quit => self.quit(),
                Message::Help => self.show_popup(HELP_TEXT),
                Message::NextScreen => self.next_screen(),
                Message::MoveUp => self.active_mut().list_mut().move_up(1),
                Message::MoveDown => self.active_mut().list_mut().move_down(1),
                Message::MovePageUp => self.active_mut().list_mut().move_up(PAGE_STEP),
                Message::MovePageDown => self.active_mut().list_mut().move_down(PAGE_STEP),
                Message::MoveBeginning => self.active_mut().list_mut().move_beginning(),
                Message::MoveEnd => self.active_mut().list_mut().move_end(),
                Message::ToggleDetails => {
                    if let Some(card) = self.active_mut().list_mut().selected_mut() {
                        card.toggle_expanded();
                    }
                }
                Message::ToggleFavorite => self.toggle_favorite(),
                Message::Edit(field) => self.enter_input(field),
                Message::SaveAndTest => self.save_and_test(),
                Message::SaveMeet => self.save_meet(),
                Message::SetFavoriteText => self.edit_selected_meet(|card| card.set_favorite_text()),
                Message::ClearMeetText => self.edit_selected_meet(|card| card.clear_meet_text()),
                Message::Refresh => self.refresh(),
                Message::CopyRow => self.copy_row(),
                Message::Exit => self.exit(),
                _ => {}
            },
            Modus::Popup => match message {
                Message::Quit => self.quit(),
                Message::Exit | Message::Help => self.exit(),
                _ => {}
            },
            Modus::Input(field) => {
                if let Message::RawKey(key) = message {
                    self.raw_input(field, key);
                }
            }
        }
    }

    fn queue(&mut self, requests: impl IntoIterator<Item = Request>) {
        self.outbox.extend(requests);
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        trace!("Status: {}", self.status_message);
    }

    /// While a field has focus the message goes to the status line so the edit survives.
    fn show_popup(&mut self, message: impl Into<String>) {
        let message = message.into();
        if let Modus::Input(_) = self.modus {
            self.set_status_message(message);
            return;
        }
        self.popup_message = message;
        self.modus = Modus::Popup;
    }

    fn exit(&mut self) {
        match self.modus {
            Modus::Popup => self.modus = Modus::Browse,
            Modus::Browse => {
                if self.screen == Screen::Data && !self.data.query().is_empty() {
                    let requests = self.data.set_query("");
                    self.queue(requests);
                    self.set_status_message("Search cleared");
                }
            }
            Modus::Input(_) => {}
        }
    }

    fn next_screen(&mut self) {
        self.screen = match self.screen {
            Screen::Data => Screen::Favorites,
            Screen::Favorites => Screen::Data,
        };
        debug!("Switched to {:?}", self.screen);
        if self.screen == Screen::Favorites {
            // Entering the screen loads it, or refreshes what it loaded before.
            let mut requests = self.favorites.sync();
            if requests.is_empty() {
                requests = self.favorites.refetch_active();
            }
            self.queue(requests);
        }
    }

    fn enter_input(&mut self, field: Field) {
        if self.screen != Screen::Data {
            self.set_status_message("Only the Data screen has input fields");
            return;
        }
        let current = match field {
            Field::Host => self.data.host().to_string(),
            Field::Port => self.data.port().to_string(),
            Field::Search => self.data.query().to_string(),
            Field::Meet => match self.data.list().selected() {
                Some(card) => {
                    self.meet_target = Some(card.key().to_string());
                    card.meet_value().to_string()
                }
                None => {
                    self.set_status_message("No row selected");
                    return;
                }
            },
        };
        trace!("Editing {field:?}");
        self.input.set(&current);
        self.last_input = self.input.get();
        self.modus = Modus::Input(field);
    }

    fn raw_input(&mut self, field: Field, key: KeyEvent) {
        self.last_input = self.input.read(key);
        if !self.last_input.finished {
            return;
        }
        self.modus = Modus::Browse;
        if self.last_input.canceled {
            return;
        }
        let value = self.last_input.input.clone();
        match field {
            Field::Host => self.data.set_host(value),
            Field::Port => self.data.set_port(value),
            Field::Search => {
                let requests = self.data.set_query(value);
                self.queue(requests);
            }
            Field::Meet => {
                let Some(key) = self.meet_target.take() else {
                    return;
                };
                match self.data.list_mut().find_mut(&key) {
                    Some(card) => card.set_meet_input(value),
                    None => self.set_status_message(format!("Row {key} left the list, edit dropped")),
                }
            }
        }
    }

    fn toggle_favorite(&mut self) {
        match self.active_mut().toggle_selected() {
            Some(request) => self.queue([request]),
            None => self.set_status_message("Favorite cannot be changed for this row right now"),
        }
    }

    fn save_meet(&mut self) {
        if self.screen != Screen::Data {
            return;
        }
        match self.data.save_selected() {
            Some(request) => {
                self.set_status_message("Saving...");
                self.queue([request]);
            }
            None => self.set_status_message("Nothing to save"),
        }
    }

    fn edit_selected_meet(&mut self, edit: impl FnOnce(&mut RowCard)) {
        if self.screen != Screen::Data {
            return;
        }
        if let Some(card) = self.data.list_mut().selected_mut() {
            edit(card);
        }
    }

    fn save_and_test(&mut self) {
        if self.screen != Screen::Data {
            return;
        }
        let requests = self.data.save_and_test(&self.base_url);
        if !requests.is_empty() {
            self.set_status_message(self.data.test_message().to_string());
        }
        self.queue(requests);
    }

    fn refresh(&mut self) {
        let mut requests = self.active_mut().refetch_active();
        if self.screen == Screen::Data {
            requests.extend(self.data.refresh_service());
        }
        self.queue(requests);
    }

    fn copy_row(&mut self) {
        let Some(card) = self.active().list().selected() else {
            return;
        };
        let content = match serde_json::to_string_pretty(card.row()) {
            Ok(content) => content,
            Err(e) => {
                warn!("Cannot serialize row {}: {e}", card.key());
                return;
            }
        };
        let key = card.key().to_string();
        let outcome = match self.clipboard.as_mut() {
            Some(clipboard) => clipboard.set_text(content).map_err(|e| e.to_string()),
            None => Err("clipboard unavailable".to_string()),
        };
        match outcome {
            Ok(()) => self.set_status_message(format!("Copied row {key}")),
            Err(e) => {
                trace!("Error copying to clipboard: {e}");
                self.set_status_message(format!("Copy failed: {e}"));
            }
        }
    }

    fn apply_fetched(&mut self, fetched: Fetched) {
        match fetched {
            Fetched::Rows {
                screen,
                generation,
                result,
            } => {
                if let Err(e) = &result {
                    warn!("Loading rows for {screen:?} failed: {e}");
                }
                match screen {
                    Screen::Data => self.data.on_rows(generation, result),
                    Screen::Favorites => self.favorites.on_rows(generation, result),
                }
            }
            Fetched::Search { generation, result } => {
                if let Err(e) = &result {
                    warn!("Search failed: {e}");
                }
                self.data.on_search(generation, result);
            }
            Fetched::Health { generation, result } => self.data.on_health(generation, result),
            Fetched::Tables { generation, result } => self.data.on_tables(generation, result),
            Fetched::Updated {
                screen,
                row_key,
                result,
            } => {
                let outcome = match screen {
                    Screen::Data => self.data.on_updated(&row_key, result),
                    Screen::Favorites => self.favorites.on_updated(&row_key, result),
                };
                match outcome {
                    Ok(requests) => {
                        self.set_status_message(format!("Updated row {row_key}"));
                        self.queue(requests);
                    }
                    Err(e) => {
                        warn!("Update of row {row_key} failed: {e}");
                        self.show_popup(format!("Update failed: {e}"));
                    }
                }
            }
            Fetched::Probed { base_url, result } => {
                let requests = self.data.on_probed(&base_url, result);
                self.set_status_message(self.data.test_message().to_string());
                self.queue(requests);
            }
        }
    }
}
