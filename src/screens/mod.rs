//! Screen state shared by the Data and Favoritte screens.

pub mod data;
pub mod favorites;

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::api::{ApiError, UpdateResponse};
use crate::card::RowCard;
use crate::domain::Screen;
use crate::query::{FetchStatus, Request};
use crate::row::Row;

pub use data::DataScreen;
pub use favorites::FavoritesScreen;

pub const NO_DATA: &str = "No data";
pub const LOADING: &str = "Loading...";

/// Cards of the visible result list plus the selection.
#[derive(Debug)]
pub struct CardList {
    cards: Vec<RowCard>,
    selected: usize,
    editable: bool,
}

impl CardList {
    pub fn new(editable: bool) -> Self {
        Self {
            cards: Vec::new(),
            selected: 0,
            editable,
        }
    }

    /// Replaces the listed rows. Cards whose key is still present keep their
    /// expansion and edit state.
    pub fn replace(&mut self, rows: Vec<Row>) {
        let mut previous: HashMap<String, RowCard> = self
            .cards
            .drain(..)
            .map(|card| (card.key().to_string(), card))
            .collect();
        self.cards = rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| {
                let key = row.list_key(index);
                match previous.remove(&key) {
                    Some(mut card) => {
                        card.refresh(row);
                        card
                    }
                    None => RowCard::new(key, row, self.editable),
                }
            })
            .collect();
        self.selected = self.selected.min(self.cards.len().saturating_sub(1));
        trace!("List now holds {} cards", self.cards.len());
    }

    pub fn cards(&self) -> &[RowCard] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected(&self) -> Option<&RowCard> {
        self.cards.get(self.selected)
    }

    pub fn selected_mut(&mut self) -> Option<&mut RowCard> {
        self.cards.get_mut(self.selected)
    }

    pub fn find_mut(&mut self, key: &str) -> Option<&mut RowCard> {
        self.cards.iter_mut().find(|card| card.key() == key)
    }

    pub fn move_up(&mut self, size: usize) {
        self.selected = self.selected.saturating_sub(size);
    }

    pub fn move_down(&mut self, size: usize) {
        if !self.cards.is_empty() {
            self.selected = (self.selected + size).min(self.cards.len() - 1);
        }
    }

    pub fn move_beginning(&mut self) {
        self.selected = 0;
    }

    pub fn move_end(&mut self) {
        self.selected = self.cards.len().saturating_sub(1);
    }
}

/// Behavior common to the screens listing row cards.
pub trait RowScreen {
    fn screen(&self) -> Screen;

    fn list(&self) -> &CardList;

    fn list_mut(&mut self) -> &mut CardList;

    /// Table of the last successful response of the active query.
    fn active_table(&self) -> Option<String>;

    /// The active query is waiting for its first data.
    fn is_loading(&self) -> bool;

    fn fetch_status(&self) -> FetchStatus;

    fn fetch_error(&self) -> Option<&str>;

    /// Refetch of the active query.
    fn refetch_active(&mut self) -> Vec<Request>;

    /// Placeholder shown when the list is empty.
    fn empty_text(&self) -> &'static str {
        if self.is_loading() { LOADING } else { NO_DATA }
    }

    fn results_title(&self) -> String {
        match (self.fetch_status(), self.fetch_error()) {
            (FetchStatus::Pending, _) if !self.list().is_empty() => {
                " Results (refreshing) ".to_string()
            }
            (FetchStatus::Failed, Some(error)) => format!(" Results (failed: {error}) "),
            _ => " Results ".to_string(),
        }
    }

    fn toggle_selected(&mut self) -> Option<Request> {
        let screen = self.screen();
        let table = self.active_table();
        let card = self.list_mut().selected_mut()?;
        let checked = !card.is_favorite();
        let update = card.toggle_favorite(checked, table.as_deref())?;
        debug!("Toggling favorite of {} to {checked}", card.key());
        Some(Request::UpdateRow {
            screen,
            row_key: card.key().to_string(),
            update,
        })
    }

    fn save_selected(&mut self) -> Option<Request> {
        let screen = self.screen();
        let table = self.active_table();
        let card = self.list_mut().selected_mut()?;
        let update = card.save_meet(table.as_deref())?;
        Some(Request::UpdateRow {
            screen,
            row_key: card.key().to_string(),
            update,
        })
    }

    /// Applies the outcome of an update. A committed update refetches the
    /// active query; a failed one hands back the message to surface.
    fn on_updated(
        &mut self,
        row_key: &str,
        result: Result<UpdateResponse, ApiError>,
    ) -> Result<Vec<Request>, String> {
        let outcome = result.map(|_| ()).map_err(|error| error.to_string());
        match self.list_mut().find_mut(row_key) {
            Some(card) => {
                card.resolve(outcome.clone());
            }
            None => debug!("Card {row_key} left the list before its update finished"),
        }
        outcome.map(|()| self.refetch_active())
    }
}
