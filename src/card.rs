//! State of a single row card: expansion, favorite toggle and `meet` editor.

use tracing::{debug, trace};

use crate::api::UpdateRow;
use crate::row::{MEET_FIELD, Row, is_favorite_value};

pub const UNTITLED: &str = "Untitled";
pub const MISSING_ID: &str = "—";
pub const FAVORITE_MARKER: &str = "favorite";

/// Lifecycle of the last write issued from a card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditState {
    Idle,
    /// `prior` holds the value to restore on failure for optimistic writes.
    Pending { prior: Option<String> },
    Committed,
    RolledBack { error: String },
}

#[derive(Debug, Clone)]
pub struct RowCard {
    key: String,
    row: Row,
    editable: bool,
    expanded: bool,
    meet: String,
    state: EditState,
}

impl RowCard {
    pub fn new(key: impl Into<String>, row: Row, editable: bool) -> Self {
        let meet = row.meet();
        Self {
            key: key.into(),
            row,
            editable,
            expanded: false,
            meet,
            state: EditState::Idle,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn row(&self) -> &Row {
        &self.row
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    pub fn meet_value(&self) -> &str {
        &self.meet
    }

    pub fn state(&self) -> &EditState {
        &self.state
    }

    pub fn headline(&self) -> String {
        let lemma = self.row.lemma();
        if lemma.is_empty() {
            UNTITLED.to_string()
        } else {
            lemma
        }
    }

    pub fn summary(&self) -> String {
        self.row.summary()
    }

    pub fn definition(&self) -> String {
        self.row.definition()
    }

    pub fn id_label(&self) -> String {
        self.row
            .id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| MISSING_ID.to_string())
    }

    /// Every field of the row as display strings, sorted by key.
    pub fn details(&self) -> Vec<(String, String)> {
        self.row
            .fields()
            .map(|(key, value)| (key.to_string(), value.display()))
            .collect()
    }

    pub fn is_favorite(&self) -> bool {
        is_favorite_value(&self.meet)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, EditState::Pending { .. })
    }

    /// A write needs both a row id and a table to route it to.
    pub fn can_edit(&self, table: Option<&str>) -> bool {
        self.row.id().is_some() && table.is_some_and(|t| !t.is_empty())
    }

    pub fn toggle_enabled(&self, table: Option<&str>) -> bool {
        !self.is_pending() && self.can_edit(table)
    }

    pub fn toggle_expanded(&mut self) {
        self.expanded = !self.expanded;
    }

    pub fn set_meet_input(&mut self, value: impl Into<String>) {
        if self.editable {
            self.meet = value.into();
        }
    }

    pub fn set_favorite_text(&mut self) {
        self.set_meet_input(FAVORITE_MARKER);
    }

    pub fn clear_meet_text(&mut self) {
        self.set_meet_input("");
    }

    /// Switches the favorite flag to `checked`. The local value changes right
    /// away; the returned update has to be sent and its outcome passed to
    /// [`RowCard::resolve`].
    pub fn toggle_favorite(&mut self, checked: bool, table: Option<&str>) -> Option<UpdateRow> {
        if !self.toggle_enabled(table) {
            trace!("Toggle ignored for card {}", self.key);
            return None;
        }
        let value = if checked { FAVORITE_MARKER } else { "" };
        let prior = std::mem::replace(&mut self.meet, value.to_string());
        self.state = EditState::Pending { prior: Some(prior) };
        self.update_for(value, table)
    }

    /// Commits the text currently in the `meet` editor.
    pub fn save_meet(&mut self, table: Option<&str>) -> Option<UpdateRow> {
        if !self.editable || !self.toggle_enabled(table) {
            return None;
        }
        self.state = EditState::Pending { prior: None };
        let value = self.meet.clone();
        self.update_for(&value, table)
    }

    /// Applies the outcome of the pending write. Returns true when it was committed.
    pub fn resolve(&mut self, outcome: Result<(), String>) -> bool {
        let EditState::Pending { prior } = std::mem::replace(&mut self.state, EditState::Idle) else {
            debug!("Card {} got an update outcome without a pending write", self.key);
            return false;
        };
        match outcome {
            Ok(()) => {
                self.state = EditState::Committed;
                true
            }
            Err(error) => {
                if let Some(prior) = prior {
                    self.meet = prior;
                }
                self.state = EditState::RolledBack { error };
                false
            }
        }
    }

    /// Takes a freshly fetched version of the row. The local `meet` follows the
    /// server value only when the server value changed.
    pub fn refresh(&mut self, row: Row) {
        let server_meet = row.meet();
        if server_meet != self.row.meet() && !self.is_pending() {
            self.meet = server_meet;
        }
        self.row = row;
    }

    fn update_for(&self, value: &str, table: Option<&str>) -> Option<UpdateRow> {
        Some(UpdateRow {
            id: self.row.id()?,
            data: Row::new().with(MEET_FIELD, value),
            table: table.map(str::to_string),
            date: None,
        })
    }
}
