//! Favoritte screen: the rows of one page whose `meet` is set.

use crate::api::{ApiError, QueryVariables, RowsQuery, RowsResponse};
use crate::card::MISSING_ID;
use crate::domain::Screen;
use crate::query::{FetchStatus, QueryState, Request};
use crate::row::Row;
use crate::screens::{CardList, RowScreen};

#[derive(Debug)]
pub struct FavoritesScreen {
    page_size: u32,
    rows: QueryState<RowsResponse>,
    list: CardList,
}

impl FavoritesScreen {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            rows: QueryState::new(),
            list: CardList::new(false),
        }
    }

    pub fn sync(&mut self) -> Vec<Request> {
        let query = RowsQuery::page(self.page_size);
        self.rows
            .sync(query.cache_key(), true)
            .map(|generation| Request::Rows {
                screen: Screen::Favorites,
                generation,
                query,
            })
            .into_iter()
            .collect()
    }

    pub fn on_rows(&mut self, generation: u64, result: Result<RowsResponse, ApiError>) {
        if self.rows.resolve(generation, result) {
            let favorites: Vec<Row> = self
                .rows
                .data()
                .map(|data| data.rows.iter().filter(|row| row.is_favorite()).cloned().collect())
                .unwrap_or_default();
            self.list.replace(favorites);
        }
    }

    /// `Table: <table> | Count: <n>`
    pub fn header(&self) -> String {
        let table = self.active_table().unwrap_or_else(|| MISSING_ID.to_string());
        format!("Table: {table} | Count: {}", self.list.len())
    }
}

impl RowScreen for FavoritesScreen {
    fn screen(&self) -> Screen {
        Screen::Favorites
    }

    fn list(&self) -> &CardList {
        &self.list
    }

    fn list_mut(&mut self) -> &mut CardList {
        &mut self.list
    }

    fn active_table(&self) -> Option<String> {
        self.rows.data().map(|data| data.table.clone())
    }

    fn is_loading(&self) -> bool {
        self.rows.is_loading()
    }

    fn fetch_status(&self) -> FetchStatus {
        self.rows.status()
    }

    fn fetch_error(&self) -> Option<&str> {
        self.rows.error()
    }

    fn refetch_active(&mut self) -> Vec<Request> {
        self.rows
            .refetch()
            .map(|generation| Request::Rows {
                screen: Screen::Favorites,
                generation,
                query: RowsQuery::page(self.page_size),
            })
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, UpdateResponse};

    fn page() -> RowsResponse {
        RowsResponse {
            table: "lexicon".to_string(),
            limit: 200,
            offset: 0,
            rows: vec![
                Row::new().with("id", 1).with("Lemma", "cat").with("meet", "favorite"),
                Row::new().with("id", 2).with("Lemma", "dog").with("meet", "  "),
                Row::new().with("id", 3).with("Lemma", "owl"),
                Row::new().with("id", 4).with("Lemma", "elk").with("meet", "seen in a book"),
            ],
        }
    }

    fn loaded() -> (FavoritesScreen, u64) {
        let mut screen = FavoritesScreen::new(200);
        let generation = match screen.sync().as_slice() {
            [Request::Rows { generation, query, .. }] => {
                assert_eq!(query.limit, Some(200));
                *generation
            }
            other => panic!("unexpected {other:?}"),
        };
        screen.on_rows(generation, Ok(page()));
        (screen, generation)
    }

    #[test]
    fn header_before_data() {
        let mut screen = FavoritesScreen::new(200);
        screen.sync();
        assert_eq!(screen.header(), "Table: — | Count: 0");
        assert_eq!(screen.empty_text(), "Loading...");
    }

    #[test]
    fn only_rows_with_meet_are_listed() {
        let (screen, _) = loaded();
        let lemmas: Vec<String> = screen.list().cards().iter().map(|card| card.headline()).collect();
        assert_eq!(lemmas, vec!["cat", "elk"]);
        assert_eq!(screen.header(), "Table: lexicon | Count: 2");
        assert!(screen.list().cards().iter().all(|card| !card.is_editable()));
    }

    #[test]
    fn unfavoriting_refetches_the_page() {
        let (mut screen, generation) = loaded();
        let request = screen.toggle_selected().unwrap();
        let Request::UpdateRow { screen: target, row_key, update } = request else {
            panic!("expected an update");
        };
        assert_eq!(target, Screen::Favorites);
        assert_eq!(update.data.meet(), "");

        let requests = screen
            .on_updated(&row_key, Ok(UpdateResponse { table: "lexicon".to_string(), updated: 1 }))
            .unwrap();
        assert!(matches!(
            requests.as_slice(),
            [Request::Rows { generation: next, .. }] if *next == generation + 1
        ));
    }

    #[test]
    fn results_title_reflects_refetch_and_failure() {
        let (mut screen, _) = loaded();
        assert_eq!(screen.results_title(), " Results ");

        let generation = match screen.refetch_active().as_slice() {
            [Request::Rows { generation, .. }] => *generation,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(screen.results_title(), " Results (refreshing) ");

        screen.on_rows(
            generation,
            Err(ApiError::Status {
                url: "http://localhost:5035/rows".to_string(),
                status: reqwest::StatusCode::BAD_GATEWAY,
                body: String::new(),
            }),
        );
        assert!(screen.results_title().starts_with(" Results (failed: HTTP 502"));
        assert_eq!(screen.list().len(), 2);
    }
}
