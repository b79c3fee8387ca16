//! Data screen: connection settings, search and the editable result list.

use tracing::{info, trace, warn};

use crate::api::{
    ApiError, ConnectionReport, HealthResponse, QueryVariables, RowsQuery, RowsResponse,
    SearchQuery, SearchResponse, TablesResponse,
};
use crate::card::MISSING_ID;
use crate::client::{BaseUrlConfig, compose_base_url, extract_host, extract_port};
use crate::domain::{DEFAULT_HOST, DEFAULT_PORT, Screen};
use crate::query::{FetchStatus, QueryState, Request};
use crate::screens::{CardList, RowScreen};

const TESTING: &str = "Testing...";

#[derive(Debug)]
pub struct DataScreen {
    host: String,
    port: String,
    query: String,
    testing: bool,
    test_message: String,
    page_size: u32,
    rows: QueryState<RowsResponse>,
    search: QueryState<SearchResponse>,
    health: QueryState<HealthResponse>,
    tables: QueryState<TablesResponse>,
    list: CardList,
}

impl DataScreen {
    /// Seeds host and port from `base_url`, falling back to the default service.
    pub fn new(base_url: &str, page_size: u32) -> Self {
        Self {
            host: extract_host(base_url).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: extract_port(base_url).unwrap_or_else(|| DEFAULT_PORT.to_string()),
            query: String::new(),
            testing: false,
            test_message: String::new(),
            page_size,
            rows: QueryState::new(),
            search: QueryState::new(),
            health: QueryState::new(),
            tables: QueryState::new(),
            list: CardList::new(true),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn base_url(&self) -> String {
        compose_base_url(&self.host, &self.port)
    }

    pub fn is_testing(&self) -> bool {
        self.testing
    }

    pub fn test_message(&self) -> &str {
        &self.test_message
    }

    pub fn is_searching(&self) -> bool {
        !self.query.trim().is_empty()
    }

    pub fn set_host(&mut self, host: impl Into<String>) {
        self.host = host.into();
    }

    pub fn set_port(&mut self, port: impl Into<String>) {
        self.port = port.into();
    }

    pub fn set_query(&mut self, query: impl Into<String>) -> Vec<Request> {
        self.query = query.into();
        trace!("Search query now {:?}", self.query);
        self.sync()
    }

    /// Enables exactly one of the rows and search slots and returns the fetches to start.
    pub fn sync(&mut self) -> Vec<Request> {
        let searching = self.is_searching();
        let rows_query = RowsQuery::page(self.page_size);
        let search_query = SearchQuery::new(self.query.clone());

        let mut requests = Vec::new();
        if let Some(generation) = self.rows.sync(rows_query.cache_key(), !searching) {
            requests.push(Request::Rows {
                screen: Screen::Data,
                generation,
                query: rows_query,
            });
        }
        if let Some(generation) = self.search.sync(search_query.cache_key(), searching) {
            requests.push(Request::Search {
                generation,
                query: search_query,
            });
        }
        self.rebuild();
        requests
    }

    /// (Re)loads the health and table list shown in the service line.
    pub fn refresh_service(&mut self) -> Vec<Request> {
        let mut requests = Vec::new();
        if let Some(generation) = self
            .health
            .sync("health".to_string(), true)
            .or_else(|| self.health.refetch())
        {
            requests.push(Request::Health { generation });
        }
        if let Some(generation) = self
            .tables
            .sync("tables".to_string(), true)
            .or_else(|| self.tables.refetch())
        {
            requests.push(Request::Tables { generation });
        }
        requests
    }

    /// Persists the composed base url and probes it. Ignored while a test runs.
    pub fn save_and_test(&mut self, config: &BaseUrlConfig) -> Vec<Request> {
        if self.testing {
            return Vec::new();
        }
        let base_url = self.base_url();
        let confirmation = config.set_api_base_url(&base_url);
        if !confirmation.persisted {
            warn!("Base url {base_url} only applies to this session");
        }
        self.testing = true;
        self.test_message = TESTING.to_string();
        vec![Request::Probe { base_url }]
    }

    pub fn on_probed(&mut self, base_url: &str, result: Result<ConnectionReport, ApiError>) -> Vec<Request> {
        self.testing = false;
        match result {
            Ok(report) => {
                let table = report.table.as_deref().unwrap_or(MISSING_ID);
                self.test_message = format!("Connected: table={table}, rows={}", report.rows);
                info!("Connection test of {base_url} succeeded");
                let mut requests = self.refresh_service();
                requests.extend(self.refetch_active());
                requests
            }
            Err(error) => {
                self.test_message = format!("Connection failed: {}", connection_failure(&error));
                warn!("Connection test of {base_url} failed: {error}");
                Vec::new()
            }
        }
    }

    pub fn on_rows(&mut self, generation: u64, result: Result<RowsResponse, ApiError>) {
        if self.rows.resolve(generation, result) {
            self.rebuild();
        }
    }

    pub fn on_search(&mut self, generation: u64, result: Result<SearchResponse, ApiError>) {
        if self.search.resolve(generation, result) {
            self.rebuild();
        }
    }

    pub fn on_health(&mut self, generation: u64, result: Result<HealthResponse, ApiError>) {
        self.health.resolve(generation, result);
    }

    pub fn on_tables(&mut self, generation: u64, result: Result<TablesResponse, ApiError>) {
        self.tables.resolve(generation, result);
    }

    /// One line summary of the service health and its tables.
    pub fn service_line(&self) -> String {
        let health = match (self.health.data(), self.health.error()) {
            (Some(health), _) => match &health.db {
                Some(db) => format!("{} ({db})", health.status),
                None => health.status.clone(),
            },
            (None, Some(_)) => "unreachable".to_string(),
            (None, None) => "?".to_string(),
        };
        let tables = self
            .tables
            .data()
            .map(|tables| tables.tables.join(", "))
            .unwrap_or_else(|| MISSING_ID.to_string());
        format!("Service: {health} | Tables: {tables}")
    }

    fn rebuild(&mut self) {
        let rows = if self.is_searching() {
            self.search.data().map(|data| data.rows.clone())
        } else {
            self.rows.data().map(|data| data.rows.clone())
        };
        self.list.replace(rows.unwrap_or_default());
    }
}

/// The probe reports bad statuses as `HTTP <code>`.
fn connection_failure(error: &ApiError) -> String {
    match error.status() {
        Some(status) => format!("HTTP {}", status.as_u16()),
        None => error.to_string(),
    }
}

impl RowScreen for DataScreen {
    fn screen(&self) -> Screen {
        Screen::Data
    }

    fn list(&self) -> &CardList {
        &self.list
    }

    fn list_mut(&mut self) -> &mut CardList {
        &mut self.list
    }

    fn active_table(&self) -> Option<String> {
        if self.is_searching() {
            self.search.data().map(|data| data.table.clone())
        } else {
            self.rows.data().map(|data| data.table.clone())
        }
    }

    fn is_loading(&self) -> bool {
        if self.is_searching() {
            self.search.is_loading()
        } else {
            self.rows.is_loading()
        }
    }

    fn fetch_status(&self) -> FetchStatus {
        if self.search.is_enabled() {
            self.search.status()
        } else {
            self.rows.status()
        }
    }

    fn fetch_error(&self) -> Option<&str> {
        if self.search.is_enabled() {
            self.search.error()
        } else {
            self.rows.error()
        }
    }

    fn refetch_active(&mut self) -> Vec<Request> {
        if self.is_searching() {
            self.search
                .refetch()
                .map(|generation| Request::Search {
                    generation,
                    query: SearchQuery::new(self.query.clone()),
                })
                .into_iter()
                .collect()
        } else {
            self.rows
                .refetch()
                .map(|generation| Request::Rows {
                    screen: Screen::Data,
                    generation,
                    query: RowsQuery::page(self.page_size),
                })
                .into_iter()
                .collect()
        }
    }
}
