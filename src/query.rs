//! Keyed query slots and the dispatcher that runs their requests.
//!
//! Screens keep one [`QueryState`] per query they show. Syncing a slot with
//! the current variables decides whether a fetch is needed; the resulting
//! [`Request`] is executed on the tokio runtime and its outcome comes back to
//! the UI thread as a [`Message::Fetched`].

use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};

use crate::api::{
    ApiClient, ApiError, ConnectionReport, HealthResponse, RowsQuery, RowsResponse, SearchQuery,
    SearchResponse, TablesResponse, UpdateResponse, UpdateRow,
};
use crate::domain::{Message, Screen};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Idle,
    Pending,
    Ready,
    Failed,
}

#[derive(Debug)]
pub struct QueryState<T> {
    key: Option<String>,
    enabled: bool,
    generation: u64,
    status: FetchStatus,
    data: Option<T>,
    error: Option<String>,
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            key: None,
            enabled: false,
            generation: 0,
            status: FetchStatus::Idle,
            data: None,
            error: None,
        }
    }
}

impl<T> QueryState<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Brings the slot in line with `key`. Returns the generation of a fetch to
    /// start, if any. A disabled slot never fetches and keeps its last data.
    pub fn sync(&mut self, key: String, enabled: bool) -> Option<u64> {
        let was_enabled = std::mem::replace(&mut self.enabled, enabled);
        if !enabled {
            return None;
        }
        let key_changed = self.key.as_deref() != Some(key.as_str());
        if key_changed {
            self.key = Some(key);
            self.data = None;
            self.error = None;
            return Some(self.begin());
        }
        if !was_enabled {
            return Some(self.begin());
        }
        None
    }

    pub fn refetch(&mut self) -> Option<u64> {
        if self.enabled && self.key.is_some() {
            Some(self.begin())
        } else {
            None
        }
    }

    /// Stores the outcome of fetch `generation`. Returns false for superseded fetches.
    pub fn resolve(&mut self, generation: u64, result: Result<T, ApiError>) -> bool {
        if generation != self.generation {
            trace!("Dropping stale result {generation} (current {})", self.generation);
            return false;
        }
        match result {
            Ok(data) => {
                self.data = Some(data);
                self.error = None;
                self.status = FetchStatus::Ready;
            }
            Err(error) => {
                debug!("Query {:?} failed: {error}", self.key);
                self.error = Some(error.to_string());
                self.status = FetchStatus::Failed;
            }
        }
        true
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn status(&self) -> FetchStatus {
        self.status
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Waiting for the first data of the current key.
    pub fn is_loading(&self) -> bool {
        self.status == FetchStatus::Pending && self.data.is_none()
    }

    fn begin(&mut self) -> u64 {
        self.generation += 1;
        self.status = FetchStatus::Pending;
        self.generation
    }
}

/// Work the model asks the dispatcher to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Rows {
        screen: Screen,
        generation: u64,
        query: RowsQuery,
    },
    Search {
        generation: u64,
        query: SearchQuery,
    },
    Health {
        generation: u64,
    },
    Tables {
        generation: u64,
    },
    UpdateRow {
        screen: Screen,
        row_key: String,
        update: UpdateRow,
    },
    Probe {
        base_url: String,
    },
}

/// Outcome of a [`Request`], delivered back to the model.
#[derive(Debug)]
pub enum Fetched {
    Rows {
        screen: Screen,
        generation: u64,
        result: Result<RowsResponse, ApiError>,
    },
    Search {
        generation: u64,
        result: Result<SearchResponse, ApiError>,
    },
    Health {
        generation: u64,
        result: Result<HealthResponse, ApiError>,
    },
    Tables {
        generation: u64,
        result: Result<TablesResponse, ApiError>,
    },
    Updated {
        screen: Screen,
        row_key: String,
        result: Result<UpdateResponse, ApiError>,
    },
    Probed {
        base_url: String,
        result: Result<ConnectionReport, ApiError>,
    },
}

pub struct Dispatcher {
    runtime: Handle,
    api: ApiClient,
    outbox: UnboundedSender<Message>,
}

impl Dispatcher {
    pub fn new(runtime: Handle, api: ApiClient, outbox: UnboundedSender<Message>) -> Self {
        Self { runtime, api, outbox }
    }

    pub fn dispatch(&self, request: Request) {
        trace!("Dispatching {request:?}");
        let api = self.api.clone();
        let outbox = self.outbox.clone();
        self.runtime.spawn(async move {
            let fetched = execute(&api, request).await;
            if outbox.send(Message::Fetched(fetched)).is_err() {
                debug!("Result arrived after the ui shut down");
            }
        });
    }
}

pub async fn execute(api: &ApiClient, request: Request) -> Fetched {
    match request {
        Request::Rows {
            screen,
            generation,
            query,
        } => Fetched::Rows {
            screen,
            generation,
            result: api.rows(&query).await,
        },
        Request::Search { generation, query } => Fetched::Search {
            generation,
            result: api.search(&query).await,
        },
        Request::Health { generation } => Fetched::Health {
            generation,
            result: api.health().await,
        },
        Request::Tables { generation } => Fetched::Tables {
            generation,
            result: api.tables().await,
        },
        Request::UpdateRow {
            screen,
            row_key,
            update,
        } => Fetched::Updated {
            screen,
            row_key,
            result: api.update_row(&update).await,
        },
        Request::Probe { base_url } => {
            let result = api.probe(&base_url).await;
            Fetched::Probed { base_url, result }
        }
    }
}
