//! Typed calls against the wordsearch REST service.

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::client::ApiEndpoint;
use crate::row::{Row, RowId};

#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a response.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP {status} from {url}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },
    #[error("unexpected response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// PUT updates are retried as POST when the method is refused or nothing came back.
    pub fn permits_post_fallback(&self) -> bool {
        match self {
            ApiError::Transport { .. } => true,
            ApiError::Status { status, .. } => *status == StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Decode { .. } => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablesResponse {
    pub tables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowsResponse {
    pub table: String,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowResponse {
    pub table: String,
    #[serde(default)]
    pub row: Option<Row>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub table: String,
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub table: String,
    pub updated: u64,
}

/// Variables of a query; serializes to its query string.
pub trait QueryVariables: Serialize {
    const TAG: &'static str;

    fn cache_key(&self) -> String {
        let variables = serde_json::to_string(self).unwrap_or_default();
        format!("{}:{variables}", Self::TAG)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowsQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl RowsQuery {
    pub fn page(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }
}

impl QueryVariables for RowsQuery {
    const TAG: &'static str = "rows";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowQuery {
    #[serde(skip)]
    pub id: RowId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl QueryVariables for RowQuery {
    const TAG: &'static str = "row";

    fn cache_key(&self) -> String {
        let variables = serde_json::to_string(self).unwrap_or_default();
        format!("{}:{}:{variables}", Self::TAG, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl SearchQuery {
    pub fn new(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            table: None,
            date: None,
        }
    }
}

impl QueryVariables for SearchQuery {
    const TAG: &'static str = "search";
}

/// Partial write of a row. Only `table` and `date` travel in the query string.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateRow {
    #[serde(skip)]
    pub id: RowId,
    #[serde(skip)]
    pub data: Row,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// Result of the raw connection check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionReport {
    pub table: Option<String>,
    pub rows: usize,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    endpoint: ApiEndpoint,
}

impl ApiClient {
    pub fn new(endpoint: ApiEndpoint) -> Self {
        Self {
            http: Client::new(),
            endpoint,
        }
    }

    pub async fn health(&self) -> Result<HealthResponse, ApiError> {
        let url = self.url("health");
        execute(self.http.get(&url), url).await
    }

    pub async fn tables(&self) -> Result<TablesResponse, ApiError> {
        let url = self.url("tables");
        execute(self.http.get(&url), url).await
    }

    pub async fn rows(&self, query: &RowsQuery) -> Result<RowsResponse, ApiError> {
        let url = self.url("rows");
        execute(self.http.get(&url).query(query), url).await
    }

    pub async fn row(&self, query: &RowQuery) -> Result<RowResponse, ApiError> {
        let url = self.url(&format!("rows/{}", query.id.path_segment()));
        execute(self.http.get(&url).query(query), url).await
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, ApiError> {
        let url = self.url("search");
        execute(self.http.get(&url).query(query), url).await
    }

    /// PUT the fields of `update`, falling back to a single POST of the same request.
    pub async fn update_row(&self, update: &UpdateRow) -> Result<UpdateResponse, ApiError> {
        match self.write_row(Method::PUT, update).await {
            Err(error) if error.permits_post_fallback() => {
                debug!("PUT of row {} rejected ({error}), retrying as POST", update.id);
                self.write_row(Method::POST, update).await
            }
            outcome => outcome,
        }
    }

    /// Fetches five rows from `base_url` directly, bypassing the configured endpoint.
    pub async fn probe(&self, base_url: &str) -> Result<ConnectionReport, ApiError> {
        let url = format!("{base_url}rows?limit=5");
        let body: Value = execute(self.http.get(&url), url).await?;
        Ok(ConnectionReport {
            table: body.get("table").and_then(Value::as_str).map(str::to_string),
            rows: body.get("rows").and_then(Value::as_array).map_or(0, Vec::len),
        })
    }

    async fn write_row(&self, method: Method, update: &UpdateRow) -> Result<UpdateResponse, ApiError> {
        let url = self.url(&format!("rows/{}", update.id.path_segment()));
        let request = self
            .http
            .request(method, &url)
            .query(update)
            .json(&update.data);
        execute(request, url).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint.current().trim_end_matches('/'), path)
    }
}

async fn execute<T: DeserializeOwned>(request: RequestBuilder, url: String) -> Result<T, ApiError> {
    debug!("Request {url}");
    let response = request.send().await.map_err(|source| ApiError::Transport {
        url: url.clone(),
        source,
    })?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Status { url, status, body });
    }
    response
        .json::<T>()
        .await
        .map_err(|source| ApiError::Decode { url, source })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode as AxumStatus;
    use axum::response::IntoResponse;
    use axum::routing::{get, put};
    use axum::{Json, Router};
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Seen {
        method: &'static str,
        id: String,
        query: HashMap<String, String>,
        body: Value,
    }

    type Recorder = Arc<Mutex<Vec<Seen>>>;

    async fn spawn_server(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    fn client_for(base_url: &str) -> ApiClient {
        ApiClient::new(ApiEndpoint::new(base_url))
    }

    fn favorite_update() -> UpdateRow {
        UpdateRow {
            id: RowId::from(1),
            data: Row::new().with("meet", "favorite"),
            table: Some("lexicon".to_string()),
            date: Some("2024-05-01".to_string()),
        }
    }

    fn write_router(put_status: AxumStatus, recorder: Recorder) -> Router {
        async fn on_put(
            State((status, recorder)): State<(AxumStatus, Recorder)>,
            Path(id): Path<String>,
            Query(query): Query<HashMap<String, String>>,
            Json(body): Json<Value>,
        ) -> impl IntoResponse {
            recorder.lock().unwrap().push(Seen { method: "PUT", id, query, body });
            if status.is_success() {
                (status, Json(json!({"table": "lexicon", "updated": 1})))
            } else {
                (status, Json(json!({"error": "nope"})))
            }
        }

        async fn on_post(
            State((_, recorder)): State<(AxumStatus, Recorder)>,
            Path(id): Path<String>,
            Query(query): Query<HashMap<String, String>>,
            Json(body): Json<Value>,
        ) -> Json<Value> {
            recorder.lock().unwrap().push(Seen { method: "POST", id, query, body });
            Json(json!({"table": "lexicon", "updated": 1}))
        }

        Router::new()
            .route("/rows/{id}", put(on_put).post(on_post))
            .with_state((put_status, recorder))
    }

    #[tokio::test]
    async fn update_row_uses_put_when_accepted() {
        let recorder = Recorder::default();
        let base = spawn_server(write_router(AxumStatus::OK, recorder.clone())).await;

        let response = client_for(&base).update_row(&favorite_update()).await.unwrap();

        assert_eq!(response, UpdateResponse { table: "lexicon".to_string(), updated: 1 });
        let seen = recorder.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, "PUT");
        assert_eq!(seen[0].body, json!({"meet": "favorite"}));
    }

    #[tokio::test]
    async fn update_row_retries_once_as_post_on_405() {
        let recorder = Recorder::default();
        let base = spawn_server(write_router(AxumStatus::METHOD_NOT_ALLOWED, recorder.clone())).await;

        let response = client_for(&base).update_row(&favorite_update()).await.unwrap();
        assert_eq!(response.updated, 1);

        let seen = recorder.lock().unwrap().clone();
        let methods: Vec<&str> = seen.iter().map(|s| s.method).collect();
        assert_eq!(methods, vec!["PUT", "POST"]);
        assert_eq!(seen[0].id, seen[1].id);
        assert_eq!(seen[0].query, seen[1].query);
        assert_eq!(seen[0].body, seen[1].body);
        assert_eq!(seen[1].id, "1");
        assert_eq!(seen[1].query.get("table").map(String::as_str), Some("lexicon"));
        assert_eq!(seen[1].query.get("date").map(String::as_str), Some("2024-05-01"));
    }

    #[tokio::test]
    async fn update_row_propagates_500_without_fallback() {
        let recorder = Recorder::default();
        let base = spawn_server(write_router(AxumStatus::INTERNAL_SERVER_ERROR, recorder.clone())).await;

        let error = client_for(&base).update_row(&favorite_update()).await.unwrap_err();

        assert_eq!(error.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        let methods: Vec<&str> = recorder.lock().unwrap().iter().map(|s| s.method).collect();
        assert_eq!(methods, vec!["PUT"]);
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut raw = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&raw).to_string();
            if let Some(head_end) = text.find("\r\n\r\n") {
                let length = text[..head_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if raw.len() >= head_end + 4 + length {
                    return text;
                }
            }
        }
        String::from_utf8_lossy(&raw).to_string()
    }

    #[tokio::test]
    async fn update_row_retries_as_post_when_no_response_arrives() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut requests = Vec::new();
            // The PUT is read and the connection dropped without an answer.
            let (mut socket, _) = listener.accept().await.unwrap();
            requests.push(read_request(&mut socket).await);
            drop(socket);

            let (mut socket, _) = listener.accept().await.unwrap();
            requests.push(read_request(&mut socket).await);
            let body = r#"{"table":"lexicon","updated":1}"#;
            let reply = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            requests
        });

        let response = client_for(&format!("http://{addr}/"))
            .update_row(&favorite_update())
            .await
            .unwrap();
        assert_eq!(response.updated, 1);

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("PUT /rows/1?table=lexicon&date=2024-05-01"));
        assert!(requests[1].starts_with("POST /rows/1?table=lexicon&date=2024-05-01"));
        assert!(requests[1].ends_with(r#"{"meet":"favorite"}"#));
    }

    #[tokio::test]
    async fn unreachable_service_reports_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let error = client_for(&format!("http://{addr}/")).health().await.unwrap_err();
        assert!(matches!(error, ApiError::Transport { .. }));
        assert!(error.permits_post_fallback());
    }

    #[tokio::test]
    async fn reads_omit_absent_parameters() {
        async fn echo(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
            Json(json!({
                "table": "lexicon",
                "limit": 50,
                "offset": 0,
                "rows": [{"id": 1, "Lemma": "cat", "meet": "", "query": query}],
            }))
        }
        async fn search(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
            Json(json!({"table": "lexicon", "q": query.get("q"), "rows": []}))
        }
        async fn single(Path(id): Path<String>) -> Json<Value> {
            Json(json!({"table": "lexicon", "row": {"id": id}}))
        }
        let app = Router::new()
            .route("/rows", get(echo))
            .route("/rows/{id}", get(single))
            .route("/search", get(search))
            .route("/health", get(|| async { Json(json!({"status": "ok", "port": 5035})) }))
            .route("/tables", get(|| async { Json(json!({"tables": ["lexicon", "notes"]})) }));
        let client = client_for(&spawn_server(app).await);

        let rows = client.rows(&RowsQuery::page(50)).await.unwrap();
        assert_eq!(rows.table, "lexicon");
        assert_eq!(rows.rows[0].lemma(), "cat");
        assert_eq!(rows.rows[0].get("query").display(), r#"{"limit":"50"}"#);

        let found = client.search(&SearchQuery::new("cat")).await.unwrap();
        assert_eq!(found.q, "cat");

        let single = client
            .row(&RowQuery { id: RowId::from("w 1"), table: None, date: None })
            .await
            .unwrap();
        assert_eq!(single.row.unwrap().id(), Some(RowId::from("w 1")));

        let health = client.health().await.unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.port, Some(5035));
        assert_eq!(client.tables().await.unwrap().tables, vec!["lexicon", "notes"]);
    }

    #[tokio::test]
    async fn probe_reports_table_and_row_count() {
        async fn rows(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
            assert_eq!(query.get("limit").map(String::as_str), Some("5"));
            Json(json!({"table": "lexicon", "rows": [{"id": 1}, {"id": 2}]}))
        }
        let base = spawn_server(Router::new().route("/rows", get(rows))).await;
        // The configured endpoint is deliberately wrong; probe uses the url it is given.
        let client = client_for("http://127.0.0.1:9/");

        let report = client.probe(&base).await.unwrap();
        assert_eq!(report, ConnectionReport { table: Some("lexicon".to_string()), rows: 2 });
    }

    #[test]
    fn cache_keys_distinguish_variables() {
        assert_eq!(RowsQuery::page(50).cache_key(), r#"rows:{"limit":50}"#);
        assert_ne!(SearchQuery::new("cat").cache_key(), SearchQuery::new("ca").cache_key());
        let row = RowQuery { id: RowId::from(3), table: None, date: None };
        assert_eq!(row.cache_key(), "row:3:{}");
    }
}
