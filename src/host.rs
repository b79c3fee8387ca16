//! Loopback static file host for the pre-built web bundle.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::domain::{ErrorKind, WSError};

pub const DEFAULT_STATIC_PORT: u16 = 5173;
pub const DEFAULT_DIST_DIR: &str = "dist";
const NOT_FOUND: &str = "Not found";

#[derive(Debug, Clone)]
pub struct StaticHost {
    dist: PathBuf,
    debug: bool,
}

impl StaticHost {
    pub fn new(dist: impl Into<PathBuf>, debug: bool) -> Self {
        Self {
            dist: dist.into(),
            debug,
        }
    }

    /// File under the bundle directory a request path maps to.
    /// Paths escaping the directory map to nothing.
    pub fn resolve(&self, request_path: &str) -> Option<PathBuf> {
        let decoded = urlencoding::decode(request_path).ok()?;
        let relative = match &*decoded {
            "/" | "" => "index.html",
            other => other.trim_start_matches('/'),
        };
        let relative = Path::new(relative);
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        contained.then(|| self.dist.join(relative))
    }
}

pub fn content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("html") => "text/html",
        Some("js") => "application/javascript",
        Some("css") => "text/css",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}

pub fn router(host: StaticHost) -> Router {
    Router::new().fallback(serve_file).with_state(Arc::new(host))
}

async fn serve_file(State(host): State<Arc<StaticHost>>, uri: Uri) -> Response {
    let response = match host.resolve(uri.path()) {
        Some(path) => read_file(&path).await,
        None => not_found(),
    };
    if host.debug {
        info!("{} -> {}", uri.path(), response.status());
    }
    response
}

async fn read_file(path: &Path) -> Response {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => {}
        _ => return not_found(),
    }
    match tokio::fs::read(path).await {
        Ok(body) => ([(header::CONTENT_TYPE, content_type(path))], body).into_response(),
        Err(e) => {
            debug!("Cannot read {}: {e}", path.display());
            not_found()
        }
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, NOT_FOUND).into_response()
}

pub async fn bind(port: u16) -> Result<TcpListener, WSError> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    TcpListener::bind(addr)
        .await
        .map_err(|e| WSError::new(ErrorKind::Server(format!("cannot bind {addr}: {e}"))))
}

/// Serves `host` on `listener` until Ctrl-C.
pub async fn run(listener: TcpListener, host: StaticHost) -> Result<(), WSError> {
    let addr = listener.local_addr()?;
    info!("Serving {} at http://{addr}/", host.dist.display());
    axum::serve(listener, router(host))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down static host");
        })
        .await
        .map_err(|e| WSError::new(ErrorKind::Server(e.to_string())))
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use tracing_subscriber::EnvFilter;

    use super::*;

    fn bundle() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>app</html>").unwrap();
        std::fs::create_dir(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("assets").join("app.JS"), "console.log(1)").unwrap();
        std::fs::write(dir.path().join("assets").join("data.bin"), [0u8, 1, 2]).unwrap();
        dir
    }

    async fn start(dir: &Path) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(StaticHost::new(dir, true));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn mime_types_by_extension() {
        assert_eq!(content_type(Path::new("a/index.html")), "text/html");
        assert_eq!(content_type(Path::new("x.jpeg")), "image/jpeg");
        assert_eq!(content_type(Path::new("x.SVG")), "image/svg+xml");
        assert_eq!(content_type(Path::new("favicon.ico")), "image/x-icon");
        assert_eq!(content_type(Path::new("font.woff2")), "application/octet-stream");
        assert_eq!(content_type(Path::new("LICENSE")), "application/octet-stream");
    }

    #[test]
    fn resolve_rejects_parent_components() {
        let host = StaticHost::new("/srv/dist", false);
        assert_eq!(host.resolve("/"), Some(PathBuf::from("/srv/dist/index.html")));
        assert_eq!(host.resolve("/a%20b.css"), Some(PathBuf::from("/srv/dist/a b.css")));
        assert_eq!(host.resolve("/../secret"), None);
        assert_eq!(host.resolve("/assets/%2e%2e/%2e%2e/secret"), None);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    async fn logged_requests(debug: bool) -> String {
        let dir = bundle();
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("info"))
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let host = Arc::new(StaticHost::new(dir.path(), debug));
        serve_file(State(host.clone()), Uri::from_static("/index.html")).await;
        serve_file(State(host), Uri::from_static("/missing.css")).await;
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[tokio::test]
    async fn debug_flag_logs_requests_at_default_level() {
        let logs = logged_requests(true).await;
        assert!(logs.contains("/index.html -> 200 OK"));
        assert!(logs.contains("/missing.css -> 404 Not Found"));

        assert!(!logged_requests(false).await.contains("/index.html"));
    }

    #[tokio::test]
    async fn serves_bundle_files() {
        let dir = bundle();
        let base = start(dir.path()).await;

        let root = reqwest::get(format!("{base}/")).await.unwrap();
        assert_eq!(root.status(), reqwest::StatusCode::OK);
        assert_eq!(root.headers()[reqwest::header::CONTENT_TYPE], "text/html");
        assert_eq!(root.text().await.unwrap(), "<html>app</html>");

        let index = reqwest::get(format!("{base}/index.html")).await.unwrap();
        assert_eq!(index.status(), reqwest::StatusCode::OK);

        let script = reqwest::get(format!("{base}/assets/app.JS")).await.unwrap();
        assert_eq!(script.headers()[reqwest::header::CONTENT_TYPE], "application/javascript");

        let blob = reqwest::get(format!("{base}/assets/data.bin")).await.unwrap();
        assert_eq!(blob.headers()[reqwest::header::CONTENT_TYPE], "application/octet-stream");
        assert_eq!(blob.bytes().await.unwrap().as_ref(), &[0u8, 1, 2]);
    }

    #[tokio::test]
    async fn missing_files_and_directories_are_404() {
        let dir = bundle();
        let base = start(dir.path()).await;

        for path in ["/nope.js", "/assets", "/assets/app.js/extra"] {
            let response = reqwest::get(format!("{base}{path}")).await.unwrap();
            assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND, "{path}");
            assert_eq!(response.text().await.unwrap(), "Not found");
        }
    }
}
