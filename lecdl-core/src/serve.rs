use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tempfile::TempDir;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("failed to create served directory: {0}")]
    TempDir(#[source] std::io::Error),
    #[error("failed to bind loopback listener: {0}")]
    Bind(#[source] std::io::Error),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("invalid local url: {0}")]
    Url(#[from] url::ParseError),
}

pub type ServeResult<T> = Result<T, ServeError>;

/// Loopback file server backing the remux tool's inputs.
///
/// The external tool only attaches its auth cookie to HTTP inputs, so
/// rewritten playlists and descrambled keys are staged as files in one
/// temporary directory and served from `http://localhost:<port>/`. The
/// directory and everything published into it disappear when the server is
/// dropped, on success and failure alike. One instance is shared by every
/// concurrently running download pipeline; uuid file names keep concurrent
/// publishes collision-free.
pub struct ContentServer {
    dir: TempDir,
    port: u16,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ContentServer {
    /// Bind `127.0.0.1:port` (0 for an ephemeral port) and start serving.
    pub async fn start(port: u16) -> ServeResult<Self> {
        let dir = tempfile::tempdir().map_err(ServeError::TempDir)?;
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(ServeError::Bind)?;
        let port = listener.local_addr().map_err(ServeError::Bind)?.port();

        let root = Arc::new(dir.path().to_path_buf());
        let app = Router::new()
            .fallback(get(serve_entry))
            .with_state(root);

        let (shutdown, signal) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = signal.await;
            });
            if let Err(error) = server.await {
                debug!(%error, "content server stopped");
            }
        });

        Ok(Self {
            dir,
            port,
            shutdown: Some(shutdown),
            task: Some(task),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The served directory, valid for the lifetime of the server.
    pub fn directory(&self) -> &Path {
        self.dir.path()
    }

    /// Persist `content` under a fresh unique name and return the URL it is
    /// served at.
    pub async fn publish(&self, content: &[u8], suffix: &str) -> ServeResult<String> {
        let name = format!("{}{}", Uuid::new_v4().simple(), suffix);
        let path = self.dir.path().join(&name);
        tokio::fs::write(&path, content)
            .await
            .map_err(|source| ServeError::Io {
                source,
                path: path.clone(),
            })?;
        let url = Url::parse(&format!("http://localhost:{}/", self.port))?.join(&name)?;
        Ok(url.to_string())
    }

    /// Stop accepting requests and wait for the serve task to finish. The
    /// served directory is removed when the value drops.
    pub async fn shutdown(mut self) {
        if let Some(trigger) = self.shutdown.take() {
            let _ = trigger.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ContentServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// Request handling stays silent so the remux tool's progress output is the
// only thing on the console; misses are debug-level at most.
async fn serve_entry(State(root): State<Arc<PathBuf>>, uri: Uri) -> Response {
    let name = uri.path().trim_start_matches('/');
    if name.is_empty() || name.contains('/') || name.contains("..") {
        return StatusCode::NOT_FOUND.into_response();
    }
    match tokio::fs::read(root.join(name)).await {
        Ok(bytes) => {
            let content_type = if name.ends_with(".m3u8") {
                "application/vnd.apple.mpegurl"
            } else {
                "application/octet-stream"
            };
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Err(error) => {
            debug!(file = name, %error, "content request missed");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}
