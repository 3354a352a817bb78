#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::Router;
use axum::routing::{any, post};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

async fn bind(test: &str) -> Option<TcpListener> {
    match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => Some(listener),
        Err(err) => {
            eprintln!("skipping {test}: {err}");
            None
        }
    }
}

fn serve(listener: TcpListener, app: Router) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app.into_make_service()).await {
            eprintln!("mock chat server error: {err}");
        }
    })
}

/// Returns an address nothing listens on.
pub async fn closed_addr() -> Option<SocketAddr> {
    let listener = bind("closed_addr").await?;
    listener.local_addr().ok()
}

/// Accepts TCP connections and never answers the WebSocket upgrade.
pub struct StalledListener {
    pub addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl StalledListener {
    pub async fn start(test: &str) -> Option<Self> {
        let listener = bind(test).await?;
        let addr = listener.local_addr().ok()?;
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                held.push(stream);
            }
        });
        Some(Self {
            addr,
            accepted,
            handle,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("ws://{}/chat", self.addr)
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

impl Drop for StalledListener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

#[derive(Clone)]
struct CompletionState {
    status: StatusCode,
    body: String,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// Chat-completions endpoint at `/chat` answering every POST the same way.
pub struct MockCompletionServer {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: JoinHandle<()>,
}

impl MockCompletionServer {
    pub async fn start(test: &str, status: StatusCode, body: &str) -> Option<Self> {
        let listener = bind(test).await?;
        let addr = listener.local_addr().ok()?;
        let hits = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = CompletionState {
            status,
            body: body.to_string(),
            hits: hits.clone(),
            requests: requests.clone(),
        };
        let app = Router::new()
            .route("/chat", post(completion_handler))
            .with_state(state);
        Some(Self {
            addr,
            hits,
            requests,
            handle: serve(listener, app),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}/chat", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for MockCompletionServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn completion_handler(
    State(state): State<CompletionState>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let body_json = serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
    state.requests.lock().unwrap().push(RecordedRequest {
        headers,
        body: body_json,
    });
    (
        state.status,
        [(header::CONTENT_TYPE, "application/json")],
        state.body.clone(),
    )
}

/// What the mock socket does after receiving one text frame.
#[derive(Clone, Debug)]
pub enum Reply {
    Text(String),
    Delay(Duration),
    Close,
}

pub fn envelope(text: &str) -> Reply {
    Reply::Text(serde_json::json!({ "response": text }).to_string())
}

pub type Script = Arc<dyn Fn(&str) -> Vec<Reply> + Send + Sync>;

#[derive(Clone)]
struct SocketState {
    script: Script,
    connects: Arc<AtomicUsize>,
    paths: Arc<Mutex<Vec<(Option<String>, String)>>>,
    frames: Arc<Mutex<Vec<String>>>,
}

/// WebSocket chat endpoint at `/chat/{key}/{id}/` (and `/chat/{id}/`).
pub struct MockSocketServer {
    pub addr: SocketAddr,
    connects: Arc<AtomicUsize>,
    paths: Arc<Mutex<Vec<(Option<String>, String)>>>,
    frames: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl MockSocketServer {
    pub async fn start<F>(test: &str, script: F) -> Option<Self>
    where
        F: Fn(&str) -> Vec<Reply> + Send + Sync + 'static,
    {
        let listener = bind(test).await?;
        let addr = listener.local_addr().ok()?;
        let state = SocketState {
            script: Arc::new(script),
            connects: Arc::new(AtomicUsize::new(0)),
            paths: Arc::new(Mutex::new(Vec::new())),
            frames: Arc::new(Mutex::new(Vec::new())),
        };
        let connects = state.connects.clone();
        let paths = state.paths.clone();
        let frames = state.frames.clone();
        let app = Router::new()
            .route("/chat/{key}/{id}/", any(keyed_socket_handler))
            .route("/chat/{id}/", any(anonymous_socket_handler))
            .with_state(state);
        Some(Self {
            addr,
            connects,
            paths,
            frames,
            handle: serve(listener, app),
        })
    }

    /// Replies `{"response": "echo:<frame>"}` to every frame.
    pub async fn echo(test: &str) -> Option<Self> {
        Self::start(test, |frame| vec![envelope(&format!("echo:{frame}"))]).await
    }

    pub fn endpoint(&self) -> String {
        format!("ws://{}/chat", self.addr)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn paths(&self) -> Vec<(Option<String>, String)> {
        self.paths.lock().unwrap().clone()
    }

    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }
}

impl Drop for MockSocketServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn keyed_socket_handler(
    State(state): State<SocketState>,
    Path((key, id)): Path<(String, String)>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    accept(state, Some(key), id, ws)
}

async fn anonymous_socket_handler(
    State(state): State<SocketState>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    accept(state, None, id, ws)
}

fn accept(
    state: SocketState,
    key: Option<String>,
    id: String,
    ws: WebSocketUpgrade,
) -> axum::response::Response {
    state.connects.fetch_add(1, Ordering::SeqCst);
    state.paths.lock().unwrap().push((key, id));
    ws.on_upgrade(move |socket| run_script(socket, state))
}

async fn run_script(mut socket: WebSocket, state: SocketState) {
    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        state.frames.lock().unwrap().push(text.as_str().to_string());
        let replies = (state.script)(text.as_str());
        for reply in replies {
            match reply {
                Reply::Text(payload) => {
                    if socket.send(Message::Text(payload.into())).await.is_err() {
                        return;
                    }
                }
                Reply::Delay(delay) => tokio::time::sleep(delay).await,
                Reply::Close => {
                    let _ = socket.send(Message::Close(None)).await;
                    return;
                }
            }
        }
    }
}
