//! In-process stand-in for the simulation engine used by tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpListener;

#[derive(Default)]
struct EngineState {
    map: Option<Value>,
    stream_body: String,
    map_hits: AtomicUsize,
    stream_hits: Mutex<Vec<Instant>>,
    commands: Mutex<Vec<(&'static str, Value)>>,
}

/// Fake engine serving `/api/map`, `/api/stream`, `/api/control` and `/api/incident`
pub struct FakeEngine {
    pub url: String,
    state: Arc<EngineState>,
}

#[derive(Default)]
pub struct FakeEngineBuilder {
    map: Option<Value>,
    stream_body: String,
}

impl FakeEngineBuilder {
    /// Serve this document from `/map` (otherwise `/map` answers 500)
    pub fn map(mut self, map: Value) -> Self {
        self.map = Some(map);
        self
    }

    /// Body sent by `/stream` before the connection is closed
    pub fn stream(mut self, body: impl Into<String>) -> Self {
        self.stream_body = body.into();
        self
    }

    pub async fn spawn(self) -> FakeEngine {
        let state = Arc::new(EngineState {
            map: self.map,
            stream_body: self.stream_body,
            ..EngineState::default()
        });

        let api = Router::new()
            .route("/map", get(map_handler))
            .route("/stream", get(stream_handler))
            .route("/control", post(control_handler))
            .route("/incident", post(incident_handler))
            .with_state(state.clone());
        let router = Router::new().nest("/api", api);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        FakeEngine {
            url: format!("http://{}/api", addr),
            state,
        }
    }
}

impl FakeEngine {
    pub fn builder() -> FakeEngineBuilder {
        FakeEngineBuilder::default()
    }

    pub fn map_hits(&self) -> usize {
        self.state.map_hits.load(Ordering::SeqCst)
    }

    pub fn stream_hits(&self) -> Vec<Instant> {
        self.state.stream_hits.lock().clone()
    }

    /// Commands received so far as `(endpoint, body)`
    pub fn commands(&self) -> Vec<(&'static str, Value)> {
        self.state.commands.lock().clone()
    }
}

async fn map_handler(State(state): State<Arc<EngineState>>) -> Response {
    state.map_hits.fetch_add(1, Ordering::SeqCst);
    match &state.map {
        Some(map) => Json(map.clone()).into_response(),
        None => (StatusCode::INTERNAL_SERVER_ERROR, "engine not ready").into_response(),
    }
}

async fn stream_handler(State(state): State<Arc<EngineState>>) -> Response {
    state.stream_hits.lock().push(Instant::now());
    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        state.stream_body.clone(),
    )
        .into_response()
}

async fn control_handler(State(state): State<Arc<EngineState>>, Json(body): Json<Value>) -> StatusCode {
    state.commands.lock().push(("control", body));
    StatusCode::NO_CONTENT
}

async fn incident_handler(State(state): State<Arc<EngineState>>, Json(body): Json<Value>) -> StatusCode {
    state.commands.lock().push(("incident", body));
    StatusCode::NO_CONTENT
}

/// URL of a port nothing listens on
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/api", addr)
}

/// Poll `check` until it holds or `timeout` elapses
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
