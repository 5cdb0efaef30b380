//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::app::AppState;
use crate::control::ControlStatus;
use crate::model::MapTopology;
use crate::upstream::LinkState;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - `*` or a comma-separated list of origins
    let allow_origin = if state.config.client_origin.trim() == "*" {
        AllowOrigin::any()
    } else {
        let allowed_origins: Vec<HeaderValue> = state
            .config
            .client_origin
            .split(',')
            .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
            .collect();
        AllowOrigin::list(allowed_origins)
    };

    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/map", get(map_handler))
        .route("/ws", get(ws_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    upstream: LinkState,
    viewers: usize,
    has_state: bool,
    states_published: u64,
    last_update_at: Option<DateTime<Utc>>,
    map_fetched_at: Option<DateTime<Utc>>,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let upstream = *state.link.borrow();

    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        upstream,
        viewers: state.broadcaster.session_count(),
        has_state: state.broadcaster.current().is_some(),
        states_published: state.broadcaster.published(),
        last_update_at: state.broadcaster.updated_at(),
        map_fetched_at: state.topology.fetched_at(),
    })
}

// ============================================================================
// Simulation endpoints
// ============================================================================

async fn map_handler(State(state): State<AppState>) -> Result<Json<MapTopology>, AppError> {
    if let Some(map) = state.topology.get() {
        return Ok(Json(map.as_ref().clone()));
    }

    match state.topology.refresh(&state.upstream).await {
        Ok(map) => Ok(Json(map.as_ref().clone())),
        Err(e) => {
            warn!(error = %e, "Map requested but upstream unavailable");
            Err(AppError::Unavailable("Map not available yet".to_string()))
        }
    }
}

async fn status_handler(State(state): State<AppState>) -> Json<ControlStatus> {
    Json(state.commands.status())
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
