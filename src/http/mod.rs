//! HTTP surface: health, status, map and the viewer WebSocket endpoint

pub mod routes;

pub use routes::build_router;
