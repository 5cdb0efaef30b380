//! Simulation engine ingest: HTTP client, stream framing, connection lifecycle

pub mod client;
pub mod connector;
pub mod frame;
pub mod topology;

pub use client::{UpstreamClient, UpstreamError};
pub use connector::{LinkState, UpstreamConnector};
pub use topology::TopologyCache;
