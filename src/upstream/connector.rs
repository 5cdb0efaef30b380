//! Upstream connector - owns the engine stream and reconnects forever

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::broadcast::Broadcaster;
use crate::config::Config;

use super::client::{UpstreamClient, UpstreamError};
use super::frame::decode_stream;
use super::topology::TopologyCache;

/// Connection state of the engine stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Disconnected,
    Connecting,
    Streaming,
}

/// Single ingest loop feeding the broadcaster.
///
/// Only one instance may run per process; the broadcaster relies on a
/// single ordered source of states.
pub struct UpstreamConnector {
    client: UpstreamClient,
    broadcaster: Arc<Broadcaster>,
    topology: Arc<TopologyCache>,
    reconnect_delay: Duration,
    max_line_bytes: usize,
    link: watch::Sender<LinkState>,
}

impl UpstreamConnector {
    pub fn new(
        client: UpstreamClient,
        broadcaster: Arc<Broadcaster>,
        topology: Arc<TopologyCache>,
        config: &Config,
    ) -> (Self, watch::Receiver<LinkState>) {
        let (link, link_rx) = watch::channel(LinkState::Disconnected);
        let connector = Self {
            client,
            broadcaster,
            topology,
            reconnect_delay: config.reconnect_delay,
            max_line_bytes: config.max_line_bytes,
            link,
        };
        (connector, link_rx)
    }

    /// Run the ingest loop. Never returns; abort the task to stop it.
    pub async fn run(self) {
        info!(upstream = %self.client.base_url(), "Starting upstream connector");
        self.spawn_topology_refresh();

        let mut failures: u64 = 0;
        loop {
            self.link.send_replace(LinkState::Connecting);

            match self.stream_once().await {
                Ok(records) => {
                    failures = 0;
                    info!(records, "Upstream stream ended");
                }
                Err(e) => {
                    failures += 1;
                    warn!(failures, error = %e, "Upstream stream unavailable");
                }
            }

            self.link.send_replace(LinkState::Disconnected);
            debug!(
                delay_ms = self.reconnect_delay.as_millis() as u64,
                "Scheduling upstream reconnect"
            );
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    /// Connect once and relay states until the stream ends
    async fn stream_once(&self) -> Result<u64, UpstreamError> {
        let response = self.client.open_stream().await?;

        self.link.send_replace(LinkState::Streaming);
        info!("Upstream stream connected");
        self.spawn_topology_refresh();

        let states = decode_stream(response.bytes_stream(), self.max_line_bytes);
        futures::pin_mut!(states);

        let mut records: u64 = 0;
        while let Some(item) = states.next().await {
            let state = item.map_err(UpstreamError::Request)?;
            trace!(vehicles = state.vehicle_count(), "State received");
            self.broadcaster.publish(state);
            records += 1;
        }

        Ok(records)
    }

    /// Fetch the map on its own task; a failure never delays the stream
    fn spawn_topology_refresh(&self) {
        let client = self.client.clone();
        let topology = self.topology.clone();
        tokio::spawn(async move {
            if let Err(e) = topology.refresh(&client).await {
                warn!(error = %e, "Map topology fetch failed");
            }
        });
    }
}
