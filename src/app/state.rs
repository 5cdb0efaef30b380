//! Application state shared across routes

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::broadcast::Broadcaster;
use crate::config::Config;
use crate::control::CommandForwarder;
use crate::upstream::{LinkState, TopologyCache, UpstreamClient, UpstreamConnector, UpstreamError};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub upstream: UpstreamClient,
    pub broadcaster: Arc<Broadcaster>,
    pub topology: Arc<TopologyCache>,
    pub commands: CommandForwarder,
    pub link: watch::Receiver<LinkState>,
}

impl AppState {
    /// Build the shared state and the background services behind it.
    ///
    /// The connector is returned unstarted; the caller spawns `run()` exactly once.
    pub fn new(config: Config) -> Result<(Self, Services), UpstreamError> {
        let config = Arc::new(config);

        // Initialize upstream client
        let upstream = UpstreamClient::new(&config)?;

        // Initialize fan-out hub and map cache
        let broadcaster = Arc::new(Broadcaster::new(
            config.session_queue_capacity,
            config.snapshot_on_join,
        ));
        let topology = Arc::new(TopologyCache::new());

        // Initialize command forwarding worker
        let (commands, forwarder) =
            CommandForwarder::spawn(upstream.clone(), config.command_queue_capacity);

        let (connector, link) =
            UpstreamConnector::new(upstream.clone(), broadcaster.clone(), topology.clone(), &config);

        let state = Self {
            config,
            upstream,
            broadcaster,
            topology,
            commands,
            link,
        };

        Ok((state, Services { connector, forwarder }))
    }
}

/// Background work owned by `main`
pub struct Services {
    /// Ingest loop, not yet started
    pub connector: UpstreamConnector,
    /// Running command forwarding worker
    pub forwarder: JoinHandle<()>,
}
