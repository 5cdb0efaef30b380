//! Cached road network

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::model::MapTopology;

use super::client::{UpstreamClient, UpstreamError};

#[derive(Default)]
struct CachedMap {
    map: Option<Arc<MapTopology>>,
    fetched_at: Option<DateTime<Utc>>,
}

/// Last map fetched from the engine, shared by the connector and viewers
#[derive(Default)]
pub struct TopologyCache {
    inner: RwLock<CachedMap>,
}

impl TopologyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<MapTopology>> {
        self.inner.read().map.clone()
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().fetched_at
    }

    /// Replace the cached map
    pub fn store(&self, map: MapTopology) -> Arc<MapTopology> {
        let map = Arc::new(map);
        let mut inner = self.inner.write();
        inner.map = Some(map.clone());
        inner.fetched_at = Some(Utc::now());
        map
    }

    /// Fetch the map from the engine and cache it.
    ///
    /// A failed fetch leaves the previous map in place.
    pub async fn refresh(&self, client: &UpstreamClient) -> Result<Arc<MapTopology>, UpstreamError> {
        debug!("Fetching map topology");
        let map = client.fetch_map().await?;
        info!(roads = map.roads.len(), "Map topology updated");
        Ok(self.store(map))
    }
}
