//! HTTP client for the simulation engine API

use std::time::Duration;

use reqwest::{Client, Response};

use crate::config::Config;
use crate::control::ControlCommand;
use crate::model::MapTopology;

/// Client for the engine's `/map`, `/stream`, `/control` and `/incident` endpoints
#[derive(Clone, Debug)]
pub struct UpstreamClient {
    client: Client,
    base_url: String,
    /// Per-request timeout for short calls; the stream has none
    request_timeout: Duration,
}

impl UpstreamClient {
    pub fn new(config: &Config) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .connect_timeout(config.upstream_timeout)
            .build()
            .map_err(UpstreamError::Request)?;

        Ok(Self {
            client,
            base_url: config.upstream_url.clone(),
            request_timeout: config.upstream_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the URL for an engine endpoint
    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Fetch the static road network
    pub async fn fetch_map(&self) -> Result<MapTopology, UpstreamError> {
        let response = self
            .client
            .get(self.endpoint("map"))
            .header("Accept", "application/json")
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(UpstreamError::Request)?;

        let response = ensure_success(response).await?;
        response.json().await.map_err(UpstreamError::Parse)
    }

    /// Open the continuous event stream; the body is read by the caller
    pub async fn open_stream(&self) -> Result<Response, UpstreamError> {
        let response = self
            .client
            .get(self.endpoint("stream"))
            .header("Accept", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .send()
            .await
            .map_err(UpstreamError::Request)?;

        ensure_success(response).await
    }

    /// Post a command to `/control` or `/incident`
    pub async fn post_command(&self, command: &ControlCommand) -> Result<(), UpstreamError> {
        let path = if command.is_incident() { "incident" } else { "control" };

        let response = self
            .client
            .post(self.endpoint(path))
            .timeout(self.request_timeout)
            .json(command)
            .send()
            .await
            .map_err(UpstreamError::Request)?;

        ensure_success(response).await?;
        Ok(())
    }
}

/// Turn a non-2xx response into an error carrying the body text
async fn ensure_success(response: Response) -> Result<Response, UpstreamError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(UpstreamError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Upstream engine errors
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(reqwest::Error),
}
