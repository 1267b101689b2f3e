//! HTTP client for fetching entropy from a remote EaaS server
//!
//! Requests `N` bytes from the peer's `/entropy` endpoint and decodes the JSON
//! envelope into raw bytes.

use crate::{protocol::EntropyEnvelope, Error, Result};
use reqwest::{header, Client, ClientBuilder};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// Configuration for the entropy fetcher
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Full URL of the peer's entropy endpoint
    pub peer_url: Url,
    /// Request timeout
    pub timeout: Duration,
}

impl FetcherConfig {
    pub fn new(peer_url: Url) -> Self {
        Self {
            peer_url,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// HTTP client for fetching entropy from a peer
#[derive(Clone)]
pub struct EntropyFetcher {
    client: Client,
    config: FetcherConfig,
}

impl EntropyFetcher {
    /// Create a new fetcher with configuration
    pub fn new(config: FetcherConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .pool_max_idle_per_host(0)
            .user_agent(concat!("eaas-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::Network)?;

        Ok(Self { client, config })
    }

    /// Fetch `byte_count` bytes from the peer.
    ///
    /// The peer may return fewer bytes than requested.
    #[instrument(skip(self), fields(peer = %self.config.peer_url))]
    pub async fn fetch(&self, byte_count: usize) -> Result<Vec<u8>> {
        let url = self.build_request_url(byte_count);

        debug!("Fetching {} bytes from {}", byte_count, url);

        let response = self
            .client
            .get(url.clone())
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                warn!("Failed to fetch from {}: {}", url, e);
                Error::Network(e)
            })?;

        let status = response.status();
        let body = response.bytes().await.map_err(Error::Network)?;

        // Error responses still carry an envelope with the peer's reason
        let envelope: EntropyEnvelope = serde_json::from_slice(&body).map_err(|e| {
            Error::Fetch(format!("HTTP {}: unreadable response body: {}", status, e))
        })?;

        if !status.is_success() && !envelope.error {
            return Err(Error::Fetch(format!("HTTP {}", status)));
        }

        let data = envelope.into_payload()?;
        if data.is_empty() {
            return Err(Error::Fetch("peer returned an empty payload".to_string()));
        }

        if data.len() != byte_count {
            warn!("Received {} bytes, expected {}", data.len(), byte_count);
        }

        debug!("Successfully fetched {} bytes", data.len());
        Ok(data)
    }

    /// Build request URL with the byte count query parameter
    fn build_request_url(&self, byte_count: usize) -> Url {
        let mut url = self.config.peer_url.clone();
        url.query_pairs_mut()
            .append_pair("bytes", &byte_count.to_string());
        url
    }

    /// Get fetcher configuration
    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }
}
