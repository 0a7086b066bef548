//! Peer Listing Client
//!
//! Fetches canonical header strings from a remote peer's listing endpoint.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use super::errors::PeerError;
use super::types::{list_since_path, HeaderListResponse};

/// Default deadline for a whole listing request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for establishing a connection
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client bound to one remote peer
#[derive(Clone, Debug)]
pub struct PeerClient {
    /// HTTP client for making requests
    http_client: Client,
    host: String,
    port: u16,
}

impl PeerClient {
    /// Create a client for `host:port` with the default timeouts
    pub fn new(host: &str, port: u16) -> Result<Self, PeerError> {
        Self::with_timeouts(host, port, REQUEST_TIMEOUT, CONNECT_TIMEOUT)
    }

    /// Create a client with custom timeouts
    ///
    /// # Arguments
    /// * `request_timeout` - Deadline for the whole request, body included
    /// * `connect_timeout` - Deadline for the TCP connect
    pub fn with_timeouts(
        host: &str,
        port: u16,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, PeerError> {
        let http_client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| PeerError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            host: host.to_string(),
            port,
        })
    }

    /// Peer address as `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Listing URL for headers with `time >= since`
    pub fn list_url(&self, since: u32) -> String {
        format!("http://{}:{}{}", self.host, self.port, list_since_path(since))
    }

    /// Fetch the canonical strings of all headers with `time >= since`
    ///
    /// An empty list is a successful answer.
    pub async fn fetch_since(&self, since: u32) -> Result<Vec<String>, PeerError> {
        let url = self.list_url(since);
        debug!(url = %url, "Listing headers from peer");

        let response = self.http_client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(peer = %self.address(), status = %status, "Peer rejected listing request");
            return Err(PeerError::from_status(status.as_u16(), &body));
        }

        let list: HeaderListResponse = response.json().await?;

        debug!(
            peer = %self.address(),
            since = since,
            count = list.header_list.len(),
            "Listed headers from peer"
        );
        Ok(list.header_list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_header, unused_port, MockPeer, PeerMode};

    #[test]
    fn test_list_url() {
        let client = PeerClient::new("violet.example.com", 7754).unwrap();
        assert_eq!(
            client.list_url(42),
            "http://violet.example.com:7754/api/header/list/since/42"
        );
        assert_eq!(client.address(), "violet.example.com:7754");
    }

    #[tokio::test]
    async fn test_fetch_since_filters_on_time() {
        let peer = MockPeer::spawn().await;
        peer.push(sample_header(10, 20, 1));
        peer.push(sample_header(30, 40, 2));

        let client = PeerClient::new("127.0.0.1", peer.port()).unwrap();
        assert_eq!(client.fetch_since(0).await.unwrap().len(), 2);
        assert_eq!(
            client.fetch_since(30).await.unwrap(),
            vec![sample_header(30, 40, 2)]
        );
        assert!(client.fetch_since(31).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_garbage_is_protocol_error() {
        let peer = MockPeer::spawn().await;
        peer.set_mode(PeerMode::Garbage);

        let client = PeerClient::new("127.0.0.1", peer.port()).unwrap();
        let err = client.fetch_since(0).await.unwrap_err();
        assert!(matches!(err, PeerError::Protocol(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_fetch_error_status() {
        let peer = MockPeer::spawn().await;
        peer.set_mode(PeerMode::Status(503));

        let client = PeerClient::new("127.0.0.1", peer.port()).unwrap();
        let err = client.fetch_since(0).await.unwrap_err();
        assert!(matches!(err, PeerError::Status(503, _)), "{:?}", err);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_fetch_unreachable_is_network_error() {
        let client = PeerClient::new("127.0.0.1", unused_port()).unwrap();
        let err = client.fetch_since(0).await.unwrap_err();
        assert!(err.is_network(), "{:?}", err);
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let peer = MockPeer::spawn().await;
        peer.set_mode(PeerMode::Stall(Duration::from_secs(5)));

        let client = PeerClient::with_timeouts(
            "127.0.0.1",
            peer.port(),
            Duration::from_millis(200),
            Duration::from_millis(200),
        )
        .unwrap();
        let err = client.fetch_since(0).await.unwrap_err();
        assert!(matches!(err, PeerError::Timeout), "{:?}", err);
    }
}
