//! Peer API Error Types
//!
//! Structured errors for the remote listing API.
//! Network-kind errors mean the peer could not be reached in time, protocol-kind
//! errors mean it answered with something that is not a header listing.

/// Peer listing error types
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Peer returned HTTP {0}: {1}")]
    Status(u16, String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Request error: {0}")]
    Request(String),
}

impl PeerError {
    /// Whether the peer was unreachable (as opposed to answering badly)
    pub fn is_network(&self) -> bool {
        matches!(self, PeerError::Network(_) | PeerError::Timeout)
    }

    /// Whether the next scheduled run has a chance of succeeding
    pub fn is_retryable(&self) -> bool {
        match self {
            PeerError::Network(_) | PeerError::Timeout => true,
            PeerError::Status(status, _) => matches!(status, 408 | 429 | 500..=599),
            PeerError::Protocol(_) | PeerError::Request(_) => false,
        }
    }

    /// Create a PeerError from an HTTP status code and response body
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            408 => PeerError::Timeout,
            _ => PeerError::Status(status, body.to_string()),
        }
    }
}

impl From<reqwest::Error> for PeerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            PeerError::Timeout
        } else if e.is_decode() {
            PeerError::Protocol(e.to_string())
        } else if e.is_builder() {
            PeerError::Request(e.to_string())
        } else {
            PeerError::Network(e.to_string())
        }
    }
}
