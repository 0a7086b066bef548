//! Cache error types
//!
//! Every fallible cache, store and sync operation returns [`CacheError`].
//! Malformed headers inside a sync batch never surface here; they are counted
//! as rejected instead.

use crate::header::HeaderError;
use crate::peer::PeerError;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Malformed header: {0}")]
    MalformedHeader(#[from] HeaderError),

    #[error(transparent)]
    Peer(#[from] PeerError),

    #[error("Failed to open header store at {path}: {reason}")]
    StoreOpenFailed { path: String, reason: String },

    #[error("Header store I/O error: {0}")]
    StoreIo(String),

    #[error("Header cache is closed")]
    Closed,
}

impl CacheError {
    /// Peer unreachable or timed out
    pub fn is_network(&self) -> bool {
        matches!(self, CacheError::Peer(e) if e.is_network())
    }

    /// Peer answered with something other than a header listing
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            CacheError::Peer(PeerError::Protocol(_) | PeerError::Status(..))
        )
    }

    pub(crate) fn store_open(path: impl Into<String>, reason: impl ToString) -> Self {
        CacheError::StoreOpenFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

macro_rules! store_io_from {
    ($($err:ty),* $(,)?) => {
        $(
            impl From<$err> for CacheError {
                fn from(e: $err) -> Self {
                    CacheError::StoreIo(e.to_string())
                }
            }
        )*
    };
}

store_io_from!(
    redb::Error,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

impl From<tokio::task::JoinError> for CacheError {
    fn from(e: tokio::task::JoinError) -> Self {
        CacheError::StoreIo(format!("store task failed: {}", e))
    }
}
