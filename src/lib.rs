//! Peer-replicated header cache
//!
//! Keeps a local, indexed copy of fixed-format message headers and pulls new
//! ones from a remote peer's listing API. Headers are addressed by identifier,
//! creation time and expiry time.
//!
//! ```no_run
//! # async fn demo() -> Result<(), header_cache::CacheError> {
//! use header_cache::HeaderCache;
//!
//! let cache = HeaderCache::open("indigo.example.com", 7754, "/var/lib/header-cache")?;
//! let report = cache.sync().await?;
//! println!("{} new headers, watermark {}", report.applied, report.watermark);
//! for header in cache.range_by_date(0, u32::MAX)? {
//!     println!("{}", header?.identifier());
//! }
//! cache.close();
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod errors;
pub mod header;
pub mod peer;
pub mod store;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::HeaderCache;
pub use config::CacheConfig;
pub use errors::CacheError;
pub use header::{Header, HeaderError, Identifier};
pub use peer::{PeerClient, PeerError};
pub use store::{HeaderRange, HeaderStore, UpsertOutcome};
pub use sync::{SyncReport, SyncState};
