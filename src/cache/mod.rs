//! Header cache
//!
//! Ties a local header store to an optional remote peer and schedules
//! periodic syncs against it.

pub mod header_cache;

pub use header_cache::HeaderCache;
