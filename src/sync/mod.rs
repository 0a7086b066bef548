//! Incremental header synchronization from remote peers

pub mod syncer;

pub use syncer::{apply_batch, ApplyOutcome, ErrorEntry, PeerSyncer, SyncReport, SyncState};
