//! Peer Sync Client
//!
//! One run pulls every header with `time >= watermark` from a peer, upserts the
//! well-formed ones and raises the watermark to the newest applied `time`.
//!
//! ```text
//! Idle -> Fetching -> Applying -> Idle
//!           |
//!           +-> Failed -> Idle
//! ```
//!
//! A failed run leaves the watermark alone and is not retried until the next run.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use crate::errors::CacheError;
use crate::header::{Header, HeaderError};
use crate::peer::PeerClient;
use crate::store::HeaderStore;

/// Maximum number of recent errors to track
const MAX_ERROR_HISTORY: usize = 10;

/// Health status values
pub const HEALTH_HEALTHY: u8 = 0;
pub const HEALTH_DEGRADED: u8 = 1;
pub const HEALTH_UNHEALTHY: u8 = 2;

/// Phase of the current sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SyncState {
    Idle = 0,
    Fetching = 1,
    Applying = 2,
    Failed = 3,
}

impl SyncState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SyncState::Fetching,
            2 => SyncState::Applying,
            3 => SyncState::Failed,
            _ => SyncState::Idle,
        }
    }
}

/// Outcome of applying one batch of transport strings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Headers upserted into the store
    pub applied: usize,
    /// Malformed strings skipped
    pub rejected: usize,
    /// Largest `time` among applied headers
    pub max_time: Option<u32>,
}

/// Outcome of one sync run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub applied: usize,
    pub rejected: usize,
    /// Watermark after the run
    pub watermark: u32,
}

/// A recent error entry for tracking
#[derive(Debug, Clone)]
pub struct ErrorEntry {
    pub timestamp: u64,
    pub watermark: u32,
    pub error: String,
}

/// Upsert every well-formed string, counting the malformed ones
///
/// Strings are applied in order. A malformed string never stops the batch; a
/// store failure does, leaving earlier upserts committed.
pub fn apply_batch(store: &HeaderStore, strings: &[String]) -> Result<ApplyOutcome, CacheError> {
    let mut outcome = ApplyOutcome::default();
    for s in strings {
        let header = match Header::deserialize(s) {
            Ok(header) => header,
            Err(e) => {
                log_rejected(s, &e);
                outcome.rejected += 1;
                continue;
            }
        };
        store.upsert(&header)?;
        outcome.applied += 1;
        outcome.max_time = outcome.max_time.max(Some(header.time()));
    }
    Ok(outcome)
}

fn log_rejected(s: &str, error: &HeaderError) {
    let preview: String = s.chars().take(24).collect();
    debug!(header = %preview, error = %error, "Rejected malformed header");
}

/// Resets the run state to `Idle` however the run ends
struct StateGuard<'a>(&'a AtomicU8);

impl<'a> StateGuard<'a> {
    fn enter(state: &'a AtomicU8, phase: SyncState) -> Self {
        state.store(phase as u8, Ordering::SeqCst);
        Self(state)
    }

    fn set(&self, phase: SyncState) {
        self.0.store(phase as u8, Ordering::SeqCst);
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        self.0.store(SyncState::Idle as u8, Ordering::SeqCst);
    }
}

/// Pulls headers from one peer into one store
pub struct PeerSyncer {
    peer: PeerClient,
    store: Arc<HeaderStore>,
    /// Watermark key in the store
    peer_key: String,
    watermark: AtomicU32,
    state: AtomicU8,
    /// Serializes runs so watermark updates follow application order
    run_lock: Mutex<()>,
    /// Peer health (0=healthy, 1=degraded, 2=unhealthy)
    health: AtomicU8,
    /// Recent error log
    error_log: RwLock<VecDeque<ErrorEntry>>,
}

impl PeerSyncer {
    /// Bind a peer to a store, resuming from the store's recorded watermark
    pub fn new(peer: PeerClient, store: Arc<HeaderStore>) -> Result<Self, CacheError> {
        let peer_key = peer.address();
        let watermark = store.watermark(&peer_key)?;
        debug!(peer = %peer_key, watermark = watermark, "Sync client ready");
        Ok(Self {
            peer,
            store,
            peer_key,
            watermark: AtomicU32::new(watermark),
            state: AtomicU8::new(SyncState::Idle as u8),
            run_lock: Mutex::new(()),
            health: AtomicU8::new(HEALTH_HEALTHY),
            error_log: RwLock::new(VecDeque::with_capacity(MAX_ERROR_HISTORY)),
        })
    }

    pub fn peer(&self) -> &PeerClient {
        &self.peer
    }

    pub fn state(&self) -> SyncState {
        SyncState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Highest applied header time from this peer
    pub fn watermark(&self) -> u32 {
        self.watermark.load(Ordering::SeqCst)
    }

    /// Run one fetch-and-apply cycle
    pub async fn run(&self) -> Result<SyncReport, CacheError> {
        let _run = self.run_lock.lock().await;
        let since = self.watermark();
        let state = StateGuard::enter(&self.state, SyncState::Fetching);

        let strings = match self.peer.fetch_since(since).await {
            Ok(strings) => strings,
            Err(e) => {
                state.set(SyncState::Failed);
                let health = if e.is_network() {
                    HEALTH_UNHEALTHY
                } else {
                    HEALTH_DEGRADED
                };
                self.health.store(health, Ordering::Relaxed);
                let e = CacheError::from(e);
                self.fail(since, &e);
                return Err(e);
            }
        };

        state.set(SyncState::Applying);
        let store = Arc::clone(&self.store);
        let applied = tokio::task::spawn_blocking(move || apply_batch(&store, &strings))
            .await
            .map_err(CacheError::from)
            .and_then(|outcome| outcome);
        let outcome = match applied {
            Ok(outcome) => outcome,
            Err(e) => {
                state.set(SyncState::Failed);
                self.fail(since, &e);
                return Err(e);
            }
        };

        let watermark = match outcome.max_time {
            Some(time) if time > since => {
                let stored = self.store.advance_watermark(&self.peer_key, time)?;
                self.watermark.fetch_max(stored, Ordering::SeqCst);
                self.watermark()
            }
            _ => since,
        };
        self.health.store(HEALTH_HEALTHY, Ordering::Relaxed);

        if outcome.applied > 0 || outcome.rejected > 0 {
            info!(
                peer = %self.peer_key,
                applied = outcome.applied,
                rejected = outcome.rejected,
                watermark = watermark,
                "Synced headers from peer"
            );
        } else {
            trace!(peer = %self.peer_key, watermark = watermark, "No new headers from peer");
        }

        Ok(SyncReport {
            applied: outcome.applied,
            rejected: outcome.rejected,
            watermark,
        })
    }

    fn fail(&self, since: u32, error: &CacheError) {
        warn!(peer = %self.peer_key, since = since, error = %error, "Header sync failed");
        self.log_error(since, error);
    }

    /// Log an error to the error history ring buffer
    fn log_error(&self, watermark: u32, error: &CacheError) {
        let entry = ErrorEntry {
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            watermark,
            error: error.to_string(),
        };

        let mut log = self.error_log.write().unwrap_or_else(|e| e.into_inner());
        if log.len() >= MAX_ERROR_HISTORY {
            log.pop_front();
        }
        log.push_back(entry);
    }

    /// Get peer health status string
    pub fn health_status(&self) -> &'static str {
        match self.health.load(Ordering::Relaxed) {
            HEALTH_HEALTHY => "healthy",
            HEALTH_DEGRADED => "degraded",
            _ => "unhealthy",
        }
    }

    /// Get recent errors
    pub fn recent_errors(&self) -> Vec<ErrorEntry> {
        self.error_log
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}
