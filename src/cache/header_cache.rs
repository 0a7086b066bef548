//! Header Cache
//!
//! Owns one header store and, optionally, the peer it replicates from.
//! Reads go straight to the store; `sync` runs one pull from the peer.

use std::sync::{Arc, RwLock, RwLockReadGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::errors::CacheError;
use crate::header::{Header, Identifier};
use crate::peer::PeerClient;
use crate::store::{HeaderRange, HeaderStore, UpsertOutcome};
use crate::sync::{ErrorEntry, PeerSyncer, SyncReport, SyncState};

/// Live resources, dropped on close
struct Open {
    store: Arc<HeaderStore>,
    syncer: Option<Arc<PeerSyncer>>,
}

/// A header store with an optional upstream peer
pub struct HeaderCache {
    open: RwLock<Option<Open>>,
    /// Peer address as `host:port`, fixed at open
    remote: Option<String>,
}

impl HeaderCache {
    /// Open a cache
    ///
    /// # Arguments
    /// * `remote_host` - Peer to sync from, empty for a local-only cache
    /// * `remote_port` - Peer listing API port
    /// * `local_path` - Store directory, empty for an in-memory store
    pub fn open(remote_host: &str, remote_port: u16, local_path: &str) -> Result<Self, CacheError> {
        Self::open_with_config(&CacheConfig::new(remote_host, remote_port, local_path))
    }

    /// Open a cache from a full configuration
    pub fn open_with_config(config: &CacheConfig) -> Result<Self, CacheError> {
        let store = if config.local_path.is_empty() {
            HeaderStore::in_memory()?
        } else {
            HeaderStore::persistent(&config.local_path)?
        };
        let store = Arc::new(store);

        let syncer = if config.remote_host.is_empty() {
            None
        } else {
            let client = PeerClient::with_timeouts(
                &config.remote_host,
                config.remote_port,
                config.request_timeout(),
                config.connect_timeout(),
            )?;
            Some(Arc::new(PeerSyncer::new(client, Arc::clone(&store))?))
        };
        let remote = syncer.as_ref().map(|s| s.peer().address());

        info!(
            peer = remote.as_deref().unwrap_or("<none>"),
            persistent = store.is_persistent(),
            "Header cache open"
        );

        Ok(Self {
            open: RwLock::new(Some(Open { store, syncer })),
            remote,
        })
    }

    fn resources(&self) -> Result<RwLockReadGuard<'_, Option<Open>>, CacheError> {
        let guard = self.open.read().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            return Err(CacheError::Closed);
        }
        Ok(guard)
    }

    fn with_store<T>(
        &self,
        f: impl FnOnce(&HeaderStore) -> Result<T, CacheError>,
    ) -> Result<T, CacheError> {
        let guard = self.resources()?;
        match guard.as_ref() {
            Some(open) => f(&open.store),
            None => Err(CacheError::Closed),
        }
    }

    fn syncer(&self) -> Result<Option<Arc<PeerSyncer>>, CacheError> {
        let guard = self.resources()?;
        Ok(guard.as_ref().and_then(|open| open.syncer.clone()))
    }

    /// Pull new headers from the peer once
    ///
    /// Without a peer this succeeds without doing anything.
    pub async fn sync(&self) -> Result<SyncReport, CacheError> {
        match self.syncer()? {
            Some(syncer) => syncer.run().await,
            None => Ok(SyncReport::default()),
        }
    }

    /// Insert or replace a header
    pub fn upsert(&self, header: &Header) -> Result<UpsertOutcome, CacheError> {
        self.with_store(|store| store.upsert(header))
    }

    /// Most recent header for an identifier
    pub fn lookup(&self, identifier: &Identifier) -> Result<Option<Header>, CacheError> {
        self.with_store(|store| store.lookup(identifier))
    }

    pub fn get(&self, identifier: &Identifier, time: u32) -> Result<Option<Header>, CacheError> {
        self.with_store(|store| store.get(identifier, time))
    }

    pub fn range_by_date(&self, from: u32, to: u32) -> Result<HeaderRange, CacheError> {
        self.with_store(|store| store.range_by_date(from, to))
    }

    pub fn range_by_expire(&self, from: u32, to: u32) -> Result<HeaderRange, CacheError> {
        self.with_store(|store| store.range_by_expire(from, to))
    }

    /// Canonical strings of all headers with `time >= since`, as a peer would list them
    pub fn list_since(&self, since: u32) -> Result<Vec<String>, CacheError> {
        self.range_by_date(since, u32::MAX)?
            .map(|header| header.map(|h| h.serialize()))
            .collect()
    }

    /// Remove headers expiring before `before_expire`
    pub fn prune(&self, before_expire: u32) -> Result<usize, CacheError> {
        self.with_store(|store| store.prune(before_expire))
    }

    /// Remove headers that have already expired
    pub fn prune_expired(&self) -> Result<usize, CacheError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.prune(u32::try_from(now).unwrap_or(u32::MAX))
    }

    pub fn len(&self) -> Result<u64, CacheError> {
        self.with_store(|store| store.len())
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        self.with_store(|store| store.is_empty())
    }

    /// Peer address, if bound
    pub fn remote(&self) -> Option<&str> {
        self.remote.as_deref()
    }

    /// Highest header time applied from the peer, 0 without a peer
    pub fn watermark(&self) -> Result<u32, CacheError> {
        Ok(self.syncer()?.map(|s| s.watermark()).unwrap_or(0))
    }

    pub fn sync_state(&self) -> Result<SyncState, CacheError> {
        Ok(self.syncer()?.map(|s| s.state()).unwrap_or(SyncState::Idle))
    }

    /// Peer health string, `None` without a peer
    pub fn health_status(&self) -> Result<Option<&'static str>, CacheError> {
        Ok(self.syncer()?.map(|s| s.health_status()))
    }

    pub fn recent_errors(&self) -> Result<Vec<ErrorEntry>, CacheError> {
        Ok(self.syncer()?.map(|s| s.recent_errors()).unwrap_or_default())
    }

    pub fn is_closed(&self) -> bool {
        self.open.read().unwrap_or_else(|e| e.into_inner()).is_none()
    }

    /// Release the store. Closing twice is a no-op.
    ///
    /// A sync run still in flight keeps the store alive until it finishes.
    pub fn close(&self) {
        let taken = self.open.write().unwrap_or_else(|e| e.into_inner()).take();
        let Some(Open { store, syncer }) = taken else {
            debug!("Header cache already closed");
            return;
        };
        drop(syncer);
        match Arc::try_unwrap(store) {
            Ok(store) => store.close(),
            Err(_) => info!(
                peer = self.remote().unwrap_or("<none>"),
                "Header store in use, releasing after in-flight sync"
            ),
        }
        info!(peer = self.remote().unwrap_or("<none>"), "Header cache closed");
    }

    /// Sync every `interval` and drop expired headers until cancelled or closed
    pub fn spawn_sync_task(
        cache: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                peer = cache.remote().unwrap_or("<none>"),
                interval_secs = interval.as_secs_f64(),
                "Scheduled header sync started"
            );

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let result = tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = cache.sync() => result,
                };
                match result {
                    Ok(_) => {}
                    Err(CacheError::Closed) => break,
                    // failed runs are retried on the next tick
                    Err(e) => warn!(error = %e, "Scheduled header sync failed"),
                }

                match cache.prune_expired() {
                    Ok(0) => {}
                    Ok(pruned) => info!(pruned = pruned, "Dropped expired headers"),
                    Err(CacheError::Closed) => break,
                    Err(e) => warn!(error = %e, "Failed to drop expired headers"),
                }
            }

            info!(peer = cache.remote().unwrap_or("<none>"), "Scheduled header sync stopped");
        })
    }
}

impl Drop for HeaderCache {
    fn drop(&mut self) {
        self.close();
    }
}
