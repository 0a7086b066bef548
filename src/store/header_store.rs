//! Header Store Implementation
//!
//! Keeps every header under three index families (date, expire, identifier) in a
//! redb database. Each mutation of a header touches all families inside a single
//! write transaction, so readers never see a header in one index but not another.

use std::path::{Path, PathBuf};

use redb::{backends::InMemoryBackend, Database, ReadableTable, ReadableTableMetadata};
use tracing::{debug, info, trace};

use super::range::{decode_record, HeaderRange};
use super::tables::{
    expire_entry_key, id_entry_key, HEADERS_BY_DATE, HEADERS_BY_EXPIRE, HEADERS_BY_ID,
    PEER_WATERMARKS,
};
use crate::errors::CacheError;
use crate::header::keys::{self, DATE_TAG, EXPIRE_TAG};
use crate::header::{Header, Identifier};

/// Database file name inside a persistent store directory
pub const DB_FILE_NAME: &str = "headers.redb";

/// Result of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No header with this identifier and time was stored
    Inserted,
    /// A different encoding with the same identifier and time was replaced
    Replaced,
    /// The identical header was already stored
    Unchanged,
}

/// Indexed header storage
#[derive(Debug)]
pub struct HeaderStore {
    db: Database,
    /// Database file, `None` for an in-memory store
    path: Option<PathBuf>,
}

impl HeaderStore {
    /// Open or create a persistent store in directory `dir`
    pub fn persistent(dir: impl AsRef<Path>) -> Result<Self, CacheError> {
        let dir = dir.as_ref();
        info!(path = %dir.display(), "Opening persistent header store");

        std::fs::create_dir_all(dir)
            .map_err(|e| CacheError::store_open(dir.display().to_string(), e))?;
        let path = dir.join(DB_FILE_NAME);
        let db = Database::builder()
            .create(&path)
            .map_err(|e| CacheError::store_open(path.display().to_string(), e))?;
        Self::open(db, Some(path))
    }

    /// Create a store that lives only as long as this value
    pub fn in_memory() -> Result<Self, CacheError> {
        info!("Using in-memory header store");
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .map_err(|e| CacheError::store_open("<memory>", e))?;
        Self::open(db, None)
    }

    fn open(db: Database, path: Option<PathBuf>) -> Result<Self, CacheError> {
        let label = path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<memory>".to_string());
        let create_tables = || -> Result<(), CacheError> {
            let tx = db.begin_write()?;
            {
                tx.open_table(HEADERS_BY_DATE)?;
                tx.open_table(HEADERS_BY_EXPIRE)?;
                tx.open_table(HEADERS_BY_ID)?;
                tx.open_table(PEER_WATERMARKS)?;
            }
            tx.commit()?;
            Ok(())
        };
        create_tables().map_err(|e| CacheError::store_open(label, e))?;
        Ok(Self { db, path })
    }

    /// Whether this store survives the process
    pub fn is_persistent(&self) -> bool {
        self.path.is_some()
    }

    /// Database file, if persistent
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Insert a header, or replace the one stored under the same identifier and time
    pub fn upsert(&self, header: &Header) -> Result<UpsertOutcome, CacheError> {
        let keys = header.index_keys();
        let record = header.serialize();

        let tx = self.db.begin_write()?;
        let outcome = {
            let mut by_date = tx.open_table(HEADERS_BY_DATE)?;
            let mut by_expire = tx.open_table(HEADERS_BY_EXPIRE)?;
            let mut by_id = tx.open_table(HEADERS_BY_ID)?;

            let previous = by_date
                .get(keys.date.as_slice())?
                .map(|stored| stored.value().to_string());

            match previous {
                Some(stored) if stored == record => UpsertOutcome::Unchanged,
                previous => {
                    let outcome = match previous {
                        Some(stored) => {
                            // expire may differ between the two encodings
                            let old = decode_record(&stored)?;
                            let old_keys = old.index_keys();
                            by_expire.remove(expire_entry_key(&old_keys, old.time()).as_slice())?;
                            UpsertOutcome::Replaced
                        }
                        None => UpsertOutcome::Inserted,
                    };
                    by_date.insert(keys.date.as_slice(), record.as_str())?;
                    by_expire.insert(
                        expire_entry_key(&keys, header.time()).as_slice(),
                        keys.date.as_slice(),
                    )?;
                    by_id.insert(
                        id_entry_key(&keys.identifier, header.time()).as_slice(),
                        keys.date.as_slice(),
                    )?;
                    outcome
                }
            }
        };

        if outcome == UpsertOutcome::Unchanged {
            tx.abort()?;
        } else {
            tx.commit()?;
        }
        trace!(
            identifier = %header.identifier(),
            time = header.time(),
            outcome = ?outcome,
            "Upserted header"
        );
        Ok(outcome)
    }

    /// Most recent header for an identifier
    pub fn lookup(&self, identifier: &Identifier) -> Result<Option<Header>, CacheError> {
        let tx = self.db.begin_read()?;
        let by_id = tx.open_table(HEADERS_BY_ID)?;
        let lo = id_entry_key(identifier.as_bytes(), 0);
        let hi = id_entry_key(identifier.as_bytes(), u32::MAX);
        let mut entries = by_id.range::<&[u8]>(lo.as_slice()..=hi.as_slice())?;
        let Some(entry) = entries.next_back() else {
            return Ok(None);
        };
        let (_, date_key) = entry?;
        let by_date = tx.open_table(HEADERS_BY_DATE)?;
        let record = by_date.get(date_key.value())?.ok_or_else(|| {
            CacheError::StoreIo(format!("identifier index entry for {} without a header", identifier))
        })?;
        decode_record(record.value()).map(Some)
    }

    /// Header stored under exactly this identifier and time
    pub fn get(&self, identifier: &Identifier, time: u32) -> Result<Option<Header>, CacheError> {
        let tx = self.db.begin_read()?;
        let by_date = tx.open_table(HEADERS_BY_DATE)?;
        let key = keys::date_key(time, identifier);
        let header = match by_date.get(key.as_slice())? {
            Some(record) => Some(decode_record(record.value())?),
            None => None,
        };
        Ok(header)
    }

    /// Headers with `from <= time <= to`, ascending by time
    pub fn range_by_date(&self, from: u32, to: u32) -> Result<HeaderRange, CacheError> {
        if from > to {
            return Ok(HeaderRange::empty());
        }
        let tx = self.db.begin_read()?;
        let by_date = tx.open_table(HEADERS_BY_DATE)?;
        let lo = keys::lower_bound(DATE_TAG, from);
        let hi = keys::upper_bound(DATE_TAG, to);
        let range = by_date.range::<&[u8]>(lo.as_slice()..=hi.as_slice())?;
        Ok(HeaderRange::by_date(range))
    }

    /// Headers with `from <= expire <= to`, ascending by expiration
    pub fn range_by_expire(&self, from: u32, to: u32) -> Result<HeaderRange, CacheError> {
        if from > to {
            return Ok(HeaderRange::empty());
        }
        let tx = self.db.begin_read()?;
        let by_expire = tx.open_table(HEADERS_BY_EXPIRE)?;
        let records = tx.open_table(HEADERS_BY_DATE)?;
        let lo = keys::lower_bound(EXPIRE_TAG, from).to_vec();
        let mut hi = keys::upper_bound(EXPIRE_TAG, to).to_vec();
        hi.extend_from_slice(&u32::MAX.to_be_bytes());
        let index = by_expire.range::<&[u8]>(lo.as_slice()..=hi.as_slice())?;
        Ok(HeaderRange::by_expire(index, records))
    }

    /// Remove every header with `expire < before_expire` from all indices
    pub fn prune(&self, before_expire: u32) -> Result<usize, CacheError> {
        let cutoff = keys::lower_bound(EXPIRE_TAG, before_expire);

        let tx = self.db.begin_write()?;
        let pruned = {
            let mut by_date = tx.open_table(HEADERS_BY_DATE)?;
            let mut by_expire = tx.open_table(HEADERS_BY_EXPIRE)?;
            let mut by_id = tx.open_table(HEADERS_BY_ID)?;

            let mut stale = Vec::new();
            for entry in by_expire.range::<&[u8]>(..cutoff.as_slice())? {
                let (_, date_key) = entry?;
                stale.push(date_key.value().to_vec());
            }

            for date_key in &stale {
                let record = by_date
                    .remove(date_key.as_slice())?
                    .map(|stored| stored.value().to_string())
                    .ok_or_else(|| {
                        CacheError::StoreIo("expire index entry without a header".to_string())
                    })?;
                let header = decode_record(&record)?;
                let keys = header.index_keys();
                by_expire.remove(expire_entry_key(&keys, header.time()).as_slice())?;
                by_id.remove(id_entry_key(&keys.identifier, header.time()).as_slice())?;
                trace!(identifier = %header.identifier(), expire = header.expire(), "Pruned header");
            }
            stale.len()
        };
        tx.commit()?;

        debug!(pruned = pruned, before_expire = before_expire, "Pruned expired headers");
        Ok(pruned)
    }

    /// Number of stored headers
    pub fn len(&self) -> Result<u64, CacheError> {
        let tx = self.db.begin_read()?;
        Ok(tx.open_table(HEADERS_BY_DATE)?.len()?)
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }

    /// Last recorded watermark for a peer, 0 if it was never synced
    pub fn watermark(&self, peer: &str) -> Result<u32, CacheError> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(PEER_WATERMARKS)?;
        Ok(table.get(peer)?.map(|w| w.value()).unwrap_or(0))
    }

    /// Raise a peer's watermark to at least `time`, returning the stored value
    pub fn advance_watermark(&self, peer: &str, time: u32) -> Result<u32, CacheError> {
        let tx = self.db.begin_write()?;
        let watermark = {
            let mut table = tx.open_table(PEER_WATERMARKS)?;
            let current = table.get(peer)?.map(|w| w.value()).unwrap_or(0);
            let next = current.max(time);
            if next != current {
                table.insert(peer, next)?;
            }
            next
        };
        tx.commit()?;
        Ok(watermark)
    }

    /// Release the database
    pub fn close(self) {
        match &self.path {
            Some(path) => info!(path = %path.display(), "Closing header store"),
            None => info!("Closing in-memory header store"),
        }
        drop(self.db);
    }

    #[cfg(test)]
    fn table_len<V: redb::Value + 'static>(
        &self,
        table: redb::TableDefinition<&'static [u8], V>,
    ) -> u64 {
        let tx = self.db.begin_read().unwrap();
        let table = tx.open_table(table).unwrap();
        table.len().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_header, sample_identifier};

    fn header(time: u32, expire: u32, seed: u8) -> Header {
        Header::deserialize(&sample_header(time, expire, seed)).unwrap()
    }

    fn collect(range: HeaderRange) -> Vec<Header> {
        range.collect::<Result<Vec<_>, _>>().unwrap()
    }

    fn assert_indices_consistent(store: &HeaderStore) {
        let records = store.table_len(HEADERS_BY_DATE);
        assert_eq!(store.table_len(HEADERS_BY_EXPIRE), records);
        assert_eq!(store.table_len(HEADERS_BY_ID), records);
        let by_expire = collect(store.range_by_expire(0, u32::MAX).unwrap());
        assert_eq!(by_expire.len() as u64, records);
        for h in by_expire {
            assert_eq!(store.get(h.identifier(), h.time()).unwrap(), Some(h));
        }
    }

    #[test]
    fn test_upsert_and_lookup() {
        let store = HeaderStore::in_memory().unwrap();
        let h = header(100, 200, 1);

        assert_eq!(store.lookup(h.identifier()).unwrap(), None);
        assert_eq!(store.upsert(&h).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.lookup(h.identifier()).unwrap(), Some(h.clone()));
        assert_eq!(store.get(h.identifier(), 100).unwrap(), Some(h.clone()));
        assert_eq!(store.get(h.identifier(), 101).unwrap(), None);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let store = HeaderStore::in_memory().unwrap();
        let h = header(100, 200, 1);

        store.upsert(&h).unwrap();
        let by_date = collect(store.range_by_date(0, u32::MAX).unwrap());
        let by_expire = collect(store.range_by_expire(0, u32::MAX).unwrap());

        for _ in 0..5 {
            assert_eq!(store.upsert(&h).unwrap(), UpsertOutcome::Unchanged);
        }
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.lookup(h.identifier()).unwrap(), Some(h));
        assert_eq!(collect(store.range_by_date(0, u32::MAX).unwrap()), by_date);
        assert_eq!(collect(store.range_by_expire(0, u32::MAX).unwrap()), by_expire);
        assert_indices_consistent(&store);
    }

    #[test]
    fn test_replace_moves_expire_entry() {
        let store = HeaderStore::in_memory().unwrap();
        let first = header(100, 200, 1);
        let renewed = header(100, 900, 1);

        store.upsert(&first).unwrap();
        assert_eq!(store.upsert(&renewed).unwrap(), UpsertOutcome::Replaced);

        assert_eq!(store.len().unwrap(), 1);
        assert!(collect(store.range_by_expire(0, 899).unwrap()).is_empty());
        assert_eq!(collect(store.range_by_expire(900, 900).unwrap()), vec![renewed]);
        assert_indices_consistent(&store);
    }

    #[test]
    fn test_lookup_returns_latest_announcement() {
        let store = HeaderStore::in_memory().unwrap();
        let older = header(100, 500, 4);
        let newer = header(300, 400, 4);
        let other = header(200, 600, 5);

        store.upsert(&newer).unwrap();
        store.upsert(&older).unwrap();
        store.upsert(&other).unwrap();

        assert_eq!(store.len().unwrap(), 3);
        assert_eq!(store.lookup(&sample_identifier(4)).unwrap(), Some(newer));
        assert_eq!(store.lookup(&sample_identifier(5)).unwrap(), Some(other));
        assert_eq!(store.lookup(&sample_identifier(6)).unwrap(), None);
    }

    #[test]
    fn test_range_by_date_is_ascending_and_inclusive() {
        let store = HeaderStore::in_memory().unwrap();
        for (time, seed) in [(30, 1), (10, 2), (20, 3), (20, 1), (40, 4)] {
            store.upsert(&header(time, 1000, seed)).unwrap();
        }

        let times: Vec<u32> = collect(store.range_by_date(20, 30).unwrap())
            .iter()
            .map(|h| h.time())
            .collect();
        assert_eq!(times, vec![20, 20, 30]);

        let all = collect(store.range_by_date(0, u32::MAX).unwrap());
        assert_eq!(all.len(), 5);
        assert!(all.windows(2).all(|w| w[0].time() <= w[1].time()));

        assert!(collect(store.range_by_date(50, 10).unwrap()).is_empty());
    }

    #[test]
    fn test_range_by_expire_is_ascending() {
        let store = HeaderStore::in_memory().unwrap();
        for (expire, seed) in [(300, 1), (100, 2), (200, 3)] {
            store.upsert(&header(50, expire, seed)).unwrap();
        }

        let expires: Vec<u32> = collect(store.range_by_expire(0, u32::MAX).unwrap())
            .iter()
            .map(|h| h.expire())
            .collect();
        assert_eq!(expires, vec![100, 200, 300]);

        let middle = collect(store.range_by_expire(150, 250).unwrap());
        assert_eq!(middle, vec![header(50, 200, 3)]);
    }

    #[test]
    fn test_range_is_restartable_snapshot() {
        let store = HeaderStore::in_memory().unwrap();
        store.upsert(&header(10, 20, 1)).unwrap();

        let mut scan = store.range_by_date(0, u32::MAX).unwrap();
        store.upsert(&header(11, 20, 2)).unwrap();
        assert!(scan.next().unwrap().is_ok());
        assert!(scan.next().is_none());

        // a new scan sees the later write
        assert_eq!(collect(store.range_by_date(0, u32::MAX).unwrap()).len(), 2);
    }

    #[test]
    fn test_prune_removes_from_all_indices() {
        let store = HeaderStore::in_memory().unwrap();
        store.upsert(&header(10, 100, 1)).unwrap();
        store.upsert(&header(20, 150, 2)).unwrap();
        store.upsert(&header(30, 200, 3)).unwrap();
        store.upsert(&header(40, 200, 4)).unwrap();
        store.upsert(&header(5, 90, 3)).unwrap();

        assert_eq!(store.prune(150).unwrap(), 2);

        let remaining: Vec<u32> = collect(store.range_by_expire(0, u32::MAX).unwrap())
            .iter()
            .map(|h| h.expire())
            .collect();
        assert_eq!(remaining, vec![150, 200, 200]);
        assert_eq!(store.lookup(&sample_identifier(1)).unwrap(), None);
        assert_eq!(store.lookup(&sample_identifier(3)).unwrap(), Some(header(30, 200, 3)));
        assert_indices_consistent(&store);

        assert_eq!(store.prune(150).unwrap(), 0);
        assert_eq!(store.prune(u32::MAX).unwrap(), 3);
        assert!(store.is_empty().unwrap());
        assert_indices_consistent(&store);
    }

    #[test]
    fn test_watermark_never_regresses() {
        let store = HeaderStore::in_memory().unwrap();
        assert_eq!(store.watermark("peer:7754").unwrap(), 0);
        assert_eq!(store.advance_watermark("peer:7754", 50).unwrap(), 50);
        assert_eq!(store.advance_watermark("peer:7754", 20).unwrap(), 50);
        assert_eq!(store.watermark("peer:7754").unwrap(), 50);
        assert_eq!(store.watermark("other:7754").unwrap(), 0);
    }

    #[test]
    fn test_persistent_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let h = header(100, 200, 1);
        {
            let store = HeaderStore::persistent(dir.path()).unwrap();
            assert!(store.is_persistent());
            store.upsert(&h).unwrap();
            store.advance_watermark("peer:7754", 100).unwrap();
            store.close();
        }

        let store = HeaderStore::persistent(dir.path()).unwrap();
        assert_eq!(store.lookup(h.identifier()).unwrap(), Some(h));
        assert_eq!(store.watermark("peer:7754").unwrap(), 100);
    }

    #[test]
    fn test_persistent_open_fails_on_file_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = HeaderStore::persistent(file.path()).unwrap_err();
        assert!(matches!(err, CacheError::StoreOpenFailed { .. }));
    }

    #[test]
    fn test_second_open_of_same_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let _first = HeaderStore::persistent(dir.path()).unwrap();
        let err = HeaderStore::persistent(dir.path()).unwrap_err();
        assert!(matches!(err, CacheError::StoreOpenFailed { .. }));
    }
}
