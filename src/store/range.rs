//! Lazy range scans over the header indices
//!
//! A [`HeaderRange`] owns a redb [`Range`] opened from a [`ReadOnlyTable`], which keeps
//! its read transaction alive. The scan therefore sees one snapshot of the store and
//! can outlive the call that created it.

use std::fmt;

use redb::{Range, ReadOnlyTable, ReadableTable};

use crate::errors::CacheError;
use crate::header::Header;

enum Scan {
    Empty,
    /// Records read straight from the date table
    Date(Range<'static, &'static [u8], &'static str>),
    /// Index entries resolved against the date table
    Expire {
        index: Range<'static, &'static [u8], &'static [u8]>,
        records: ReadOnlyTable<&'static [u8], &'static str>,
    },
}

/// Ascending sequence of headers from one index family
pub struct HeaderRange {
    scan: Scan,
}

impl HeaderRange {
    pub(super) fn empty() -> Self {
        Self { scan: Scan::Empty }
    }

    pub(super) fn by_date(range: Range<'static, &'static [u8], &'static str>) -> Self {
        Self {
            scan: Scan::Date(range),
        }
    }

    pub(super) fn by_expire(
        index: Range<'static, &'static [u8], &'static [u8]>,
        records: ReadOnlyTable<&'static [u8], &'static str>,
    ) -> Self {
        Self {
            scan: Scan::Expire { index, records },
        }
    }
}

impl Iterator for HeaderRange {
    type Item = Result<Header, CacheError>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.scan {
            Scan::Empty => None,
            Scan::Date(range) => {
                let entry = range.next()?;
                Some(
                    entry
                        .map_err(CacheError::from)
                        .and_then(|(_, record)| decode_record(record.value())),
                )
            }
            Scan::Expire { index, records } => {
                let entry = index.next()?;
                Some(entry.map_err(CacheError::from).and_then(|(_, date_key)| {
                    let record = records.get(date_key.value())?.ok_or_else(|| {
                        CacheError::StoreIo("expire index entry without a header".to_string())
                    })?;
                    decode_record(record.value())
                }))
            }
        }
    }
}

impl fmt::Debug for HeaderRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scan {
            Scan::Empty => f.write_str("HeaderRange(empty)"),
            Scan::Date(_) => f.write_str("HeaderRange(date)"),
            Scan::Expire { .. } => f.write_str("HeaderRange(expire)"),
        }
    }
}

/// Decode a stored record; stored strings were validated on insert
pub(super) fn decode_record(record: &str) -> Result<Header, CacheError> {
    Header::deserialize(record)
        .map_err(|e| CacheError::StoreIo(format!("corrupt header record: {}", e)))
}
