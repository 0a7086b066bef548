// Table Definitions

use redb::TableDefinition;

use crate::header::IndexKeys;

/// Table: Headers by date
/// Key:   `[u8; 38]` # date key
/// Value: `&str`     # canonical transport string
///
/// The only table holding header data; the other indices point into it.
pub const HEADERS_BY_DATE: TableDefinition<&[u8], &str> = TableDefinition::new("headers-by-date-1");

/// Table: Headers by expiration
/// Key:   `[u8; 42]` # expire key || time (BE)
/// Value: `[u8; 38]` # date key
pub const HEADERS_BY_EXPIRE: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new("headers-by-expire-1");

/// Table: Headers by identifier
/// Key:   `[u8; 37]` # identifier || time (BE)
/// Value: `[u8; 38]` # date key
pub const HEADERS_BY_ID: TableDefinition<&[u8], &[u8]> = TableDefinition::new("headers-by-id-1");

/// Table: Sync watermark per peer
/// Key:   `&str` # "host:port"
/// Value: `u32`  # highest applied header time
pub const PEER_WATERMARKS: TableDefinition<&str, u32> = TableDefinition::new("peer-watermarks-1");

/// Key of a header in [`HEADERS_BY_EXPIRE`]
///
/// The time suffix keeps renewals of one identifier with equal expiry apart.
pub fn expire_entry_key(keys: &IndexKeys, time: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(keys.expire.len() + 4);
    key.extend_from_slice(&keys.expire);
    key.extend_from_slice(&time.to_be_bytes());
    key
}

/// Key of a header in [`HEADERS_BY_ID`]
pub fn id_entry_key(identifier: &[u8], time: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(identifier.len() + 4);
    key.extend_from_slice(identifier);
    key.extend_from_slice(&time.to_be_bytes());
    key
}
