//! Index key derivation
//!
//! Date and expire keys are nibble-packed so that, in hex, the 32-bit value
//! sits at `[1..9]` and the identifier at `[9..75]`:
//!
//! ```text
//! tag(4 bits) | value(32 bits, big endian) | identifier(264 bits) | 0000
//! ```
//!
//! Keys of one family compare bytewise in `(value, identifier)` order.

use super::codec::{Header, Identifier, IDENTIFIER_LEN};

/// Length of a date or expire key in bytes
pub const KEY_LEN: usize = 38;

/// Leading nibble of date keys
pub const DATE_TAG: u8 = 0xd;

/// Leading nibble of expire keys
pub const EXPIRE_TAG: u8 = 0xe;

/// The three index keys of one header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexKeys {
    /// Ascending arrival-time order
    pub date: [u8; KEY_LEN],
    /// Ascending expiration order
    pub expire: [u8; KEY_LEN],
    /// Point lookup
    pub identifier: [u8; IDENTIFIER_LEN],
}

/// Derive all index keys of a header
pub fn derive_keys(header: &Header) -> IndexKeys {
    IndexKeys {
        date: date_key(header.time(), header.identifier()),
        expire: expire_key(header.expire(), header.identifier()),
        identifier: *header.identifier().as_bytes(),
    }
}

pub fn date_key(time: u32, identifier: &Identifier) -> [u8; KEY_LEN] {
    tagged_key(DATE_TAG, time, identifier.as_bytes())
}

pub fn expire_key(expire: u32, identifier: &Identifier) -> [u8; KEY_LEN] {
    tagged_key(EXPIRE_TAG, expire, identifier.as_bytes())
}

/// Smallest possible key of a family for `value`
pub fn lower_bound(tag: u8, value: u32) -> [u8; KEY_LEN] {
    tagged_key(tag, value, &[0x00; IDENTIFIER_LEN])
}

/// Largest possible key of a family for `value`
pub fn upper_bound(tag: u8, value: u32) -> [u8; KEY_LEN] {
    tagged_key(tag, value, &[0xff; IDENTIFIER_LEN])
}

/// Value embedded in a date or expire key
pub fn key_value(key: &[u8; KEY_LEN]) -> u32 {
    let mut value = [0u8; 4];
    for (i, byte) in value.iter_mut().enumerate() {
        *byte = (key[i] << 4) | (key[i + 1] >> 4);
    }
    u32::from_be_bytes(value)
}

fn tagged_key(tag: u8, value: u32, identifier: &[u8; IDENTIFIER_LEN]) -> [u8; KEY_LEN] {
    let mut payload = [0u8; KEY_LEN - 1];
    payload[..4].copy_from_slice(&value.to_be_bytes());
    payload[4..].copy_from_slice(identifier);

    // shift the payload right by one nibble behind the tag
    let mut key = [0u8; KEY_LEN];
    key[0] = (tag << 4) | (payload[0] >> 4);
    for i in 1..payload.len() {
        key[i] = (payload[i - 1] << 4) | (payload[i] >> 4);
    }
    key[KEY_LEN - 1] = payload[payload.len() - 1] << 4;
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_header, sample_identifier};

    fn field_at(key: &[u8], range: std::ops::Range<usize>) -> String {
        hex::encode(key)[range].to_string()
    }

    #[test]
    fn test_keys_embed_fields() {
        for (time, expire, seed) in [(0x572a2ee8, 0x573b6268, 1), (0, 0, 0), (u32::MAX, u32::MAX, 255)]
        {
            let header = Header::deserialize(&sample_header(time, expire, seed)).unwrap();
            let keys = header.index_keys();

            let date_time = u32::from_str_radix(&field_at(&keys.date, 1..9), 16).unwrap();
            assert_eq!(date_time, header.time());
            assert_eq!(field_at(&keys.date, 9..75), header.identifier().to_hex());

            let key_expire = u32::from_str_radix(&field_at(&keys.expire, 1..9), 16).unwrap();
            assert_eq!(key_expire, header.expire());
            assert_eq!(field_at(&keys.expire, 9..75), header.identifier().to_hex());

            assert_eq!(hex::encode(keys.identifier), header.identifier().to_hex());
        }
    }

    #[test]
    fn test_key_tags() {
        let header = Header::deserialize(&sample_header(5, 6, 1)).unwrap();
        let keys = header.index_keys();
        assert!(hex::encode(keys.date).starts_with('d'));
        assert!(hex::encode(keys.expire).starts_with('e'));
        assert!(hex::encode(keys.date).ends_with('0'));
    }

    #[test]
    fn test_key_value() {
        let id = sample_identifier(3);
        assert_eq!(key_value(&date_key(0xdeadbeef, &id)), 0xdeadbeef);
        assert_eq!(key_value(&expire_key(17, &id)), 17);
    }

    #[test]
    fn test_date_keys_sort_by_time_then_identifier() {
        let low = sample_identifier(1);
        let high = sample_identifier(200);
        assert!(date_key(1, &high) < date_key(2, &low));
        assert!(date_key(2, &low) < date_key(2, &high));
        assert!(lower_bound(DATE_TAG, 2) <= date_key(2, &low));
        assert!(upper_bound(DATE_TAG, 2) >= date_key(2, &high));
        assert!(upper_bound(DATE_TAG, 2) < date_key(3, &low));
    }
}
