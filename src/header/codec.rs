//! Canonical header codec
//!
//! Parses and emits the fixed-width transport form of a message header:
//!
//! ```text
//! M0100:<time 8>:<expire 8>:<I 66>:<J 66>:<K 66>:<r 64>:<s 64>
//! ```
//!
//! All fields are lowercase hex. Only `time`, `expire` and the identifier `I`
//! are interpreted; the remaining fields are carried through untouched so that
//! `serialize(deserialize(s)) == s` for every accepted `s`.

use std::fmt;
use std::str::FromStr;

use super::keys::{derive_keys, IndexKeys};

/// Length of a header identifier in bytes (a compressed curve point)
pub const IDENTIFIER_LEN: usize = 33;

/// Field separator in the transport form
const SEPARATOR: char = ':';

/// Header decode failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    #[error("Unknown header version tag: {0:?}")]
    UnknownVersion(String),

    #[error("Bad header length: expected {expected}, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("Bad field count: expected {expected}, got {actual}")]
    FieldCount { expected: usize, actual: usize },

    #[error("Field {field} has width {actual}, expected {expected}")]
    FieldWidth {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Field {0} is not lowercase hex")]
    NotHex(&'static str),

    #[error("Header expires ({expire:#010x}) before it was created ({time:#010x})")]
    ExpireBeforeTime { time: u32, expire: u32 },
}

/// Header schema version, selected by the leading tag of the transport string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    /// `M0100`: time, expire, I, J, K, r, s
    V1,
}

impl Version {
    /// Tag that opens the transport string
    pub fn tag(&self) -> &'static str {
        match self {
            Version::V1 => "M0100",
        }
    }

    /// Resolve a tag to a known version
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "M0100" => Some(Version::V1),
            _ => None,
        }
    }

    /// Names and widths of the hex fields following the tag, in order.
    /// The first three are always time, expire and identifier.
    fn fields(&self) -> &'static [(&'static str, usize)] {
        match self {
            Version::V1 => &[
                ("time", 8),
                ("expire", 8),
                ("I", IDENTIFIER_LEN * 2),
                ("J", 66),
                ("K", 66),
                ("r", 64),
                ("s", 64),
            ],
        }
    }

    /// Opaque fields carried after the identifier
    fn opaque_fields(&self) -> &'static [(&'static str, usize)] {
        &self.fields()[3..]
    }

    /// Exact byte length of a transport string of this version
    pub fn encoded_len(&self) -> usize {
        let fields = self.fields();
        self.tag().len() + fields.iter().map(|(_, w)| w + 1).sum::<usize>()
    }
}

/// Opaque 33-byte subject identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier([u8; IDENTIFIER_LEN]);

impl Identifier {
    pub fn from_bytes(bytes: [u8; IDENTIFIER_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; IDENTIFIER_LEN] {
        &self.0
    }

    /// Lowercase hex form, as it appears in the transport string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", self.to_hex())
    }
}

impl FromStr for Identifier {
    type Err = HeaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        check_hex_field("I", s, IDENTIFIER_LEN * 2)?;
        let mut bytes = [0u8; IDENTIFIER_LEN];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| HeaderError::NotHex("I"))?;
        Ok(Self(bytes))
    }
}

/// A decoded message header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    version: Version,
    time: u32,
    expire: u32,
    identifier: Identifier,
    /// Uninterpreted trailing fields, verbatim
    opaque: Vec<String>,
}

impl Header {
    /// Build a V1 header from its parts
    ///
    /// `opaque` must hold the J, K, r and s fields in lowercase hex.
    pub fn new(
        time: u32,
        expire: u32,
        identifier: Identifier,
        opaque: Vec<String>,
    ) -> Result<Self, HeaderError> {
        let version = Version::V1;
        let layout = version.opaque_fields();
        if opaque.len() != layout.len() {
            return Err(HeaderError::FieldCount {
                expected: layout.len() + 3,
                actual: opaque.len() + 3,
            });
        }
        for ((name, width), field) in layout.iter().zip(&opaque) {
            check_hex_field(name, field, *width)?;
        }
        if expire < time {
            return Err(HeaderError::ExpireBeforeTime { time, expire });
        }
        Ok(Self {
            version,
            time,
            expire,
            identifier,
            opaque,
        })
    }

    /// Parse a canonical transport string
    pub fn deserialize(s: &str) -> Result<Self, HeaderError> {
        let tag = s.split(SEPARATOR).next().unwrap_or_default();
        let version =
            Version::from_tag(tag).ok_or_else(|| HeaderError::UnknownVersion(tag.to_string()))?;

        let expected = version.encoded_len();
        if s.len() != expected {
            return Err(HeaderError::Length {
                expected,
                actual: s.len(),
            });
        }

        let layout = version.fields();
        let fields: Vec<&str> = s.split(SEPARATOR).skip(1).collect();
        if fields.len() != layout.len() {
            return Err(HeaderError::FieldCount {
                expected: layout.len(),
                actual: fields.len(),
            });
        }
        for ((name, width), field) in layout.iter().zip(&fields) {
            check_hex_field(name, field, *width)?;
        }

        let time = parse_u32("time", fields[0])?;
        let expire = parse_u32("expire", fields[1])?;
        if expire < time {
            return Err(HeaderError::ExpireBeforeTime { time, expire });
        }
        let identifier = fields[2].parse()?;

        Ok(Self {
            version,
            time,
            expire,
            identifier,
            opaque: fields[3..].iter().map(|f| f.to_string()).collect(),
        })
    }

    /// Emit the canonical transport string
    pub fn serialize(&self) -> String {
        let mut out = String::with_capacity(self.version.encoded_len());
        out.push_str(self.version.tag());
        for field in [
            format!("{:08x}", self.time),
            format!("{:08x}", self.expire),
            self.identifier.to_hex(),
        ] {
            out.push(SEPARATOR);
            out.push_str(&field);
        }
        for field in &self.opaque {
            out.push(SEPARATOR);
            out.push_str(field);
        }
        out
    }

    /// Index keys for the local store
    pub fn index_keys(&self) -> IndexKeys {
        derive_keys(self)
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn time(&self) -> u32 {
        self.time
    }

    pub fn expire(&self) -> u32 {
        self.expire
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn opaque(&self) -> &[String] {
        &self.opaque
    }
}

impl FromStr for Header {
    type Err = HeaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Header::deserialize(s)
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

fn check_hex_field(field: &'static str, value: &str, width: usize) -> Result<(), HeaderError> {
    if value.len() != width {
        return Err(HeaderError::FieldWidth {
            field,
            expected: width,
            actual: value.len(),
        });
    }
    if !value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return Err(HeaderError::NotHex(field));
    }
    Ok(())
}

fn parse_u32(field: &'static str, value: &str) -> Result<u32, HeaderError> {
    u32::from_str_radix(value, 16).map_err(|_| HeaderError::NotHex(field))
}
