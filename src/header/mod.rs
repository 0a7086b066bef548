//! Message headers and their index keys

pub mod codec;
pub mod keys;

pub use codec::{Header, HeaderError, Identifier, Version, IDENTIFIER_LEN};
pub use keys::{derive_keys, IndexKeys, KEY_LEN};
