//! Local header storage
//!
//! A redb database holding headers under date, expire and identifier indices,
//! either on disk or in memory.

pub mod header_store;
pub mod range;
pub mod tables;

pub use header_store::{HeaderStore, UpsertOutcome, DB_FILE_NAME};
pub use range::HeaderRange;
