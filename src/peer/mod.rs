//! Remote peer listing API client

pub mod client;
pub mod errors;
pub mod types;

pub use client::PeerClient;
pub use errors::PeerError;
pub use types::HeaderListResponse;
