//! Peer listing API types

use serde::{Deserialize, Serialize};

/// Body of `GET /api/header/list/since/<t>`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderListResponse {
    /// Canonical header strings, in no particular order
    pub header_list: Vec<String>,
}

/// Path of the listing endpoint for headers with `time >= since`
pub fn list_since_path(since: u32) -> String {
    format!("/api/header/list/since/{}", since)
}
