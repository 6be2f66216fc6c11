//! Persisted per-region records
//!
//! A region's state counters, staging pool and live pool are stored together
//! in one `RegionDocument`. Timestamps are unix milliseconds.

use common::Region;
use serde::{Deserialize, Serialize};

/// Scheduling counters for one region.
///
/// Only the rotator mutates these, except `success_count` which consumers
/// bump through `FileStore::record_success`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionState {
    #[serde(default)]
    pub success_count: u64,
    /// `None` until the first fetch or promotion; treated as the epoch.
    #[serde(default)]
    pub last_update_time: Option<u64>,
    /// Start of the next batch in the credential sequence.
    #[serde(default)]
    pub current_index: usize,
    #[serde(default)]
    pub refresh_done: bool,
    /// Size of the most recent non-empty batch (overwritten, not summed).
    #[serde(default)]
    pub refresh_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease: Option<Lease>,
}

impl RegionState {
    /// Milliseconds since the last update, counting from the epoch if never updated.
    pub fn elapsed_since_update(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_update_time.unwrap_or(0))
    }
}

/// Exclusive claim on a region's refresh pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub owner: String,
    pub expires_at: u64,
}

/// One fetched token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub uid: String,
    pub token: String,
    pub timestamp: u64,
}

/// Everything persisted for one region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionDocument {
    pub region: Region,
    #[serde(default)]
    pub state: RegionState,
    #[serde(default)]
    pub staging: Vec<TokenRecord>,
    #[serde(default)]
    pub live: Vec<TokenRecord>,
}

impl RegionDocument {
    pub fn new(region: Region) -> Self {
        Self {
            region,
            state: RegionState::default(),
            staging: Vec::new(),
            live: Vec::new(),
        }
    }
}

/// Current wall-clock time in unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
