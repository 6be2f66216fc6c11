//! Token rotation for regional account pools
//!
//! Keeps each region's live token pool topped up from a set of issuer
//! endpoints. Tokens are fetched in batches into a staging pool and promoted
//! to the live pool wholesale once a batch is ready.
//!
//! Region lifecycle:
//! 1. Startup seeds a state document per region (`FileStore::open`)
//! 2. Empty live pool → bootstrap fetch + promotion on the first tick
//! 3. Consumers report token successes (`FileStore::record_success`)
//! 4. Success threshold or refresh interval → batch refresh into staging
//! 5. Refresh interval → promotion of fresh staged tokens, with a corrective
//!    refetch when they went stale
//! 6. The scheduler repeats this for every region on a fixed interval

pub mod error;
pub mod fetcher;
pub mod metrics;
pub mod promotion;
pub mod refresh;
pub mod retry;
pub mod rotator;
pub mod state;
pub mod store;

#[cfg(test)]
mod testutil;

pub use error::{Error, Result};
pub use fetcher::{Assignment, Fetcher};
pub use refresh::{run_tick, spawn_scheduler};
pub use retry::RetryPolicy;
pub use rotator::{Clock, PassOutcome, RefreshPolicy, Rotator, Trigger, system_clock};
pub use state::{Lease, RegionDocument, RegionState, TokenRecord, now_millis};
pub use store::FileStore;
