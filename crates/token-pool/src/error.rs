//! Error types for rotation operations

use common::Region;

/// Errors from store access and refresh passes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("store error: {0}")]
    Store(String),

    #[error(
        "{region}: token quota not met after {attempts} attempts (best batch {best}, required {required})"
    )]
    QuotaNotMet {
        region: Region,
        best: usize,
        required: usize,
        attempts: u32,
    },
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
