//! Issuer protocol constants

use std::time::Duration;

/// Path appended to each issuer base URL.
pub const TOKEN_PATH: &str = "token";

/// Per-request timeout shared by every request in a batch.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Suffix of the per-region credential file (`ind_data.json`, ...).
pub const CREDENTIAL_FILE_SUFFIX: &str = "_data.json";

/// Upper bound on how much of an error body ends up in a log line.
pub const ERROR_BODY_LIMIT: usize = 200;
