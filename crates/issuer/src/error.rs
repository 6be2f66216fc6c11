//! Error types for issuer and credential operations

/// Errors from a single token request or a credential file read.
///
/// Request errors are per-credential: the batch fetcher logs them, counts
/// them by `kind()` and moves on.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("issuer request timed out: {0}")]
    Timeout(String),

    #[error("issuer request failed: {0}")]
    Network(String),

    #[error("issuer returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed issuer response: {0}")]
    Malformed(String),

    #[error("issuer response has no token")]
    MissingToken,

    #[error("credential file not found: {0}")]
    CredentialsNotFound(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Short label for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Timeout(_) => "timeout",
            Error::Network(_) => "network",
            Error::Status { .. } => "status",
            Error::Malformed(_) => "malformed",
            Error::MissingToken => "missing_token",
            Error::CredentialsNotFound(_) => "credentials_not_found",
            Error::CredentialParse(_) => "credential_parse",
            Error::Io(_) => "io",
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else if e.is_decode() {
            Error::Malformed(e.to_string())
        } else {
            Error::Network(e.to_string())
        }
    }
}

/// Result alias for issuer operations.
pub type Result<T> = std::result::Result<T, Error>;
