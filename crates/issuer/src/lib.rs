//! Issuer client and credential source
//!
//! Two leaf collaborators of the rotator live here:
//! 1. `CredentialSource` reads a region's ordered uid/password records from
//!    `{dir}/{region}_data.json`, fresh on every call
//! 2. `fetch_token()` asks one issuer endpoint for a token for one credential
//!
//! Neither keeps state between calls. Batching, round-robin assignment and
//! persistence belong to the `token-pool` crate.

pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

pub use constants::*;
pub use credentials::{CredentialRecord, CredentialSource};
pub use error::{Error, Result};
pub use token::{IssuerResponse, fetch_token, token_url};
