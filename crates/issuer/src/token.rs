//! Single token request against one issuer endpoint
//!
//! The issuer protocol is a GET to `{endpoint}/token?uid=..&password=..`
//! answered with a JSON object carrying a `token` field. Anything else is a
//! failure for that one credential.

use std::time::Duration;

use common::Secret;
use serde::Deserialize;

use crate::constants::{ERROR_BODY_LIMIT, TOKEN_PATH};
use crate::error::{Error, Result};

/// Issuer response body. Other fields are ignored.
#[derive(Debug, Deserialize)]
pub struct IssuerResponse {
    #[serde(default)]
    pub token: Option<String>,
}

/// Build the token URL for an issuer base URL, tolerating a trailing slash.
pub fn token_url(endpoint: &str) -> String {
    format!("{}/{TOKEN_PATH}", endpoint.trim_end_matches('/'))
}

/// Request a token for one credential.
///
/// `timeout` bounds the whole request including the body read.
pub async fn fetch_token(
    client: &reqwest::Client,
    endpoint: &str,
    uid: &str,
    password: &Secret<String>,
    timeout: Duration,
) -> Result<String> {
    let response = client
        .get(token_url(endpoint))
        .query(&[("uid", uid), ("password", password.expose().as_str())])
        .timeout(timeout)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let mut body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        if body.len() > ERROR_BODY_LIMIT {
            let cut = (0..=ERROR_BODY_LIMIT)
                .rev()
                .find(|i| body.is_char_boundary(*i))
                .unwrap_or(0);
            body.truncate(cut);
        }
        return Err(Error::Status {
            status: status.as_u16(),
            body,
        });
    }

    let parsed: IssuerResponse = response
        .json()
        .await
        .map_err(|e| Error::Malformed(e.to_string()))?;

    match parsed.token {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(Error::MissingToken),
    }
}
