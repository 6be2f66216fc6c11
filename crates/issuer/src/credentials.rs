//! Per-region credential files
//!
//! Each region has a JSON array of `{uid, password}` records at
//! `{dir}/{region}_data.json`. The array order is the rotation order: the
//! rotation index stored with the region state points into it. The file is
//! re-read on every batch so operators can replace it without a restart.
//!
//! Records with a missing or empty uid/password keep their slot in the
//! sequence (so indices stay stable) but are skipped at request time.

use std::path::PathBuf;

use common::{Region, Secret};
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::constants::CREDENTIAL_FILE_SUFFIX;
use crate::error::{Error, Result};

/// One account's issuer credentials, as supplied by the operator.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialRecord {
    /// Account id. Accepted as a JSON string or number.
    #[serde(default, deserialize_with = "uid_string_or_number")]
    pub uid: Option<String>,
    #[serde(default)]
    pub password: Option<Secret<String>>,
}

impl CredentialRecord {
    pub fn new(uid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            uid: Some(uid.into()),
            password: Some(Secret::new(password.into())),
        }
    }

    /// Both fields present and non-empty, or `None` if the slot is unusable.
    pub fn usable(&self) -> Option<(&str, &Secret<String>)> {
        match (&self.uid, &self.password) {
            (Some(uid), Some(password)) if !uid.is_empty() && !password.is_empty() => {
                Some((uid.as_str(), password))
            }
            _ => None,
        }
    }
}

fn uid_string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Reads credential files from a directory.
#[derive(Debug, Clone)]
pub struct CredentialSource {
    dir: PathBuf,
}

impl CredentialSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the credential file for `region`.
    pub fn path_for(&self, region: Region) -> PathBuf {
        self.dir
            .join(format!("{}{}", region.slug(), CREDENTIAL_FILE_SUFFIX))
    }

    /// Load the full ordered record set for `region`.
    pub async fn load(&self, region: Region) -> Result<Vec<CredentialRecord>> {
        let path = self.path_for(region);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::CredentialsNotFound(path.display().to_string()));
            }
            Err(e) => {
                return Err(Error::Io(format!(
                    "reading credential file {}: {e}",
                    path.display()
                )));
            }
        };

        let records: Vec<CredentialRecord> = serde_json::from_str(&contents).map_err(|e| {
            Error::CredentialParse(format!("parsing {}: {e}", path.display()))
        })?;
        debug!(%region, records = records.len(), "loaded credentials");
        Ok(records)
    }
}
