//! Operational regions
//!
//! The region set is closed: every region owns its own credential file,
//! state document, staging pool and live pool. Unknown names are rejected
//! when configuration is parsed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Region {
    Ind,
    Bd,
    Me,
    Br,
}

impl Region {
    pub const ALL: [Region; 4] = [Region::Ind, Region::Bd, Region::Me, Region::Br];

    /// Canonical upper-case code, as written in config and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Region::Ind => "IND",
            Region::Bd => "BD",
            Region::Me => "ME",
            Region::Br => "BR",
        }
    }

    /// Lower-case form used in file names.
    pub fn slug(&self) -> &'static str {
        match self {
            Region::Ind => "ind",
            Region::Bd => "bd",
            Region::Me => "me",
            Region::Br => "br",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Region {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Region::ALL
            .into_iter()
            .find(|r| r.code().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::Error::invalid("region", format!("unknown region {s:?}")))
    }
}

/// Accepts any casing, same as `FromStr`.
impl<'de> Deserialize<'de> for Region {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("ind".parse::<Region>().unwrap(), Region::Ind);
        assert_eq!("BR".parse::<Region>().unwrap(), Region::Br);
        assert!("EU".parse::<Region>().is_err());
    }

    #[test]
    fn serde_uses_upper_case_codes() {
        let json = serde_json::to_string(&Region::Me).unwrap();
        assert_eq!(json, "\"ME\"");
        let back: Region = serde_json::from_str("\"BD\"").unwrap();
        assert_eq!(back, Region::Bd);
        let lower: Region = serde_json::from_str("\"ind\"").unwrap();
        assert_eq!(lower, Region::Ind);
        let err = serde_json::from_str::<Region>("\"XX\"").unwrap_err();
        assert!(err.to_string().contains("XX"), "{err}");
    }
}
