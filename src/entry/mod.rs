//! Stored configuration entries and their key layout.

mod key;
pub use key::*;


use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::Result;
use crate::StoreError;

/// One configuration value as stored under
/// `/config/{namespace}/{environment}/{key}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Opaque JSON value
    pub value: Value,
    pub version: String,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigMetadata {
    pub created_by: String,
    #[serde(with = "created_at_format")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub approved_by: Option<String>,
    #[serde(default)]
    pub git_commit: Option<String>,
}

impl ConfigEntry {
    pub fn new(
        value: Value,
        version: impl Into<String>,
        created_by: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            value,
            version: version.into(),
            metadata: ConfigMetadata {
                created_by: created_by.into(),
                created_at,
                approved_by: None,
                git_commit: None,
            },
        }
    }

    pub fn with_git_commit(
        mut self,
        commit: impl Into<String>,
    ) -> Self {
        self.metadata.git_commit = Some(commit.into());
        self
    }

    /// Serialize for storage at `path`
    pub fn encode(
        &self,
        path: &str,
    ) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|source| {
            StoreError::Encode {
                key: path.to_string(),
                source,
            }
            .into()
        })
    }

    /// Parse a stored payload read from `path`
    pub fn decode(
        path: &str,
        bytes: &[u8],
    ) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|source| {
            StoreError::Decode {
                key: path.to_string(),
                source,
            }
            .into()
        })
    }
}

/// `created_at` is written as RFC 3339 UTC. Older writers stored naive
/// timestamps without an offset; those are read as UTC.
mod created_at_format {
    use chrono::DateTime;
    use chrono::NaiveDateTime;
    use chrono::SecondsFormat;
    use chrono::Utc;
    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;

    const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

    pub(super) fn serialize<S>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub(super) fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, NAIVE_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }
}
