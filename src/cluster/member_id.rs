use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Canonical member identifier: the decimal form for numeric ids, otherwise
/// the trimmed opaque string the backend reported.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for MemberId {
    fn from(id: u64) -> Self {
        MemberId(id.to_string())
    }
}

impl fmt::Display for MemberId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Structured member handle, as some clients wrap the id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberHandle {
    pub id: u64,
}

/// Every shape a member or leader id arrives in from a backend adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawMemberId {
    Int(u64),
    Text(String),
    Handle(MemberHandle),
}

impl RawMemberId {
    /// Normalize to a [`MemberId`]. Zero and empty ids mean "none".
    ///
    /// Text is read as decimal, then as `0x` hex, and otherwise kept as an
    /// opaque identifier.
    pub fn normalize(&self) -> Option<MemberId> {
        match self {
            RawMemberId::Int(id) => numeric(*id),
            RawMemberId::Handle(handle) => numeric(handle.id),
            RawMemberId::Text(raw) => {
                let text = raw.trim();
                if text.is_empty() {
                    return None;
                }
                if let Ok(id) = text.parse::<u64>() {
                    return numeric(id);
                }
                let hex = text
                    .strip_prefix("0x")
                    .or_else(|| text.strip_prefix("0X"))
                    .and_then(|digits| u64::from_str_radix(digits, 16).ok());
                match hex {
                    Some(id) => numeric(id),
                    None => Some(MemberId(text.to_string())),
                }
            }
        }
    }
}

impl From<u64> for RawMemberId {
    fn from(id: u64) -> Self {
        RawMemberId::Int(id)
    }
}

fn numeric(id: u64) -> Option<MemberId> {
    (id != 0).then(|| MemberId::from(id))
}
