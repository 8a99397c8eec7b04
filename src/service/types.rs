use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::ReplicationRecord;

pub(crate) const DEFAULT_WRITER: &str = "api";
pub(crate) const DEFAULT_DEPLOYER: &str = "deploy";

/// Body of an emergency write
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRequest {
    pub value: Value,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl WriteRequest {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            reason: None,
            created_by: None,
        }
    }
}

/// What was written and how it spread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationContext {
    pub namespace: String,
    pub environment: String,
    pub key: String,
    pub value: Value,
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteResponse {
    pub success: bool,
    pub version: String,
    pub replication_log: Vec<ReplicationRecord>,
    pub replication_context: ReplicationContext,
}

/// Batch of keys released together under one git ref
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployRequest {
    pub git_ref: String,
    #[serde(default = "default_deployer")]
    pub created_by: String,
    pub configs: BTreeMap<String, Value>,
}

fn default_deployer() -> String {
    DEFAULT_DEPLOYER.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployResponse {
    pub success: bool,
    pub deployed: usize,
    pub git_ref: String,
}
