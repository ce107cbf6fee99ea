use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A named timestamp anchor usable as a rollback target.
///
/// Created on demand by callers and automatically (as `"pre_rollback"`)
/// before every rollback execution.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BackupPoint {
    pub id: String,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}
