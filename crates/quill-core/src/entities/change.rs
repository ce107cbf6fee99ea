use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::RowData;
use crate::enums::OperationType;

/// One append-only change-log entry recording a mutation to a tracked table.
///
/// Immutable once persisted: rollback produces new entries, never edits
/// existing ones. `old_data` is what makes an update/delete reversible;
/// `new_data` is informational and feeds the warning heuristics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ChangeLogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub operation_type: OperationType,
    pub table_name: String,
    pub record_id: Option<String>,
    pub old_data: Option<RowData>,
    pub new_data: Option<RowData>,
    pub change_summary: String,
    pub author: String,
    pub metadata: Option<serde_json::Value>,
}
