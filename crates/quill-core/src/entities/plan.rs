use std::time::Duration;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::entities::ChangeLogEntry;
use crate::enums::RiskLevel;

/// A computed, immutable set of candidate changes to reverse, plus
/// risk/warning metadata.
///
/// Built by the planner from a live query, consumed exactly once by the
/// executor, then discarded. Only the pre-rollback backup point it causes
/// ever reaches storage.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RollbackPlan {
    pub rollback_id: String,
    /// The instant to roll back *to*: every entry strictly after it is a
    /// reversal candidate.
    pub target_timestamp: DateTime<Utc>,
    /// Deduplicated table names touched by the candidates, sorted.
    pub affected_tables: Vec<String>,
    pub total_records: usize,
    /// Crude fixed-cost heuristic, not a scheduling guarantee.
    pub estimated_duration: Duration,
    pub risk_level: RiskLevel,
    /// Candidates in the order rollback must apply them: newest first.
    pub changes_to_rollback: Vec<ChangeLogEntry>,
    pub warnings: Vec<String>,
}

/// Outcome of a rollback execution.
///
/// A non-zero `error_count` with `success: false` is a degraded success,
/// not an exception: the entries that could be reversed were reversed.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RollbackReport {
    pub success: bool,
    pub message: String,
    pub success_count: usize,
    pub error_count: usize,
    /// Id of the `pre_rollback` backup point, when one could be taken.
    pub backup_id: Option<String>,
}

impl RollbackReport {
    /// Report for a rollback that was refused before any side effect.
    #[must_use]
    pub fn refused(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            success_count: 0,
            error_count: 0,
            backup_id: None,
        }
    }
}
