//! Rollback planner: candidate selection, risk scoring, and warnings.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};

use quill_config::TrackingConfig;
use quill_core::entities::{ChangeLogEntry, RollbackPlan};
use quill_core::enums::{OperationType, RiskLevel};

use crate::error::DatabaseError;
use crate::repos::change_log::{ENTRY_COLUMNS, row_to_entry};
use crate::service::ChangeTracker;

/// Fixed per-record cost heuristic for `estimated_duration`.
const PER_RECORD_COST_MS: u64 = 100;

/// Weighted score at or above which a plan is high risk.
const HIGH_RISK_SCORE: u32 = 10;
/// Weighted score at or above which a plan is medium risk.
const MEDIUM_RISK_SCORE: u32 = 5;

/// Classify how disruptive reversing `changes` is expected to be.
///
/// Score: `2 × deletes + 1 × updates + 3 × critical-table changes`. Any
/// critical-table change is high risk regardless of score.
#[must_use]
pub fn assess_risk(changes: &[ChangeLogEntry], config: &TrackingConfig) -> RiskLevel {
    let mut deletes = 0u32;
    let mut updates = 0u32;
    let mut critical = 0u32;

    for change in changes {
        match change.operation_type {
            OperationType::Delete => deletes += 1,
            OperationType::Update => updates += 1,
            OperationType::Insert | OperationType::Rollback => {}
        }
        if config.is_critical(&change.table_name) {
            critical += 1;
        }
    }

    let score = 2 * deletes + updates + 3 * critical;
    if critical > 0 || score >= HIGH_RISK_SCORE {
        RiskLevel::High
    } else if score >= MEDIUM_RISK_SCORE {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Human-readable cautions for a candidate set.
///
/// Three rules: inserts whose compensation deletes rows, records touched
/// by more than one candidate (undo-order conflicts), and updates missing
/// the before-image needed to restore prior state.
#[must_use]
pub fn build_warnings(changes: &[ChangeLogEntry]) -> Vec<String> {
    let mut warnings = Vec::new();

    let insert_count = changes
        .iter()
        .filter(|c| c.operation_type == OperationType::Insert)
        .count();
    if insert_count > 0 {
        warnings.push(format!(
            "{insert_count} insert(s) will be reversed: data that was added will be removed"
        ));
    }

    let mut touches: HashMap<(&str, &str), usize> = HashMap::new();
    for change in changes {
        if let Some(record_id) = change.record_id.as_deref() {
            *touches.entry((change.table_name.as_str(), record_id)).or_insert(0) += 1;
        }
    }
    let conflicted = touches.values().filter(|&&n| n > 1).count();
    if conflicted > 0 {
        warnings.push(format!(
            "{conflicted} record(s) have multiple changes in the window; conflicting undo order is possible"
        ));
    }

    for change in changes {
        if change.operation_type == OperationType::Update
            && change.new_data.is_some()
            && change.old_data.is_none()
        {
            warnings.push(format!(
                "update of {}.{} has no before-image; prior state cannot be restored",
                change.table_name,
                change.record_id.as_deref().unwrap_or("<unknown>")
            ));
        }
    }

    warnings
}

impl ChangeTracker {
    /// Build a rollback plan reversing every change strictly after
    /// `target_timestamp`, optionally restricted by table and author.
    ///
    /// Candidates come back newest first — the order rollback must apply
    /// them in, since later changes may depend on earlier ones having
    /// still been in effect. Planning performs no writes.
    ///
    /// Returns `Ok(None)` when no changes match: nothing to roll back is a
    /// normal outcome, distinct from a planning failure.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the candidate query fails.
    pub async fn create_rollback_plan(
        &self,
        target_timestamp: DateTime<Utc>,
        table_filter: Option<&[String]>,
        author_filter: Option<&str>,
    ) -> Result<Option<RollbackPlan>, DatabaseError> {
        let mut conditions = vec!["project_root = ?1".to_string(), "timestamp > ?2".to_string()];
        let mut params: Vec<libsql::Value> = vec![
            self.project_root().into(),
            target_timestamp.to_rfc3339().into(),
        ];

        if let Some(tables) = table_filter {
            let mut placeholders = Vec::with_capacity(tables.len());
            for table in tables {
                params.push(table.as_str().into());
                placeholders.push(format!("?{}", params.len()));
            }
            conditions.push(format!("table_name IN ({})", placeholders.join(", ")));
        }
        if let Some(author) = author_filter {
            params.push(author.into());
            conditions.push(format!("author = ?{}", params.len()));
        }

        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM change_log WHERE {} \
             ORDER BY timestamp DESC, rowid DESC",
            conditions.join(" AND ")
        );

        let mut rows = self
            .db()
            .query(&sql, libsql::params_from_iter(params))
            .await?;
        let mut changes = Vec::new();
        while let Some(row) = rows.next().await? {
            changes.push(row_to_entry(&row)?);
        }

        if changes.is_empty() {
            return Ok(None);
        }

        let affected_tables: Vec<String> = changes
            .iter()
            .map(|c| c.table_name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let total_records = changes.len();
        let risk_level = assess_risk(&changes, self.config());
        let warnings = build_warnings(&changes);

        Ok(Some(RollbackPlan {
            rollback_id: self.db().generate_id().await?,
            target_timestamp,
            affected_tables,
            total_records,
            estimated_duration: Duration::from_millis(PER_RECORD_COST_MS * total_records as u64),
            risk_level,
            changes_to_rollback: changes,
            warnings,
        }))
    }
}
