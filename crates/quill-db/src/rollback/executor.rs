//! Rollback executor: applies compensating operations from a confirmed plan.
//!
//! Each entry is reversed independently — a failed compensation increments
//! the failure tally and execution moves on. Partial rollback success is
//! preferable to an all-or-nothing abort when entries are independent.

use tracing::{debug, warn};

use quill_core::entities::{ChangeLogEntry, RollbackPlan, RollbackReport};
use quill_core::enums::OperationType;

use crate::error::DatabaseError;
use crate::helpers::{json_to_sql, quote_ident};
use crate::repos::change_log::NewChange;
use crate::service::ChangeTracker;

/// Errors kept verbatim in the summary message; the rest are only counted.
const MAX_REPORTED_ERRORS: usize = 3;

/// What the executor did with a single plan entry.
enum EntryOutcome {
    Reversed,
    /// Audit markers (`rollback`-type entries) are not data mutations.
    Skipped,
    Failed(String),
}

impl ChangeTracker {
    /// Execute a confirmed rollback plan.
    ///
    /// Requires `confirm = true` — planning is always safe and read-only,
    /// execution is not. Takes a `"pre_rollback"` backup point
    /// (best-effort), applies the inverse of each entry newest-first, then
    /// records the rollback itself as a new change-log entry.
    ///
    /// Never returns an error: whole-operation failures come back as a
    /// report with `success = false` and a `"Rollback failed: ..."`
    /// message, per-entry failures as a degraded-success tally.
    pub async fn execute_rollback(
        &self,
        plan: &RollbackPlan,
        confirm: bool,
        author: &str,
    ) -> RollbackReport {
        if !confirm {
            return RollbackReport::refused("Rollback not confirmed");
        }

        // One rollback at a time per process.
        let _guard = self.rollback_lock.lock().await;

        match self.run_rollback(plan, author).await {
            Ok(report) => report,
            Err(e) => {
                warn!(rollback_id = %plan.rollback_id, error = %e, "rollback failed");
                RollbackReport::refused(format!("Rollback failed: {e}"))
            }
        }
    }

    async fn run_rollback(
        &self,
        plan: &RollbackPlan,
        author: &str,
    ) -> Result<RollbackReport, DatabaseError> {
        // Safety net; an empty id means the backup could not be taken but
        // the rollback proceeds regardless.
        let backup_id = self.create_backup_point("pre_rollback").await;
        let backup_id = (!backup_id.is_empty()).then_some(backup_id);

        let mut success_count = 0usize;
        let mut error_count = 0usize;
        let mut errors: Vec<String> = Vec::new();

        for change in &plan.changes_to_rollback {
            match self.reverse_entry(change).await {
                EntryOutcome::Reversed => success_count += 1,
                EntryOutcome::Skipped => {}
                EntryOutcome::Failed(reason) => {
                    error_count += 1;
                    if errors.len() < MAX_REPORTED_ERRORS {
                        errors.push(reason);
                    }
                }
            }
        }

        // The rollback is itself a change: auditable, and reversible in
        // principle.
        let record = NewChange::new(
            OperationType::Rollback,
            "change_log",
            &format!(
                "Rolled back {} change(s) to {}",
                plan.total_records,
                plan.target_timestamp.to_rfc3339()
            ),
        )
        .record_id(&plan.rollback_id)
        .new_data(
            serde_json::json!({
                "rollback_id": plan.rollback_id,
                "target_timestamp": plan.target_timestamp.to_rfc3339(),
                "total_records": plan.total_records,
                "success_count": success_count,
                "error_count": error_count,
                "backup_id": backup_id.as_deref(),
            })
            .as_object()
            .cloned()
            .unwrap_or_default(),
        )
        .author(author);
        let _ = self.log_change(record).await;

        let mut message =
            format!("Rollback completed: {success_count} successful, {error_count} failed");
        if !errors.is_empty() {
            message.push_str("; errors: ");
            message.push_str(&errors.join("; "));
        }
        debug!(rollback_id = %plan.rollback_id, success_count, error_count, "rollback finished");

        Ok(RollbackReport {
            success: error_count == 0,
            message,
            success_count,
            error_count,
            backup_id,
        })
    }

    /// Apply the compensating operation for one entry.
    ///
    /// insert → delete the inserted row; update → restore `old_data`;
    /// delete → re-insert the full row. Entries missing what their
    /// compensation needs count as failures so the summary reflects that
    /// not everything was undone.
    async fn reverse_entry(&self, change: &ChangeLogEntry) -> EntryOutcome {
        let result = match change.operation_type {
            OperationType::Insert => self.reverse_insert(change).await,
            OperationType::Update => self.reverse_update(change).await,
            OperationType::Delete => self.reverse_delete(change).await,
            OperationType::Rollback => return EntryOutcome::Skipped,
        };
        match result {
            Ok(()) => EntryOutcome::Reversed,
            Err(e) => EntryOutcome::Failed(format!(
                "{} {}/{}: {e}",
                change.operation_type,
                change.table_name,
                change.record_id.as_deref().unwrap_or("<unknown>")
            )),
        }
    }

    async fn reverse_insert(&self, change: &ChangeLogEntry) -> Result<(), DatabaseError> {
        let record_id = change.record_id.as_deref().ok_or_else(|| {
            DatabaseError::InvalidState("insert entry has no record_id".to_string())
        })?;
        let table = quote_ident(&change.table_name)?;
        self.db()
            .execute(&format!("DELETE FROM {table} WHERE id = ?1"), [record_id])
            .await?;
        Ok(())
    }

    async fn reverse_update(&self, change: &ChangeLogEntry) -> Result<(), DatabaseError> {
        let record_id = change.record_id.as_deref().ok_or_else(|| {
            DatabaseError::InvalidState("update entry has no record_id".to_string())
        })?;
        let old_data = change.old_data.as_ref().ok_or_else(|| {
            DatabaseError::InvalidState("update entry has no old_data to restore".to_string())
        })?;
        if old_data.is_empty() {
            return Err(DatabaseError::InvalidState(
                "update entry has an empty old_data snapshot".to_string(),
            ));
        }

        let table = quote_ident(&change.table_name)?;
        let mut sets = Vec::with_capacity(old_data.len());
        let mut params: Vec<libsql::Value> = Vec::with_capacity(old_data.len() + 1);
        for (column, value) in old_data {
            params.push(json_to_sql(value));
            sets.push(format!("{} = ?{}", quote_ident(column)?, params.len()));
        }
        params.push(record_id.into());
        let sql = format!(
            "UPDATE {table} SET {} WHERE id = ?{}",
            sets.join(", "),
            params.len()
        );
        self.db()
            .execute(&sql, libsql::params_from_iter(params))
            .await?;
        Ok(())
    }

    async fn reverse_delete(&self, change: &ChangeLogEntry) -> Result<(), DatabaseError> {
        let old_data = change.old_data.as_ref().ok_or_else(|| {
            DatabaseError::InvalidState("delete entry has no old_data to reinsert".to_string())
        })?;
        if old_data.is_empty() {
            return Err(DatabaseError::InvalidState(
                "delete entry has an empty old_data snapshot".to_string(),
            ));
        }

        let table = quote_ident(&change.table_name)?;
        let mut columns = Vec::with_capacity(old_data.len());
        let mut placeholders = Vec::with_capacity(old_data.len());
        let mut params: Vec<libsql::Value> = Vec::with_capacity(old_data.len());
        for (column, value) in old_data {
            params.push(json_to_sql(value));
            columns.push(quote_ident(column)?);
            placeholders.push(format!("?{}", params.len()));
        }
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );
        self.db()
            .execute(&sql, libsql::params_from_iter(params))
            .await?;
        Ok(())
    }
}
