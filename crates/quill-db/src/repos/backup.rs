//! Backup point repository.
//!
//! Named timestamp anchors used both for manual "restore to backup"
//! operations and as the automatic safety net before any rollback executes.

use chrono::Utc;
use tracing::warn;

use quill_core::entities::{BackupPoint, RollbackReport};

use crate::error::DatabaseError;
use crate::helpers::{parse_datetime, parse_optional_json};
use crate::service::ChangeTracker;

fn row_to_backup_point(row: &libsql::Row) -> Result<BackupPoint, DatabaseError> {
    Ok(BackupPoint {
        id: row.get::<String>(0)?,
        name: row.get::<String>(1)?,
        timestamp: parse_datetime(&row.get::<String>(2)?)?,
        metadata: parse_optional_json(row.get::<Option<String>>(3)?.as_deref())?,
    })
}

impl ChangeTracker {
    /// Create a named timestamp anchor at the current instant.
    ///
    /// Never fails outward, mirroring [`Self::log_change`]: storage errors
    /// are traced and the empty string returned instead of the id.
    pub async fn create_backup_point(&self, name: &str) -> String {
        match self.try_create_backup_point(name).await {
            Ok(id) => id,
            Err(e) => {
                warn!(name, error = %e, "failed to create backup point");
                String::new()
            }
        }
    }

    async fn try_create_backup_point(&self, name: &str) -> Result<String, DatabaseError> {
        let id = self.db().generate_id().await?;
        let now = Utc::now();
        self.db()
            .execute(
                "INSERT INTO backup_points (id, name, timestamp, project_root, metadata) \
                 VALUES (?1, ?2, ?3, ?4, NULL)",
                libsql::params![
                    id.as_str(),
                    name,
                    now.to_rfc3339(),
                    self.project_root()
                ],
            )
            .await?;
        Ok(id)
    }

    /// The most recent backup points, newest first.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn get_backup_points(&self, limit: u32) -> Result<Vec<BackupPoint>, DatabaseError> {
        let mut rows = self
            .db()
            .query(
                &format!(
                    "SELECT id, name, timestamp, metadata FROM backup_points \
                     WHERE project_root = ?1 \
                     ORDER BY timestamp DESC, rowid DESC LIMIT {limit}"
                ),
                [self.project_root()],
            )
            .await?;
        let mut points = Vec::new();
        while let Some(row) = rows.next().await? {
            points.push(row_to_backup_point(&row)?);
        }
        Ok(points)
    }

    /// Roll the project back to the instant a backup point was taken.
    ///
    /// Looks up the backup's timestamp, plans, then executes with author
    /// `"backup_restore"`. An unknown id or an unconfirmed call performs
    /// no writes.
    pub async fn restore_from_backup(&self, backup_id: &str, confirm: bool) -> RollbackReport {
        if !confirm {
            return RollbackReport::refused("Restore not confirmed");
        }

        let point = match self.find_backup_point(backup_id).await {
            Ok(Some(point)) => point,
            Ok(None) => return RollbackReport::refused("Backup point not found"),
            Err(e) => {
                warn!(backup_id, error = %e, "backup point lookup failed");
                return RollbackReport::refused(format!("Restore failed: {e}"));
            }
        };

        let plan = match self
            .create_rollback_plan(point.timestamp, None, None)
            .await
        {
            Ok(Some(plan)) => plan,
            Ok(None) => {
                // Nothing happened after the backup: a successful no-op.
                return RollbackReport {
                    success: true,
                    message: "No changes to roll back since backup".to_string(),
                    success_count: 0,
                    error_count: 0,
                    backup_id: None,
                };
            }
            Err(e) => {
                warn!(backup_id, error = %e, "restore planning failed");
                return RollbackReport::refused(format!("Restore failed: {e}"));
            }
        };

        self.execute_rollback(&plan, true, "backup_restore").await
    }

    async fn find_backup_point(
        &self,
        backup_id: &str,
    ) -> Result<Option<BackupPoint>, DatabaseError> {
        let row = self
            .db()
            .fetchone(
                "SELECT id, name, timestamp, metadata FROM backup_points \
                 WHERE id = ?1 AND project_root = ?2",
                libsql::params![backup_id, self.project_root()],
            )
            .await?;
        row.as_ref().map(row_to_backup_point).transpose()
    }
}
