//! Time-based retention for change-log and backup-point rows.

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use crate::error::DatabaseError;
use crate::service::ChangeTracker;

impl ChangeTracker {
    /// Purge change-log and backup-point rows older than the configured
    /// retention window.
    ///
    /// Best-effort housekeeping, typically invoked on a schedule external
    /// to this subsystem: failures are traced, never raised.
    pub async fn cleanup_old_changes(&self) {
        if let Err(e) = self.try_cleanup_old_changes().await {
            warn!(error = %e, "retention cleanup failed");
        }
    }

    async fn try_cleanup_old_changes(&self) -> Result<(), DatabaseError> {
        let cutoff =
            (Utc::now() - Duration::days(i64::from(self.config().retention_days))).to_rfc3339();

        let changes = self
            .db()
            .execute(
                "DELETE FROM change_log WHERE project_root = ?1 AND timestamp < ?2",
                libsql::params![self.project_root(), cutoff.as_str()],
            )
            .await?;
        let backups = self
            .db()
            .execute(
                "DELETE FROM backup_points WHERE project_root = ?1 AND timestamp < ?2",
                libsql::params![self.project_root(), cutoff.as_str()],
            )
            .await?;

        debug!(changes, backups, %cutoff, "retention cleanup done");
        Ok(())
    }
}
