//! Change-tracking and rollback configuration.

use serde::{Deserialize, Serialize};

/// Default retention window for change-log and backup-point rows, in days.
const fn default_retention_days() -> u32 {
    90
}

/// Tables whose changes always push a rollback plan to high risk.
///
/// The project registry and the primary entry log are structurally
/// important: reversing writes to them can detach every other table.
fn default_critical_tables() -> Vec<String> {
    vec!["projects".to_string(), "entries".to_string()]
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackingConfig {
    /// Rows older than this many days are purged by `cleanup_old_changes`.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Critical-table allowlist used by the rollback risk scorer.
    #[serde(default = "default_critical_tables")]
    pub critical_tables: Vec<String>,
}

impl TrackingConfig {
    /// Whether a table is on the critical allowlist.
    #[must_use]
    pub fn is_critical(&self, table_name: &str) -> bool {
        self.critical_tables.iter().any(|t| t == table_name)
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            critical_tables: default_critical_tables(),
        }
    }
}
