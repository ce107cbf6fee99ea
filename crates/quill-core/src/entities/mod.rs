//! Entity structs for the change-tracking domain.
//!
//! Each persisted entity maps to a table owned by this subsystem
//! (`change_log`, `backup_points`). `RollbackPlan` and `RollbackReport` are
//! ephemeral: computed on demand, consumed once, never persisted.

mod backup;
mod change;
mod plan;

pub use backup::BackupPoint;
pub use change::ChangeLogEntry;
pub use plan::{RollbackPlan, RollbackReport};
