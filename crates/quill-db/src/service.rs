//! Service layer tying the change log, planner, and executor together.
//!
//! `ChangeTracker` wraps `QuillDb` (raw database access) with the project
//! scope, tracking configuration, the bounded recent-changes cache, and the
//! process-wide rollback lock. All repo, planner, and executor methods are
//! implemented as `impl ChangeTracker` blocks in their own modules.

use std::sync::Mutex;

use quill_config::TrackingConfig;
use quill_core::entities::ChangeLogEntry;

use crate::QuillDb;
use crate::error::DatabaseError;

/// In-memory recent-changes cache cap; exceeding it trims to the most
/// recent [`RECENT_CACHE_TRIM`] entries so memory stays bounded without
/// losing recent history for fast paths.
pub(crate) const RECENT_CACHE_CAP: usize = 1000;
pub(crate) const RECENT_CACHE_TRIM: usize = 500;

/// Instance-scoped change tracker for a single logical project store.
///
/// Explicitly constructed with a storage handle and project root (never a
/// module-level singleton) so multiple projects and tests can run isolated
/// instances concurrently.
pub struct ChangeTracker {
    db: QuillDb,
    project_root: String,
    config: TrackingConfig,
    /// Ring buffer of the most recently logged entries, newest last.
    pub(crate) recent: Mutex<Vec<ChangeLogEntry>>,
    /// At most one rollback executes at a time per process.
    pub(crate) rollback_lock: tokio::sync::Mutex<()>,
}

impl ChangeTracker {
    /// Create a tracker over a local database with default tracking config.
    ///
    /// # Arguments
    ///
    /// * `db_path` — Path to the libSQL database file, or `":memory:"` for tests.
    /// * `project_root` — Logical project scope; every row this tracker
    ///   writes or reads is tagged/filtered with it.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or
    /// migrations fail.
    pub async fn new_local(db_path: &str, project_root: &str) -> Result<Self, DatabaseError> {
        let db = QuillDb::open_local(db_path).await?;
        Ok(Self::from_db(db, project_root, TrackingConfig::default()))
    }

    /// Create from an existing `QuillDb` with explicit config.
    #[must_use]
    pub fn from_db(db: QuillDb, project_root: &str, config: TrackingConfig) -> Self {
        Self {
            db,
            project_root: project_root.to_string(),
            config,
            recent: Mutex::new(Vec::new()),
            rollback_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Access the underlying database handle.
    #[must_use]
    pub const fn db(&self) -> &QuillDb {
        &self.db
    }

    /// The project root this tracker is scoped to.
    #[must_use]
    pub fn project_root(&self) -> &str {
        &self.project_root
    }

    /// Access the tracking configuration.
    #[must_use]
    pub const fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Append an entry to the recent-changes cache, trimming at the cap.
    pub(crate) fn cache_recent(&self, entry: ChangeLogEntry) {
        let mut recent = self.recent.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        recent.push(entry);
        if recent.len() > RECENT_CACHE_CAP {
            let excess = recent.len() - RECENT_CACHE_TRIM;
            recent.drain(..excess);
        }
    }

    /// The most recently logged entries, newest first, without touching
    /// storage. Serves fast introspection paths only; `get_change_history`
    /// is the authoritative read.
    #[must_use]
    pub fn recent_changes(&self, limit: usize) -> Vec<ChangeLogEntry> {
        let recent = self.recent.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        recent.iter().rev().take(limit).cloned().collect()
    }
}
