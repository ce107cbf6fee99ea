//! # quill-db
//!
//! libSQL persistence for the Quill change-tracking and rollback subsystem.
//!
//! Owns the `change_log` and `backup_points` tables, the rollback planner,
//! and the rollback executor. Higher-level tool handlers construct a
//! [`service::ChangeTracker`] and call it on every mutation to a tracked
//! table; the log is the source of truth for undo.

pub mod error;
pub mod helpers;
mod migrations;
pub mod repos;
pub mod rollback;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

use error::DatabaseError;
use libsql::Builder;

/// Database handle for all change-tracking storage operations.
///
/// Wraps a libSQL database and connection behind the three calls the
/// subsystem needs: `execute`, `query`, and `fetchone`. Migrations run
/// automatically on open.
pub struct QuillDb {
    #[allow(dead_code)]
    db: libsql::Database,
    conn: libsql::Connection,
}

impl QuillDb {
    /// Open a local-only database at the given path.
    ///
    /// Runs migrations automatically on first open.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open_local(path: &str) -> Result<Self, DatabaseError> {
        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;

        let quill_db = Self { db, conn };
        quill_db.run_migrations().await?;
        Ok(quill_db)
    }

    /// Access the underlying libSQL connection for direct queries.
    #[must_use]
    pub const fn conn(&self) -> &libsql::Connection {
        &self.conn
    }

    /// Execute a statement, returning the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the statement fails.
    pub async fn execute(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<u64, DatabaseError> {
        Ok(self.conn.execute(sql, params).await?)
    }

    /// Run a query and return the row cursor.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn query(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<libsql::Rows, DatabaseError> {
        Ok(self.conn.query(sql, params).await?)
    }

    /// Run a query and return the first row, if any.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn fetchone(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Option<libsql::Row>, DatabaseError> {
        let mut rows = self.conn.query(sql, params).await?;
        Ok(rows.next().await?)
    }

    /// Generate an opaque 12-char lowercase hex id, e.g. `"a3f8b2c19e04"`.
    ///
    /// Uses `randomblob(6)` in SQL: the 12-hex format of the original id
    /// scheme, but with a real entropy source instead of a timestamp hash.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails or returns no rows.
    pub async fn generate_id(&self) -> Result<String, DatabaseError> {
        let row = self
            .fetchone("SELECT lower(hex(randomblob(6)))", ())
            .await?
            .ok_or(DatabaseError::NoResult)?;
        Ok(row.get::<String>(0)?)
    }
}
