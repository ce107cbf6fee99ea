//! Change log repository.
//!
//! Append-only entries recording every mutation to a tracked table, plus
//! the filtered history query. The log is the source of truth for undo.

use chrono::{DateTime, Utc};
use tracing::warn;

use quill_core::RowData;
use quill_core::entities::ChangeLogEntry;
use quill_core::enums::OperationType;

use crate::error::DatabaseError;
use crate::helpers::{get_opt_string, parse_datetime, parse_enum, parse_optional_json, parse_row_data};
use crate::service::ChangeTracker;

/// A mutation to record, as supplied by the calling tool handler.
///
/// `old_data` is what makes the entry rollback-capable later; at least one
/// of `old_data`/`new_data` is expected to be present.
#[derive(Debug, Clone)]
pub struct NewChange {
    pub operation_type: OperationType,
    pub table_name: String,
    pub record_id: Option<String>,
    pub old_data: Option<RowData>,
    pub new_data: Option<RowData>,
    pub change_summary: String,
    pub author: String,
    pub metadata: Option<serde_json::Value>,
}

impl NewChange {
    /// A new change description with author `"system"` and no payloads.
    #[must_use]
    pub fn new(operation_type: OperationType, table_name: &str, change_summary: &str) -> Self {
        Self {
            operation_type,
            table_name: table_name.to_string(),
            record_id: None,
            old_data: None,
            new_data: None,
            change_summary: change_summary.to_string(),
            author: "system".to_string(),
            metadata: None,
        }
    }

    #[must_use]
    pub fn record_id(mut self, record_id: &str) -> Self {
        self.record_id = Some(record_id.to_string());
        self
    }

    #[must_use]
    pub fn old_data(mut self, old_data: RowData) -> Self {
        self.old_data = Some(old_data);
        self
    }

    #[must_use]
    pub fn new_data(mut self, new_data: RowData) -> Self {
        self.new_data = Some(new_data);
        self
    }

    #[must_use]
    pub fn author(mut self, author: &str) -> Self {
        self.author = author.to_string();
        self
    }

    #[must_use]
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Filter criteria for change-history queries.
#[derive(Debug, Default)]
pub struct HistoryFilter {
    pub table_name: Option<String>,
    pub author: Option<String>,
    pub operation_type: Option<OperationType>,
    /// Only entries strictly after this instant.
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

pub(crate) fn row_to_entry(row: &libsql::Row) -> Result<ChangeLogEntry, DatabaseError> {
    Ok(ChangeLogEntry {
        id: row.get::<String>(0)?,
        timestamp: parse_datetime(&row.get::<String>(1)?)?,
        operation_type: parse_enum(&row.get::<String>(2)?)?,
        table_name: row.get::<String>(3)?,
        record_id: get_opt_string(row, 4)?,
        old_data: parse_row_data(get_opt_string(row, 5)?.as_deref())?,
        new_data: parse_row_data(get_opt_string(row, 6)?.as_deref())?,
        change_summary: row.get::<String>(7)?,
        author: row.get::<String>(8)?,
        metadata: parse_optional_json(get_opt_string(row, 9)?.as_deref())?,
    })
}

pub(crate) const ENTRY_COLUMNS: &str = "id, timestamp, operation_type, table_name, record_id, \
     old_data, new_data, change_summary, author, metadata";

impl ChangeTracker {
    /// Record a mutation in the change log. Called on every write to a
    /// tracked table.
    ///
    /// Never fails outward: logging is diagnostic infrastructure, and a
    /// logging failure must not abort the business operation that
    /// triggered it. Storage errors are traced and the empty string
    /// returned instead of the generated id.
    pub async fn log_change(&self, change: NewChange) -> String {
        match self.try_log_change(change).await {
            Ok(entry) => {
                let id = entry.id.clone();
                self.cache_recent(entry);
                id
            }
            Err(e) => {
                warn!(error = %e, "failed to record change-log entry");
                String::new()
            }
        }
    }

    /// Fallible inner append. The executor uses this directly where a
    /// surfaced error is wanted.
    pub(crate) async fn try_log_change(
        &self,
        change: NewChange,
    ) -> Result<ChangeLogEntry, DatabaseError> {
        let now = Utc::now();
        let id = self.db().generate_id().await?;

        let old_json = change
            .old_data
            .as_ref()
            .map(|m| serde_json::Value::Object(m.clone()).to_string());
        let new_json = change
            .new_data
            .as_ref()
            .map(|m| serde_json::Value::Object(m.clone()).to_string());
        let meta_json = change.metadata.as_ref().map(std::string::ToString::to_string);

        self.db()
            .execute(
                "INSERT INTO change_log (id, timestamp, operation_type, table_name, record_id, \
                 old_data, new_data, change_summary, author, metadata, project_root) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                libsql::params![
                    id.as_str(),
                    now.to_rfc3339(),
                    change.operation_type.as_str(),
                    change.table_name.as_str(),
                    change.record_id.as_deref(),
                    old_json.as_deref(),
                    new_json.as_deref(),
                    change.change_summary.as_str(),
                    change.author.as_str(),
                    meta_json.as_deref(),
                    self.project_root()
                ],
            )
            .await?;

        Ok(ChangeLogEntry {
            id,
            timestamp: now,
            operation_type: change.operation_type,
            table_name: change.table_name,
            record_id: change.record_id,
            old_data: change.old_data,
            new_data: change.new_data,
            change_summary: change.change_summary,
            author: change.author,
            metadata: change.metadata,
        })
    }

    /// Query the change log with optional filters, newest first.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn get_change_history(
        &self,
        filter: &HistoryFilter,
    ) -> Result<Vec<ChangeLogEntry>, DatabaseError> {
        let mut conditions = vec!["project_root = ?1".to_string()];
        let mut params: Vec<libsql::Value> = vec![self.project_root().into()];

        if let Some(ref table) = filter.table_name {
            params.push(table.as_str().into());
            conditions.push(format!("table_name = ?{}", params.len()));
        }
        if let Some(ref author) = filter.author {
            params.push(author.as_str().into());
            conditions.push(format!("author = ?{}", params.len()));
        }
        if let Some(op) = filter.operation_type {
            params.push(op.as_str().into());
            conditions.push(format!("operation_type = ?{}", params.len()));
        }
        if let Some(since) = filter.since {
            params.push(since.to_rfc3339().into());
            conditions.push(format!("timestamp > ?{}", params.len()));
        }

        let limit = filter.limit.unwrap_or(100);
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM change_log WHERE {} \
             ORDER BY timestamp DESC, rowid DESC LIMIT {limit}",
            conditions.join(" AND ")
        );

        let mut rows = self
            .db()
            .query(&sql, libsql::params_from_iter(params))
            .await?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(row_to_entry(&row)?);
        }
        Ok(entries)
    }
}
