//! Shared test utilities for quill-db tests.

pub(crate) mod helpers {
    use quill_config::TrackingConfig;
    use quill_core::RowData;

    use crate::QuillDb;
    use crate::service::ChangeTracker;

    /// Create an in-memory tracker with default config.
    pub async fn test_tracker() -> ChangeTracker {
        let db = QuillDb::open_local(":memory:").await.unwrap();
        ChangeTracker::from_db(db, "/test/project", TrackingConfig::default())
    }

    /// Build a full-row snapshot from column/value pairs.
    pub fn row_data(pairs: &[(&str, serde_json::Value)]) -> RowData {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }
}
