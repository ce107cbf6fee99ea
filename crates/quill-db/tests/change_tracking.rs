//! Change-tracking and rollback integration tests.
//!
//! End-to-end coverage for the public surface:
//! - Change recorder: append + history roundtrip
//! - Planner: candidate window, ordering, filters, risk
//! - Executor: compensating operations, confirmation gate, partial failure
//! - Backup points: pre-rollback safety net, restore flow

use chrono::Utc;

use quill_config::TrackingConfig;
use quill_core::RowData;
use quill_core::enums::{OperationType, RiskLevel};
use quill_db::QuillDb;
use quill_db::repos::change_log::{HistoryFilter, NewChange};
use quill_db::service::ChangeTracker;

async fn test_tracker() -> ChangeTracker {
    let db = QuillDb::open_local(":memory:").await.unwrap();
    ChangeTracker::from_db(db, "/test/project", TrackingConfig::default())
}

/// Create the tracked table the tests mutate and roll back.
async fn create_docs_table(tracker: &ChangeTracker) {
    tracker
        .db()
        .execute(
            "CREATE TABLE docs (id TEXT PRIMARY KEY, status TEXT, title TEXT)",
            (),
        )
        .await
        .unwrap();
}

fn row(pairs: &[(&str, serde_json::Value)]) -> RowData {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

async fn doc_status(tracker: &ChangeTracker, id: &str) -> Option<String> {
    tracker
        .db()
        .fetchone("SELECT status FROM docs WHERE id = ?1", [id])
        .await
        .unwrap()
        .map(|r| r.get::<String>(0).unwrap())
}

async fn doc_exists(tracker: &ChangeTracker, id: &str) -> bool {
    tracker
        .db()
        .fetchone("SELECT id FROM docs WHERE id = ?1", [id])
        .await
        .unwrap()
        .is_some()
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

#[tokio::test]
async fn change_log_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("quill.db");
    let db_path = db_path.to_str().unwrap();

    {
        let tracker = ChangeTracker::new_local(db_path, "/test/project")
            .await
            .unwrap();
        tracker
            .log_change(NewChange::new(OperationType::Insert, "docs", "added r1").record_id("r1"))
            .await;
    }

    let tracker = ChangeTracker::new_local(db_path, "/test/project")
        .await
        .unwrap();
    let entries = tracker
        .get_change_history(&HistoryFilter::default())
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].record_id.as_deref(), Some("r1"));
    assert!(
        tracker.recent_changes(10).is_empty(),
        "the in-memory cache does not survive a reopen"
    );
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

#[tokio::test]
async fn plan_selects_entries_after_target_newest_first() {
    let tracker = test_tracker().await;

    tracker
        .log_change(NewChange::new(OperationType::Insert, "docs", "before target").record_id("r0"))
        .await;
    let target = Utc::now();
    tracker
        .log_change(NewChange::new(OperationType::Insert, "docs", "first after").record_id("r1"))
        .await;
    tracker
        .log_change(NewChange::new(OperationType::Insert, "docs", "second after").record_id("r2"))
        .await;

    let plan = tracker
        .create_rollback_plan(target, None, None)
        .await
        .unwrap()
        .expect("plan");

    assert_eq!(plan.total_records, 2);
    assert_eq!(plan.changes_to_rollback[0].change_summary, "second after");
    assert_eq!(plan.changes_to_rollback[1].change_summary, "first after");
    assert!(
        plan.changes_to_rollback[0].timestamp >= plan.changes_to_rollback[1].timestamp,
        "candidates must be newest first"
    );
    assert_eq!(plan.affected_tables, vec!["docs".to_string()]);
    assert_eq!(plan.estimated_duration.as_millis(), 200);
    assert_eq!(plan.rollback_id.len(), 12);
}

#[tokio::test]
async fn plan_is_none_when_nothing_to_roll_back() {
    let tracker = test_tracker().await;
    tracker
        .log_change(NewChange::new(OperationType::Insert, "docs", "old").record_id("r1"))
        .await;

    let plan = tracker
        .create_rollback_plan(Utc::now(), None, None)
        .await
        .unwrap();
    assert!(plan.is_none());
}

#[tokio::test]
async fn plan_respects_table_and_author_filters() {
    let tracker = test_tracker().await;
    let target = Utc::now();

    tracker
        .log_change(
            NewChange::new(OperationType::Insert, "docs", "doc change")
                .record_id("r1")
                .author("alice"),
        )
        .await;
    tracker
        .log_change(
            NewChange::new(OperationType::Insert, "notes", "note change")
                .record_id("n1")
                .author("bob"),
        )
        .await;

    let docs_only = tracker
        .create_rollback_plan(target, Some(&["docs".to_string()]), None)
        .await
        .unwrap()
        .expect("plan");
    assert_eq!(docs_only.total_records, 1);
    assert_eq!(docs_only.affected_tables, vec!["docs".to_string()]);

    let bob_only = tracker
        .create_rollback_plan(target, None, Some("bob"))
        .await
        .unwrap()
        .expect("plan");
    assert_eq!(bob_only.total_records, 1);
    assert_eq!(bob_only.changes_to_rollback[0].author, "bob");

    let neither = tracker
        .create_rollback_plan(target, Some(&["ghosts".to_string()]), Some("carol"))
        .await
        .unwrap();
    assert!(neither.is_none());
}

#[tokio::test]
async fn plan_flags_critical_tables_as_high_risk() {
    let db = QuillDb::open_local(":memory:").await.unwrap();
    let config = TrackingConfig {
        critical_tables: vec!["registry".to_string()],
        ..TrackingConfig::default()
    };
    let tracker = ChangeTracker::from_db(db, "/test/project", config);
    let target = Utc::now();

    tracker
        .log_change(NewChange::new(OperationType::Update, "registry", "rename").record_id("p1"))
        .await;

    let plan = tracker
        .create_rollback_plan(target, None, None)
        .await
        .unwrap()
        .expect("plan");
    assert_eq!(plan.risk_level, RiskLevel::High);
}

// ---------------------------------------------------------------------------
// Executor: compensating operations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rollback_of_insert_deletes_the_row() {
    let tracker = test_tracker().await;
    create_docs_table(&tracker).await;
    let target = Utc::now();

    tracker
        .db()
        .execute(
            "INSERT INTO docs (id, status, title) VALUES ('r1', 'draft', 'Hello')",
            (),
        )
        .await
        .unwrap();
    tracker
        .log_change(
            NewChange::new(OperationType::Insert, "docs", "added r1")
                .record_id("r1")
                .new_data(row(&[("id", "r1".into()), ("status", "draft".into())])),
        )
        .await;

    let plan = tracker
        .create_rollback_plan(target, None, None)
        .await
        .unwrap()
        .expect("plan");
    let report = tracker.execute_rollback(&plan, true, "rollback_system").await;

    assert!(report.success);
    assert_eq!(report.message, "Rollback completed: 1 successful, 0 failed");
    assert!(!doc_exists(&tracker, "r1").await);
}

#[tokio::test]
async fn rollback_of_update_restores_old_values() {
    let tracker = test_tracker().await;
    create_docs_table(&tracker).await;

    tracker
        .db()
        .execute(
            "INSERT INTO docs (id, status, title) VALUES ('r1', 'draft', 'Hello')",
            (),
        )
        .await
        .unwrap();
    let target = Utc::now();

    tracker
        .db()
        .execute("UPDATE docs SET status = 'final' WHERE id = 'r1'", ())
        .await
        .unwrap();
    tracker
        .log_change(
            NewChange::new(OperationType::Update, "docs", "draft -> final")
                .record_id("r1")
                .old_data(row(&[("status", "draft".into())]))
                .new_data(row(&[("status", "final".into())])),
        )
        .await;

    let plan = tracker
        .create_rollback_plan(target, None, None)
        .await
        .unwrap()
        .expect("plan");
    let report = tracker.execute_rollback(&plan, true, "rollback_system").await;

    assert!(report.success);
    assert_eq!(doc_status(&tracker, "r1").await.as_deref(), Some("draft"));
    // Columns outside old_data stay untouched
    let title = tracker
        .db()
        .fetchone("SELECT title FROM docs WHERE id = 'r1'", ())
        .await
        .unwrap()
        .unwrap()
        .get::<String>(0)
        .unwrap();
    assert_eq!(title, "Hello");
}

#[tokio::test]
async fn rollback_of_delete_reinserts_the_row() {
    let tracker = test_tracker().await;
    create_docs_table(&tracker).await;

    tracker
        .db()
        .execute(
            "INSERT INTO docs (id, status, title) VALUES ('r1', 'final', 'Hello')",
            (),
        )
        .await
        .unwrap();
    let target = Utc::now();

    tracker
        .db()
        .execute("DELETE FROM docs WHERE id = 'r1'", ())
        .await
        .unwrap();
    tracker
        .log_change(
            NewChange::new(OperationType::Delete, "docs", "removed r1")
                .record_id("r1")
                .old_data(row(&[
                    ("id", "r1".into()),
                    ("status", "final".into()),
                    ("title", "Hello".into()),
                ])),
        )
        .await;

    let plan = tracker
        .create_rollback_plan(target, None, None)
        .await
        .unwrap()
        .expect("plan");
    let report = tracker.execute_rollback(&plan, true, "rollback_system").await;

    assert!(report.success);
    assert_eq!(doc_status(&tracker, "r1").await.as_deref(), Some("final"));
}

// ---------------------------------------------------------------------------
// Executor: gates and failure policy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unconfirmed_rollback_performs_no_writes() {
    let tracker = test_tracker().await;
    create_docs_table(&tracker).await;
    let target = Utc::now();

    tracker
        .db()
        .execute("INSERT INTO docs (id, status) VALUES ('r1', 'draft')", ())
        .await
        .unwrap();
    tracker
        .log_change(NewChange::new(OperationType::Insert, "docs", "added r1").record_id("r1"))
        .await;

    let plan = tracker
        .create_rollback_plan(target, None, None)
        .await
        .unwrap()
        .expect("plan");
    let report = tracker.execute_rollback(&plan, false, "rollback_system").await;

    assert!(!report.success);
    assert_eq!(report.message, "Rollback not confirmed");
    assert!(report.backup_id.is_none());
    assert!(doc_exists(&tracker, "r1").await, "row must survive");
    assert!(
        tracker.get_backup_points(50).await.unwrap().is_empty(),
        "no pre_rollback backup point without confirmation"
    );
}

#[tokio::test]
async fn partial_failure_applies_remaining_entries() {
    let tracker = test_tracker().await;
    create_docs_table(&tracker).await;
    let target = Utc::now();

    tracker
        .db()
        .execute("INSERT INTO docs (id, status) VALUES ('r1', 'draft')", ())
        .await
        .unwrap();
    tracker
        .log_change(NewChange::new(OperationType::Insert, "docs", "added r1").record_id("r1"))
        .await;
    // Reinserting into a table that does not exist must fail in isolation.
    tracker
        .log_change(
            NewChange::new(OperationType::Delete, "ghosts", "removed g1")
                .record_id("g1")
                .old_data(row(&[("id", "g1".into())])),
        )
        .await;

    let plan = tracker
        .create_rollback_plan(target, None, None)
        .await
        .unwrap()
        .expect("plan");
    assert_eq!(plan.total_records, 2);

    let report = tracker.execute_rollback(&plan, true, "rollback_system").await;
    assert!(!report.success);
    assert_eq!(report.success_count, 1);
    assert_eq!(report.error_count, 1);
    assert!(report.message.contains("1 successful, 1 failed"));
    assert!(report.message.contains("ghosts"));
    assert!(!doc_exists(&tracker, "r1").await, "good entry still applied");
}

#[tokio::test]
async fn update_without_old_data_counts_as_failure() {
    let tracker = test_tracker().await;
    create_docs_table(&tracker).await;
    let target = Utc::now();

    tracker
        .db()
        .execute("INSERT INTO docs (id, status) VALUES ('r1', 'final')", ())
        .await
        .unwrap();
    tracker
        .log_change(
            NewChange::new(OperationType::Update, "docs", "blind update")
                .record_id("r1")
                .new_data(row(&[("status", "final".into())])),
        )
        .await;

    let plan = tracker
        .create_rollback_plan(target, None, None)
        .await
        .unwrap()
        .expect("plan");
    assert!(
        plan.warnings.iter().any(|w| w.contains("no before-image")),
        "planner must warn about the missing before-image"
    );

    let report = tracker.execute_rollback(&plan, true, "rollback_system").await;
    assert!(!report.success);
    assert_eq!(report.success_count, 0);
    assert_eq!(report.error_count, 1);
    assert_eq!(doc_status(&tracker, "r1").await.as_deref(), Some("final"));
}

// ---------------------------------------------------------------------------
// Executor: audit trail and safety net
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rollback_is_logged_as_a_change() {
    let tracker = test_tracker().await;
    create_docs_table(&tracker).await;
    let target = Utc::now();

    tracker
        .db()
        .execute("INSERT INTO docs (id, status) VALUES ('r1', 'draft')", ())
        .await
        .unwrap();
    tracker
        .log_change(NewChange::new(OperationType::Insert, "docs", "added r1").record_id("r1"))
        .await;

    let plan = tracker
        .create_rollback_plan(target, None, None)
        .await
        .unwrap()
        .expect("plan");
    let report = tracker.execute_rollback(&plan, true, "rollback_system").await;

    let rollbacks = tracker
        .get_change_history(&HistoryFilter {
            operation_type: Some(OperationType::Rollback),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(rollbacks.len(), 1);
    let entry = &rollbacks[0];
    assert_eq!(entry.table_name, "change_log");
    assert_eq!(entry.author, "rollback_system");
    assert_eq!(entry.record_id.as_deref(), Some(plan.rollback_id.as_str()));

    let new_data = entry.new_data.as_ref().expect("rollback entry payload");
    assert_eq!(new_data.get("total_records"), Some(&serde_json::json!(1)));
    assert_eq!(new_data.get("success_count"), Some(&serde_json::json!(1)));
    assert_eq!(
        new_data.get("backup_id"),
        Some(&serde_json::json!(report.backup_id))
    );

    // The safety net was taken before compensations ran.
    let points = tracker.get_backup_points(50).await.unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].name, "pre_rollback");
    assert_eq!(Some(points[0].id.as_str()), report.backup_id.as_deref());
}

// ---------------------------------------------------------------------------
// Restore from backup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn restore_from_backup_reverses_changes_after_the_anchor() {
    let tracker = test_tracker().await;
    create_docs_table(&tracker).await;

    tracker
        .db()
        .execute("INSERT INTO docs (id, status) VALUES ('r1', 'draft')", ())
        .await
        .unwrap();
    let backup_id = tracker.create_backup_point("before_edit").await;

    tracker
        .db()
        .execute("UPDATE docs SET status = 'final' WHERE id = 'r1'", ())
        .await
        .unwrap();
    tracker
        .log_change(
            NewChange::new(OperationType::Update, "docs", "draft -> final")
                .record_id("r1")
                .old_data(row(&[("status", "draft".into())]))
                .new_data(row(&[("status", "final".into())])),
        )
        .await;

    let report = tracker.restore_from_backup(&backup_id, true).await;
    assert!(report.success, "restore failed: {}", report.message);
    assert_eq!(doc_status(&tracker, "r1").await.as_deref(), Some("draft"));

    // The restore's rollback entry carries the delegated author.
    let rollbacks = tracker
        .get_change_history(&HistoryFilter {
            operation_type: Some(OperationType::Rollback),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(rollbacks.len(), 1);
    assert_eq!(rollbacks[0].author, "backup_restore");
}

// ---------------------------------------------------------------------------
// The two-entry scenario
// ---------------------------------------------------------------------------

#[tokio::test]
async fn insert_then_update_scenario_rolls_back_cleanly() {
    let tracker = test_tracker().await;
    create_docs_table(&tracker).await;
    let target = Utc::now();

    tracker
        .db()
        .execute("INSERT INTO docs (id, status) VALUES ('r1', 'draft')", ())
        .await
        .unwrap();
    tracker
        .log_change(
            NewChange::new(OperationType::Insert, "docs", "added r1")
                .record_id("r1")
                .new_data(row(&[("id", "r1".into()), ("status", "draft".into())])),
        )
        .await;

    tracker
        .db()
        .execute("UPDATE docs SET status = 'final' WHERE id = 'r1'", ())
        .await
        .unwrap();
    tracker
        .log_change(
            NewChange::new(OperationType::Update, "docs", "draft -> final")
                .record_id("r1")
                .old_data(row(&[("status", "draft".into())]))
                .new_data(row(&[("status", "final".into())])),
        )
        .await;

    let plan = tracker
        .create_rollback_plan(target, None, None)
        .await
        .unwrap()
        .expect("plan");
    assert_eq!(plan.total_records, 2);
    assert_eq!(
        plan.changes_to_rollback[0].operation_type,
        OperationType::Update,
        "newest (the update) comes first"
    );
    assert_eq!(
        plan.changes_to_rollback[1].operation_type,
        OperationType::Insert
    );
    assert!(plan.risk_level >= RiskLevel::Low);

    let report = tracker.execute_rollback(&plan, true, "rollback_system").await;
    assert!(report.success);
    assert_eq!(report.message, "Rollback completed: 2 successful, 0 failed");
    assert!(!doc_exists(&tracker, "r1").await, "insert was reversed last");
}
