//! Archive persistence tests on a real on-disk database.

use testforge::history::{ExecutionSummary, HistoryStore};
use testforge::model::{ExecutionMetrics, ExecutionRecord, ExecutionStatus};
use testforge::store::{open_pool, ResultStore};

#[test]
fn test_results_survive_reopen_and_merge() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("archive.db");
    let db_path = db_path.to_str().unwrap();

    {
        let store = ResultStore::new(open_pool(db_path).unwrap());
        let mut rec = ExecutionRecord::new("exec-1");
        rec.status = ExecutionStatus::Running;
        rec.logs = Some("building project".into());
        store.upsert(&rec).unwrap();
    }

    // Reopen: the partial record is still there and later payloads merge
    // into it instead of replacing it.
    let store = ResultStore::new(open_pool(db_path).unwrap());
    let mut update = ExecutionRecord::new("exec-1");
    update.status = ExecutionStatus::Completed;
    update.metrics = Some(ExecutionMetrics {
        tests_run: Some(9),
        success_rate: Some(88.9),
        ..Default::default()
    });
    store.upsert(&update).unwrap();

    let stored = store.get("exec-1").unwrap().unwrap();
    assert_eq!(stored.status, ExecutionStatus::Completed);
    assert_eq!(stored.logs.as_deref(), Some("building project"));
    assert_eq!(stored.metrics.unwrap().tests_run, Some(9));
}

#[test]
fn test_delete_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("archive.db");
    let db_path = db_path.to_str().unwrap();

    {
        let store = ResultStore::new(open_pool(db_path).unwrap());
        store.upsert(&ExecutionRecord::new("exec-gone")).unwrap();
        assert!(store.delete("exec-gone").unwrap());
    }

    let store = ResultStore::new(open_pool(db_path).unwrap());
    assert!(store.get("exec-gone").unwrap().is_none());
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn test_history_and_results_share_one_database() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("archive.db");
    let pool = open_pool(db_path.to_str().unwrap()).unwrap();

    let store = ResultStore::new(pool.clone());
    let history = HistoryStore::new(pool);

    let entry_id = history
        .add("public class Api {}", "@Test void t() {}", "restassured", None)
        .unwrap();

    let mut rec = ExecutionRecord::new("exec-7");
    rec.status = ExecutionStatus::Completed;
    rec.metrics = Some(ExecutionMetrics {
        success_rate: Some(100.0),
        tests_run: Some(4),
        failures: Some(0),
        errors: Some(0),
        ..Default::default()
    });
    store.upsert(&rec).unwrap();

    history
        .update_execution(
            &entry_id,
            &ExecutionSummary {
                execution_id: "exec-7".into(),
                status: ExecutionStatus::Completed,
                success_rate: Some(100.0),
                tests_run: Some(4),
                failures: Some(0),
                errors: Some(0),
            },
        )
        .unwrap();

    let entry = history.get(&entry_id).unwrap().unwrap();
    let linked = entry.execution.unwrap();
    assert_eq!(linked.execution_id, "exec-7");
    assert!(store.get(&linked.execution_id).unwrap().is_some());
}

#[test]
fn test_stats_and_search_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = ResultStore::new(open_pool(dir.path().join("a.db").to_str().unwrap()).unwrap());

    for (id, status, rate) in [
        ("exec-a", ExecutionStatus::Completed, Some(80.0)),
        ("exec-b", ExecutionStatus::Completed, Some(100.0)),
        ("exec-c", ExecutionStatus::Failed, None),
    ] {
        let mut rec = ExecutionRecord::new(id);
        rec.status = status;
        rec.metrics = Some(ExecutionMetrics {
            success_rate: rate,
            ..Default::default()
        });
        store.upsert(&rec).unwrap();
    }

    let stats = store.global_stats().unwrap();
    assert_eq!(stats.total_executions, 3);
    assert!((stats.success_rate - 66.666).abs() < 0.01);
    assert!((stats.avg_test_success_rate - 90.0).abs() < 1e-9);

    let failed = store.search("", Some(ExecutionStatus::Failed)).unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].execution_id, "exec-c");

    let by_id = store.search("EXEC-B", None).unwrap();
    assert_eq!(by_id.len(), 1);
}
