//! Deferred execution tests.
//!
//! Requests submitted before the pools exist are queued and replayed in
//! submission order once initialization completes; requests submitted after
//! go straight to the pool.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use gatedb::{Binds, CommandKind, Error, ExecuteOptions, ReadinessState};
use gatedb_testing::fixtures::{DUAL_QUERY, TestFixture, init_tracing};
use gatedb_testing::mock_provider::{MockProvider, MockResponse};
use serde_json::json;

fn dual_provider() -> MockProvider {
    MockProvider::builder()
        .with_response(DUAL_QUERY, MockResponse::scalar("1", 1))
        .build()
}

#[tokio::test]
async fn test_queued_request_completes_after_initialize() {
    init_tracing();
    let fixture = TestFixture::two_pools(dual_provider()).unwrap();
    let db = &fixture.db;

    let pending = db.execute_one("A", DUAL_QUERY, Binds::none(), ExecuteOptions::new());
    assert_eq!(db.state(), ReadinessState::NotStarted);
    assert_eq!(db.pending_len(), 1);
    assert!(fixture.provider.executions().is_empty());

    db.initialize().await.unwrap();
    assert!(db.is_ready());
    assert_eq!(db.pending_len(), 0);

    let rs = pending.await.unwrap();
    assert_eq!(rs.len(), 1);
    assert_eq!(rs.first().unwrap().get("1"), Some(&json!(1)));
    assert_eq!(fixture.provider.created_pools(), vec!["A", "B"]);

    // After readiness a call on the other pool is not queued.
    let direct = db.execute_one("B", DUAL_QUERY, Binds::none(), ExecuteOptions::new());
    assert_eq!(db.pending_len(), 0);
    let rs = direct.await.unwrap();
    assert_eq!(rs.first().unwrap().get("1"), Some(&json!(1)));

    let aliases: Vec<String> = fixture
        .provider
        .executions()
        .into_iter()
        .map(|c| c.alias)
        .collect();
    assert_eq!(aliases, vec!["A", "B"]);
}

#[tokio::test]
async fn test_queued_requests_run_in_submission_order() {
    let fixture = TestFixture::two_pools(MockProvider::builder().build()).unwrap();
    let db = &fixture.db;

    let statements: Vec<String> = (0..10).map(|i| format!("UPDATE t SET n = {i}")).collect();
    let mut pending = Vec::new();
    for (i, sql) in statements.iter().enumerate() {
        let alias = if i % 2 == 0 { "A" } else { "B" };
        pending.push(db.execute_one(alias, sql.as_str(), Binds::none(), ExecuteOptions::new()));
    }
    assert_eq!(db.pending_len(), 10);

    db.initialize().await.unwrap();
    for p in pending {
        p.await.unwrap();
    }

    assert_eq!(fixture.provider.executed_statements(), statements);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_submission_order_on_multi_thread_runtime() {
    let fixture = TestFixture::two_pools(MockProvider::builder().build()).unwrap();
    let db = fixture.db.clone();

    let statements: Vec<String> = (0..16).map(|i| format!("UPDATE t SET n = {i}")).collect();
    let pending: Vec<_> = statements
        .iter()
        .enumerate()
        .map(|(i, sql)| {
            let alias = if i % 3 == 0 { "B" } else { "A" };
            db.execute_one(alias, sql.as_str(), Binds::none(), ExecuteOptions::new())
        })
        .collect();

    // Initialize from a worker thread, as an application task would.
    tokio::spawn({
        let db = db.clone();
        async move { db.initialize().await }
    })
    .await
    .unwrap()
    .unwrap();

    for p in pending {
        p.await.unwrap();
    }
    assert_eq!(fixture.provider.executed_statements(), statements);
}

#[tokio::test]
async fn test_queued_outcome_matches_direct_outcome() {
    let provider = MockProvider::builder()
        .with_response(
            "SELECT name FROM users WHERE id = :id",
            MockResponse::rows(["NAME"], vec![vec![json!("Ada")]]),
        )
        .with_response(
            "INSERT INTO users VALUES (:id)",
            MockResponse::error(1, "unique constraint violated"),
        )
        .build();
    let fixture = TestFixture::two_pools(provider).unwrap();
    let db = &fixture.db;
    let binds = Binds::named([("id", 7)]);

    let queued_ok = db.execute_one(
        "A",
        "SELECT name FROM users WHERE id = :id",
        binds.clone(),
        ExecuteOptions::new(),
    );
    let queued_err = db.execute_one(
        "A",
        "INSERT INTO users VALUES (:id)",
        binds.clone(),
        ExecuteOptions::new(),
    );
    db.initialize().await.unwrap();
    let queued_ok = queued_ok.await.unwrap();
    let queued_err = queued_err.await.unwrap_err();

    let direct_ok = db
        .execute_one(
            "A",
            "SELECT name FROM users WHERE id = :id",
            binds.clone(),
            ExecuteOptions::new(),
        )
        .await
        .unwrap();
    let direct_err = db
        .execute_one(
            "A",
            "INSERT INTO users VALUES (:id)",
            binds,
            ExecuteOptions::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(queued_ok, direct_ok);
    assert_eq!(queued_err.to_string(), direct_err.to_string());
    assert!(matches!(queued_err, Error::StatementExecution { ref alias, .. } if alias == "A"));
    assert_eq!(queued_err.driver_error().and_then(|e| e.code()), Some(1));
}

#[tokio::test]
async fn test_dropped_caller_still_runs_queued_request() {
    let fixture = TestFixture::two_pools(MockProvider::builder().build()).unwrap();
    let db = &fixture.db;

    drop(db.execute_one("A", "DELETE FROM audit", Binds::none(), ExecuteOptions::new()));
    let marker = db.execute_one("A", "SELECT 1 FROM DUAL", Binds::none(), ExecuteOptions::new());

    db.initialize().await.unwrap();
    marker.await.unwrap();

    assert_eq!(
        fixture.provider.executed_statements(),
        vec!["DELETE FROM audit", "SELECT 1 FROM DUAL"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_request_during_initialization_is_queued() {
    let provider = MockProvider::builder()
        .with_create_delay(Duration::from_millis(100))
        .build();
    let fixture = TestFixture::two_pools(provider).unwrap();
    let db = fixture.db.clone();

    let init = tokio::spawn({
        let db = db.clone();
        async move { db.initialize().await }
    });
    tokio::task::yield_now().await;
    assert_eq!(db.state(), ReadinessState::Initializing);

    let pending = db.execute_many(
        "B",
        "INSERT INTO t VALUES (:1)",
        vec![Binds::positional([1]), Binds::positional([2])],
        ExecuteOptions::new(),
    );
    assert_eq!(db.pending_len(), 1);

    init.await.unwrap().unwrap();
    let result = pending.await.unwrap();
    assert_eq!(result.rows_affected, 2);

    let calls = fixture.provider.executions();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].kind, CommandKind::Batch);
    assert_eq!(calls[0].binds.len(), 2);
}

#[tokio::test]
async fn test_ready_signal_fires_on_initialize() {
    let fixture = TestFixture::two_pools(MockProvider::builder().build()).unwrap();
    let db = fixture.db.clone();

    let mut signal = db.ready_signal();
    assert!(!signal.is_ready());
    let waiter = tokio::spawn(async move { signal.wait().await });

    db.initialize().await.unwrap();
    waiter.await.unwrap().unwrap();

    // Late subscribers complete immediately.
    let mut late = db.ready_signal();
    assert!(late.is_ready());
    late.wait().await.unwrap();
}

#[tokio::test]
async fn test_unknown_alias_after_ready() {
    let fixture = TestFixture::two_pools(MockProvider::builder().build()).unwrap();
    fixture.db.initialize().await.unwrap();

    let err = fixture
        .db
        .execute_one("C", DUAL_QUERY, Binds::none(), ExecuteOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PoolLookup(ref alias) if alias == "C"));
    assert_eq!(fixture.provider.stats().connections_acquired, 0);
}

#[tokio::test]
async fn test_unknown_alias_queued_fails_after_ready() {
    let fixture = TestFixture::two_pools(MockProvider::builder().build()).unwrap();

    let pending = fixture
        .db
        .execute_one("C", DUAL_QUERY, Binds::none(), ExecuteOptions::new());
    fixture.db.initialize().await.unwrap();

    assert!(matches!(pending.await, Err(Error::PoolLookup(_))));
}
