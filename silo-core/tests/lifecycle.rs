//! End-to-end behavior of the core against the in-memory fake backend:
//! registry dispatch, pool lifecycle, statement invalidation and the named
//! transaction manager.

use silo_core::{
    ColumnarConnection, ColumnarPool, Connection, DocumentCollection, DocumentConnection,
    ErrorKind, IsolationLevel, KvConnection, KvPool, KvReply, PoolOptions, PreparedStatement,
    RelationalConnection, RelationalPool, ResultSet, TransactionManager, Value, connect_columnar,
    connect_document, connect_kv, connect_relational,
};
use silo_tests::{FakeBackend, FakeDriver, FakeOutcome};
use std::sync::atomic::Ordering;
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

struct Handles {
    relational: Arc<FakeBackend>,
    columnar: Arc<FakeBackend>,
    kv: Arc<FakeBackend>,
}

fn handles() -> &'static Handles {
    static HANDLES: OnceLock<Handles> = OnceLock::new();
    HANDLES.get_or_init(|| {
        silo_tests::init_logging();
        let relational = FakeDriver::relational();
        let document = FakeDriver::document();
        let columnar = FakeDriver::columnar();
        let kv = FakeDriver::kv();
        let handles = Handles {
            relational: relational.backend(),
            columnar: columnar.backend(),
            kv: kv.backend(),
        };
        silo_core::register_driver(Arc::new(relational));
        silo_core::register_driver(Arc::new(document));
        silo_core::register_driver(Arc::new(columnar));
        silo_core::register_driver(Arc::new(kv));
        handles
    })
}

fn pool_options() -> PoolOptions {
    PoolOptions {
        initial_size: 1,
        max_size: 2,
        connection_timeout: Duration::from_millis(2000),
        validation_interval: Duration::from_millis(10_000),
        ..PoolOptions::default()
    }
}

#[test]
fn registry_dispatches_by_scheme_and_family() {
    handles();
    let conn = connect_relational("silo:fakesql://localhost/app").unwrap();
    assert!(!conn.is_closed());
    conn.close().unwrap();

    let err = connect_relational("silo:fakedoc://localhost/app").err().unwrap();
    assert_eq!(err, ErrorKind::WrongFamily);

    let err = connect_kv("silo:nosuchthing://localhost").err().unwrap();
    assert_eq!(err, ErrorKind::NoDriver);
}

#[test]
fn closing_a_connection_orphans_its_statements() {
    handles();
    let conn = connect_relational("silo:fakesql://localhost/app").unwrap();
    let mut statement = conn.prepare_statement("SELECT name FROM users").unwrap();
    conn.close().unwrap();
    conn.close().unwrap();

    let err = statement.execute_query().err().unwrap();
    assert_eq!(err, ErrorKind::ConnectionClosed);
    let err = statement.set_i32(1, 5).unwrap_err();
    assert_eq!(err, ErrorKind::ConnectionClosed);

    // Closing the orphaned statement stays legal and idempotent.
    statement.close().unwrap();
    statement.close().unwrap();
}

#[test]
fn pooled_sessions_come_back_reset() {
    let handles = handles();
    let pool = RelationalPool::open("silo:fakesql://localhost/app", pool_options()).unwrap();

    let rollbacks_before = handles.relational.rollbacks.load(Ordering::SeqCst);
    {
        let conn = pool.get().unwrap();
        conn.begin().unwrap();
        conn.execute_update("UPDATE t SET v = 1").unwrap();
        assert!(conn.transaction_active());
        assert!(!conn.auto_commit().unwrap());
    }
    // Other tests share this backend, so the counter is a lower bound.
    assert!(handles.relational.rollbacks.load(Ordering::SeqCst) > rollbacks_before);

    let conn = pool.get().unwrap();
    assert!(conn.auto_commit().unwrap());
    assert!(!conn.transaction_active());
    drop(conn);
    pool.close();
}

#[test]
fn pool_applies_default_isolation_on_borrow() {
    handles();
    let mut options = pool_options();
    options.transaction_isolation = Some(IsolationLevel::Serializable);
    let pool = RelationalPool::open("silo:fakesql://localhost/app", options).unwrap();
    let conn = pool.get().unwrap();
    assert_eq!(conn.transaction_isolation(), IsolationLevel::Serializable);
    drop(conn);
    pool.close();
}

#[test]
fn two_borrowers_share_one_underlying_connection() {
    handles();
    let pool = RelationalPool::open(
        "silo:fakesql://localhost/app",
        PoolOptions {
            initial_size: 1,
            max_size: 1,
            connection_timeout: Duration::from_millis(2000),
            ..PoolOptions::default()
        },
    )
    .unwrap();

    let id_of = |pool: &RelationalPool| {
        let conn = pool.get().unwrap();
        let mut rows = conn.execute_query("select connection_id").unwrap();
        assert!(rows.next().unwrap());
        rows.get_i64(0).unwrap()
    };

    let first = id_of(&pool);
    let second = id_of(&pool);
    assert_eq!(first, second);
    pool.close();
}

#[test]
fn transaction_manager_commit_and_rollback_round_trip() {
    let handles = handles();
    let pool = RelationalPool::open("silo:fakesql://localhost/app", pool_options()).unwrap();
    let manager = TransactionManager::new(pool.clone()).unwrap();

    let commits_before = handles.relational.commits.load(Ordering::SeqCst);
    let id = manager.begin_transaction().unwrap();
    assert!(manager.is_transaction_active(&id));
    assert_eq!(manager.active_transaction_count(), 1);

    {
        let conn = manager.transaction_connection(&id).unwrap();
        conn.execute_update("INSERT INTO t VALUES (1)").unwrap();
        assert!(conn.transaction_active());
    }

    manager.commit_transaction(&id).unwrap();
    assert!(!manager.is_transaction_active(&id));
    assert!(handles.relational.commits.load(Ordering::SeqCst) > commits_before);
    assert_eq!(
        manager.transaction_connection(&id).unwrap_err(),
        ErrorKind::UnknownTransaction
    );
    assert_eq!(
        manager.commit_transaction(&id).unwrap_err(),
        ErrorKind::UnknownTransaction
    );

    let rollbacks_before = handles.relational.rollbacks.load(Ordering::SeqCst);
    let id = manager.begin_transaction().unwrap();
    manager
        .transaction_connection(&id)
        .unwrap()
        .execute_update("INSERT INTO t VALUES (2)")
        .unwrap();
    manager.rollback_transaction(&id).unwrap();
    assert!(handles.relational.rollbacks.load(Ordering::SeqCst) > rollbacks_before);

    manager.close();
    pool.close();
}

#[test]
fn idle_transactions_are_reaped_and_their_connections_released() {
    handles();
    let pool = RelationalPool::open(
        "silo:fakesql://localhost/reaper",
        PoolOptions {
            initial_size: 1,
            max_size: 1,
            ..PoolOptions::default()
        },
    )
    .unwrap();
    let manager = TransactionManager::with_settings(
        pool.clone(),
        Duration::from_millis(200),
        Duration::from_millis(100),
    )
    .unwrap();

    let id = manager.begin_transaction().unwrap();
    assert_eq!(pool.status().idle, 0);

    thread::sleep(Duration::from_millis(500));
    assert!(!manager.is_transaction_active(&id));
    assert_eq!(pool.status().idle, 1);
    assert_eq!(manager.active_transaction_count(), 0);

    manager.close();
    pool.close();
}

#[test]
fn manager_close_rolls_back_survivors() {
    let handles = handles();
    let pool = RelationalPool::open("silo:fakesql://localhost/app", pool_options()).unwrap();
    let manager = TransactionManager::new(pool.clone()).unwrap();

    let rollbacks_before = handles.relational.rollbacks.load(Ordering::SeqCst);
    let id = manager.begin_transaction().unwrap();
    manager
        .transaction_connection(&id)
        .unwrap()
        .execute_update("UPDATE t SET v = 9")
        .unwrap();

    manager.close();
    manager.close();
    assert!(handles.relational.rollbacks.load(Ordering::SeqCst) > rollbacks_before);
    assert_eq!(manager.active_transaction_count(), 0);
    pool.close();
}

#[test]
fn kv_pool_replaces_connections_that_fail_ping() {
    let handles = handles();
    let pool = KvPool::open(
        "silo:fakekv://localhost/0",
        PoolOptions {
            initial_size: 1,
            max_size: 1,
            connection_timeout: Duration::from_millis(2000),
            ..PoolOptions::default()
        },
    )
    .unwrap();

    let created_before = handles.kv.connections_created.load(Ordering::SeqCst);
    handles.kv.fail_next_pings(1);
    let conn = pool.get().unwrap();
    // The poisoned candidate was destroyed and exactly one replacement made.
    assert_eq!(
        handles.kv.connections_created.load(Ordering::SeqCst),
        created_before + 1
    );

    assert_eq!(
        conn.command(&["SET", "greeting", "hello"]).unwrap(),
        KvReply::Status("OK".to_string())
    );
    assert_eq!(
        conn.command(&["GET", "greeting"]).unwrap().as_str().unwrap(),
        "hello"
    );
    assert!(conn.command(&["GET", "missing"]).unwrap().is_nil());
    drop(conn);
    pool.close();
}

#[test]
fn document_connections_manage_collections() {
    handles();
    let conn = connect_document("silo:fakedoc://localhost/appdb").unwrap();

    conn.create_collection("people").unwrap();
    assert!(conn.collection_exists("people").unwrap());

    let id = conn
        .create_document("people", serde_json::json!({ "name": "ada", "age": 36 }))
        .unwrap();
    assert!(!id.is_empty());

    let people = conn.collection("people").unwrap();
    people
        .insert_one(serde_json::json!({ "name": "grace", "age": 45 }))
        .unwrap();
    assert_eq!(people.count(serde_json::json!({})).unwrap(), 2);

    let found = people.find(serde_json::json!({ "name": "ada" })).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["age"], 36);

    let touched = people
        .update_many(
            serde_json::json!({ "name": "ada" }),
            serde_json::json!({ "$set": { "age": 37 } }),
        )
        .unwrap();
    assert_eq!(touched, 1);
    assert_eq!(
        people.find(serde_json::json!({ "name": "ada" })).unwrap()[0]["age"],
        37
    );

    assert_eq!(people.delete_many(serde_json::json!({})).unwrap(), 2);
    conn.drop_collection("people").unwrap();
    assert!(!conn.collection_exists("people").unwrap());

    let pong = conn.run_command(serde_json::json!({ "ping": 1 })).unwrap();
    assert_eq!(pong["ok"], 1);
    conn.close().unwrap();
}

#[test]
fn columnar_prepared_statements_execute_scripted_rows() {
    let handles = handles();
    handles.columnar.script(
        "SELECT id, city FROM places",
        FakeOutcome::Rows {
            columns: vec!["id".to_string(), "city".to_string()],
            rows: vec![
                vec![Value::Int64(Some(1)), Value::Varchar(Some("zurich".into()))],
                vec![Value::Int64(Some(2)), Value::Varchar(Some("oslo".into()))],
            ],
        },
    );

    let conn = connect_columnar("silo:fakecql://localhost/metrics").unwrap();
    let mut statement = conn.prepare_statement("SELECT id, city FROM places").unwrap();
    assert!(statement.execute().unwrap());
    let mut rows = statement.execute_query().unwrap();
    assert!(rows.next().unwrap());
    assert_eq!(rows.get_string_named("city").unwrap(), "zurich");
    assert!(rows.next().unwrap());
    assert_eq!(rows.get_i64(0).unwrap(), 2);
    assert!(!rows.next().unwrap());
    rows.close().unwrap();
    statement.close().unwrap();
    conn.close().unwrap();

    let pool = ColumnarPool::open(
        "silo:fakecql://localhost/metrics",
        PoolOptions {
            initial_size: 1,
            max_size: 1,
            validation_query: "SELECT now FROM system_local".to_string(),
            ..PoolOptions::default()
        },
    )
    .unwrap();
    let conn = pool.get().unwrap();
    assert_eq!(conn.execute_update("TRUNCATE places").unwrap(), 0);
    drop(conn);
    pool.close();
}

#[test]
fn connect_failures_surface_from_pool_creation() {
    handles();
    // A private backend, so the scripted failure cannot leak into tests
    // running in parallel on the shared one.
    let driver = FakeDriver::relational_with_scheme("fakesqlflaky");
    let backend = driver.backend();
    silo_core::register_driver(Arc::new(driver));

    backend.fail_next_connects(1);
    let err = RelationalPool::open(
        "silo:fakesqlflaky://localhost/app",
        PoolOptions {
            initial_size: 1,
            ..PoolOptions::default()
        },
    )
    .err()
    .unwrap();
    assert_eq!(err, ErrorKind::ConnectFailure);
}
