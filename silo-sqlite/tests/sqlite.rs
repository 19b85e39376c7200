//! Hermetic integration tests against the bundled SQLite engine.

use silo_core::{
    Blob, Connection, ErrorKind, InputStream, IsolationLevel, MemoryBlob, PoolOptions,
    PreparedStatement, RelationalConnection, RelationalPool, ResultSet, TransactionManager,
    connect_relational, register_driver,
};
use silo_sqlite::SqliteDriver;
use std::sync::{Arc, Once};
use std::thread;
use std::time::{Duration, Instant};

fn setup() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        silo_tests::init_logging();
        register_driver(Arc::new(SqliteDriver::new()));
    });
}

fn temp_db(tag: &str) -> String {
    let path = std::env::temp_dir().join(format!(
        "silo-sqlite-{}-{tag}.db",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&path);
    format!("silo:sqlite://{}", path.display())
}

#[test]
fn typed_round_trip_through_prepared_statements() {
    setup();
    let conn = connect_relational("silo:sqlite://:memory:").unwrap();
    conn.execute_update(
        "CREATE TABLE samples (id INTEGER, label TEXT, ratio REAL, flag INTEGER, \
         born TEXT, seen TEXT, wakeup TEXT, payload BLOB, missing TEXT)",
    )
    .unwrap();

    let mut insert = conn
        .prepare_statement("INSERT INTO samples VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)")
        .unwrap();
    insert.set_i32(1, 41).unwrap();
    insert.set_string(2, "aurora").unwrap();
    insert.set_f64(3, 2.75).unwrap();
    insert.set_bool(4, true).unwrap();
    insert
        .set_date(5, time::macros::date!(2024 - 02 - 29))
        .unwrap();
    insert
        .set_timestamp(6, time::macros::datetime!(2024-02-29 13:05:00))
        .unwrap();
    insert.set_time(7, time::macros::time!(06:45:00)).unwrap();
    insert.set_bytes(8, &[0xde, 0xad, 0xbe, 0xef]).unwrap();
    insert.set_null(9).unwrap();
    assert_eq!(insert.execute_update().unwrap(), 1);

    let mut rows = conn
        .execute_query(
            "SELECT id, label, ratio, flag, born, seen, wakeup, payload, missing FROM samples",
        )
        .unwrap();
    assert!(rows.next().unwrap());
    assert_eq!(rows.get_i32(0).unwrap(), 41);
    assert_eq!(rows.get_string_named("label").unwrap(), "aurora");
    assert!((rows.get_f64(2).unwrap() - 2.75).abs() < f64::EPSILON);
    assert!(rows.get_bool(3).unwrap());
    assert_eq!(rows.get_date(4).unwrap(), time::macros::date!(2024 - 02 - 29));
    assert_eq!(
        rows.get_timestamp(5).unwrap(),
        time::macros::datetime!(2024-02-29 13:05:00)
    );
    assert_eq!(rows.get_time(6).unwrap(), time::macros::time!(06:45:00));
    assert_eq!(rows.get_bytes(7).unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);

    assert!(rows.is_null(8).unwrap());
    assert_eq!(rows.get_string(8).unwrap(), "");
    assert!(rows.was_null());
    assert_eq!(rows.get_i32(0).unwrap(), 41);
    assert!(!rows.was_null());

    assert!(!rows.next().unwrap());
    conn.close().unwrap();
}

#[test]
fn execute_runs_the_statement_and_reports_result_sets() {
    setup();
    let conn = connect_relational("silo:sqlite://:memory:").unwrap();
    conn.execute_update("CREATE TABLE marks (id INTEGER)").unwrap();

    let mut insert = conn
        .prepare_statement("INSERT INTO marks VALUES (?)")
        .unwrap();
    insert.set_i32(1, 7).unwrap();
    assert!(!insert.execute().unwrap());

    // The insert really reached the database.
    let mut rows = conn.execute_query("SELECT COUNT(*) FROM marks").unwrap();
    assert!(rows.next().unwrap());
    assert_eq!(rows.get_i64(0).unwrap(), 1);
    rows.close().unwrap();

    let mut select = conn
        .prepare_statement("SELECT id FROM marks WHERE id = 7")
        .unwrap();
    assert!(select.execute().unwrap());

    // Stepping inside execute did not consume the rows for later reads.
    let mut rows = select.execute_query().unwrap();
    assert!(rows.next().unwrap());
    assert_eq!(rows.get_i32(0).unwrap(), 7);
    conn.close().unwrap();
}

#[test]
fn out_of_range_binds_are_rejected() {
    setup();
    let conn = connect_relational("silo:sqlite://:memory:").unwrap();
    conn.execute_update("CREATE TABLE t (v INTEGER)").unwrap();
    let mut statement = conn.prepare_statement("INSERT INTO t VALUES (?)").unwrap();
    assert_eq!(
        statement.set_i32(2, 1).unwrap_err(),
        ErrorKind::BindError
    );
    assert_eq!(
        statement.set_i32(0, 1).unwrap_err(),
        ErrorKind::BindError
    );
    conn.close().unwrap();
}

#[test]
fn rollback_discards_and_commit_persists() {
    setup();
    let conn = connect_relational("silo:sqlite://:memory:").unwrap();
    conn.execute_update("CREATE TABLE entries (id INTEGER PRIMARY KEY, v TEXT)")
        .unwrap();

    conn.set_auto_commit(false).unwrap();
    conn.execute_update("INSERT INTO entries VALUES (1, 'ghost')")
        .unwrap();
    assert!(conn.transaction_active());
    conn.rollback().unwrap();

    let mut rows = conn
        .execute_query("SELECT COUNT(*) FROM entries WHERE id = 1")
        .unwrap();
    assert!(rows.next().unwrap());
    assert_eq!(rows.get_i64(0).unwrap(), 0);
    rows.close().unwrap();

    conn.execute_update("INSERT INTO entries VALUES (1, 'kept')")
        .unwrap();
    conn.commit().unwrap();

    let mut rows = conn
        .execute_query("SELECT COUNT(*) FROM entries WHERE id = 1")
        .unwrap();
    assert!(rows.next().unwrap());
    assert_eq!(rows.get_i64(0).unwrap(), 1);
    rows.close().unwrap();

    conn.set_auto_commit(true).unwrap();
    assert_eq!(conn.commit().unwrap_err(), ErrorKind::TransactionState);
    conn.close().unwrap();
}

#[test]
fn blob_round_trips_byte_exact() {
    setup();
    let conn = connect_relational("silo:sqlite://:memory:").unwrap();
    conn.execute_update("CREATE TABLE binaries (id INTEGER, body BLOB)")
        .unwrap();

    let mut pattern = MemoryBlob::new();
    let bytes: Vec<u8> = (0..100_000u32).map(|i| (i % 256) as u8).collect();
    pattern.set_bytes(0, &bytes).unwrap();

    let mut insert = conn
        .prepare_statement("INSERT INTO binaries VALUES (1, ?)")
        .unwrap();
    insert.set_blob(1, &pattern).unwrap();
    assert_eq!(insert.execute_update().unwrap(), 1);

    let mut rows = conn
        .execute_query("SELECT body FROM binaries WHERE id = 1")
        .unwrap();
    assert!(rows.next().unwrap());

    let blob = rows.get_blob(0).unwrap();
    assert_eq!(blob.length().unwrap(), 100_000);
    assert_eq!(blob.bytes().unwrap(), bytes);

    let mut stream = rows.get_binary_stream(0).unwrap();
    let mut assembled = Vec::new();
    let mut chunk = [0u8; 4096];
    while let Some(n) = stream.read(&mut chunk).unwrap() {
        assembled.extend_from_slice(&chunk[..n]);
    }
    assert_eq!(assembled, bytes);
    conn.close().unwrap();
}

#[test]
fn closing_the_connection_orphans_children_without_crashing() {
    setup();
    let conn = connect_relational("silo:sqlite://:memory:").unwrap();
    conn.execute_update("CREATE TABLE t (v INTEGER)").unwrap();
    conn.execute_update("INSERT INTO t VALUES (1), (2), (3)")
        .unwrap();

    let mut statement = conn.prepare_statement("SELECT v FROM t").unwrap();
    let mut rows = conn.execute_query("SELECT v FROM t ORDER BY v").unwrap();
    assert!(rows.next().unwrap());

    conn.close().unwrap();
    conn.close().unwrap();

    assert_eq!(rows.next().unwrap_err(), ErrorKind::ConnectionClosed);
    assert_eq!(
        statement.execute_query().err().unwrap(),
        ErrorKind::ConnectionClosed
    );
    statement.close().unwrap();
    rows.close().unwrap();
}

#[test]
fn cursor_state_machine_on_live_queries() {
    setup();
    let conn = connect_relational("silo:sqlite://:memory:").unwrap();
    conn.execute_update("CREATE TABLE seq (n INTEGER)").unwrap();
    conn.execute_update("INSERT INTO seq VALUES (10), (20)")
        .unwrap();

    let mut rows = conn.execute_query("SELECT n FROM seq ORDER BY n").unwrap();
    assert!(rows.is_before_first());
    assert_eq!(rows.get_i32(0).unwrap_err(), ErrorKind::NoCurrentRow);

    assert!(rows.next().unwrap());
    assert_eq!(rows.row(), 1);
    assert_eq!(rows.get_i32(0).unwrap(), 10);
    assert!(rows.next().unwrap());
    assert_eq!(rows.row(), 2);
    assert!(!rows.next().unwrap());
    assert!(rows.is_after_last());
    assert!(!rows.next().unwrap());
    assert_eq!(rows.get_i32(0).unwrap_err(), ErrorKind::NoCurrentRow);
    conn.close().unwrap();
}

#[test]
fn duplicate_column_names_resolve_to_the_first() {
    setup();
    let conn = connect_relational("silo:sqlite://:memory:").unwrap();
    let mut rows = conn
        .execute_query("SELECT 1 AS x, 2 AS x")
        .unwrap();
    assert!(rows.next().unwrap());
    assert_eq!(rows.find_column("x").unwrap(), 0);
    assert_eq!(rows.get_i32_named("x").unwrap(), 1);
    conn.close().unwrap();
}

#[test]
fn isolation_levels_map_onto_sqlite_semantics() {
    setup();
    let conn = connect_relational("silo:sqlite://:memory:").unwrap();
    assert_eq!(conn.transaction_isolation(), IsolationLevel::Serializable);

    conn.set_transaction_isolation(IsolationLevel::ReadUncommitted)
        .unwrap();
    assert_eq!(
        conn.transaction_isolation(),
        IsolationLevel::ReadUncommitted
    );

    conn.set_transaction_isolation(IsolationLevel::ReadCommitted)
        .unwrap();
    assert_eq!(conn.transaction_isolation(), IsolationLevel::Serializable);
    conn.close().unwrap();
}

#[test]
fn pool_reuses_warm_connections_and_times_out_when_saturated() {
    setup();
    let url = temp_db("pool");
    let pool = RelationalPool::open(
        &url,
        PoolOptions {
            initial_size: 1,
            max_size: 1,
            connection_timeout: Duration::from_millis(400),
            ..PoolOptions::default()
        },
    )
    .unwrap();

    {
        let conn = pool.get().unwrap();
        conn.execute_update("CREATE TABLE IF NOT EXISTS marks (v INTEGER)")
            .unwrap();
    }
    assert_eq!(pool.status().idle, 1);

    // Table created on the first borrow is visible on the second: same
    // underlying connection.
    {
        let conn = pool.get().unwrap();
        conn.execute_update("INSERT INTO marks VALUES (7)").unwrap();
    }

    let held = pool.get().unwrap();
    let pool2 = pool.clone();
    let waiter = thread::spawn(move || {
        let started = Instant::now();
        let err = pool2.get().unwrap_err();
        (err, started.elapsed())
    });
    let (err, waited) = waiter.join().unwrap();
    assert_eq!(err, ErrorKind::PoolTimeout);
    assert!(waited >= Duration::from_millis(400));
    drop(held);
    pool.close();
}

#[test]
fn transaction_manager_drives_real_transactions() {
    setup();
    let url = temp_db("txmgr");
    let pool = RelationalPool::open(
        &url,
        PoolOptions {
            initial_size: 1,
            max_size: 1,
            ..PoolOptions::default()
        },
    )
    .unwrap();
    {
        let conn = pool.get().unwrap();
        conn.execute_update("CREATE TABLE ledger (id INTEGER PRIMARY KEY, v TEXT)")
            .unwrap();
    }

    let manager = TransactionManager::new(pool.clone()).unwrap();

    let id = manager.begin_transaction().unwrap();
    assert!(manager.is_transaction_active(&id));
    {
        let conn = manager.transaction_connection(&id).unwrap();
        conn.execute_update("INSERT INTO ledger VALUES (1, 'posted')")
            .unwrap();
    }
    manager.commit_transaction(&id).unwrap();
    assert!(!manager.is_transaction_active(&id));

    let id = manager.begin_transaction().unwrap();
    {
        let conn = manager.transaction_connection(&id).unwrap();
        conn.execute_update("INSERT INTO ledger VALUES (2, 'ghost')")
            .unwrap();
    }
    manager.rollback_transaction(&id).unwrap();

    {
        let conn = pool.get().unwrap();
        assert!(conn.auto_commit().unwrap());
        let mut rows = conn.execute_query("SELECT COUNT(*) FROM ledger").unwrap();
        assert!(rows.next().unwrap());
        assert_eq!(rows.get_i64(0).unwrap(), 1);
    }

    manager.close();
    pool.close();
}
