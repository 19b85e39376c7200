//! Integration tests against a live ScyllaDB (or Cassandra) node.
//!
//! Gated on `SILO_SCYLLADB_URL` (e.g. `silo:scylladb://127.0.0.1:9042/silo_test`,
//! keyspace created in advance); without it every test skips silently.

use silo_core::{
    ColumnarConnection, ColumnarPool, Connection, PoolOptions, PreparedStatement, ResultSet,
    connect_columnar, register_driver,
};
use silo_scylladb::ScyllaDriver;
use std::sync::{Arc, Once};
use std::time::Duration;

fn server_url() -> Option<String> {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        silo_tests::init_logging();
        register_driver(Arc::new(ScyllaDriver::new()));
    });
    std::env::var("SILO_SCYLLADB_URL").ok()
}

#[test]
fn cql_round_trip_with_bound_parameters() {
    let Some(url) = server_url() else {
        eprintln!("SILO_SCYLLADB_URL not set, skipping");
        return;
    };
    let conn = connect_columnar(&url).unwrap();
    conn.execute_update(
        "CREATE TABLE IF NOT EXISTS silo_samples (id int PRIMARY KEY, label text, payload blob)",
    )
    .unwrap();
    conn.execute_update("TRUNCATE silo_samples").unwrap();

    let mut insert = conn
        .prepare_statement("INSERT INTO silo_samples (id, label, payload) VALUES (?, ?, ?)")
        .unwrap();
    insert.set_i32(1, 3).unwrap();
    insert.set_string(2, "cedar").unwrap();
    insert.set_bytes(3, &[4, 5, 6]).unwrap();
    insert.execute_update().unwrap();

    let mut rows = conn
        .execute_query("SELECT id, label, payload FROM silo_samples")
        .unwrap();
    assert!(rows.next().unwrap());
    assert_eq!(rows.get_i32(0).unwrap(), 3);
    assert_eq!(rows.get_string_named("label").unwrap(), "cedar");
    assert_eq!(rows.get_bytes(2).unwrap(), vec![4, 5, 6]);
    assert!(!rows.next().unwrap());

    conn.execute_update("DROP TABLE silo_samples").unwrap();
    conn.close().unwrap();
}

#[test]
fn pooled_columnar_connections_validate_with_probe() {
    let Some(url) = server_url() else {
        eprintln!("SILO_SCYLLADB_URL not set, skipping");
        return;
    };
    let pool = ColumnarPool::open(
        &url,
        PoolOptions {
            initial_size: 1,
            max_size: 2,
            connection_timeout: Duration::from_millis(5000),
            validation_query: "SELECT now() FROM system.local".to_string(),
            ..PoolOptions::default()
        },
    )
    .unwrap();
    {
        let conn = pool.get().unwrap();
        let mut rows = conn
            .execute_query("SELECT key FROM system.local WHERE key = 'local'")
            .unwrap();
        assert!(rows.next().unwrap());
    }
    pool.close();
}
