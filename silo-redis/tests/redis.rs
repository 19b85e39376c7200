//! Integration tests against a live Redis server.
//!
//! Gated on `SILO_REDIS_URL` (e.g. `silo:redis://127.0.0.1:6379/15`);
//! without it every test skips silently.

use silo_core::{Connection, KvConnection, KvPool, KvReply, PoolOptions, connect_kv, register_driver};
use silo_redis::RedisDriver;
use std::sync::{Arc, Once};
use std::time::Duration;

fn server_url() -> Option<String> {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        silo_tests::init_logging();
        register_driver(Arc::new(RedisDriver::new()));
    });
    std::env::var("SILO_REDIS_URL").ok()
}

#[test]
fn ping_and_basic_commands() {
    let Some(url) = server_url() else {
        eprintln!("SILO_REDIS_URL not set, skipping");
        return;
    };
    let conn = connect_kv(&url).unwrap();
    conn.ping().unwrap();

    assert_eq!(
        conn.command(&["SET", "silo:test:k", "42"]).unwrap(),
        KvReply::Status("OK".to_string())
    );
    assert_eq!(
        conn.command(&["GET", "silo:test:k"]).unwrap().as_i64(),
        Some(42)
    );
    assert_eq!(
        conn.command(&["DEL", "silo:test:k"]).unwrap(),
        KvReply::Integer(1)
    );
    assert!(conn.command(&["GET", "silo:test:k"]).unwrap().is_nil());
    conn.close().unwrap();
}

#[test]
fn pooled_kv_connections_validate_with_ping() {
    let Some(url) = server_url() else {
        eprintln!("SILO_REDIS_URL not set, skipping");
        return;
    };
    let pool = KvPool::open(
        &url,
        PoolOptions {
            initial_size: 1,
            max_size: 2,
            connection_timeout: Duration::from_millis(3000),
            ..PoolOptions::default()
        },
    )
    .unwrap();
    {
        let conn = pool.get().unwrap();
        conn.command(&["SET", "silo:test:pooled", "yes"]).unwrap();
    }
    {
        let conn = pool.get().unwrap();
        assert_eq!(
            conn.command(&["GET", "silo:test:pooled"])
                .unwrap()
                .as_str()
                .unwrap(),
            "yes"
        );
        conn.command(&["DEL", "silo:test:pooled"]).unwrap();
    }
    pool.close();
}
