//! Integration tests against a live MongoDB server.
//!
//! Gated on `SILO_MONGODB_URL` (e.g. `silo:mongodb://127.0.0.1:27017/silo_test`);
//! without it every test skips silently.

use serde_json::json;
use silo_core::{
    Connection, DocumentCollection, DocumentConnection, DocumentPool, PoolOptions,
    connect_document, register_driver,
};
use silo_mongodb::MongoDriver;
use std::sync::{Arc, Once};
use std::time::Duration;

fn server_url() -> Option<String> {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        silo_tests::init_logging();
        register_driver(Arc::new(MongoDriver::new()));
    });
    std::env::var("SILO_MONGODB_URL").ok()
}

#[test]
fn collections_round_trip() {
    let Some(url) = server_url() else {
        eprintln!("SILO_MONGODB_URL not set, skipping");
        return;
    };
    let conn = connect_document(&url).unwrap();
    let _ = conn.drop_collection("silo_people");

    conn.create_collection("silo_people").unwrap();
    assert!(conn.collection_exists("silo_people").unwrap());

    let people = conn.collection("silo_people").unwrap();
    people
        .insert_one(json!({ "name": "ada", "age": 36 }))
        .unwrap();
    people
        .insert_one(json!({ "name": "grace", "age": 45 }))
        .unwrap();
    assert_eq!(people.count(json!({})).unwrap(), 2);

    let found = people.find(json!({ "name": "ada" })).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["age"], 36);

    assert_eq!(
        people
            .update_many(json!({ "name": "ada" }), json!({ "$set": { "age": 37 } }))
            .unwrap(),
        1
    );
    assert_eq!(people.delete_many(json!({})).unwrap(), 2);

    conn.drop_collection("silo_people").unwrap();
    assert!(!conn.collection_exists("silo_people").unwrap());

    let pong = conn.run_command(json!({ "ping": 1 })).unwrap();
    assert_eq!(pong["ok"].as_f64(), Some(1.0));
    conn.close().unwrap();
}

#[test]
fn pooled_document_connections_ping_on_validation() {
    let Some(url) = server_url() else {
        eprintln!("SILO_MONGODB_URL not set, skipping");
        return;
    };
    let pool = DocumentPool::open(
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
        conn.create_document("silo_pooled", json!({ "tag": "pooled" }))
            .unwrap();
    }
    {
        let conn = pool.get().unwrap();
        let docs = conn
            .collection("silo_pooled")
            .unwrap()
            .find(json!({ "tag": "pooled" }))
            .unwrap();
        assert!(!docs.is_empty());
        conn.drop_collection("silo_pooled").unwrap();
    }
    pool.close();
}
