//! Silo: a uniform connection layer for heterogeneous databases.
//!
//! Applications obtain connections from driver-aware pools, run
//! parameterized statements or model-specific operations, stream large
//! binary values and compose multi-statement work into transactions —
//! against relational, document, columnar and key-value backends alike.
//!
//! This crate re-exports the core API and, behind one feature flag per
//! backend, the driver crates. [`register_drivers`] installs every
//! compiled driver into the process-wide registry:
//!
//! ```no_run
//! use silo::RelationalConnection;
//!
//! silo::register_drivers();
//! let pool = silo::RelationalPool::open(
//!     "silo:sqlite://:memory:",
//!     silo::PoolOptions::default(),
//! )?;
//! let conn = pool.get()?;
//! conn.execute_update("CREATE TABLE t (v INTEGER)")?;
//! # silo::Result::Ok(())
//! ```

pub use silo_core::*;

#[cfg(feature = "sqlite")]
pub use silo_sqlite::SqliteDriver;

#[cfg(feature = "mysql")]
pub use silo_mysql::MySqlDriver;

#[cfg(feature = "postgres")]
pub use silo_postgres::PgDriver;

#[cfg(feature = "mongodb")]
pub use silo_mongodb::MongoDriver;

#[cfg(feature = "redis")]
pub use silo_redis::RedisDriver;

#[cfg(feature = "scylladb")]
pub use silo_scylladb::ScyllaDriver;

/// Register every driver compiled into this build. Safe to call more than
/// once; repeat calls are no-ops.
pub fn register_drivers() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        #[cfg(feature = "sqlite")]
        register_driver(std::sync::Arc::new(SqliteDriver::new()));
        #[cfg(feature = "mysql")]
        register_driver(std::sync::Arc::new(MySqlDriver::new()));
        #[cfg(feature = "postgres")]
        register_driver(std::sync::Arc::new(PgDriver::new()));
        #[cfg(feature = "mongodb")]
        register_driver(std::sync::Arc::new(MongoDriver::new()));
        #[cfg(feature = "redis")]
        register_driver(std::sync::Arc::new(RedisDriver::new()));
        #[cfg(feature = "scylladb")]
        register_driver(std::sync::Arc::new(ScyllaDriver::new()));
    });
}
