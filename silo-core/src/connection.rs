use crate::{IsolationLevel, KvReply, PreparedStatement, Result, ResultSet};
use serde_json::Value as JsonValue;

/// Capability surface shared by every open backend session.
///
/// Connections carry their own per-connection mutex internally: every
/// operation that crosses the native handle boundary serializes on it, so
/// all methods take `&self` and a connection can be driven from any thread,
/// one operation at a time.
pub trait Connection: Send + Sync {
    /// The URL this connection was opened from.
    fn url(&self) -> &str;

    fn is_closed(&self) -> bool;

    /// Physically close the native session. Idempotent; only the first call
    /// has observable effect. Closing synchronously invalidates every live
    /// statement and result set produced by this connection.
    fn close(&self) -> Result<()>;

    /// Reset the session for re-idling instead of closing it: auto-commit
    /// back on, isolation back at the session default, any open transaction
    /// rolled back. The native handle stays usable. Pools call this in
    /// place of [`Connection::close`] when a borrow ends.
    fn reset_for_pool(&self) -> Result<()>;
}

/// SQL backend with transactions.
pub trait RelationalConnection: Connection {
    fn prepare_statement(&self, sql: &str) -> Result<Box<dyn PreparedStatement>>;

    /// One-shot query; the returned result set owns its statement.
    fn execute_query(&self, sql: &str) -> Result<Box<dyn ResultSet>>;

    /// Execute DML/DDL, returning the affected-row count.
    fn execute_update(&self, sql: &str) -> Result<u64>;

    /// Toggling auto-commit off starts transactional mode; toggling it on
    /// commits any open transaction first.
    fn set_auto_commit(&self, on: bool) -> Result<()>;

    fn auto_commit(&self) -> Result<bool>;

    fn begin(&self) -> Result<()>;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;

    fn transaction_active(&self) -> bool;

    /// Apply an isolation level through the driver's fixed translation
    /// table. May end an in-flight transaction and begin a new one; each
    /// driver documents whether it does.
    fn set_transaction_isolation(&self, level: IsolationLevel) -> Result<()>;

    fn transaction_isolation(&self) -> IsolationLevel;
}

/// JSON-document backend.
pub trait DocumentConnection: Connection {
    fn collection(&self, name: &str) -> Result<Box<dyn DocumentCollection>>;

    fn create_collection(&self, name: &str) -> Result<()>;

    fn collection_exists(&self, name: &str) -> Result<bool>;

    fn drop_collection(&self, name: &str) -> Result<()>;

    /// Run a raw database command and return its reply document.
    fn run_command(&self, command: JsonValue) -> Result<JsonValue>;

    /// Insert one document, returning its id in string form.
    fn create_document(&self, collection: &str, document: JsonValue) -> Result<String>;
}

/// Handle to one named collection of a document backend.
pub trait DocumentCollection: Send {
    fn name(&self) -> &str;

    fn insert_one(&self, document: JsonValue) -> Result<String>;

    fn find(&self, filter: JsonValue) -> Result<Vec<JsonValue>>;

    fn update_many(&self, filter: JsonValue, update: JsonValue) -> Result<u64>;

    fn delete_many(&self, filter: JsonValue) -> Result<u64>;

    fn count(&self, filter: JsonValue) -> Result<u64>;
}

/// Wide-column backend speaking CQL-style statements with bound parameters.
pub trait ColumnarConnection: Connection {
    fn prepare_statement(&self, cql: &str) -> Result<Box<dyn PreparedStatement>>;

    fn execute_query(&self, cql: &str) -> Result<Box<dyn ResultSet>>;

    fn execute_update(&self, cql: &str) -> Result<u64>;
}

/// Key-value backend exposing untyped commands.
pub trait KvConnection: Connection {
    fn ping(&self) -> Result<()>;

    /// Send one command verbatim, e.g. `["SET", "k", "v"]`.
    fn command(&self, parts: &[&str]) -> Result<KvReply>;
}
