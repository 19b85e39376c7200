use serde_json::{Value as JsonValue, json};
use silo_core::{
    BufferedResultSet, ColumnarConnection, Connection, ConnectionFamily, ConnectionUrl, DbError,
    DocumentCollection, DocumentConnection, Driver, ErrorKind, IsolationLevel, KvConnection,
    KvReply, ParamSlots, PreparedStatement, RelationalConnection, Result, ResultSet, Value,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Scripted reply for one statement text.
#[derive(Debug, Clone)]
pub enum FakeOutcome {
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    Affected(u64),
    Fail(ErrorKind, String),
}

/// The shared in-memory "server" behind every fake connection.
///
/// Tests keep a handle to it to script failures and observe counters.
pub struct FakeBackend {
    pub connections_created: AtomicUsize,
    pub connections_closed: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub resets: AtomicUsize,
    connect_failures: AtomicUsize,
    query_failures: AtomicUsize,
    ping_failures: AtomicUsize,
    outcomes: Mutex<HashMap<String, FakeOutcome>>,
    kv: Mutex<HashMap<String, String>>,
    collections: Mutex<HashMap<String, Vec<JsonValue>>>,
    doc_id: AtomicUsize,
    conn_id: AtomicUsize,
}

impl FakeBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            connections_created: AtomicUsize::new(0),
            connections_closed: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
            rollbacks: AtomicUsize::new(0),
            resets: AtomicUsize::new(0),
            connect_failures: AtomicUsize::new(0),
            query_failures: AtomicUsize::new(0),
            ping_failures: AtomicUsize::new(0),
            outcomes: Mutex::new(HashMap::new()),
            kv: Mutex::new(HashMap::new()),
            collections: Mutex::new(HashMap::new()),
            doc_id: AtomicUsize::new(0),
            conn_id: AtomicUsize::new(0),
        })
    }

    pub fn script(&self, statement: impl Into<String>, outcome: FakeOutcome) {
        self.outcomes
            .lock()
            .expect("outcome map poisoned")
            .insert(statement.into(), outcome);
    }

    pub fn fail_next_connects(&self, n: usize) {
        self.connect_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` statement executions, whatever their text.
    pub fn fail_next_queries(&self, n: usize) {
        self.query_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_pings(&self, n: usize) {
        self.ping_failures.store(n, Ordering::SeqCst);
    }

    fn take_scripted_failure(&self, counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// In-memory driver. One instance serves exactly one connection family;
/// the constructors pick the scheme tag accordingly.
pub struct FakeDriver {
    name: &'static str,
    family: ConnectionFamily,
    backend: Arc<FakeBackend>,
}

impl FakeDriver {
    pub fn relational() -> Self {
        Self::relational_with_scheme("fakesql")
    }

    /// Relational fake under a custom scheme tag, for tests that need a
    /// backend nobody else shares.
    pub fn relational_with_scheme(name: &'static str) -> Self {
        Self {
            name,
            family: ConnectionFamily::Relational,
            backend: FakeBackend::new(),
        }
    }

    pub fn document() -> Self {
        Self {
            name: "fakedoc",
            family: ConnectionFamily::Document,
            backend: FakeBackend::new(),
        }
    }

    pub fn columnar() -> Self {
        Self {
            name: "fakecql",
            family: ConnectionFamily::Columnar,
            backend: FakeBackend::new(),
        }
    }

    pub fn kv() -> Self {
        Self {
            name: "fakekv",
            family: ConnectionFamily::KeyValue,
            backend: FakeBackend::new(),
        }
    }

    pub fn backend(&self) -> Arc<FakeBackend> {
        self.backend.clone()
    }

    fn admit(&self, requested: ConnectionFamily) -> Result<()> {
        if self.family != requested {
            return Err(DbError::new(
                "FK1WRNGFAM0A",
                ErrorKind::WrongFamily,
                format!("fake driver serves {}, not {requested}", self.family),
            ));
        }
        if self.backend.take_scripted_failure(&self.backend.connect_failures) {
            return Err(DbError::new(
                "FK2CONNFAIL0",
                ErrorKind::ConnectFailure,
                "scripted connect failure",
            ));
        }
        self.backend.connections_created.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Driver for FakeDriver {
    fn name(&self) -> &'static str {
        self.name
    }

    fn family(&self) -> ConnectionFamily {
        self.family
    }

    fn connect_relational(&self, url: &ConnectionUrl) -> Result<Box<dyn RelationalConnection>> {
        self.admit(ConnectionFamily::Relational)?;
        Ok(Box::new(FakeRelationalConnection {
            core: FakeConnCore::new(self.backend.clone()),
            url: url.as_str().to_string(),
        }))
    }

    fn connect_document(&self, url: &ConnectionUrl) -> Result<Box<dyn DocumentConnection>> {
        self.admit(ConnectionFamily::Document)?;
        Ok(Box::new(FakeDocumentConnection {
            backend: self.backend.clone(),
            closed: AtomicBool::new(false),
            url: url.as_str().to_string(),
        }))
    }

    fn connect_columnar(&self, url: &ConnectionUrl) -> Result<Box<dyn ColumnarConnection>> {
        self.admit(ConnectionFamily::Columnar)?;
        Ok(Box::new(FakeColumnarConnection {
            core: FakeConnCore::new(self.backend.clone()),
            url: url.as_str().to_string(),
        }))
    }

    fn connect_kv(&self, url: &ConnectionUrl) -> Result<Box<dyn KvConnection>> {
        self.admit(ConnectionFamily::KeyValue)?;
        Ok(Box::new(FakeKvConnection {
            backend: self.backend.clone(),
            closed: AtomicBool::new(false),
            url: url.as_str().to_string(),
        }))
    }
}

struct FakeSession {
    closed: bool,
    auto_commit: bool,
    tx_active: bool,
    isolation: IsolationLevel,
}

/// State shared between a fake connection and its statements.
struct FakeConnCore {
    id: usize,
    backend: Arc<FakeBackend>,
    session: Mutex<FakeSession>,
}

impl FakeConnCore {
    fn new(backend: Arc<FakeBackend>) -> Arc<Self> {
        let id = backend.conn_id.fetch_add(1, Ordering::SeqCst);
        Arc::new(Self {
            id,
            backend,
            session: Mutex::new(FakeSession {
                closed: false,
                auto_commit: true,
                tx_active: false,
                isolation: IsolationLevel::ReadCommitted,
            }),
        })
    }

    fn closed_error() -> DbError {
        DbError::new(
            "FK3CLOSEDSQL",
            ErrorKind::ConnectionClosed,
            "fake connection is closed",
        )
    }

    fn run(&self, statement: &str) -> Result<FakeOutcome> {
        {
            let mut session = self.session.lock().expect("fake session poisoned");
            if session.closed {
                return Err(Self::closed_error());
            }
            if !session.auto_commit && !session.tx_active {
                session.tx_active = true;
            }
        }
        if self.backend.take_scripted_failure(&self.backend.query_failures) {
            return Err(DbError::backend("FK4QRYFAIL00", "FAKE", "scripted query failure"));
        }
        if statement.eq_ignore_ascii_case("select connection_id") {
            return Ok(FakeOutcome::Rows {
                columns: vec!["connection_id".to_string()],
                rows: vec![vec![Value::Int64(Some(self.id as i64))]],
            });
        }
        let scripted = self
            .backend
            .outcomes
            .lock()
            .expect("outcome map poisoned")
            .get(statement)
            .cloned();
        Ok(match scripted {
            Some(outcome) => outcome,
            None if statement
                .trim_start()
                .get(..6)
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case("select")) =>
            {
                FakeOutcome::Rows {
                    columns: Vec::new(),
                    rows: Vec::new(),
                }
            }
            None => FakeOutcome::Affected(0),
        })
    }

    fn query(&self, statement: &str) -> Result<Box<dyn ResultSet>> {
        match self.run(statement)? {
            FakeOutcome::Rows { columns, rows } => {
                Ok(Box::new(BufferedResultSet::new(columns, rows)))
            }
            FakeOutcome::Affected(..) => Ok(Box::new(BufferedResultSet::empty())),
            FakeOutcome::Fail(kind, message) => Err(DbError::new("FK5SCRIPTED0", kind, message)),
        }
    }

    fn update(&self, statement: &str) -> Result<u64> {
        match self.run(statement)? {
            FakeOutcome::Affected(n) => Ok(n),
            FakeOutcome::Rows { .. } => Ok(0),
            FakeOutcome::Fail(kind, message) => Err(DbError::new("FK6SCRIPTED1", kind, message)),
        }
    }

    fn close(&self) -> Result<()> {
        let mut session = self.session.lock().expect("fake session poisoned");
        if !session.closed {
            session.closed = true;
            self.backend.connections_closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.session.lock().expect("fake session poisoned").closed
    }

    fn reset(&self) -> Result<()> {
        let mut session = self.session.lock().expect("fake session poisoned");
        if session.closed {
            return Err(Self::closed_error());
        }
        if session.tx_active {
            session.tx_active = false;
            self.backend.rollbacks.fetch_add(1, Ordering::SeqCst);
        }
        session.auto_commit = true;
        session.isolation = IsolationLevel::ReadCommitted;
        self.backend.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Relational fake: scripted statement outcomes plus honest session-flag
/// bookkeeping, so pool and transaction-manager invariants are observable.
pub struct FakeRelationalConnection {
    core: Arc<FakeConnCore>,
    url: String,
}

impl Connection for FakeRelationalConnection {
    fn url(&self) -> &str {
        &self.url
    }

    fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    fn close(&self) -> Result<()> {
        self.core.close()
    }

    fn reset_for_pool(&self) -> Result<()> {
        self.core.reset()
    }
}

impl RelationalConnection for FakeRelationalConnection {
    fn prepare_statement(&self, sql: &str) -> Result<Box<dyn PreparedStatement>> {
        if self.core.is_closed() {
            return Err(FakeConnCore::closed_error());
        }
        Ok(Box::new(FakePreparedStatement {
            core: Arc::downgrade(&self.core),
            sql: sql.to_string(),
            slots: ParamSlots::new(None),
            closed: false,
        }))
    }

    fn execute_query(&self, sql: &str) -> Result<Box<dyn ResultSet>> {
        self.core.query(sql)
    }

    fn execute_update(&self, sql: &str) -> Result<u64> {
        self.core.update(sql)
    }

    fn set_auto_commit(&self, on: bool) -> Result<()> {
        let mut session = self.core.session.lock().expect("fake session poisoned");
        if session.closed {
            return Err(FakeConnCore::closed_error());
        }
        if on && session.tx_active {
            session.tx_active = false;
            self.core.backend.commits.fetch_add(1, Ordering::SeqCst);
        }
        session.auto_commit = on;
        Ok(())
    }

    fn auto_commit(&self) -> Result<bool> {
        let session = self.core.session.lock().expect("fake session poisoned");
        if session.closed {
            return Err(FakeConnCore::closed_error());
        }
        Ok(session.auto_commit)
    }

    fn begin(&self) -> Result<()> {
        let mut session = self.core.session.lock().expect("fake session poisoned");
        if session.closed {
            return Err(FakeConnCore::closed_error());
        }
        if session.tx_active {
            return Err(DbError::new(
                "FK7TXACTIVE0",
                ErrorKind::TransactionState,
                "transaction already active",
            ));
        }
        session.auto_commit = false;
        session.tx_active = true;
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let mut session = self.core.session.lock().expect("fake session poisoned");
        if session.closed {
            return Err(FakeConnCore::closed_error());
        }
        if !session.tx_active {
            // In transactional mode an untouched transaction commits as a
            // no-op; with auto-commit on there is nothing to commit.
            return if session.auto_commit {
                Err(DbError::new(
                    "FK8NOTX00000",
                    ErrorKind::TransactionState,
                    "commit without an active transaction",
                ))
            } else {
                Ok(())
            };
        }
        session.tx_active = false;
        self.core.backend.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let mut session = self.core.session.lock().expect("fake session poisoned");
        if session.closed {
            return Err(FakeConnCore::closed_error());
        }
        if !session.tx_active {
            return if session.auto_commit {
                Err(DbError::new(
                    "FK9NOTX00001",
                    ErrorKind::TransactionState,
                    "rollback without an active transaction",
                ))
            } else {
                Ok(())
            };
        }
        session.tx_active = false;
        self.core.backend.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn transaction_active(&self) -> bool {
        self.core
            .session
            .lock()
            .expect("fake session poisoned")
            .tx_active
    }

    fn set_transaction_isolation(&self, level: IsolationLevel) -> Result<()> {
        let mut session = self.core.session.lock().expect("fake session poisoned");
        if session.closed {
            return Err(FakeConnCore::closed_error());
        }
        session.isolation = level;
        Ok(())
    }

    fn transaction_isolation(&self) -> IsolationLevel {
        self.core
            .session
            .lock()
            .expect("fake session poisoned")
            .isolation
    }
}

/// Columnar fake; shares the scripted-outcome machinery.
pub struct FakeColumnarConnection {
    core: Arc<FakeConnCore>,
    url: String,
}

impl Connection for FakeColumnarConnection {
    fn url(&self) -> &str {
        &self.url
    }

    fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    fn close(&self) -> Result<()> {
        self.core.close()
    }

    fn reset_for_pool(&self) -> Result<()> {
        self.core.reset()
    }
}

impl ColumnarConnection for FakeColumnarConnection {
    fn prepare_statement(&self, cql: &str) -> Result<Box<dyn PreparedStatement>> {
        if self.core.is_closed() {
            return Err(FakeConnCore::closed_error());
        }
        Ok(Box::new(FakePreparedStatement {
            core: Arc::downgrade(&self.core),
            sql: cql.to_string(),
            slots: ParamSlots::new(None),
            closed: false,
        }))
    }

    fn execute_query(&self, cql: &str) -> Result<Box<dyn ResultSet>> {
        self.core.query(cql)
    }

    fn execute_update(&self, cql: &str) -> Result<u64> {
        self.core.update(cql)
    }
}

/// Statement against a fake connection. Holds a weak reference to the
/// connection core, exactly like the real drivers.
pub struct FakePreparedStatement {
    core: Weak<FakeConnCore>,
    sql: String,
    slots: ParamSlots,
    closed: bool,
}

impl FakePreparedStatement {
    fn core(&self) -> Result<Arc<FakeConnCore>> {
        if self.closed {
            return Err(DbError::new(
                "FKASTMTCLSD0",
                ErrorKind::StatementClosed,
                "statement is closed",
            ));
        }
        let core = self.core.upgrade().ok_or_else(FakeConnCore::closed_error)?;
        if core.is_closed() {
            return Err(FakeConnCore::closed_error());
        }
        Ok(core)
    }
}

impl PreparedStatement for FakePreparedStatement {
    fn set_value(&mut self, index: usize, value: Value) -> Result<()> {
        self.core()?;
        self.slots.set(index, value)
    }

    fn clear_parameters(&mut self) -> Result<()> {
        self.core()?;
        self.slots.clear();
        Ok(())
    }

    fn execute_query(&mut self) -> Result<Box<dyn ResultSet>> {
        let core = self.core()?;
        core.query(&self.sql)
    }

    fn execute_update(&mut self) -> Result<u64> {
        let core = self.core()?;
        core.update(&self.sql)
    }

    fn execute(&mut self) -> Result<bool> {
        let core = self.core()?;
        Ok(matches!(core.run(&self.sql)?, FakeOutcome::Rows { .. }))
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Document fake over a shared collection map.
pub struct FakeDocumentConnection {
    backend: Arc<FakeBackend>,
    closed: AtomicBool,
    url: String,
}

impl FakeDocumentConnection {
    fn live(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DbError::new(
                "FKBCLOSEDDOC",
                ErrorKind::ConnectionClosed,
                "fake connection is closed",
            ));
        }
        Ok(())
    }
}

impl Connection for FakeDocumentConnection {
    fn url(&self) -> &str {
        &self.url
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.backend.connections_closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn reset_for_pool(&self) -> Result<()> {
        self.live()?;
        self.backend.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl DocumentConnection for FakeDocumentConnection {
    fn collection(&self, name: &str) -> Result<Box<dyn DocumentCollection>> {
        self.live()?;
        Ok(Box::new(FakeCollection {
            backend: self.backend.clone(),
            name: name.to_string(),
        }))
    }

    fn create_collection(&self, name: &str) -> Result<()> {
        self.live()?;
        self.backend
            .collections
            .lock()
            .expect("collection map poisoned")
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    fn collection_exists(&self, name: &str) -> Result<bool> {
        self.live()?;
        Ok(self
            .backend
            .collections
            .lock()
            .expect("collection map poisoned")
            .contains_key(name))
    }

    fn drop_collection(&self, name: &str) -> Result<()> {
        self.live()?;
        self.backend
            .collections
            .lock()
            .expect("collection map poisoned")
            .remove(name);
        Ok(())
    }

    fn run_command(&self, command: JsonValue) -> Result<JsonValue> {
        self.live()?;
        if command.get("ping").is_some() {
            if self.backend.take_scripted_failure(&self.backend.ping_failures) {
                return Err(DbError::backend("FKCPINGFAIL0", "FAKE", "scripted ping failure"));
            }
            return Ok(json!({ "ok": 1 }));
        }
        if let Some(name) = command.get("count").and_then(JsonValue::as_str) {
            let collections = self
                .backend
                .collections
                .lock()
                .expect("collection map poisoned");
            let n = collections.get(name).map_or(0, Vec::len);
            return Ok(json!({ "ok": 1, "n": n }));
        }
        Ok(json!({ "ok": 1 }))
    }

    fn create_document(&self, collection: &str, document: JsonValue) -> Result<String> {
        self.live()?;
        FakeCollection {
            backend: self.backend.clone(),
            name: collection.to_string(),
        }
        .insert_one(document)
    }
}

struct FakeCollection {
    backend: Arc<FakeBackend>,
    name: String,
}

fn filter_matches(filter: &JsonValue, document: &JsonValue) -> bool {
    match filter.as_object() {
        None => true,
        Some(fields) => fields
            .iter()
            .all(|(key, expected)| document.get(key) == Some(expected)),
    }
}

impl DocumentCollection for FakeCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn insert_one(&self, mut document: JsonValue) -> Result<String> {
        let id = format!("fake-{}", self.backend.doc_id.fetch_add(1, Ordering::SeqCst));
        if let Some(fields) = document.as_object_mut() {
            fields
                .entry("_id".to_string())
                .or_insert(JsonValue::String(id.clone()));
        }
        self.backend
            .collections
            .lock()
            .expect("collection map poisoned")
            .entry(self.name.clone())
            .or_default()
            .push(document);
        Ok(id)
    }

    fn find(&self, filter: JsonValue) -> Result<Vec<JsonValue>> {
        let collections = self
            .backend
            .collections
            .lock()
            .expect("collection map poisoned");
        Ok(collections
            .get(&self.name)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| filter_matches(&filter, doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn update_many(&self, filter: JsonValue, update: JsonValue) -> Result<u64> {
        let mut collections = self
            .backend
            .collections
            .lock()
            .expect("collection map poisoned");
        let Some(docs) = collections.get_mut(&self.name) else {
            return Ok(0);
        };
        let set = update.get("$set").and_then(JsonValue::as_object).cloned();
        let mut touched = 0;
        for doc in docs.iter_mut().filter(|doc| filter_matches(&filter, doc)) {
            if let (Some(fields), Some(set)) = (doc.as_object_mut(), set.as_ref()) {
                for (key, value) in set {
                    fields.insert(key.clone(), value.clone());
                }
            }
            touched += 1;
        }
        Ok(touched)
    }

    fn delete_many(&self, filter: JsonValue) -> Result<u64> {
        let mut collections = self
            .backend
            .collections
            .lock()
            .expect("collection map poisoned");
        let Some(docs) = collections.get_mut(&self.name) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|doc| !filter_matches(&filter, doc));
        Ok((before - docs.len()) as u64)
    }

    fn count(&self, filter: JsonValue) -> Result<u64> {
        Ok(self.find(filter)?.len() as u64)
    }
}

/// Key-value fake over a shared string map.
pub struct FakeKvConnection {
    backend: Arc<FakeBackend>,
    closed: AtomicBool,
    url: String,
}

impl FakeKvConnection {
    fn live(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DbError::new(
                "FKDCLOSEDKV0",
                ErrorKind::ConnectionClosed,
                "fake connection is closed",
            ));
        }
        Ok(())
    }
}

impl Connection for FakeKvConnection {
    fn url(&self) -> &str {
        &self.url
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.backend.connections_closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn reset_for_pool(&self) -> Result<()> {
        self.live()?;
        self.backend.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl KvConnection for FakeKvConnection {
    fn ping(&self) -> Result<()> {
        self.live()?;
        if self.backend.take_scripted_failure(&self.backend.ping_failures) {
            return Err(DbError::backend("FKEPINGFAIL1", "FAKE", "scripted ping failure"));
        }
        Ok(())
    }

    fn command(&self, parts: &[&str]) -> Result<KvReply> {
        self.live()?;
        let Some((&command, args)) = parts.split_first() else {
            return Err(DbError::new(
                "FKFEMPTYCMD0",
                ErrorKind::BindError,
                "empty command",
            ));
        };
        let mut kv = self.backend.kv.lock().expect("kv store poisoned");
        match (command.to_ascii_uppercase().as_str(), args) {
            ("PING", []) => Ok(KvReply::Status("PONG".to_string())),
            ("SET", [key, value]) => {
                kv.insert(key.to_string(), value.to_string());
                Ok(KvReply::Status("OK".to_string()))
            }
            ("GET", [key]) => Ok(kv
                .get(*key)
                .map(|v| KvReply::Data(v.clone().into_bytes()))
                .unwrap_or(KvReply::Nil)),
            ("DEL", keys) => {
                let removed = keys.iter().filter(|k| kv.remove(**k).is_some()).count();
                Ok(KvReply::Integer(removed as i64))
            }
            ("EXISTS", [key]) => Ok(KvReply::Integer(kv.contains_key(*key) as i64)),
            ("KEYS", _) => {
                let mut keys: Vec<_> = kv.keys().cloned().collect();
                keys.sort();
                Ok(KvReply::Array(
                    keys.into_iter()
                        .map(|k| KvReply::Data(k.into_bytes()))
                        .collect(),
                ))
            }
            ("FLUSHDB", []) => {
                kv.clear();
                Ok(KvReply::Status("OK".to_string()))
            }
            _ => Err(DbError::backend(
                "FKGUNKNOWNC0",
                "ERR",
                format!("unknown command `{command}`"),
            )),
        }
    }
}
