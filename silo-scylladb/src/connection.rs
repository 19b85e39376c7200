use crate::statement::ScyllaPreparedStatement;
use crate::values::from_cql_value;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::response::query_result::QueryResult;
use scylla::value::Row;
use silo_core::{
    BufferedResultSet, ColumnarConnection, Connection, ConnectionUrl, DbError, ErrorKind,
    ParamSlots, PreparedStatement, Result, ResultSet,
};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::runtime::Runtime;

/// The async client plus the runtime that drives it. Held behind the
/// per-connection mutex, so every wire operation is serialized.
pub(crate) struct ScyllaBridge {
    pub(crate) runtime: Runtime,
    pub(crate) session: Session,
}

pub(crate) struct ScyllaCore {
    url: String,
    pub(crate) state: Mutex<Option<ScyllaBridge>>,
}

impl ScyllaCore {
    pub(crate) fn guard(&self) -> Result<MutexGuard<'_, Option<ScyllaBridge>>> {
        let state = self.state.lock().expect("scylla state poisoned");
        if state.is_none() {
            return Err(DbError::new(
                "J8QV4NWYT2KX",
                ErrorKind::ConnectionClosed,
                "scylladb connection is closed",
            ));
        }
        Ok(state)
    }
}

/// Turn a finished query into a buffered result set.
pub(crate) fn buffer_result(result: QueryResult) -> Result<Box<dyn ResultSet>> {
    if !result.is_rows() {
        return Ok(Box::new(BufferedResultSet::empty()));
    }
    let rows_result = result.into_rows_result().map_err(|e| {
        DbError::backend("S5DH9CXRF1LB", "scylla", e.to_string())
    })?;
    let columns: Vec<String> = rows_result
        .column_specs()
        .iter()
        .map(|spec| spec.name().to_string())
        .collect();
    let mut rows = Vec::new();
    let typed = rows_result
        .rows::<Row>()
        .map_err(|e| DbError::backend("W2KN6EPJU8MZ", "scylla", e.to_string()))?;
    for row in typed {
        let row = row.map_err(|e| DbError::backend("E7AG1VBSQ4TC", "scylla", e.to_string()))?;
        rows.push(row.columns.into_iter().map(from_cql_value).collect());
    }
    Ok(Box::new(BufferedResultSet::new(columns, rows)))
}

/// Open ScyllaDB/Cassandra session scoped to one keyspace.
pub struct ScyllaConnection {
    core: Arc<ScyllaCore>,
}

impl ScyllaConnection {
    pub(crate) fn open(url: &ConnectionUrl) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                DbError::new(
                    "B4XF7RZMH0QD",
                    ErrorKind::ConnectFailure,
                    format!("cannot build scylla runtime: {e}"),
                )
            })?;
        let address = url.authority(9042);
        let mut builder = SessionBuilder::new().known_node(&address);
        if let Some(user) = url.username() {
            builder = builder.user(user, url.password().unwrap_or_default());
        }
        if !url.target().is_empty() {
            builder = builder.use_keyspace(url.target(), true);
        }
        let session = runtime.block_on(builder.build()).map_err(|e| {
            let error = DbError::new(
                "M1TY6KJCV9SW",
                ErrorKind::ConnectFailure,
                format!("cannot connect to scylladb at {address}: {e}"),
            );
            log::error!("{error}");
            error
        })?;
        log::debug!("connected to scylladb at {address}");
        Ok(Self {
            core: Arc::new(ScyllaCore {
                url: url.as_str().to_string(),
                state: Mutex::new(Some(ScyllaBridge { runtime, session })),
            }),
        })
    }

    fn weak(&self) -> Weak<ScyllaCore> {
        Arc::downgrade(&self.core)
    }
}

impl Connection for ScyllaConnection {
    fn url(&self) -> &str {
        &self.core.url
    }

    fn is_closed(&self) -> bool {
        self.core
            .state
            .lock()
            .expect("scylla state poisoned")
            .is_none()
    }

    fn close(&self) -> Result<()> {
        // Dropping the session tears down the cluster connections; the
        // runtime goes with it.
        self.core.state.lock().expect("scylla state poisoned").take();
        Ok(())
    }

    fn reset_for_pool(&self) -> Result<()> {
        // CQL sessions carry no auto-commit or isolation state.
        self.core.guard()?;
        Ok(())
    }
}

impl ColumnarConnection for ScyllaConnection {
    fn prepare_statement(&self, cql: &str) -> Result<Box<dyn PreparedStatement>> {
        let state = self.core.guard()?;
        let bridge = state.as_ref().expect("guarded bridge");
        let prepared = bridge
            .runtime
            .block_on(bridge.session.prepare(cql))
            .map_err(|e| DbError::backend("F3LQ8UWNB5EY", "scylla", e.to_string()))?;
        let parameters = prepared.get_variable_col_specs().len();
        Ok(Box::new(ScyllaPreparedStatement::new(
            self.weak(),
            prepared,
            ParamSlots::new(Some(parameters)),
        )))
    }

    fn execute_query(&self, cql: &str) -> Result<Box<dyn ResultSet>> {
        let state = self.core.guard()?;
        let bridge = state.as_ref().expect("guarded bridge");
        let result = bridge
            .runtime
            .block_on(bridge.session.query_unpaged(cql, &[]))
            .map_err(|e| DbError::backend("K6PC0JAXD2RG", "scylla", e.to_string()))?;
        buffer_result(result)
    }

    /// CQL does not report affected-row counts; successful execution
    /// returns 0.
    fn execute_update(&self, cql: &str) -> Result<u64> {
        let state = self.core.guard()?;
        let bridge = state.as_ref().expect("guarded bridge");
        bridge
            .runtime
            .block_on(bridge.session.query_unpaged(cql, &[]))
            .map_err(|e| DbError::backend("H9ZD5SMKW7VN", "scylla", e.to_string()))?;
        Ok(0)
    }
}

impl Drop for ScyllaConnection {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            log::warn!("error closing scylladb connection in drop: {error}");
        }
    }
}
