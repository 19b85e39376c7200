use crate::statement::PgPreparedStatement;
use crate::values::{from_pg_column, from_pg_error};
use postgres::{Client, NoTls};
use silo_core::{
    BufferedResultSet, Connection, ConnectionUrl, DbError, ErrorKind, IsolationLevel, ParamSlots,
    PreparedStatement, RelationalConnection, Result, ResultSet,
};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

pub(crate) struct PgState {
    pub(crate) client: Option<Client>,
    pub(crate) auto_commit: bool,
    pub(crate) tx_active: bool,
    pub(crate) isolation: IsolationLevel,
}

/// Connection core shared weakly with prepared statements; the state
/// mutex is the per-connection mutex.
pub(crate) struct PgCore {
    url: String,
    pub(crate) state: Mutex<PgState>,
}

impl PgCore {
    pub(crate) fn guard(&self) -> Result<MutexGuard<'_, PgState>> {
        let state = self.state.lock().expect("postgres state poisoned");
        if state.client.is_none() {
            return Err(DbError::new(
                "M4VZ7RKWQ1HX",
                ErrorKind::ConnectionClosed,
                "postgres connection is closed",
            ));
        }
        Ok(state)
    }

    pub(crate) fn simple(state: &mut PgState, sql: &str) -> Result<()> {
        let client = state.client.as_mut().expect("guarded client");
        client
            .batch_execute(sql)
            .map_err(|e| from_pg_error("P8JC3EYBN5TD", e))
    }

    /// Explicit `BEGIN` when transactional mode needs a transaction open.
    pub(crate) fn ensure_tx(state: &mut PgState) -> Result<()> {
        if !state.auto_commit && !state.tx_active {
            Self::simple(state, "BEGIN")?;
            state.tx_active = true;
        }
        Ok(())
    }

    /// Prepare-and-run returning a buffered result set, so column names
    /// survive empty results.
    pub(crate) fn buffered_query(
        state: &mut PgState,
        sql: &str,
    ) -> Result<Box<dyn ResultSet>> {
        let client = state.client.as_mut().expect("guarded client");
        let statement = client
            .prepare(sql)
            .map_err(|e| from_pg_error("G1FN6UQSD8WM", e))?;
        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let fetched = client
            .query(&statement, &[])
            .map_err(|e| from_pg_error("B5TR9HXKA2LJ", e))?;
        let mut rows = Vec::with_capacity(fetched.len());
        for row in &fetched {
            let values = (0..row.len())
                .map(|i| from_pg_column(row, i))
                .collect::<Result<Vec<_>>>()?;
            rows.push(values);
        }
        Ok(Box::new(BufferedResultSet::new(columns, rows)))
    }
}

/// Open PostgreSQL session.
pub struct PgConnection {
    core: Arc<PgCore>,
}

impl PgConnection {
    pub(crate) fn open(url: &ConnectionUrl) -> Result<Self> {
        let mut config = Client::configure();
        config
            .host(url.host())
            .port(url.port().unwrap_or(5432));
        if let Some(user) = url.username() {
            config.user(user);
        }
        if let Some(password) = url.password() {
            config.password(password);
        }
        if !url.target().is_empty() {
            config.dbname(url.target());
        }
        if let Some(name) = url.option("application_name") {
            config.application_name(name);
        }
        let client = config.connect(NoTls).map_err(|e| {
            let error = DbError::new(
                "K9WY4SNEJ7QV",
                ErrorKind::ConnectFailure,
                format!("cannot connect to postgres: {e}"),
            );
            log::error!("{error}");
            error
        })?;
        log::debug!("connected to postgres at {}", url.authority(5432));
        Ok(Self {
            core: Arc::new(PgCore {
                url: url.as_str().to_string(),
                state: Mutex::new(PgState {
                    client: Some(client),
                    auto_commit: true,
                    tx_active: false,
                    isolation: IsolationLevel::ReadCommitted,
                }),
            }),
        })
    }

    fn weak(&self) -> Weak<PgCore> {
        Arc::downgrade(&self.core)
    }
}

impl Connection for PgConnection {
    fn url(&self) -> &str {
        &self.core.url
    }

    fn is_closed(&self) -> bool {
        self.core
            .state
            .lock()
            .expect("postgres state poisoned")
            .client
            .is_none()
    }

    fn close(&self) -> Result<()> {
        let mut state = self.core.state.lock().expect("postgres state poisoned");
        if let Some(client) = state.client.take() {
            state.tx_active = false;
            if let Err(error) = client.close() {
                log::warn!("error closing postgres client: {error}");
            }
        }
        Ok(())
    }

    fn reset_for_pool(&self) -> Result<()> {
        let mut state = self.core.guard()?;
        if state.tx_active {
            PgCore::simple(&mut state, "ROLLBACK")?;
            state.tx_active = false;
        }
        PgCore::simple(
            &mut state,
            "SET SESSION CHARACTERISTICS AS TRANSACTION ISOLATION LEVEL READ COMMITTED",
        )?;
        state.auto_commit = true;
        state.isolation = IsolationLevel::ReadCommitted;
        Ok(())
    }
}

impl RelationalConnection for PgConnection {
    fn prepare_statement(&self, sql: &str) -> Result<Box<dyn PreparedStatement>> {
        let mut state = self.core.guard()?;
        let client = state.client.as_mut().expect("guarded client");
        let statement = client
            .prepare(sql)
            .map_err(|e| from_pg_error("E2QD7MBVH0SU", e))?;
        let parameters = statement.params().len();
        Ok(Box::new(PgPreparedStatement::new(
            self.weak(),
            statement,
            ParamSlots::new(Some(parameters)),
        )))
    }

    fn execute_query(&self, sql: &str) -> Result<Box<dyn ResultSet>> {
        let mut state = self.core.guard()?;
        PgCore::ensure_tx(&mut state)?;
        PgCore::buffered_query(&mut state, sql)
    }

    fn execute_update(&self, sql: &str) -> Result<u64> {
        let mut state = self.core.guard()?;
        PgCore::ensure_tx(&mut state)?;
        let client = state.client.as_mut().expect("guarded client");
        client
            .execute(sql, &[])
            .map_err(|e| from_pg_error("X6LA1PGRC9FW", e))
    }

    fn set_auto_commit(&self, on: bool) -> Result<()> {
        let mut state = self.core.guard()?;
        if on {
            if state.tx_active {
                PgCore::simple(&mut state, "COMMIT")?;
                state.tx_active = false;
            }
            state.auto_commit = true;
        } else {
            state.auto_commit = false;
        }
        Ok(())
    }

    fn auto_commit(&self) -> Result<bool> {
        Ok(self.core.guard()?.auto_commit)
    }

    fn begin(&self) -> Result<()> {
        let mut state = self.core.guard()?;
        if state.tx_active {
            return Err(DbError::new(
                "R0SM5TWJY8KB",
                ErrorKind::TransactionState,
                "transaction already active",
            ));
        }
        PgCore::simple(&mut state, "BEGIN")?;
        state.auto_commit = false;
        state.tx_active = true;
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let mut state = self.core.guard()?;
        if state.tx_active {
            PgCore::simple(&mut state, "COMMIT")?;
            state.tx_active = false;
            return Ok(());
        }
        if state.auto_commit {
            return Err(DbError::new(
                "D4UH8ZCQX2NG",
                ErrorKind::TransactionState,
                "commit outside a transaction",
            ));
        }
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let mut state = self.core.guard()?;
        if state.tx_active {
            PgCore::simple(&mut state, "ROLLBACK")?;
            state.tx_active = false;
            return Ok(());
        }
        if state.auto_commit {
            return Err(DbError::new(
                "W3EK6NFVL1RY",
                ErrorKind::TransactionState,
                "rollback outside a transaction",
            ));
        }
        Ok(())
    }

    fn transaction_active(&self) -> bool {
        self.core
            .state
            .lock()
            .expect("postgres state poisoned")
            .tx_active
    }

    /// PostgreSQL translation: READ UNCOMMITTED is read committed on this
    /// backend, so NONE and READ_UNCOMMITTED map to READ_COMMITTED; the
    /// other levels are native. An in-flight transaction is committed
    /// first and the level applies to subsequent transactions.
    fn set_transaction_isolation(&self, level: IsolationLevel) -> Result<()> {
        let mut state = self.core.guard()?;
        if state.tx_active {
            PgCore::simple(&mut state, "COMMIT")?;
            state.tx_active = false;
        }
        let (mapped, sql) = match level {
            IsolationLevel::None
            | IsolationLevel::ReadUncommitted
            | IsolationLevel::ReadCommitted => (
                IsolationLevel::ReadCommitted,
                "SET SESSION CHARACTERISTICS AS TRANSACTION ISOLATION LEVEL READ COMMITTED",
            ),
            IsolationLevel::RepeatableRead => (
                IsolationLevel::RepeatableRead,
                "SET SESSION CHARACTERISTICS AS TRANSACTION ISOLATION LEVEL REPEATABLE READ",
            ),
            IsolationLevel::Serializable => (
                IsolationLevel::Serializable,
                "SET SESSION CHARACTERISTICS AS TRANSACTION ISOLATION LEVEL SERIALIZABLE",
            ),
        };
        PgCore::simple(&mut state, sql)?;
        state.isolation = mapped;
        Ok(())
    }

    fn transaction_isolation(&self) -> IsolationLevel {
        self.core
            .state
            .lock()
            .expect("postgres state poisoned")
            .isolation
    }
}

impl Drop for PgConnection {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            log::warn!("error closing postgres connection in drop: {error}");
        }
    }
}
