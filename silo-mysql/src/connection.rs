use crate::statement::MySqlPreparedStatement;
use crate::values::{from_mysql_error, materialize_row};
use mysql::prelude::Queryable;
use mysql::{Conn, Opts, OptsBuilder};
use silo_core::{
    BufferedResultSet, Connection, ConnectionUrl, DbError, ErrorKind, IsolationLevel, ParamSlots,
    PreparedStatement, RelationalConnection, Result, ResultSet,
};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

pub(crate) struct MySqlState {
    pub(crate) conn: Option<Conn>,
    pub(crate) auto_commit: bool,
    pub(crate) tx_active: bool,
    pub(crate) isolation: IsolationLevel,
}

/// Connection core shared weakly with prepared statements. The state
/// mutex is the per-connection mutex; the client connection itself is not
/// thread safe, so every wire operation goes through it.
pub(crate) struct MySqlCore {
    url: String,
    pub(crate) state: Mutex<MySqlState>,
}

impl MySqlCore {
    pub(crate) fn guard(&self) -> Result<MutexGuard<'_, MySqlState>> {
        let state = self.state.lock().expect("mysql state poisoned");
        if state.conn.is_none() {
            return Err(DbError::new(
                "A6PW3KZQN0VD",
                ErrorKind::ConnectionClosed,
                "mysql connection is closed",
            ));
        }
        Ok(state)
    }

    /// Run one statement for effect only.
    pub(crate) fn simple(state: &mut MySqlState, sql: &str) -> Result<()> {
        let conn = state.conn.as_mut().expect("guarded connection");
        conn.query_drop(sql)
            .map_err(|e| from_mysql_error("T9RC4HYXF2SB", e))
    }

    pub(crate) fn ensure_tx(state: &mut MySqlState) -> Result<()> {
        if !state.auto_commit && !state.tx_active {
            // `SET autocommit = 0` already opened an implicit transaction
            // server side; the flag only tracks that work is pending.
            state.tx_active = true;
        }
        Ok(())
    }
}

/// Open MySQL session.
pub struct MySqlConnection {
    core: Arc<MySqlCore>,
}

impl MySqlConnection {
    pub(crate) fn open(url: &ConnectionUrl) -> Result<Self> {
        let opts: Opts = OptsBuilder::new()
            .ip_or_hostname(Some(url.host().to_string()))
            .tcp_port(url.port().unwrap_or(3306))
            .user(url.username().map(str::to_string))
            .pass(url.password().map(str::to_string))
            .db_name(if url.target().is_empty() {
                None
            } else {
                Some(url.target().to_string())
            })
            .into();
        let conn = Conn::new(opts).map_err(|e| {
            let error = from_mysql_error("J1GV6BNME8TK", e);
            log::error!("mysql connect failed: {error}");
            error
        })?;
        log::debug!("connected to mysql at {}", url.authority(3306));
        Ok(Self {
            core: Arc::new(MySqlCore {
                url: url.as_str().to_string(),
                state: Mutex::new(MySqlState {
                    conn: Some(conn),
                    auto_commit: true,
                    tx_active: false,
                    isolation: IsolationLevel::RepeatableRead,
                }),
            }),
        })
    }

    fn weak(&self) -> Weak<MySqlCore> {
        Arc::downgrade(&self.core)
    }
}

impl Connection for MySqlConnection {
    fn url(&self) -> &str {
        &self.core.url
    }

    fn is_closed(&self) -> bool {
        self.core
            .state
            .lock()
            .expect("mysql state poisoned")
            .conn
            .is_none()
    }

    fn close(&self) -> Result<()> {
        let mut state = self.core.state.lock().expect("mysql state poisoned");
        if let Some(conn) = state.conn.take() {
            // Dropping the client connection closes the socket.
            drop(conn);
            state.tx_active = false;
        }
        Ok(())
    }

    fn reset_for_pool(&self) -> Result<()> {
        let mut state = self.core.guard()?;
        if state.tx_active {
            MySqlCore::simple(&mut state, "ROLLBACK")?;
            state.tx_active = false;
        }
        MySqlCore::simple(&mut state, "SET autocommit = 1")?;
        MySqlCore::simple(
            &mut state,
            "SET SESSION TRANSACTION ISOLATION LEVEL REPEATABLE READ",
        )?;
        state.auto_commit = true;
        state.isolation = IsolationLevel::RepeatableRead;
        Ok(())
    }
}

impl RelationalConnection for MySqlConnection {
    fn prepare_statement(&self, sql: &str) -> Result<Box<dyn PreparedStatement>> {
        let mut state = self.core.guard()?;
        let conn = state.conn.as_mut().expect("guarded connection");
        let statement = conn
            .prep(sql)
            .map_err(|e| from_mysql_error("W7ZD0QJUK5MA", e))?;
        let parameters = statement.num_params() as usize;
        Ok(Box::new(MySqlPreparedStatement::new(
            self.weak(),
            statement,
            ParamSlots::new(Some(parameters)),
        )))
    }

    fn execute_query(&self, sql: &str) -> Result<Box<dyn ResultSet>> {
        let mut state = self.core.guard()?;
        MySqlCore::ensure_tx(&mut state)?;
        let conn = state.conn.as_mut().expect("guarded connection");
        let mut result = conn
            .query_iter(sql)
            .map_err(|e| from_mysql_error("E3HS8VRYC1NP", e))?;
        buffer_result(&mut result)
    }

    fn execute_update(&self, sql: &str) -> Result<u64> {
        let mut state = self.core.guard()?;
        MySqlCore::ensure_tx(&mut state)?;
        let conn = state.conn.as_mut().expect("guarded connection");
        let result = conn
            .query_iter(sql)
            .map_err(|e| from_mysql_error("G5BK2TWNX9QF", e))?;
        Ok(result.affected_rows())
    }

    fn set_auto_commit(&self, on: bool) -> Result<()> {
        let mut state = self.core.guard()?;
        if on {
            if state.tx_active {
                MySqlCore::simple(&mut state, "COMMIT")?;
                state.tx_active = false;
            }
            MySqlCore::simple(&mut state, "SET autocommit = 1")?;
            state.auto_commit = true;
        } else {
            MySqlCore::simple(&mut state, "SET autocommit = 0")?;
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
                "N8FM5CLAD7GW",
                ErrorKind::TransactionState,
                "transaction already active",
            ));
        }
        MySqlCore::simple(&mut state, "START TRANSACTION")?;
        state.auto_commit = false;
        state.tx_active = true;
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let mut state = self.core.guard()?;
        if state.tx_active {
            MySqlCore::simple(&mut state, "COMMIT")?;
            state.tx_active = false;
            return Ok(());
        }
        if state.auto_commit {
            return Err(DbError::new(
                "S2XJ9PEVB4HT",
                ErrorKind::TransactionState,
                "commit outside a transaction",
            ));
        }
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let mut state = self.core.guard()?;
        if state.tx_active {
            MySqlCore::simple(&mut state, "ROLLBACK")?;
            state.tx_active = false;
            return Ok(());
        }
        if state.auto_commit {
            return Err(DbError::new(
                "H0UY6RQGK3CZ",
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
            .expect("mysql state poisoned")
            .tx_active
    }

    /// MySQL supports all four standard levels; NONE maps up to
    /// READ UNCOMMITTED. An in-flight transaction is committed first, and
    /// the new level applies from the next transaction on.
    fn set_transaction_isolation(&self, level: IsolationLevel) -> Result<()> {
        let mut state = self.core.guard()?;
        if state.tx_active {
            MySqlCore::simple(&mut state, "COMMIT")?;
            state.tx_active = false;
        }
        let (mapped, sql) = match level {
            IsolationLevel::None | IsolationLevel::ReadUncommitted => (
                IsolationLevel::ReadUncommitted,
                "SET SESSION TRANSACTION ISOLATION LEVEL READ UNCOMMITTED",
            ),
            IsolationLevel::ReadCommitted => (
                IsolationLevel::ReadCommitted,
                "SET SESSION TRANSACTION ISOLATION LEVEL READ COMMITTED",
            ),
            IsolationLevel::RepeatableRead => (
                IsolationLevel::RepeatableRead,
                "SET SESSION TRANSACTION ISOLATION LEVEL REPEATABLE READ",
            ),
            IsolationLevel::Serializable => (
                IsolationLevel::Serializable,
                "SET SESSION TRANSACTION ISOLATION LEVEL SERIALIZABLE",
            ),
        };
        MySqlCore::simple(&mut state, sql)?;
        state.isolation = mapped;
        Ok(())
    }

    fn transaction_isolation(&self) -> IsolationLevel {
        self.core
            .state
            .lock()
            .expect("mysql state poisoned")
            .isolation
    }
}

impl Drop for MySqlConnection {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            log::warn!("error closing mysql connection in drop: {error}");
        }
    }
}

/// Drain a query result into a buffered result set.
pub(crate) fn buffer_result<P: mysql::prelude::Protocol>(
    result: &mut mysql::QueryResult<'_, '_, '_, P>,
) -> Result<Box<dyn ResultSet>> {
    let columns: Vec<String> = result
        .columns()
        .as_ref()
        .iter()
        .map(|c| c.name_str().into_owned())
        .collect();
    let mut rows = Vec::new();
    for row in result.by_ref() {
        let row = row.map_err(|e| from_mysql_error("V4LN7AWSJ0XE", e))?;
        rows.push(materialize_row(row)?);
    }
    Ok(Box::new(BufferedResultSet::new(columns, rows)))
}
