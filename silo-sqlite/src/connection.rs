use crate::extract::db_error_message;
use crate::{SqlitePreparedStatement, SqliteResultSet, extract};
use libsqlite3_sys::*;
use silo_core::{
    Connection, DbError, ErrorKind, IsolationLevel, ParamSlots, PreparedStatement,
    RelationalConnection, Result, ResultSet,
};
use std::collections::BTreeMap;
use std::ffi::{CString, c_int};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Shared slot for one native statement handle.
///
/// The connection keeps weak references to every live slot so its close
/// path can finalize them; a nulled-out slot tells the owning statement or
/// result set that nothing is left to finalize.
pub(crate) struct StmtSlot {
    pub(crate) raw: Mutex<*mut sqlite3_stmt>,
}

unsafe impl Send for StmtSlot {}
unsafe impl Sync for StmtSlot {}

pub(crate) struct SqliteState {
    pub(crate) db: *mut sqlite3,
    pub(crate) auto_commit: bool,
    pub(crate) tx_active: bool,
    pub(crate) isolation: IsolationLevel,
    statements: Vec<Weak<StmtSlot>>,
}

unsafe impl Send for SqliteState {}

/// Connection core shared (weakly) with statements and result sets.
///
/// The state mutex is the per-connection mutex of the driver contract:
/// preparing, stepping, finalizing, committing and closing all serialize
/// on it. Lock order is state before slot, everywhere.
pub(crate) struct SqliteCore {
    url: String,
    pub(crate) state: Mutex<SqliteState>,
}

impl SqliteCore {
    /// Lock the state and require an open handle.
    pub(crate) fn guard(&self) -> Result<MutexGuard<'_, SqliteState>> {
        let state = self.state.lock().expect("sqlite state poisoned");
        if state.db.is_null() {
            return Err(DbError::new(
                "Q2SL8VNKD6TY",
                ErrorKind::ConnectionClosed,
                "sqlite connection is closed",
            ));
        }
        Ok(state)
    }
}

/// Run one SQL statement to completion, returning the change count.
///
/// # Safety
/// `db` must be a live handle and the caller must hold the connection
/// mutex.
pub(crate) unsafe fn exec(db: *mut sqlite3, sql: &str) -> Result<u64> {
    unsafe {
        let c_sql = CString::new(sql).map_err(|_| {
            DbError::new(
                "W6FJ1RQHZ4BN",
                ErrorKind::ParseError,
                "SQL text contains a NUL byte",
            )
        })?;
        let mut raw: *mut sqlite3_stmt = ptr::null_mut();
        let rc = sqlite3_prepare_v2(db, c_sql.as_ptr(), -1, &mut raw, ptr::null_mut());
        if rc != SQLITE_OK {
            return Err(backend_error(db, "E9KC4MTXV0GW"));
        }
        loop {
            match sqlite3_step(raw) {
                SQLITE_ROW | SQLITE_BUSY => continue,
                SQLITE_DONE => break,
                _ => {
                    let error = backend_error(db, "R3YA7SDPJ1UM");
                    sqlite3_finalize(raw);
                    return Err(error);
                }
            }
        }
        sqlite3_finalize(raw);
        Ok(sqlite3_changes64(db) as u64)
    }
}

pub(crate) fn backend_error(db: *mut sqlite3, mark: &'static str) -> DbError {
    let (code, message) = unsafe {
        (
            sqlite3_extended_errcode(db),
            db_error_message(db),
        )
    };
    DbError::backend(mark, code.to_string(), message)
}

/// Start the implicit transaction when auto-commit is off and no
/// transaction is open yet.
pub(crate) fn ensure_tx(state: &mut SqliteState) -> Result<()> {
    if !state.auto_commit && !state.tx_active {
        unsafe { exec(state.db, "BEGIN") }?;
        state.tx_active = true;
    }
    Ok(())
}

/// Compile `sql`, register the slot with the connection and report the
/// result columns and parameter count.
pub(crate) fn prepare_raw(
    state: &mut SqliteState,
    sql: &str,
) -> Result<(Arc<StmtSlot>, Vec<String>, usize)> {
    let c_sql = CString::new(sql).map_err(|_| {
        DbError::new(
            "T5BD0WGQN8XJ",
            ErrorKind::ParseError,
            "SQL text contains a NUL byte",
        )
    })?;
    let mut raw: *mut sqlite3_stmt = ptr::null_mut();
    unsafe {
        let rc = sqlite3_prepare_v2(state.db, c_sql.as_ptr(), -1, &mut raw, ptr::null_mut());
        if rc != SQLITE_OK {
            return Err(backend_error(state.db, "A1VN6HKSC3EZ"));
        }
        let column_count = sqlite3_column_count(raw);
        let columns = (0..column_count)
            .map(|i| extract::column_name(raw, i))
            .collect();
        let parameters = sqlite3_bind_parameter_count(raw) as usize;
        let slot = Arc::new(StmtSlot {
            raw: Mutex::new(raw),
        });
        if state.statements.len() > 50 {
            state.statements.retain(|weak| weak.strong_count() > 0);
        }
        state.statements.push(Arc::downgrade(&slot));
        Ok((slot, columns, parameters))
    }
}

/// Open SQLite session.
pub struct SqliteConnection {
    core: Arc<SqliteCore>,
}

impl SqliteConnection {
    /// Open `path` (a filesystem path or `:memory:`) and apply the
    /// recognized URL options: `foreign_keys` (default on),
    /// `journal_mode`, `synchronous` and `busy_timeout` (ms, default
    /// 5000).
    pub(crate) fn open(
        path: &str,
        url: &str,
        options: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let c_path = CString::new(path).map_err(|_| {
            DbError::new(
                "L8PW3EYJM5QA",
                ErrorKind::ParseError,
                "database path contains a NUL byte",
            )
        })?;
        let mut db: *mut sqlite3 = ptr::null_mut();
        unsafe {
            let rc = sqlite3_open_v2(
                c_path.as_ptr(),
                &mut db,
                SQLITE_OPEN_READWRITE | SQLITE_OPEN_CREATE,
                ptr::null(),
            );
            if rc != SQLITE_OK {
                let error = DbError::new(
                    "G7XU2CVBF9RK",
                    ErrorKind::ConnectFailure,
                    format!("cannot open `{path}`: {}", db_error_message(db)),
                );
                sqlite3_close(db);
                log::error!("{error}");
                return Err(error);
            }

            let busy_timeout: c_int = options
                .get("busy_timeout")
                .and_then(|v| v.parse().ok())
                .unwrap_or(5000);
            sqlite3_busy_timeout(db, busy_timeout);

            let core = Self {
                core: Arc::new(SqliteCore {
                    url: url.to_string(),
                    state: Mutex::new(SqliteState {
                        db,
                        auto_commit: true,
                        tx_active: false,
                        isolation: IsolationLevel::Serializable,
                        statements: Vec::new(),
                    }),
                }),
            };

            {
                let state = core.core.guard()?;
                if options.get("foreign_keys").map(String::as_str) != Some("false") {
                    exec(state.db, "PRAGMA foreign_keys = ON")?;
                }
                if let Some(mode) = options.get("journal_mode") {
                    exec(state.db, &format!("PRAGMA journal_mode = {mode}"))?;
                }
                if let Some(level) = options.get("synchronous") {
                    exec(state.db, &format!("PRAGMA synchronous = {level}"))?;
                }
            }
            log::debug!("opened sqlite database `{path}`");
            Ok(core)
        }
    }

    fn weak(&self) -> Weak<SqliteCore> {
        Arc::downgrade(&self.core)
    }
}

impl Connection for SqliteConnection {
    fn url(&self) -> &str {
        &self.core.url
    }

    fn is_closed(&self) -> bool {
        self.core
            .state
            .lock()
            .expect("sqlite state poisoned")
            .db
            .is_null()
    }

    fn close(&self) -> Result<()> {
        let mut state = self.core.state.lock().expect("sqlite state poisoned");
        if state.db.is_null() {
            return Ok(());
        }
        // Children first: finalize every live statement handle while the
        // database handle is still valid, then release the handle. After
        // this, orphaned statements observe a nulled slot and never touch
        // native memory again.
        for weak in state.statements.drain(..) {
            if let Some(slot) = weak.upgrade() {
                let mut raw = slot.raw.lock().expect("sqlite statement slot poisoned");
                if !raw.is_null() {
                    unsafe { sqlite3_finalize(*raw) };
                    *raw = ptr::null_mut();
                }
            }
        }
        if state.tx_active {
            if let Err(error) = unsafe { exec(state.db, "ROLLBACK") } {
                log::warn!("rollback during sqlite close failed: {error}");
            }
            state.tx_active = false;
        }
        let rc = unsafe { sqlite3_close(state.db) };
        if rc != SQLITE_OK {
            log::warn!("sqlite3_close returned {rc}");
        }
        state.db = ptr::null_mut();
        Ok(())
    }

    fn reset_for_pool(&self) -> Result<()> {
        let mut state = self.core.guard()?;
        if state.tx_active {
            unsafe { exec(state.db, "ROLLBACK") }?;
            state.tx_active = false;
        }
        state.auto_commit = true;
        unsafe { exec(state.db, "PRAGMA read_uncommitted = 0") }?;
        state.isolation = IsolationLevel::Serializable;
        Ok(())
    }
}

impl RelationalConnection for SqliteConnection {
    fn prepare_statement(&self, sql: &str) -> Result<Box<dyn PreparedStatement>> {
        let mut state = self.core.guard()?;
        let (slot, columns, parameters) = prepare_raw(&mut state, sql)?;
        Ok(Box::new(SqlitePreparedStatement::new(
            self.weak(),
            slot,
            columns,
            ParamSlots::new(Some(parameters)),
        )))
    }

    fn execute_query(&self, sql: &str) -> Result<Box<dyn ResultSet>> {
        let mut state = self.core.guard()?;
        ensure_tx(&mut state)?;
        let (slot, columns, _) = prepare_raw(&mut state, sql)?;
        Ok(Box::new(SqliteResultSet::new(
            self.weak(),
            slot,
            columns,
            true,
        )))
    }

    fn execute_update(&self, sql: &str) -> Result<u64> {
        let mut state = self.core.guard()?;
        ensure_tx(&mut state)?;
        unsafe { exec(state.db, sql) }
    }

    fn set_auto_commit(&self, on: bool) -> Result<()> {
        let mut state = self.core.guard()?;
        if on {
            if state.tx_active {
                unsafe { exec(state.db, "COMMIT") }?;
                state.tx_active = false;
            }
            state.auto_commit = true;
        } else {
            // The transaction itself starts lazily with the next statement.
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
                "Z0RM5QWCT7HD",
                ErrorKind::TransactionState,
                "transaction already active",
            ));
        }
        unsafe { exec(state.db, "BEGIN") }?;
        state.auto_commit = false;
        state.tx_active = true;
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let mut state = self.core.guard()?;
        if state.tx_active {
            unsafe { exec(state.db, "COMMIT") }?;
            state.tx_active = false;
            return Ok(());
        }
        if state.auto_commit {
            return Err(DbError::new(
                "J4TK9NBEX2SV",
                ErrorKind::TransactionState,
                "commit outside a transaction",
            ));
        }
        // Transactional mode with nothing executed yet: commit is a no-op.
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let mut state = self.core.guard()?;
        if state.tx_active {
            unsafe { exec(state.db, "ROLLBACK") }?;
            state.tx_active = false;
            return Ok(());
        }
        if state.auto_commit {
            return Err(DbError::new(
                "Y7GH1FPLU8CA",
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
            .expect("sqlite state poisoned")
            .tx_active
    }

    /// SQLite translation: NONE and READ_UNCOMMITTED enable
    /// `PRAGMA read_uncommitted` (effective under shared cache) and map to
    /// READ_UNCOMMITTED; every other level maps to SERIALIZABLE, SQLite's
    /// native behavior. An in-flight transaction is committed first.
    fn set_transaction_isolation(&self, level: IsolationLevel) -> Result<()> {
        let mut state = self.core.guard()?;
        if state.tx_active {
            unsafe { exec(state.db, "COMMIT") }?;
            state.tx_active = false;
        }
        let mapped = match level {
            IsolationLevel::None | IsolationLevel::ReadUncommitted => {
                unsafe { exec(state.db, "PRAGMA read_uncommitted = 1") }?;
                IsolationLevel::ReadUncommitted
            }
            _ => {
                unsafe { exec(state.db, "PRAGMA read_uncommitted = 0") }?;
                IsolationLevel::Serializable
            }
        };
        state.isolation = mapped;
        Ok(())
    }

    fn transaction_isolation(&self) -> IsolationLevel {
        self.core
            .state
            .lock()
            .expect("sqlite state poisoned")
            .isolation
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            log::warn!("error closing sqlite connection in drop: {error}");
        }
    }
}
