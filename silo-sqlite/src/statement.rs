use crate::connection::{SqliteCore, StmtSlot, backend_error, ensure_tx};
use crate::SqliteResultSet;
use libsqlite3_sys::*;
use silo_core::{
    DbError, ErrorKind, ParamSlots, PreparedStatement, Result, ResultSet, Value,
};
use std::ffi::{CString, c_int, c_void};
use std::mem;
use std::ptr;
use std::sync::{Arc, Weak};

fn transient() -> sqlite3_destructor_type {
    // SQLITE_TRANSIENT: sqlite copies the buffer before returning.
    Some(unsafe { mem::transmute::<isize, unsafe extern "C" fn(*mut c_void)>(-1_isize) })
}

/// Bind the accumulated parameter slots onto the native statement.
///
/// # Safety
/// `db` and `raw` must be live handles and the caller must hold the
/// connection mutex.
unsafe fn bind_values(db: *mut sqlite3, raw: *mut sqlite3_stmt, params: &ParamSlots) -> Result<()> {
    unsafe {
        for (offset, value) in params.values().iter().enumerate() {
            let index = (offset + 1) as c_int;
            let rc = if value.is_null() {
                sqlite3_bind_null(raw, index)
            } else {
                match value {
                    Value::Boolean(Some(v)) => sqlite3_bind_int(raw, index, *v as c_int),
                    Value::Int32(Some(v)) => sqlite3_bind_int(raw, index, *v),
                    Value::Int64(Some(v)) => sqlite3_bind_int64(raw, index, *v),
                    Value::Float64(Some(v)) => sqlite3_bind_double(raw, index, *v),
                    Value::Bytes(Some(v)) => sqlite3_bind_blob(
                        raw,
                        index,
                        if v.is_empty() {
                            // A null pointer with length 0 would bind NULL.
                            b"\0".as_ptr() as *const c_void
                        } else {
                            v.as_ptr() as *const c_void
                        },
                        v.len() as c_int,
                        transient(),
                    ),
                    other => {
                        // Strings and temporal values travel as UTF-8 text.
                        let text = other.as_string()?.unwrap_or_default();
                        let c_text = CString::new(text).map_err(|_| {
                            DbError::new(
                                "N2QX6JFVH9WB",
                                ErrorKind::BindError,
                                "bound text contains a NUL byte",
                            )
                        })?;
                        sqlite3_bind_text(raw, index, c_text.as_ptr(), -1, transient())
                    }
                }
            };
            if rc != SQLITE_OK {
                return Err(backend_error(db, "K5RC8TYDA3LP"));
            }
        }
        Ok(())
    }
}

/// Compiled SQLite statement.
///
/// Holds a weak reference to the connection core; the statement is usable
/// only while the connection is open. Closing is idempotent and happens on
/// drop as well.
pub struct SqlitePreparedStatement {
    core: Weak<SqliteCore>,
    slot: Arc<StmtSlot>,
    columns: Vec<String>,
    params: ParamSlots,
    closed: bool,
}

impl SqlitePreparedStatement {
    pub(crate) fn new(
        core: Weak<SqliteCore>,
        slot: Arc<StmtSlot>,
        columns: Vec<String>,
        params: ParamSlots,
    ) -> Self {
        Self {
            core,
            slot,
            columns,
            params,
            closed: false,
        }
    }

    fn core(&self) -> Result<Arc<SqliteCore>> {
        if self.closed {
            return Err(DbError::new(
                "B9WM4SGKE7UT",
                ErrorKind::StatementClosed,
                "statement is closed",
            ));
        }
        let core = self.core.upgrade().ok_or_else(|| {
            DbError::new(
                "D6AF0ZNRQ1YV",
                ErrorKind::ConnectionClosed,
                "owning connection is gone",
            )
        })?;
        // Also require the handle to still be open; binds on an orphaned
        // statement fail without touching native memory.
        drop(core.guard()?);
        Ok(core)
    }

    /// Reset, rebind and leave the statement ready to step. Shared by the
    /// execute flavors.
    fn arm(&self) -> Result<Arc<SqliteCore>> {
        let core = self.core()?;
        {
            let mut state = core.guard()?;
            let raw = *self.slot.raw.lock().expect("sqlite statement slot poisoned");
            if raw.is_null() {
                return Err(DbError::new(
                    "H3JQ7CLXS5PD",
                    ErrorKind::ConnectionClosed,
                    "statement was finalized by connection close",
                ));
            }
            unsafe {
                sqlite3_reset(raw);
                sqlite3_clear_bindings(raw);
                bind_values(state.db, raw, &self.params)?;
            }
            ensure_tx(&mut state)?;
        }
        Ok(core)
    }
}

impl PreparedStatement for SqlitePreparedStatement {
    fn set_value(&mut self, index: usize, value: Value) -> Result<()> {
        self.core()?;
        self.params.set(index, value)
    }

    fn clear_parameters(&mut self) -> Result<()> {
        self.core()?;
        self.params.clear();
        Ok(())
    }

    fn execute_query(&mut self) -> Result<Box<dyn ResultSet>> {
        self.arm()?;
        Ok(Box::new(SqliteResultSet::new(
            self.core.clone(),
            self.slot.clone(),
            self.columns.clone(),
            false,
        )))
    }

    fn execute_update(&mut self) -> Result<u64> {
        let core = self.arm()?;
        let state = core.guard()?;
        let raw = *self.slot.raw.lock().expect("sqlite statement slot poisoned");
        if raw.is_null() {
            return Err(DbError::new(
                "P1EV5BHWN8KC",
                ErrorKind::ConnectionClosed,
                "statement was finalized by connection close",
            ));
        }
        unsafe {
            loop {
                match sqlite3_step(raw) {
                    SQLITE_ROW | SQLITE_BUSY => continue,
                    SQLITE_DONE => break,
                    _ => {
                        let error = backend_error(state.db, "S8UY2MQJF4XG");
                        sqlite3_reset(raw);
                        return Err(error);
                    }
                }
            }
            let changes = sqlite3_changes64(state.db) as u64;
            sqlite3_reset(raw);
            Ok(changes)
        }
    }

    fn execute(&mut self) -> Result<bool> {
        let core = self.arm()?;
        let state = core.guard()?;
        let raw = *self.slot.raw.lock().expect("sqlite statement slot poisoned");
        if raw.is_null() {
            return Err(DbError::new(
                "V7QS2HXDA4GM",
                ErrorKind::ConnectionClosed,
                "statement was finalized by connection close",
            ));
        }
        unsafe {
            loop {
                match sqlite3_step(raw) {
                    SQLITE_ROW => {
                        // Rows are waiting: this was a query. Rewind so a
                        // following execute_query sees them all.
                        sqlite3_reset(raw);
                        return Ok(true);
                    }
                    SQLITE_DONE => {
                        sqlite3_reset(raw);
                        return Ok(false);
                    }
                    SQLITE_BUSY => continue,
                    _ => {
                        let error = backend_error(state.db, "Y2KD8RWQJ5TN");
                        sqlite3_reset(raw);
                        return Err(error);
                    }
                }
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.core.upgrade() {
            Some(core) => {
                let _state = core.state.lock().expect("sqlite state poisoned");
                let mut raw = self.slot.raw.lock().expect("sqlite statement slot poisoned");
                if !raw.is_null() {
                    unsafe { sqlite3_finalize(*raw) };
                    *raw = ptr::null_mut();
                }
            }
            // Connection close already finalized every child handle, so
            // there is nothing left to release here.
            None => {}
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for SqlitePreparedStatement {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            log::warn!("error closing sqlite statement in drop: {error}");
        }
    }
}
