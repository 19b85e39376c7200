use crate::connection::{SqliteCore, StmtSlot, backend_error};
use crate::extract;
use libsqlite3_sys::*;
use silo_core::{CursorState, DbError, ErrorKind, Result, ResultSet, Value};
use std::ptr;
use std::sync::{Arc, Weak};
use time::{Date, PrimitiveDateTime, Time};

/// Cursor-model result set.
///
/// Every `next` and every column read crosses the native handle, so both
/// re-acquire the owning connection's mutex. `owns_statement` is set for
/// one-shot `execute_query` results, which finalize their statement on
/// close; statement-produced result sets only reset it.
pub struct SqliteResultSet {
    core: Weak<SqliteCore>,
    slot: Arc<StmtSlot>,
    columns: Vec<String>,
    owns_statement: bool,
    cursor: CursorState,
    row_index: u64,
    was_null: bool,
    closed: bool,
}

impl SqliteResultSet {
    pub(crate) fn new(
        core: Weak<SqliteCore>,
        slot: Arc<StmtSlot>,
        columns: Vec<String>,
        owns_statement: bool,
    ) -> Self {
        Self {
            core,
            slot,
            columns,
            owns_statement,
            cursor: CursorState::BeforeFirst,
            row_index: 0,
            was_null: false,
            closed: false,
        }
    }

    fn live(&self) -> Result<Arc<SqliteCore>> {
        if self.closed {
            return Err(DbError::new(
                "F4ZT9KWVB6NQ",
                ErrorKind::ResultClosed,
                "result set is closed",
            ));
        }
        self.core.upgrade().ok_or_else(|| {
            DbError::new(
                "M7CH2EYSL0JA",
                ErrorKind::ConnectionClosed,
                "owning connection is gone",
            )
        })
    }

    /// Read one column of the current row under the connection mutex.
    fn value_at(&self, index: usize) -> Result<Value> {
        match self.cursor {
            CursorState::OnRow => {}
            CursorState::BeforeFirst => {
                return Err(DbError::new(
                    "V3GN8RDQU5XW",
                    ErrorKind::NoCurrentRow,
                    "cursor is before the first row",
                ));
            }
            CursorState::AfterLast => {
                return Err(DbError::new(
                    "C0PB6JZKT9EM",
                    ErrorKind::NoCurrentRow,
                    "cursor is after the last row",
                ));
            }
        }
        if index >= self.columns.len() {
            return Err(DbError::new(
                "X8SD1AFYH4LC",
                ErrorKind::BindError,
                format!(
                    "column index {index} out of range, result has {}",
                    self.columns.len()
                ),
            ));
        }
        let core = self.live()?;
        let state = core.guard()?;
        let raw = *self.slot.raw.lock().expect("sqlite statement slot poisoned");
        if raw.is_null() {
            drop(state);
            return Err(DbError::new(
                "O5KJ3WQNR7TB",
                ErrorKind::ConnectionClosed,
                "statement was finalized by connection close",
            ));
        }
        let value = unsafe { extract::column_value(raw, index as i32) };
        Ok(value)
    }
}

macro_rules! sqlite_get {
    ($name:ident, $ty:ty, $conv:ident, $zero:expr) => {
        fn $name(&mut self, index: usize) -> Result<$ty> {
            let value = self.value_at(index)?.$conv()?;
            self.was_null = value.is_none();
            Ok(value.unwrap_or($zero))
        }
    };
}

impl ResultSet for SqliteResultSet {
    fn next(&mut self) -> Result<bool> {
        if self.closed {
            return Err(DbError::new(
                "I6RW0TMGD2YF",
                ErrorKind::ResultClosed,
                "result set is closed",
            ));
        }
        if self.cursor == CursorState::AfterLast {
            return Ok(false);
        }
        let core = self.live()?;
        let state = core.guard()?;
        let raw = *self.slot.raw.lock().expect("sqlite statement slot poisoned");
        if raw.is_null() {
            drop(state);
            return Err(DbError::new(
                "U2LQ9XCVK8HS",
                ErrorKind::ConnectionClosed,
                "statement was finalized by connection close",
            ));
        }
        loop {
            match unsafe { sqlite3_step(raw) } {
                SQLITE_ROW => {
                    self.cursor = CursorState::OnRow;
                    self.row_index += 1;
                    return Ok(true);
                }
                SQLITE_DONE => {
                    self.cursor = CursorState::AfterLast;
                    return Ok(false);
                }
                SQLITE_BUSY => continue,
                _ => {
                    let error = backend_error(state.db, "W1YE5PNJA3ZD");
                    return Err(error);
                }
            }
        }
    }

    fn cursor_state(&self) -> CursorState {
        self.cursor
    }

    fn row(&self) -> u64 {
        match self.cursor {
            CursorState::OnRow => self.row_index,
            _ => 0,
        }
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, index: usize) -> Result<String> {
        self.columns.get(index).cloned().ok_or_else(|| {
            DbError::new(
                "R9TA4GBXM6VU",
                ErrorKind::BindError,
                format!(
                    "column index {index} out of range, result has {}",
                    self.columns.len()
                ),
            )
        })
    }

    fn find_column(&self, name: &str) -> Result<usize> {
        self.columns.iter().position(|c| c == name).ok_or_else(|| {
            DbError::new(
                "T7FK1HSCW0QJ",
                ErrorKind::BindError,
                format!("no column named `{name}`"),
            )
        })
    }

    fn is_null(&mut self, index: usize) -> Result<bool> {
        Ok(self.value_at(index)?.is_null())
    }

    fn was_null(&self) -> bool {
        self.was_null
    }

    fn get_value(&mut self, index: usize) -> Result<Value> {
        self.value_at(index)
    }

    sqlite_get!(get_bool, bool, as_bool, false);
    sqlite_get!(get_i32, i32, as_i32, 0);
    sqlite_get!(get_i64, i64, as_i64, 0);
    sqlite_get!(get_f64, f64, as_f64, 0.0);
    sqlite_get!(get_string, String, as_string, String::new());
    sqlite_get!(get_date, Date, as_date, Date::MIN);
    sqlite_get!(get_time, Time, as_time, Time::MIDNIGHT);
    sqlite_get!(
        get_timestamp,
        PrimitiveDateTime,
        as_timestamp,
        PrimitiveDateTime::MIN
    );
    sqlite_get!(get_bytes, Vec<u8>, as_bytes, Vec::new());

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(core) = self.core.upgrade() {
            let _state = core.state.lock().expect("sqlite state poisoned");
            let mut raw = self.slot.raw.lock().expect("sqlite statement slot poisoned");
            if !raw.is_null() {
                if self.owns_statement {
                    unsafe { sqlite3_finalize(*raw) };
                    *raw = ptr::null_mut();
                } else {
                    unsafe { sqlite3_reset(*raw) };
                }
            }
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for SqliteResultSet {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            log::warn!("error closing sqlite result set in drop: {error}");
        }
    }
}
