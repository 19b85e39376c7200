use libsqlite3_sys::*;
use silo_core::Value;
use std::ffi::CStr;
use std::slice;

/// Read the canonical name of a 0-based result column.
///
/// # Safety
/// `stmt` must be a live statement handle and `index` within its column
/// count; the caller holds the connection mutex.
pub(crate) unsafe fn column_name(stmt: *mut sqlite3_stmt, index: i32) -> String {
    unsafe {
        let name = sqlite3_column_name(stmt, index);
        if name.is_null() {
            format!("column{index}")
        } else {
            CStr::from_ptr(name).to_string_lossy().into_owned()
        }
    }
}

/// Materialize the value of a 0-based column in the current row.
///
/// # Safety
/// Same contract as [`column_name`], and the statement must be positioned
/// on a row (`sqlite3_step` returned `SQLITE_ROW`).
pub(crate) unsafe fn column_value(stmt: *mut sqlite3_stmt, index: i32) -> Value {
    unsafe {
        match sqlite3_column_type(stmt, index) {
            SQLITE_NULL => Value::Null,
            SQLITE_INTEGER => Value::Int64(Some(sqlite3_column_int64(stmt, index))),
            SQLITE_FLOAT => Value::Float64(Some(sqlite3_column_double(stmt, index))),
            SQLITE_TEXT => {
                let ptr = sqlite3_column_text(stmt, index);
                let len = sqlite3_column_bytes(stmt, index) as usize;
                let text = if ptr.is_null() {
                    String::new()
                } else {
                    String::from_utf8_lossy(slice::from_raw_parts(ptr, len)).into_owned()
                };
                Value::Varchar(Some(text))
            }
            _ => {
                let ptr = sqlite3_column_blob(stmt, index);
                let len = sqlite3_column_bytes(stmt, index) as usize;
                let bytes = if ptr.is_null() || len == 0 {
                    Vec::new()
                } else {
                    slice::from_raw_parts(ptr as *const u8, len).to_vec()
                };
                Value::Bytes(Some(bytes))
            }
        }
    }
}

/// Error text of the connection owning `db`.
///
/// # Safety
/// `db` must be a live database handle; the caller holds the connection
/// mutex.
pub(crate) unsafe fn db_error_message(db: *mut sqlite3) -> String {
    unsafe {
        let message = sqlite3_errmsg(db);
        if message.is_null() {
            "unknown sqlite error".to_string()
        } else {
            CStr::from_ptr(message).to_string_lossy().into_owned()
        }
    }
}
