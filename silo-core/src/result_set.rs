use crate::{
    Blob, DbError, ErrorKind, InputStream, MemoryBlob, MemoryInputStream, Result, Value,
};
use std::sync::Arc;
use time::{Date, PrimitiveDateTime, Time};

/// Cursor position of a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    BeforeFirst,
    OnRow,
    AfterLast,
}

/// Forward-only view over query results.
///
/// The cursor starts before the first row; each successful [`ResultSet::next`]
/// advances it, and a `false` return parks it after the last row for good.
/// Typed accessors off a row fail with `NoCurrentRow`. A NULL read through a
/// typed accessor yields the type's zero value and arms [`ResultSet::was_null`].
///
/// Cursor-model backends route every advance and column read through the
/// owning connection's mutex; buffered backends hold their rows client side
/// and detach from the connection at execution time.
pub trait ResultSet: Send {
    /// Advance to the next row. `false` means the cursor is now after the
    /// last row; asking again keeps failing rather than re-delivering rows.
    fn next(&mut self) -> Result<bool>;

    fn cursor_state(&self) -> CursorState;

    fn is_before_first(&self) -> bool {
        self.cursor_state() == CursorState::BeforeFirst
    }

    fn is_after_last(&self) -> bool {
        self.cursor_state() == CursorState::AfterLast
    }

    /// 1-based index of the current row; 0 before the first `next`.
    fn row(&self) -> u64;

    fn column_count(&self) -> usize;

    /// Canonical (backend-reported) name of the 0-based column.
    fn column_name(&self, index: usize) -> Result<String>;

    /// 0-based index for a canonical column name, exact match; the first
    /// occurrence wins for duplicated names.
    fn find_column(&self, name: &str) -> Result<usize>;

    fn is_null(&mut self, index: usize) -> Result<bool>;

    /// Whether the last typed accessor read a NULL.
    fn was_null(&self) -> bool;

    /// Raw value of the 0-based column in the current row.
    fn get_value(&mut self, index: usize) -> Result<Value>;

    fn get_bool(&mut self, index: usize) -> Result<bool>;
    fn get_i32(&mut self, index: usize) -> Result<i32>;
    fn get_i64(&mut self, index: usize) -> Result<i64>;
    fn get_f64(&mut self, index: usize) -> Result<f64>;
    fn get_string(&mut self, index: usize) -> Result<String>;
    fn get_date(&mut self, index: usize) -> Result<Date>;
    fn get_time(&mut self, index: usize) -> Result<Time>;
    fn get_timestamp(&mut self, index: usize) -> Result<PrimitiveDateTime>;
    fn get_bytes(&mut self, index: usize) -> Result<Vec<u8>>;

    /// Blob view over a binary column.
    fn get_blob(&mut self, index: usize) -> Result<Box<dyn Blob>> {
        Ok(Box::new(MemoryBlob::from_bytes(self.get_bytes(index)?)))
    }

    /// Stream view over a binary column. For cursor-model backends the view
    /// is only valid while the cursor still sits on the row it came from.
    fn get_binary_stream(&mut self, index: usize) -> Result<Box<dyn InputStream>> {
        Ok(Box::new(MemoryInputStream::new(self.get_bytes(index)?)))
    }

    fn get_bool_named(&mut self, name: &str) -> Result<bool> {
        let index = self.find_column(name)?;
        self.get_bool(index)
    }

    fn get_i32_named(&mut self, name: &str) -> Result<i32> {
        let index = self.find_column(name)?;
        self.get_i32(index)
    }

    fn get_i64_named(&mut self, name: &str) -> Result<i64> {
        let index = self.find_column(name)?;
        self.get_i64(index)
    }

    fn get_f64_named(&mut self, name: &str) -> Result<f64> {
        let index = self.find_column(name)?;
        self.get_f64(index)
    }

    fn get_string_named(&mut self, name: &str) -> Result<String> {
        let index = self.find_column(name)?;
        self.get_string(index)
    }

    fn get_bytes_named(&mut self, name: &str) -> Result<Vec<u8>> {
        let index = self.find_column(name)?;
        self.get_bytes(index)
    }

    /// Idempotent; releases per-row resources and, when the result set owns
    /// its statement, finalizes it.
    fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// Result set over rows fully materialized at execution time.
///
/// The shared implementation for buffered-model backends: once built it is
/// independent of the producing connection, so closing the connection later
/// does not disturb iteration.
pub struct BufferedResultSet {
    columns: Arc<[String]>,
    rows: Vec<Vec<Value>>,
    state: CursorState,
    position: usize,
    was_null: bool,
    closed: bool,
}

impl BufferedResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns.into(),
            rows,
            state: CursorState::BeforeFirst,
            position: 0,
            was_null: false,
            closed: false,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    fn live(&self, mark: &'static str) -> Result<()> {
        if self.closed {
            Err(DbError::new(
                mark,
                ErrorKind::ResultClosed,
                "result set is closed",
            ))
        } else {
            Ok(())
        }
    }

    fn current_row(&self) -> Result<&Vec<Value>> {
        match self.state {
            CursorState::OnRow => Ok(&self.rows[self.position - 1]),
            CursorState::BeforeFirst => Err(DbError::new(
                "N5XW8EQJB2TK",
                ErrorKind::NoCurrentRow,
                "cursor is before the first row",
            )),
            CursorState::AfterLast => Err(DbError::new(
                "U0HR3YMVC7SD",
                ErrorKind::NoCurrentRow,
                "cursor is after the last row",
            )),
        }
    }

    fn value_at(&self, index: usize) -> Result<&Value> {
        let row = self.current_row()?;
        row.get(index).ok_or_else(|| {
            DbError::new(
                "W9PA5KZGN1FX",
                ErrorKind::BindError,
                format!("column index {index} out of range, row has {}", row.len()),
            )
        })
    }
}

macro_rules! buffered_get {
    ($name:ident, $ty:ty, $conv:ident, $zero:expr) => {
        fn $name(&mut self, index: usize) -> Result<$ty> {
            self.live("Q6JD0SBWE4RY")?;
            let value = self.value_at(index)?.$conv()?;
            self.was_null = value.is_none();
            Ok(value.unwrap_or($zero))
        }
    };
}

impl ResultSet for BufferedResultSet {
    fn next(&mut self) -> Result<bool> {
        self.live("C2LF7VHTM8QN")?;
        if self.state == CursorState::AfterLast {
            return Ok(false);
        }
        if self.position < self.rows.len() {
            self.position += 1;
            self.state = CursorState::OnRow;
            Ok(true)
        } else {
            self.state = CursorState::AfterLast;
            Ok(false)
        }
    }

    fn cursor_state(&self) -> CursorState {
        self.state
    }

    fn row(&self) -> u64 {
        match self.state {
            CursorState::OnRow => self.position as u64,
            _ => 0,
        }
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, index: usize) -> Result<String> {
        self.columns.get(index).cloned().ok_or_else(|| {
            DbError::new(
                "A7ZK1NDQX5MG",
                ErrorKind::BindError,
                format!(
                    "column index {index} out of range, result has {}",
                    self.columns.len()
                ),
            )
        })
    }

    fn find_column(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| {
                DbError::new(
                    "E3VU9GRLP0CW",
                    ErrorKind::BindError,
                    format!("no column named `{name}`"),
                )
            })
    }

    fn is_null(&mut self, index: usize) -> Result<bool> {
        self.live("G4BN6TXSH2JZ")?;
        Ok(self.value_at(index)?.is_null())
    }

    fn was_null(&self) -> bool {
        self.was_null
    }

    fn get_value(&mut self, index: usize) -> Result<Value> {
        self.live("K8MC2QWYV6EA")?;
        Ok(self.value_at(index)?.clone())
    }

    buffered_get!(get_bool, bool, as_bool, false);
    buffered_get!(get_i32, i32, as_i32, 0);
    buffered_get!(get_i64, i64, as_i64, 0);
    buffered_get!(get_f64, f64, as_f64, 0.0);
    buffered_get!(get_string, String, as_string, String::new());
    buffered_get!(get_date, Date, as_date, Date::MIN);
    buffered_get!(get_time, Time, as_time, Time::MIDNIGHT);
    buffered_get!(
        get_timestamp,
        PrimitiveDateTime,
        as_timestamp,
        PrimitiveDateTime::MIN
    );
    buffered_get!(get_bytes, Vec<u8>, as_bytes, Vec::new());

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.rows = Vec::new();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BufferedResultSet {
        BufferedResultSet::new(
            vec!["id".into(), "name".into(), "name".into()],
            vec![
                vec![
                    Value::Int32(Some(1)),
                    Value::Varchar(Some("first".into())),
                    Value::Varchar(Some("shadowed".into())),
                ],
                vec![Value::Int32(Some(2)), Value::Null, Value::Null],
            ],
        )
    }

    #[test]
    fn cursor_walks_the_state_machine() {
        let mut rs = sample();
        assert!(rs.is_before_first());
        assert_eq!(rs.row(), 0);
        assert_eq!(rs.get_i32(0).unwrap_err(), ErrorKind::NoCurrentRow);

        assert!(rs.next().unwrap());
        assert_eq!(rs.row(), 1);
        assert!(rs.next().unwrap());
        assert_eq!(rs.row(), 2);
        assert!(!rs.next().unwrap());
        assert!(rs.is_after_last());
        assert!(!rs.next().unwrap());
        assert_eq!(rs.get_i32(0).unwrap_err(), ErrorKind::NoCurrentRow);
    }

    #[test]
    fn duplicate_names_resolve_to_first_occurrence() {
        let mut rs = sample();
        rs.next().unwrap();
        assert_eq!(rs.find_column("name").unwrap(), 1);
        assert_eq!(rs.get_string_named("name").unwrap(), "first");
        assert_eq!(rs.get_string(2).unwrap(), "shadowed");
    }

    #[test]
    fn null_reads_zero_and_arm_the_indicator() {
        let mut rs = sample();
        rs.next().unwrap();
        rs.next().unwrap();
        assert!(rs.is_null(1).unwrap());
        assert_eq!(rs.get_string(1).unwrap(), "");
        assert!(rs.was_null());
        assert_eq!(rs.get_i32(0).unwrap(), 2);
        assert!(!rs.was_null());
    }

    #[test]
    fn closed_result_set_rejects_access() {
        let mut rs = sample();
        rs.close().unwrap();
        rs.close().unwrap();
        assert_eq!(rs.next().unwrap_err(), ErrorKind::ResultClosed);
    }

    #[test]
    fn binary_columns_expose_blob_and_stream_views() {
        let mut rs = BufferedResultSet::new(
            vec!["payload".into()],
            vec![vec![Value::Bytes(Some(vec![1, 2, 3, 4]))]],
        );
        rs.next().unwrap();
        let blob = rs.get_blob(0).unwrap();
        assert_eq!(blob.length().unwrap(), 4);
        let mut stream = rs.get_binary_stream(0).unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4]);
    }
}
