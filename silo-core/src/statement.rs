use crate::{Blob, DbError, ErrorKind, InputStream, Result, ResultSet, Value};
use time::{Date, PrimitiveDateTime, Time};

/// Compiled statement with positional parameters.
///
/// Parameters are 1-indexed. A statement holds a weak reference to its
/// owning connection: once the connection closes, every further operation
/// fails with `ConnectionClosed` and never touches the native handle.
/// Dropping a statement without closing it is legal and counts as a close.
pub trait PreparedStatement: Send {
    /// The one required bind primitive; the typed setters feed it.
    fn set_value(&mut self, index: usize, value: Value) -> Result<()>;

    fn set_null(&mut self, index: usize) -> Result<()> {
        self.set_value(index, Value::Null)
    }

    fn set_bool(&mut self, index: usize, value: bool) -> Result<()> {
        self.set_value(index, Value::Boolean(Some(value)))
    }

    fn set_i32(&mut self, index: usize, value: i32) -> Result<()> {
        self.set_value(index, Value::Int32(Some(value)))
    }

    fn set_i64(&mut self, index: usize, value: i64) -> Result<()> {
        self.set_value(index, Value::Int64(Some(value)))
    }

    fn set_f64(&mut self, index: usize, value: f64) -> Result<()> {
        self.set_value(index, Value::Float64(Some(value)))
    }

    fn set_string(&mut self, index: usize, value: &str) -> Result<()> {
        self.set_value(index, Value::Varchar(Some(value.to_string())))
    }

    fn set_date(&mut self, index: usize, value: Date) -> Result<()> {
        self.set_value(index, Value::Date(Some(value)))
    }

    fn set_time(&mut self, index: usize, value: Time) -> Result<()> {
        self.set_value(index, Value::Time(Some(value)))
    }

    fn set_timestamp(&mut self, index: usize, value: PrimitiveDateTime) -> Result<()> {
        self.set_value(index, Value::Timestamp(Some(value)))
    }

    fn set_bytes(&mut self, index: usize, value: &[u8]) -> Result<()> {
        self.set_value(index, Value::Bytes(Some(value.to_vec())))
    }

    /// Bind a blob's current content.
    fn set_blob(&mut self, index: usize, blob: &dyn Blob) -> Result<()> {
        self.set_value(index, Value::Bytes(Some(blob.bytes()?)))
    }

    /// Bind `length` bytes drained from `stream`. Fails with `BindError`
    /// when the stream ends early.
    fn set_binary_stream(
        &mut self,
        index: usize,
        stream: &mut dyn InputStream,
        length: u64,
    ) -> Result<()> {
        let mut data = Vec::with_capacity(length as usize);
        let mut chunk = [0u8; 4096];
        while (data.len() as u64) < length {
            let want = chunk.len().min((length - data.len() as u64) as usize);
            match stream.read(&mut chunk[..want])? {
                Some(n) => data.extend_from_slice(&chunk[..n]),
                None => {
                    return Err(DbError::new(
                        "X3QM7LBRD9VE",
                        ErrorKind::BindError,
                        format!(
                            "stream ended after {} of {length} declared bytes",
                            data.len()
                        ),
                    ));
                }
            }
        }
        self.set_value(index, Value::Bytes(Some(data)))
    }

    fn clear_parameters(&mut self) -> Result<()>;

    /// Execute and return the rows. The result set's lifetime extends until
    /// its close or the owning connection's close.
    fn execute_query(&mut self) -> Result<Box<dyn ResultSet>>;

    /// Execute DML/DDL; returns the affected-row count and resets the
    /// statement for re-execution.
    fn execute_update(&mut self) -> Result<u64>;

    /// Execute either kind of statement against the backend and report
    /// whether it produced a result set. The rows themselves are
    /// discarded; callers that need them use `execute_query` instead.
    fn execute(&mut self) -> Result<bool>;

    /// Idempotent.
    fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// Shared bind-slot bookkeeping for driver statement implementations.
///
/// Keeps the 1-indexed parameter vector and the out-of-range checks in one
/// place; drivers translate the slots to native binds at execute time.
#[derive(Debug, Default)]
pub struct ParamSlots {
    values: Vec<Value>,
    expected: Option<usize>,
}

impl ParamSlots {
    /// `expected` pins the parameter count when the backend reports it;
    /// `None` lets the vector grow with the highest bound index.
    pub fn new(expected: Option<usize>) -> Self {
        Self {
            values: match expected {
                Some(n) => vec![Value::Null; n],
                None => Vec::new(),
            },
            expected,
        }
    }

    /// Store a 1-indexed bind.
    pub fn set(&mut self, index: usize, value: Value) -> Result<()> {
        if index == 0 {
            return Err(DbError::new(
                "F1YK6UWSN0HG",
                ErrorKind::BindError,
                "parameter indexes are 1-based",
            ));
        }
        if let Some(expected) = self.expected {
            if index > expected {
                return Err(DbError::new(
                    "D8CT4RJAZ2PM",
                    ErrorKind::BindError,
                    format!("parameter index {index} out of range, statement has {expected}"),
                ));
            }
        } else if index > self.values.len() {
            self.values.resize(index, Value::Null);
        }
        self.values[index - 1] = value;
        Ok(())
    }

    pub fn clear(&mut self) {
        for slot in &mut self.values {
            *slot = Value::Null;
        }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_one_indexed() {
        let mut slots = ParamSlots::new(Some(2));
        slots.set(1, Value::Int32(Some(7))).unwrap();
        slots.set(2, Value::Varchar(Some("x".into()))).unwrap();
        assert_eq!(slots.set(0, Value::Null).unwrap_err(), ErrorKind::BindError);
        assert_eq!(slots.set(3, Value::Null).unwrap_err(), ErrorKind::BindError);
        assert_eq!(slots.values().len(), 2);
    }

    #[test]
    fn unsized_slots_grow_to_highest_index() {
        let mut slots = ParamSlots::new(None);
        slots.set(3, Value::Boolean(Some(true))).unwrap();
        assert_eq!(slots.len(), 3);
        assert!(slots.values()[0].is_null());
    }

    #[test]
    fn clear_keeps_arity() {
        let mut slots = ParamSlots::new(Some(2));
        slots.set(1, Value::Int32(Some(1))).unwrap();
        slots.clear();
        assert_eq!(slots.len(), 2);
        assert!(slots.values().iter().all(Value::is_null));
    }
}
