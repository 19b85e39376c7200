use mysql::consts::ColumnFlags;
use mysql::{Column, Row, Value as MyValue};
use silo_core::{DbError, ErrorKind, Result, Value};
use time::{Date, Month, PrimitiveDateTime, Time};

pub(crate) fn from_mysql_error(mark: &'static str, error: mysql::Error) -> DbError {
    match error {
        mysql::Error::MySqlError(server) => {
            DbError::backend(mark, server.code.to_string(), server.message)
        }
        other => DbError::new(mark, ErrorKind::ConnectFailure, other.to_string()),
    }
}

/// Convert a bind slot into the client's parameter value.
pub(crate) fn to_mysql_value(value: &Value) -> Result<MyValue> {
    Ok(match value {
        _ if value.is_null() => MyValue::NULL,
        Value::Boolean(Some(v)) => MyValue::Int(*v as i64),
        Value::Int32(Some(v)) => MyValue::Int(*v as i64),
        Value::Int64(Some(v)) => MyValue::Int(*v),
        Value::Float64(Some(v)) => MyValue::Double(*v),
        Value::Varchar(Some(v)) => MyValue::Bytes(v.clone().into_bytes()),
        Value::Bytes(Some(v)) => MyValue::Bytes(v.clone()),
        Value::Date(Some(v)) => {
            MyValue::Date(v.year() as u16, v.month() as u8, v.day(), 0, 0, 0, 0)
        }
        Value::Timestamp(Some(v)) => MyValue::Date(
            v.year() as u16,
            v.month() as u8,
            v.day(),
            v.hour(),
            v.minute(),
            v.second(),
            v.microsecond(),
        ),
        Value::Time(Some(v)) => {
            MyValue::Time(false, 0, v.hour(), v.minute(), v.second(), v.microsecond())
        }
        other => {
            return Err(DbError::new(
                "Y4QH8SKNB1WF",
                ErrorKind::TypeNotSupported,
                format!("cannot bind {} to mysql", other.type_name()),
            ));
        }
    })
}

fn month(m: u8) -> Result<Month> {
    Month::try_from(m).map_err(|_| {
        DbError::new(
            "C7TD2VGXJ9LA",
            ErrorKind::ParseError,
            format!("month {m} out of range"),
        )
    })
}

/// Convert one wire value using its column metadata. Text and binary
/// payloads both arrive as `Bytes`; the binary column flag decides which
/// one it was.
pub(crate) fn from_mysql_value(value: MyValue, column: &Column) -> Result<Value> {
    Ok(match value {
        MyValue::NULL => Value::Null,
        MyValue::Int(v) => Value::Int64(Some(v)),
        MyValue::UInt(v) => Value::Int64(Some(v as i64)),
        MyValue::Float(v) => Value::Float64(Some(v as f64)),
        MyValue::Double(v) => Value::Float64(Some(v)),
        MyValue::Bytes(bytes) => {
            if column.flags().contains(ColumnFlags::BINARY_FLAG) {
                Value::Bytes(Some(bytes))
            } else {
                Value::Varchar(Some(String::from_utf8_lossy(&bytes).into_owned()))
            }
        }
        MyValue::Date(y, mo, d, 0, 0, 0, 0) => {
            Value::Date(Some(Date::from_calendar_date(y as i32, month(mo)?, d).map_err(
                |e| DbError::new("L0XB5MRQW3EK", ErrorKind::ParseError, e.to_string()),
            )?))
        }
        MyValue::Date(y, mo, d, h, mi, s, us) => {
            let date = Date::from_calendar_date(y as i32, month(mo)?, d)
                .map_err(|e| DbError::new("F8NJ1AYTD6PC", ErrorKind::ParseError, e.to_string()))?;
            let t = Time::from_hms_micro(h, mi, s, us)
                .map_err(|e| DbError::new("Z2KW7EGSH0UV", ErrorKind::ParseError, e.to_string()))?;
            Value::Timestamp(Some(PrimitiveDateTime::new(date, t)))
        }
        MyValue::Time(_negative, _days, h, m, s, us) => {
            Value::Time(Some(Time::from_hms_micro(h, m, s, us).map_err(|e| {
                DbError::new("Q5VM9CJBL4XR", ErrorKind::ParseError, e.to_string())
            })?))
        }
    })
}

/// Materialize one row against its column list.
pub(crate) fn materialize_row(row: Row) -> Result<Vec<Value>> {
    let columns = row.columns();
    let values = row.unwrap();
    values
        .into_iter()
        .zip(columns.iter())
        .map(|(value, column)| from_mysql_value(value, column))
        .collect()
}
