use scylla::value::{CqlDate, CqlTime, CqlTimestamp, CqlValue};
use silo_core::{DbError, ErrorKind, Result, Value};
use time::macros::{date, datetime};
use time::{Duration, PrimitiveDateTime};

const EPOCH_DATE: time::Date = date!(1970 - 01 - 01);
const EPOCH_DATETIME: PrimitiveDateTime = datetime!(1970-01-01 00:00:00);
const DATE_BIAS: i64 = 1 << 31;

/// Convert one bind slot into the client's value; nulls travel as `None`.
pub(crate) fn to_cql_value(value: &Value) -> Result<Option<CqlValue>> {
    Ok(Some(match value {
        _ if value.is_null() => return Ok(None),
        Value::Boolean(Some(v)) => CqlValue::Boolean(*v),
        Value::Int32(Some(v)) => CqlValue::Int(*v),
        Value::Int64(Some(v)) => CqlValue::BigInt(*v),
        Value::Float64(Some(v)) => CqlValue::Double(*v),
        Value::Varchar(Some(v)) => CqlValue::Text(v.clone()),
        Value::Bytes(Some(v)) => CqlValue::Blob(v.clone()),
        Value::Date(Some(v)) => {
            let days = (*v - EPOCH_DATE).whole_days();
            CqlValue::Date(CqlDate((DATE_BIAS + days) as u32))
        }
        Value::Time(Some(v)) => {
            let nanos = (*v - time::Time::MIDNIGHT).whole_nanoseconds() as i64;
            CqlValue::Time(CqlTime(nanos))
        }
        Value::Timestamp(Some(v)) => {
            let millis = (*v - EPOCH_DATETIME).whole_milliseconds() as i64;
            CqlValue::Timestamp(CqlTimestamp(millis))
        }
        other => {
            return Err(DbError::new(
                "O9WK2TJFQ3ZB",
                ErrorKind::TypeNotSupported,
                format!("cannot bind {} to cql", other.type_name()),
            ));
        }
    }))
}

/// Convert one fetched column value into the core union.
pub(crate) fn from_cql_value(value: Option<CqlValue>) -> Value {
    let Some(value) = value else {
        return Value::Null;
    };
    match value {
        CqlValue::Boolean(v) => Value::Boolean(Some(v)),
        CqlValue::TinyInt(v) => Value::Int32(Some(v as i32)),
        CqlValue::SmallInt(v) => Value::Int32(Some(v as i32)),
        CqlValue::Int(v) => Value::Int32(Some(v)),
        CqlValue::BigInt(v) => Value::Int64(Some(v)),
        CqlValue::Counter(v) => Value::Int64(Some(v.0)),
        CqlValue::Float(v) => Value::Float64(Some(v as f64)),
        CqlValue::Double(v) => Value::Float64(Some(v)),
        CqlValue::Text(v) => Value::Varchar(Some(v)),
        CqlValue::Ascii(v) => Value::Varchar(Some(v)),
        CqlValue::Blob(v) => Value::Bytes(Some(v)),
        CqlValue::Uuid(v) => Value::Varchar(Some(v.to_string())),
        CqlValue::Timeuuid(v) => Value::Varchar(Some(v.to_string())),
        CqlValue::Date(v) => {
            let days = v.0 as i64 - DATE_BIAS;
            Value::Date(Some(EPOCH_DATE + Duration::days(days)))
        }
        CqlValue::Time(v) => Value::Time(Some(time::Time::MIDNIGHT + Duration::nanoseconds(v.0))),
        CqlValue::Timestamp(v) => {
            Value::Timestamp(Some(EPOCH_DATETIME + Duration::milliseconds(v.0)))
        }
        other => Value::Varchar(Some(format!("{other:?}"))),
    }
}
