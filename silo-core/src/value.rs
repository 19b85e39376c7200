use crate::{DbError, ErrorKind, Result};
use serde_json::{Number, Value as JsonValue};
use std::fmt::{self, Display, Formatter};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, PrimitiveDateTime, Time};

pub const DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]");
pub const TIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[hour]:[minute]:[second]");
pub const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const TIMESTAMP_FORMAT_T: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

/// Parameter and column value union.
///
/// Every typed variant carries an `Option`: `Int32(None)` is a NULL that
/// still remembers it came from a 32-bit integer column, while
/// [`Value::Null`] is a NULL with no type information (an unbound or
/// explicitly null parameter).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(Option<bool>),
    Int32(Option<i32>),
    Int64(Option<i64>),
    Float64(Option<f64>),
    Varchar(Option<String>),
    Date(Option<Date>),
    Time(Option<Time>),
    Timestamp(Option<PrimitiveDateTime>),
    Bytes(Option<Vec<u8>>),
}

macro_rules! lenient_int {
    ($name:ident, $ty:ty, $mark:literal) => {
        /// `None` when the value is NULL. Numeric variants coerce, strings
        /// parse; anything else is a type error.
        pub fn $name(&self) -> Result<Option<$ty>> {
            Ok(Some(match self {
                Value::Null => return Ok(None),
                Value::Boolean(None)
                | Value::Int32(None)
                | Value::Int64(None)
                | Value::Float64(None)
                | Value::Varchar(None)
                | Value::Date(None)
                | Value::Time(None)
                | Value::Timestamp(None)
                | Value::Bytes(None) => return Ok(None),
                Value::Boolean(Some(v)) => *v as $ty,
                Value::Int32(Some(v)) => *v as $ty,
                Value::Int64(Some(v)) => *v as $ty,
                Value::Float64(Some(v)) => *v as $ty,
                Value::Varchar(Some(v)) => v.trim().parse::<$ty>().map_err(|_| {
                    DbError::new(
                        $mark,
                        ErrorKind::ParseError,
                        format!("`{v}` is not an integer"),
                    )
                })?,
                other => {
                    return Err(DbError::new(
                        $mark,
                        ErrorKind::TypeNotSupported,
                        format!("cannot read {} as an integer", other.type_name()),
                    ));
                }
            }))
        }
    };
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(
            self,
            Value::Null
                | Value::Boolean(None)
                | Value::Int32(None)
                | Value::Int64(None)
                | Value::Float64(None)
                | Value::Varchar(None)
                | Value::Date(None)
                | Value::Time(None)
                | Value::Timestamp(None)
                | Value::Bytes(None)
        )
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(..) => "boolean",
            Value::Int32(..) => "int32",
            Value::Int64(..) => "int64",
            Value::Float64(..) => "float64",
            Value::Varchar(..) => "varchar",
            Value::Date(..) => "date",
            Value::Time(..) => "time",
            Value::Timestamp(..) => "timestamp",
            Value::Bytes(..) => "bytes",
        }
    }

    lenient_int!(as_i32, i32, "KJ4WQ8ZNT1RC");
    lenient_int!(as_i64, i64, "U7DM2XEAYB5H");

    pub fn as_f64(&self) -> Result<Option<f64>> {
        Ok(Some(match self {
            _ if self.is_null() => return Ok(None),
            Value::Boolean(Some(v)) => *v as u8 as f64,
            Value::Int32(Some(v)) => *v as f64,
            Value::Int64(Some(v)) => *v as f64,
            Value::Float64(Some(v)) => *v,
            Value::Varchar(Some(v)) => v.trim().parse::<f64>().map_err(|_| {
                DbError::new(
                    "A3GF9PLVK6SW",
                    ErrorKind::ParseError,
                    format!("`{v}` is not a number"),
                )
            })?,
            other => {
                return Err(DbError::new(
                    "Q1RB7JNCH4ZD",
                    ErrorKind::TypeNotSupported,
                    format!("cannot read {} as a double", other.type_name()),
                ));
            }
        }))
    }

    pub fn as_bool(&self) -> Result<Option<bool>> {
        Ok(Some(match self {
            _ if self.is_null() => return Ok(None),
            Value::Boolean(Some(v)) => *v,
            Value::Int32(Some(v)) => *v != 0,
            Value::Int64(Some(v)) => *v != 0,
            Value::Varchar(Some(v)) => match v.trim() {
                "t" | "T" | "1" | "true" | "TRUE" | "True" => true,
                "f" | "F" | "0" | "false" | "FALSE" | "False" => false,
                other => {
                    return Err(DbError::new(
                        "N8TV5YXKE2QJ",
                        ErrorKind::ParseError,
                        format!("`{other}` is not a boolean"),
                    ));
                }
            },
            other => {
                return Err(DbError::new(
                    "C6HZ3WSDM9FU",
                    ErrorKind::TypeNotSupported,
                    format!("cannot read {} as a boolean", other.type_name()),
                ));
            }
        }))
    }

    pub fn as_string(&self) -> Result<Option<String>> {
        Ok(Some(match self {
            _ if self.is_null() => return Ok(None),
            Value::Boolean(Some(v)) => v.to_string(),
            Value::Int32(Some(v)) => v.to_string(),
            Value::Int64(Some(v)) => v.to_string(),
            Value::Float64(Some(v)) => v.to_string(),
            Value::Varchar(Some(v)) => v.clone(),
            Value::Date(Some(v)) => v.format(DATE_FORMAT).map_err(fmt_error)?,
            Value::Time(Some(v)) => v.format(TIME_FORMAT).map_err(fmt_error)?,
            Value::Timestamp(Some(v)) => v.format(TIMESTAMP_FORMAT).map_err(fmt_error)?,
            Value::Bytes(Some(v)) => String::from_utf8_lossy(v).into_owned(),
            _ => unreachable!("null variants are handled by the guard arm"),
        }))
    }

    pub fn as_date(&self) -> Result<Option<Date>> {
        Ok(Some(match self {
            _ if self.is_null() => return Ok(None),
            Value::Date(Some(v)) => *v,
            Value::Timestamp(Some(v)) => v.date(),
            Value::Varchar(Some(v)) => Date::parse(v.trim(), DATE_FORMAT).map_err(|_| {
                DbError::new(
                    "Z5KP1MBWR7CY",
                    ErrorKind::ParseError,
                    format!("`{v}` is not an ISO-8601 date"),
                )
            })?,
            other => {
                return Err(DbError::new(
                    "O2XJ6VQFT8LA",
                    ErrorKind::TypeNotSupported,
                    format!("cannot read {} as a date", other.type_name()),
                ));
            }
        }))
    }

    pub fn as_time(&self) -> Result<Option<Time>> {
        Ok(Some(match self {
            _ if self.is_null() => return Ok(None),
            Value::Time(Some(v)) => *v,
            Value::Timestamp(Some(v)) => v.time(),
            Value::Varchar(Some(v)) => Time::parse(v.trim(), TIME_FORMAT).map_err(|_| {
                DbError::new(
                    "I9SD4HNGU3EM",
                    ErrorKind::ParseError,
                    format!("`{v}` is not an ISO-8601 time"),
                )
            })?,
            other => {
                return Err(DbError::new(
                    "V0BQ8CKXJ5WT",
                    ErrorKind::TypeNotSupported,
                    format!("cannot read {} as a time", other.type_name()),
                ));
            }
        }))
    }

    pub fn as_timestamp(&self) -> Result<Option<PrimitiveDateTime>> {
        Ok(Some(match self {
            _ if self.is_null() => return Ok(None),
            Value::Timestamp(Some(v)) => *v,
            Value::Date(Some(v)) => PrimitiveDateTime::new(*v, Time::MIDNIGHT),
            Value::Varchar(Some(v)) => {
                let text = v.trim();
                PrimitiveDateTime::parse(text, TIMESTAMP_FORMAT)
                    .or_else(|_| PrimitiveDateTime::parse(text, TIMESTAMP_FORMAT_T))
                    .map_err(|_| {
                        DbError::new(
                            "E4LY7RZPA1NK",
                            ErrorKind::ParseError,
                            format!("`{v}` is not an ISO-8601 date-time"),
                        )
                    })?
            }
            other => {
                return Err(DbError::new(
                    "M1FW9UGSB6XH",
                    ErrorKind::TypeNotSupported,
                    format!("cannot read {} as a timestamp", other.type_name()),
                ));
            }
        }))
    }

    pub fn as_bytes(&self) -> Result<Option<Vec<u8>>> {
        Ok(Some(match self {
            _ if self.is_null() => return Ok(None),
            Value::Bytes(Some(v)) => v.clone(),
            Value::Varchar(Some(v)) => v.clone().into_bytes(),
            other => {
                return Err(DbError::new(
                    "G7TC2NDHK0QV",
                    ErrorKind::TypeNotSupported,
                    format!("cannot read {} as bytes", other.type_name()),
                ));
            }
        }))
    }

    /// JSON projection used by the document family and diagnostics.
    pub fn to_json(&self) -> JsonValue {
        match self {
            _ if self.is_null() => JsonValue::Null,
            Value::Boolean(Some(v)) => JsonValue::Bool(*v),
            Value::Int32(Some(v)) => JsonValue::Number((*v).into()),
            Value::Int64(Some(v)) => JsonValue::Number((*v).into()),
            Value::Float64(Some(v)) => Number::from_f64(*v)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            other => other
                .as_string()
                .ok()
                .flatten()
                .map(JsonValue::String)
                .unwrap_or(JsonValue::Null),
        }
    }
}

fn fmt_error(e: time::error::Format) -> DbError {
    DbError::new("T8JR3AVLX2PD", ErrorKind::ParseError, e.to_string())
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return write!(f, "NULL");
        }
        match self.as_string() {
            Ok(Some(text)) => write!(f, "{text}"),
            _ => write!(f, "<{}>", self.type_name()),
        }
    }
}

/// Untyped reply of a key-value command, mirroring the wire reply shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvReply {
    Nil,
    Status(String),
    Integer(i64),
    Data(Vec<u8>),
    Array(Vec<KvReply>),
}

impl KvReply {
    pub fn is_nil(&self) -> bool {
        matches!(self, KvReply::Nil)
    }

    /// Text form of status or bulk replies.
    pub fn as_str(&self) -> Option<String> {
        match self {
            KvReply::Status(v) => Some(v.clone()),
            KvReply::Data(v) => Some(String::from_utf8_lossy(v).into_owned()),
            KvReply::Integer(v) => Some(v.to_string()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            KvReply::Integer(v) => Some(*v),
            KvReply::Data(v) => String::from_utf8_lossy(v).trim().parse().ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime, time};

    #[test]
    fn null_detection_covers_typed_nulls() {
        assert!(Value::Null.is_null());
        assert!(Value::Int32(None).is_null());
        assert!(!Value::Int32(Some(0)).is_null());
    }

    #[test]
    fn integers_coerce_leniently() {
        assert_eq!(Value::Int64(Some(41)).as_i32().unwrap(), Some(41));
        assert_eq!(Value::Varchar(Some(" 12 ".into())).as_i32().unwrap(), Some(12));
        assert_eq!(Value::Boolean(Some(true)).as_i64().unwrap(), Some(1));
        assert_eq!(Value::Null.as_i32().unwrap(), None);
        assert_eq!(
            Value::Varchar(Some("twelve".into())).as_i32().unwrap_err(),
            ErrorKind::ParseError
        );
    }

    #[test]
    fn temporal_values_round_trip_through_text() {
        let day = Value::Varchar(Some("2024-02-29".into()));
        assert_eq!(day.as_date().unwrap(), Some(date!(2024 - 02 - 29)));

        let stamp = Value::Varchar(Some("2024-02-29T13:05:00".into()));
        assert_eq!(
            stamp.as_timestamp().unwrap(),
            Some(datetime!(2024-02-29 13:05:00))
        );

        let formatted = Value::Time(Some(time!(09:30:00))).as_string().unwrap();
        assert_eq!(formatted, Some("09:30:00".into()));
    }

    #[test]
    fn bytes_reject_numeric_sources() {
        assert_eq!(
            Value::Int32(Some(7)).as_bytes().unwrap_err(),
            ErrorKind::TypeNotSupported
        );
    }

    #[test]
    fn kv_reply_text_forms() {
        assert_eq!(KvReply::Status("OK".into()).as_str().unwrap(), "OK");
        assert_eq!(KvReply::Data(b"42".to_vec()).as_i64().unwrap(), 42);
        assert!(KvReply::Nil.is_nil());
    }
}
