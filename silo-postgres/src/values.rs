use postgres::Row;
use postgres::types::{ToSql, Type};
use silo_core::{DbError, ErrorKind, Result, Value};
use time::{Date, PrimitiveDateTime, Time};

pub(crate) fn from_pg_error(mark: &'static str, error: postgres::Error) -> DbError {
    match error.as_db_error() {
        Some(server) => DbError::backend(mark, server.code().code(), server.message()),
        None => DbError::new(mark, ErrorKind::ConnectFailure, error.to_string()),
    }
}

/// Convert one bind slot into the wire value the statement's declared
/// parameter type expects. The client sends binary parameters, so the
/// Rust type has to match the declared OID exactly.
pub(crate) fn to_pg_param(value: &Value, ty: &Type) -> Result<Box<dyn ToSql + Sync>> {
    Ok(if *ty == Type::BOOL {
        Box::new(value.as_bool()?)
    } else if *ty == Type::INT2 {
        Box::new(value.as_i32()?.map(|v| v as i16))
    } else if *ty == Type::INT4 {
        Box::new(value.as_i32()?)
    } else if *ty == Type::INT8 {
        Box::new(value.as_i64()?)
    } else if *ty == Type::FLOAT4 {
        Box::new(value.as_f64()?.map(|v| v as f32))
    } else if *ty == Type::FLOAT8 {
        Box::new(value.as_f64()?)
    } else if *ty == Type::BYTEA {
        Box::new(value.as_bytes()?)
    } else if *ty == Type::DATE {
        Box::new(value.as_date()?)
    } else if *ty == Type::TIME {
        Box::new(value.as_time()?)
    } else if *ty == Type::TIMESTAMP {
        Box::new(value.as_timestamp()?)
    } else if *ty == Type::TEXT
        || *ty == Type::VARCHAR
        || *ty == Type::BPCHAR
        || *ty == Type::NAME
        || *ty == Type::UNKNOWN
    {
        Box::new(value.as_string()?)
    } else {
        // Types outside this table (numeric, json, uuid) take their text
        // form only through an explicit cast the statement author writes.
        // Reject instead of guessing.
        return Err(DbError::new(
            "U3HK8WDQZ6NE",
            ErrorKind::TypeNotSupported,
            format!("cannot bind {} as postgres type {ty}", value.type_name()),
        ));
    })
}

/// Materialize one column of a fetched row by its declared type.
pub(crate) fn from_pg_column(row: &Row, index: usize) -> Result<Value> {
    let ty = row.columns()[index].type_().clone();
    let bad =
        |e: postgres::Error| DbError::new("J7PF2XSMV4CB", ErrorKind::TypeNotSupported, e.to_string());
    Ok(if ty == Type::BOOL {
        Value::Boolean(row.try_get::<_, Option<bool>>(index).map_err(bad)?)
    } else if ty == Type::INT2 {
        Value::Int32(
            row.try_get::<_, Option<i16>>(index)
                .map_err(bad)?
                .map(i32::from),
        )
    } else if ty == Type::INT4 {
        Value::Int32(row.try_get::<_, Option<i32>>(index).map_err(bad)?)
    } else if ty == Type::INT8 {
        Value::Int64(row.try_get::<_, Option<i64>>(index).map_err(bad)?)
    } else if ty == Type::FLOAT4 {
        Value::Float64(
            row.try_get::<_, Option<f32>>(index)
                .map_err(bad)?
                .map(f64::from),
        )
    } else if ty == Type::FLOAT8 {
        Value::Float64(row.try_get::<_, Option<f64>>(index).map_err(bad)?)
    } else if ty == Type::BYTEA {
        Value::Bytes(row.try_get::<_, Option<Vec<u8>>>(index).map_err(bad)?)
    } else if ty == Type::DATE {
        Value::Date(row.try_get::<_, Option<Date>>(index).map_err(bad)?)
    } else if ty == Type::TIME {
        Value::Time(row.try_get::<_, Option<Time>>(index).map_err(bad)?)
    } else if ty == Type::TIMESTAMP {
        Value::Timestamp(
            row.try_get::<_, Option<PrimitiveDateTime>>(index)
                .map_err(bad)?,
        )
    } else {
        Value::Varchar(row.try_get::<_, Option<String>>(index).map_err(bad)?)
    })
}
