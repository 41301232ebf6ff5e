//! Helpers for moving optional values in and out of libSQL rows

use libsql::{Row, Value};

use crate::error::Result;

/// Convert `Option<String>` to a libsql Value.
pub fn text_value(value: Option<String>) -> Value {
    value.map_or(Value::Null, Value::Text)
}

/// Convert `Option<i64>` to a libsql Value.
pub fn int_value(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

/// Read a nullable TEXT column.
pub fn opt_text(row: &Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx)? {
        Value::Text(value) => Ok(Some(value)),
        _ => Ok(None),
    }
}

/// Read a nullable INTEGER column.
pub fn opt_int(row: &Row, idx: i32) -> Result<Option<i64>> {
    match row.get_value(idx)? {
        Value::Integer(value) => Ok(Some(value)),
        _ => Ok(None),
    }
}

/// Read an INTEGER column holding a 0/1 flag.
pub fn flag(row: &Row, idx: i32) -> Result<bool> {
    Ok(row.get::<i64>(idx)? != 0)
}
