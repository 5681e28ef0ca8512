//! Cell value type for database-agnostic row handling.
//!
//! SQLite cells carry one of five storage classes. Rows travel through the
//! copy pipeline as vectors of [`Value`], and transformers consume and
//! produce the same type.

use rusqlite::types::{ToSql, ToSqlOutput, Value as SqliteValue, ValueRef};

/// A single cell value as stored by SQLite.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
}

impl Value {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Canonical textual form, used for dedup keys, row seeds, and row
    /// fingerprints. Stable across runs and platforms: NULL renders empty,
    /// integers in decimal, reals with Rust's default float formatting,
    /// text verbatim, blobs as lowercase hex.
    #[must_use]
    pub fn display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Integer(v) => v.to_string(),
            Value::Real(v) => v.to_string(),
            Value::Text(v) => v.clone(),
            Value::Blob(v) => hex::encode(v),
        }
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(v: ValueRef<'_>) -> Self {
        match v {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Value::Null => Ok(ToSqlOutput::Owned(SqliteValue::Null)),
            Value::Integer(v) => Ok(ToSqlOutput::Owned(SqliteValue::Integer(*v))),
            Value::Real(v) => Ok(ToSqlOutput::Owned(SqliteValue::Real(*v))),
            Value::Text(v) => Ok(ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes()))),
            Value::Blob(v) => Ok(ToSqlOutput::Borrowed(ValueRef::Blob(&v[..]))),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

/// Join a tuple of values into its dedup key: the canonical textual form of
/// each value joined by `|`. Tuples within one table share a fixed arity, so
/// the separator cannot produce collisions across positions.
#[must_use]
pub fn tuple_key(values: &[Value]) -> String {
    let parts: Vec<String> = values.iter().map(Value::display_string).collect();
    parts.join("|")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_string_forms() {
        assert_eq!(Value::Null.display_string(), "");
        assert_eq!(Value::Integer(42).display_string(), "42");
        assert_eq!(Value::Real(1.5).display_string(), "1.5");
        assert_eq!(Value::Text("abc".into()).display_string(), "abc");
        assert_eq!(Value::Blob(vec![0xde, 0xad]).display_string(), "dead");
    }

    #[test]
    fn test_tuple_key_joins_with_pipe() {
        let key = tuple_key(&[Value::Integer(1), Value::Text("us".into())]);
        assert_eq!(key, "1|us");
    }

    #[test]
    fn test_is_null() {
        assert!(Value::Null.is_null());
        assert!(!Value::Integer(0).is_null());
    }

    #[test]
    fn test_from_value_ref() {
        assert_eq!(Value::from(ValueRef::Integer(7)), Value::Integer(7));
        assert_eq!(
            Value::from(ValueRef::Text(b"hello")),
            Value::Text("hello".into())
        );
    }
}
