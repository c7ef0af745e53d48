use super::value::TIMESTAMP_FORMAT;
use super::{DataType, DbError, Result, Value};
use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

/// Conversion between a Rust field type and its stored [`Value`].
///
/// Implemented for the scalar types records may map; `#[derive(SqlEnum)]`
/// implements it for fieldless enums.
pub trait SqlValue: Sized {
    fn data_type() -> DataType;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch<T>(expected: &str, value: &Value) -> Result<T> {
    Err(DbError::TypeMismatch(format!(
        "expected {}, got {} ({})",
        expected,
        value.type_name(),
        value
    )))
}

impl SqlValue for i64 {
    fn data_type() -> DataType {
        DataType::Integer
    }

    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Integer(i) => Ok(i),
            Value::Boolean(b) => Ok(i64::from(b)),
            Value::Text(ref s) => s.trim().parse().or_else(|_| mismatch("INTEGER", &value)),
            other => mismatch("INTEGER", &other),
        }
    }
}

impl SqlValue for i32 {
    fn data_type() -> DataType {
        DataType::Integer
    }

    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide)
            .map_err(|_| DbError::TypeMismatch(format!("{} does not fit in a 32-bit integer", wide)))
    }
}

impl SqlValue for i16 {
    fn data_type() -> DataType {
        DataType::Integer
    }

    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self> {
        let wide = i64::from_value(value)?;
        i16::try_from(wide)
            .map_err(|_| DbError::TypeMismatch(format!("{} does not fit in a 16-bit integer", wide)))
    }
}

impl SqlValue for f64 {
    fn data_type() -> DataType {
        DataType::Float
    }

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value.as_f64() {
            Some(f) => Ok(f),
            None => mismatch("FLOAT", &value),
        }
    }
}

impl SqlValue for f32 {
    fn data_type() -> DataType {
        DataType::Float
    }

    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self> {
        f64::from_value(value).map(|f| f as f32)
    }
}

impl SqlValue for bool {
    fn data_type() -> DataType {
        DataType::Boolean
    }

    fn to_value(&self) -> Value {
        Value::Boolean(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Boolean(b) => Ok(b),
            Value::Integer(i) => Ok(i != 0),
            other => mismatch("BOOLEAN", &other),
        }
    }
}

impl SqlValue for String {
    fn data_type() -> DataType {
        DataType::Text
    }

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s),
            Value::Null => mismatch("TEXT", &Value::Null),
            other => Ok(other.to_string()),
        }
    }
}

impl SqlValue for NaiveDateTime {
    fn data_type() -> DataType {
        DataType::Timestamp
    }

    fn to_value(&self) -> Value {
        Value::Timestamp(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Timestamp(ts) => Ok(ts),
            Value::Text(ref s) => NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
                .or_else(|_| mismatch("TIMESTAMP", &value)),
            other => mismatch("TIMESTAMP", &other),
        }
    }
}

impl SqlValue for DateTime<Utc> {
    fn data_type() -> DataType {
        DataType::Timestamp
    }

    fn to_value(&self) -> Value {
        Value::Timestamp(self.naive_utc())
    }

    fn from_value(value: Value) -> Result<Self> {
        NaiveDateTime::from_value(value).map(|naive| naive.and_utc())
    }
}

impl SqlValue for Uuid {
    fn data_type() -> DataType {
        DataType::Text
    }

    fn to_value(&self) -> Value {
        Value::Text(self.to_string())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(ref s) => Uuid::parse_str(s).or_else(|_| mismatch("UUID", &value)),
            other => mismatch("UUID", &other),
        }
    }
}

impl<T: SqlValue> SqlValue for Option<T> {
    fn data_type() -> DataType {
        T::data_type()
    }

    fn to_value(&self) -> Value {
        match self {
            Some(inner) => inner.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Field types that render to a symbolic name rather than their stored ordinal.
///
/// The audit trail uses this for enumerations so history reads `Active`
/// instead of `1`.
pub trait Symbolic: SqlValue {
    fn symbol_of(value: &Value) -> Option<&'static str>;
}

impl<T: Symbolic> Symbolic for Option<T> {
    fn symbol_of(value: &Value) -> Option<&'static str> {
        T::symbol_of(value)
    }
}

/// Identity field types.
///
/// The `Default` value is the "unset" sentinel that marks a record as new.
pub trait Identity: SqlValue + Clone + PartialEq + Default + std::fmt::Debug + Send + Sync {
    fn is_unset(&self) -> bool {
        *self == Self::default()
    }

    /// Numeric row identity used to key row versions and history entries.
    fn as_row_id(&self) -> Option<i64>;
}

impl Identity for i64 {
    fn as_row_id(&self) -> Option<i64> {
        Some(*self)
    }
}

impl Identity for i32 {
    fn as_row_id(&self) -> Option<i64> {
        Some(i64::from(*self))
    }
}

impl Identity for i16 {
    fn as_row_id(&self) -> Option<i64> {
        Some(i64::from(*self))
    }
}

impl Identity for Uuid {
    fn as_row_id(&self) -> Option<i64> {
        None
    }
}
