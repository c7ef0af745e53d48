use super::{DbError, Result, SqlValue, Value};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DataType {
    Integer,
    Float,
    Text,
    Boolean,
    Timestamp,
}

impl DataType {
    /// Map a declared column type (as reported by schema introspection) to a storage type.
    ///
    /// Follows SQLite's affinity rules, extended with boolean and date/time names.
    pub fn from_declared(declared: &str) -> Option<Self> {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("BOOL") || upper == "BIT" {
            Some(Self::Boolean)
        } else if upper.contains("INT") {
            Some(Self::Integer)
        } else if upper.contains("DATE") || upper.contains("TIME") {
            Some(Self::Timestamp)
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            Some(Self::Text)
        } else if upper.contains("REAL")
            || upper.contains("FLOA")
            || upper.contains("DOUB")
            || upper.contains("DECIMAL")
            || upper.contains("NUMERIC")
        {
            Some(Self::Float)
        } else {
            None
        }
    }

    pub fn is_compatible(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (Self::Integer, Value::Integer(_)) => true,
            (Self::Float, Value::Float(_)) => true,
            (Self::Float, Value::Integer(_)) => true,
            (Self::Text, Value::Text(_)) => true,
            (Self::Boolean, Value::Boolean(_)) => true,
            (Self::Boolean, Value::Integer(_)) => true,
            (Self::Timestamp, Value::Timestamp(_)) => true,
            (Self::Timestamp, Value::Text(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "INTEGER"),
            Self::Float => write!(f, "FLOAT"),
            Self::Text => write!(f, "TEXT"),
            Self::Boolean => write!(f, "BOOLEAN"),
            Self::Timestamp => write!(f, "TIMESTAMP"),
        }
    }
}

/// One result row, addressable by column name.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<Vec<String>>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<Vec<String>>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
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

    pub fn value_at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Look up a column by exact name, falling back to a case-insensitive match.
    pub fn get(&self, column: &str) -> Option<&Value> {
        let index = self
            .columns
            .iter()
            .position(|c| c == column)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(column)))?;
        self.values.get(index)
    }

    /// Typed column read used by generated `Record::from_row` implementations.
    pub fn get_as<T: SqlValue>(&self, column: &str) -> Result<T> {
        match self.get(column) {
            Some(value) => T::from_value(value.clone()).map_err(|err| match err {
                DbError::TypeMismatch(msg) => {
                    DbError::TypeMismatch(format!("column '{}': {}", column, msg))
                }
                other => other,
            }),
            None => Err(DbError::UnknownColumn(column.to_string(), "<result row>".to_string())),
        }
    }
}

/// Named parameter bindings, kept in binding order.
///
/// Names are stored without the dialect prefix and matched case-sensitively.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Params {
    values: Vec<(String, Value)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Bind `name`, replacing any earlier binding of the same name.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.values.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Diagnostic rendering attached to wrapped statement failures.
    pub fn to_json(&self) -> String {
        let map: serde_json::Map<String, serde_json::Value> = self
            .values
            .iter()
            .map(|(name, value)| {
                (
                    name.clone(),
                    serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
                )
            })
            .collect();
        serde_json::Value::Object(map).to_string()
    }
}
