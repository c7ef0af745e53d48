use crate::core::{DbError, Params, Result, Value};
use crate::metadata::Record;

/// Equality criteria for a WHERE-by-properties lookup, in the order added.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    params: Params,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.params.set(column, value);
        self
    }

    /// Criteria matching `record`'s current values for `columns`.
    pub fn from_record<R: Record>(record: &R, columns: &[&str]) -> Result<Self> {
        let mut criteria = Self::new();
        for column in columns {
            let value = record.value(column).ok_or_else(|| {
                DbError::UnknownColumn(column.to_string(), R::descriptor().shape)
            })?;
            criteria.params.set(column, value);
        }
        Ok(criteria)
    }

    pub fn columns(&self) -> Vec<&str> {
        self.params.iter().map(|(name, _)| name).collect()
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}
