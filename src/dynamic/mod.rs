//! Schema-driven, untyped insert/update commands.
//!
//! A [`DynamicCommand`] is built from a live table's column list and accepts
//! assignments only for columns that exist there. Values are either bound
//! parameters or raw SQL expressions emitted literally.

use crate::connection::{ColumnInfo, Connection};
use crate::core::{DbError, Params, Result, SqlValue, Value};
use crate::metadata::{ColumnMetadata, TableMetadata};
use crate::statement::{self, Dialect, RawExpressions, SqlExpr, Statement};
use std::collections::HashMap;
use std::ops::Index;
use tracing::debug;

static UNASSIGNED: DynamicValue = DynamicValue::Param(Value::Null);

#[derive(Debug, Clone, PartialEq)]
pub enum DynamicValue {
    Param(Value),
    Sql(SqlExpr),
}

impl From<Value> for DynamicValue {
    fn from(value: Value) -> Self {
        Self::Param(value)
    }
}

impl From<SqlExpr> for DynamicValue {
    fn from(expr: SqlExpr) -> Self {
        Self::Sql(expr)
    }
}

#[derive(Debug, Clone)]
pub struct DynamicCommand {
    table: String,
    columns: Vec<ColumnInfo>,
    values: HashMap<String, DynamicValue>,
}

impl DynamicCommand {
    /// Read `table`'s columns from the connection. This is the only call that
    /// touches the database before execution.
    pub async fn introspect(
        conn: &mut dyn Connection,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Self> {
        let columns = conn.columns(schema, table).await?;
        debug!("Introspected {} columns of {}", columns.len(), table);
        Self::from_columns(schema, table, columns)
    }

    pub fn from_columns(schema: Option<&str>, table: &str, columns: Vec<ColumnInfo>) -> Result<Self> {
        if columns.iter().filter(|c| c.identity).count() > 1 {
            return Err(DbError::Configuration(format!(
                "'{}' reports more than one identity column",
                table
            )));
        }
        let table = match schema {
            Some(schema) => format!("{}.{}", schema, table),
            None => table.to_string(),
        };
        Ok(Self {
            table,
            columns,
            values: HashMap::new(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn identity_column(&self) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.identity)
    }

    /// Assign a bound value to a column.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.assign(column, DynamicValue::Param(value.into()))
    }

    /// Assign a raw SQL expression. Never pass untrusted input.
    pub fn set_sql(&mut self, column: &str, expr: SqlExpr) -> Result<&mut Self> {
        self.assign(column, DynamicValue::Sql(expr))
    }

    pub fn get(&self, column: &str) -> Option<&DynamicValue> {
        self.values.get(column)
    }

    /// Non-panicking form of indexing: the assigned value, a NULL parameter
    /// when unassigned, or `UnknownColumn` when `column` is not in the table.
    pub fn try_get(&self, column: &str) -> Result<&DynamicValue> {
        match self.values.get(column) {
            Some(value) => Ok(value),
            None if self.columns.iter().any(|c| c.name == column) => Ok(&UNASSIGNED),
            None => Err(DbError::UnknownColumn(column.to_string(), self.table.clone())),
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    fn assign(&mut self, column: &str, value: DynamicValue) -> Result<&mut Self> {
        let info = self
            .columns
            .iter()
            .find(|c| c.name == column)
            .ok_or_else(|| DbError::UnknownColumn(column.to_string(), self.table.clone()))?;

        if info.identity {
            return Err(DbError::Configuration(format!(
                "identity column '{}' of '{}' is generated and cannot be assigned",
                column, self.table
            )));
        }
        let Some(data_type) = info.data_type else {
            return Err(DbError::TypeMismatch(format!(
                "column '{}' has declared type '{}', which has no value mapping",
                column, info.declared_type
            )));
        };
        if let DynamicValue::Param(value) = &value {
            if !data_type.is_compatible(value) {
                return Err(DbError::TypeMismatch(format!(
                    "cannot assign {} to {} column '{}'",
                    value.type_name(),
                    data_type,
                    column
                )));
            }
        }

        self.values.insert(column.to_string(), value);
        Ok(self)
    }

    /// Metadata over the assigned columns, in schema order.
    fn metadata(&self) -> Result<TableMetadata> {
        let columns = self
            .columns
            .iter()
            .filter(|c| self.values.contains_key(&c.name))
            .filter_map(|c| c.data_type.map(|dt| ColumnMetadata::new(c.name.clone(), dt)))
            .collect();
        TableMetadata::from_columns(
            self.table.clone(),
            self.identity_column().map(|c| c.name.clone()),
            columns,
        )
    }

    fn raw_expressions(&self) -> RawExpressions {
        self.values
            .iter()
            .filter_map(|(column, value)| match value {
                DynamicValue::Sql(expr) => Some((column.clone(), expr.clone())),
                DynamicValue::Param(_) => None,
            })
            .collect()
    }

    fn bind(&self, stmt: &Statement, id: Option<Value>) -> Result<Params> {
        let identity = self.identity_column().map(|c| c.name.as_str());
        let mut params = Params::new();
        for name in &stmt.parameters {
            let value = match self.values.get(name) {
                Some(DynamicValue::Param(value)) => value.clone(),
                _ if Some(name.as_str()) == identity => id
                    .clone()
                    .ok_or_else(|| DbError::MissingParameter(name.clone()))?,
                _ => return Err(DbError::MissingParameter(name.clone())),
            };
            params.set(name, value);
        }
        Ok(params)
    }

    pub fn insert_statement(&self, dialect: &dyn Dialect) -> Result<Statement> {
        statement::build_insert_with(&self.metadata()?, dialect, &self.raw_expressions())
    }

    pub fn update_statement(&self, dialect: &dyn Dialect) -> Result<Statement> {
        statement::build_update_with(&self.metadata()?, dialect, None, &self.raw_expressions())
    }

    /// Insert the assigned values and return the generated identity as `I`.
    pub async fn insert<I: SqlValue>(&self, conn: &mut dyn Connection) -> Result<I> {
        let metadata = self.metadata()?;
        metadata.require_identity("insert with identity read-back")?;

        let stmt = self.insert_statement(conn.dialect())?;
        let params = self.bind(&stmt, None)?;
        let generated = conn
            .query_scalar(&stmt.sql, &params)
            .await
            .map_err(|err| DbError::crud(&stmt.sql, params.to_json(), err))?
            .ok_or_else(|| {
                DbError::crud(
                    &stmt.sql,
                    params.to_json(),
                    DbError::Configuration("insert did not return a generated identity".into()),
                )
            })?;
        I::from_value(generated)
    }

    /// Update the row identified by `id` with the assigned values.
    pub async fn update<I: SqlValue>(&self, conn: &mut dyn Connection, id: &I) -> Result<u64> {
        let stmt = self.update_statement(conn.dialect())?;
        let params = self.bind(&stmt, Some(id.to_value()))?;
        conn.execute(&stmt.sql, &params)
            .await
            .map_err(|err| DbError::crud(&stmt.sql, params.to_json(), err))
    }
}

impl Index<&str> for DynamicCommand {
    type Output = DynamicValue;

    /// Assigned value of `column`, or a NULL parameter when unassigned.
    ///
    /// Panics if `column` is not part of the table.
    fn index(&self, column: &str) -> &DynamicValue {
        match self.try_get(column) {
            Ok(value) => value,
            Err(_) => panic!("no column '{}' in '{}'", column, self.table),
        }
    }
}
