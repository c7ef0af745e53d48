pub mod config;
pub mod sqlite;

pub use config::ConnectionConfig;
pub use sqlite::SqliteConnection;

use crate::core::{DataType, Params, Result, Row, Value};
use crate::statement::Dialect;
use async_trait::async_trait;
use serde::Serialize;

/// One column as reported by the database catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    /// `None` when the declared type has no mapping.
    pub data_type: Option<DataType>,
    pub nullable: bool,
    /// Database-generated surrogate key.
    pub identity: bool,
}

/// A single database session.
///
/// Every operation in the crate borrows a connection for its duration and
/// performs all of its work on it. Parameters are bound by name; a statement
/// parameter with no matching entry in `params` is an error.
#[async_trait]
pub trait Connection: Send {
    fn dialect(&self) -> &dyn Dialect;

    /// Run a statement that returns no rows. Returns the affected row count.
    async fn execute(&mut self, sql: &str, params: &Params) -> Result<u64>;

    async fn query_rows(&mut self, sql: &str, params: &Params) -> Result<Vec<Row>>;

    /// First column of the first row, if any.
    async fn query_scalar(&mut self, sql: &str, params: &Params) -> Result<Option<Value>> {
        let rows = self.query_rows(sql, params).await?;
        Ok(rows.into_iter().next().and_then(|row| row.value_at(0).cloned()))
    }

    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    fn in_transaction(&self) -> bool;

    async fn exists(&mut self, from: &str, where_clause: &str, params: &Params) -> Result<bool> {
        let sql = self.dialect().exists_query(from, where_clause);
        let found = self.query_scalar(&sql, params).await?;
        Ok(found.and_then(|v| v.as_i64()).is_some_and(|n| n != 0))
    }

    /// Column list of `table`, in declaration order.
    async fn columns(&mut self, schema: Option<&str>, table: &str) -> Result<Vec<ColumnInfo>>;
}
