use super::config::ConnectionConfig;
use super::{ColumnInfo, Connection};
use crate::core::{DataType, DbError, Params, Result, Row, Value, value::TIMESTAMP_FORMAT};
use crate::statement::{Dialect, Sqlite};
use async_trait::async_trait;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use std::sync::Arc;
use tracing::debug;

const TABLE_INFO_QUERY: &str =
    r#"SELECT name, type, "notnull", pk FROM pragma_table_info(@table)"#;
const SCHEMA_TABLE_INFO_QUERY: &str =
    r#"SELECT name, type, "notnull", pk FROM pragma_table_info(@table, @schema)"#;

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Integer(n) => ToSqlOutput::from(*n),
            Value::Float(f) => ToSqlOutput::from(*f),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
            Value::Boolean(b) => ToSqlOutput::from(*b),
            Value::Timestamp(ts) => {
                ToSqlOutput::from(ts.format(TIMESTAMP_FORMAT).to_string())
            }
        })
    }
}

fn read_value(raw: ValueRef<'_>, column: &str) -> Result<Value> {
    match raw {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(n) => Ok(Value::Integer(n)),
        ValueRef::Real(f) => Ok(Value::Float(f)),
        ValueRef::Text(bytes) => Ok(Value::Text(String::from_utf8_lossy(bytes).into_owned())),
        ValueRef::Blob(_) => Err(DbError::TypeMismatch(format!(
            "column '{}' holds a BLOB, which has no value mapping",
            column
        ))),
    }
}

/// Bind every named parameter the statement declares from `params`.
fn bind_parameters(stmt: &mut rusqlite::Statement<'_>, params: &Params) -> Result<()> {
    for index in 1..=stmt.parameter_count() {
        let Some(marker) = stmt.parameter_name(index).map(str::to_owned) else {
            return Err(DbError::MissingParameter(format!("?{}", index)));
        };
        let name = marker.trim_start_matches(['@', ':', '$']);
        let value = params
            .get(name)
            .ok_or_else(|| DbError::MissingParameter(name.to_string()))?;
        stmt.raw_bind_parameter(index, value)?;
    }
    Ok(())
}

fn run_execute(conn: &rusqlite::Connection, sql: &str, params: &Params) -> Result<u64> {
    let mut stmt = conn.prepare(sql)?;
    bind_parameters(&mut stmt, params)?;
    Ok(stmt.raw_execute()? as u64)
}

fn run_query(conn: &rusqlite::Connection, sql: &str, params: &Params) -> Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    bind_parameters(&mut stmt, params)?;

    let columns: Arc<Vec<String>> = Arc::new(
        stmt.column_names()
            .into_iter()
            .map(str::to_owned)
            .collect(),
    );

    let mut rows = stmt.raw_query();
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for (index, column) in columns.iter().enumerate() {
            values.push(read_value(row.get_ref(index)?, column)?);
        }
        out.push(Row::new(Arc::clone(&columns), values));
    }
    Ok(out)
}

/// [`Connection`] backed by a single SQLite database handle.
pub struct SqliteConnection {
    inner: rusqlite::Connection,
    dialect: Sqlite,
    in_transaction: bool,
}

impl SqliteConnection {
    pub fn open(config: &ConnectionConfig) -> Result<Self> {
        config.validate()?;

        let inner = if config.is_in_memory() {
            rusqlite::Connection::open_in_memory()?
        } else {
            rusqlite::Connection::open(&config.path)?
        };
        inner.busy_timeout(config.busy_timeout)?;
        inner.execute_batch(if config.foreign_keys {
            "PRAGMA foreign_keys = ON"
        } else {
            "PRAGMA foreign_keys = OFF"
        })?;

        debug!("Opened SQLite connection: {}", config.to_url());
        Ok(Self {
            inner,
            dialect: Sqlite,
            in_transaction: false,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(&ConnectionConfig::in_memory())
    }

    /// Run one or more parameterless statements (DDL, seed data).
    pub fn execute_batch(&mut self, sql: &str) -> Result<()> {
        debug!("Executing batch: {}", sql);
        self.inner.execute_batch(sql)?;
        Ok(())
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn execute(&mut self, sql: &str, params: &Params) -> Result<u64> {
        debug!("Executing: {} with params: {}", sql, params.to_json());
        run_execute(&self.inner, sql, params)
    }

    async fn query_rows(&mut self, sql: &str, params: &Params) -> Result<Vec<Row>> {
        debug!("Querying: {} with params: {}", sql, params.to_json());
        run_query(&self.inner, sql, params)
    }

    async fn begin(&mut self) -> Result<()> {
        if self.in_transaction {
            return Err(DbError::Transaction("Transaction already active".into()));
        }
        self.inner.execute_batch("BEGIN")?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Err(DbError::Transaction("No active transaction".into()));
        }
        self.inner.execute_batch("COMMIT")?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Err(DbError::Transaction("No active transaction".into()));
        }
        self.in_transaction = false;
        self.inner.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    async fn columns(&mut self, schema: Option<&str>, table: &str) -> Result<Vec<ColumnInfo>> {
        let mut params = Params::new().with_value("table", table);
        let sql = match schema {
            Some(schema) => {
                params.set("schema", schema);
                SCHEMA_TABLE_INFO_QUERY
            }
            None => TABLE_INFO_QUERY,
        };

        let rows = run_query(&self.inner, sql, &params)?;
        if rows.is_empty() {
            return Err(DbError::Configuration(format!(
                "table '{}' does not exist or has no columns",
                table
            )));
        }

        let pk_count = rows
            .iter()
            .filter(|row| row.value_at(3).and_then(Value::as_i64).unwrap_or(0) > 0)
            .count();

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name = row.get_as::<String>("name")?;
            let declared_type = row.get_as::<String>("type")?;
            let not_null = row.get_as::<i64>("notnull")? != 0;
            let pk = row.get_as::<i64>("pk")? > 0;

            // Only a lone INTEGER primary key aliases the rowid.
            let identity = pk && pk_count == 1 && declared_type.eq_ignore_ascii_case("INTEGER");

            columns.push(ColumnInfo {
                data_type: DataType::from_declared(&declared_type),
                nullable: !not_null && !pk,
                identity,
                name,
                declared_type,
            });
        }
        Ok(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_named_parameters_round_trip() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (Id INTEGER PRIMARY KEY, Name TEXT, Score REAL)")
            .unwrap();

        let params = Params::new()
            .with_value("Name", "alpha")
            .with_value("Score", 1.5);
        let affected = conn
            .execute("INSERT INTO t (Name, Score) VALUES (@Name, @Score)", &params)
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let rows = conn
            .query_rows("SELECT * FROM t WHERE Name=@Name", &Params::new().with_value("Name", "alpha"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("Id"), Some(&Value::Integer(1)));
        assert_eq!(rows[0].get("score"), Some(&Value::Float(1.5)));
    }

    #[tokio::test]
    async fn test_missing_parameter_is_reported() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        let err = conn
            .query_scalar("SELECT @Missing", &Params::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::MissingParameter(name) if name == "Missing"));
    }

    #[tokio::test]
    async fn test_nested_begin_rejected() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        conn.begin().await.unwrap();
        assert!(conn.in_transaction());
        assert!(conn.begin().await.is_err());
        conn.rollback().await.unwrap();
        assert!(!conn.in_transaction());
        assert!(conn.commit().await.is_err());
    }

    #[tokio::test]
    async fn test_columns_introspection() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE Widget (Id INTEGER PRIMARY KEY AUTOINCREMENT, Name TEXT NOT NULL, Weight REAL, Blob BLOB)",
        )
        .unwrap();

        let columns = conn.columns(None, "Widget").await.unwrap();
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Id", "Name", "Weight", "Blob"]);
        assert!(columns[0].identity);
        assert!(!columns[1].nullable);
        assert!(columns[2].nullable);
        assert_eq!(columns[2].data_type, Some(DataType::Float));
        assert_eq!(columns[3].data_type, None);

        assert!(matches!(
            conn.columns(None, "Nope").await,
            Err(DbError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_column_info_serializes() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE Tag (Id INTEGER PRIMARY KEY, Label TEXT NOT NULL, Icon BLOB)")
            .unwrap();

        let columns = conn.columns(None, "Tag").await.unwrap();
        let json = serde_json::to_value(&columns).unwrap();
        assert_eq!(json[0]["name"], "Id");
        assert_eq!(json[0]["data_type"], "Integer");
        assert_eq!(json[0]["identity"], true);
        assert_eq!(json[1]["data_type"], "Text");
        assert!(json[2]["data_type"].is_null());
    }
}
