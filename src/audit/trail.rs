// ============================================================================
// Audit Storage
// ============================================================================
//
// History and row-version tables. `AuditTrail::initialize` is the single
// startup step that creates them; every audited save requires the handle it
// returns.
//
// Row version table:  (TableName, RowId) -> Version
// History table:      one row per changed column per save
//
// ============================================================================

use super::config::AuditConfig;
use crate::connection::Connection;
use crate::core::{DataType, DbError, Params, Result, Row, Value};
use crate::metadata::LookupRef;
use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info};

/// One audited column change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub user_name: String,
    pub changed_at: NaiveDateTime,
    pub table_name: String,
    pub row_id: i64,
    pub version: i64,
    pub column_name: String,
    pub old_value: String,
    pub new_value: String,
}

impl HistoryEntry {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            user_name: row.get_as("UserName")?,
            changed_at: row.get_as("ChangedAt")?,
            table_name: row.get_as("TableName")?,
            row_id: row.get_as("RowId")?,
            version: row.get_as("Version")?,
            column_name: row.get_as("ColumnName")?,
            old_value: row.get_as("OldValue")?,
            new_value: row.get_as("NewValue")?,
        })
    }
}

fn row_key(table: &str, row_id: i64) -> Params {
    Params::new()
        .with_value("TableName", table)
        .with_value("RowId", row_id)
}

/// Handle to initialised audit storage.
#[derive(Debug, Clone)]
pub struct AuditTrail {
    config: AuditConfig,
    history_sql: String,
    version_sql: String,
}

impl AuditTrail {
    /// Create the history and row-version tables if they do not exist.
    ///
    /// Idempotent; call once at startup and share the returned handle.
    pub async fn initialize(conn: &mut dyn Connection, config: AuditConfig) -> Result<Self> {
        config.validate()?;

        let (version_ddl, history_ddl, history_sql, version_sql) = {
            let d = conn.dialect();
            let q = |name: &str| d.quote_identifier(name);

            let version_ddl = d.create_table_if_absent(
                &config.version_table,
                &format!(
                    "{} {} NOT NULL, {} {} NOT NULL, {} {} NOT NULL, PRIMARY KEY ({}, {})",
                    q("TableName"),
                    d.key_type_name(DataType::Text),
                    q("RowId"),
                    d.key_type_name(DataType::Integer),
                    q("Version"),
                    d.type_name(DataType::Integer),
                    q("TableName"),
                    q("RowId"),
                ),
            );

            let history_ddl = d.create_table_if_absent(
                &config.history_table,
                &format!(
                    "{}, {} {} NOT NULL, {} {} NOT NULL, {} {} NOT NULL, {} {} NOT NULL, \
                     {} {} NOT NULL, {} {} NOT NULL, {} {} NOT NULL, {} {} NOT NULL",
                    d.identity_column_ddl("Id"),
                    q("UserName"),
                    d.type_name(DataType::Text),
                    q("ChangedAt"),
                    d.type_name(DataType::Timestamp),
                    q("TableName"),
                    d.type_name(DataType::Text),
                    q("RowId"),
                    d.type_name(DataType::Integer),
                    q("Version"),
                    d.type_name(DataType::Integer),
                    q("ColumnName"),
                    d.type_name(DataType::Text),
                    q("OldValue"),
                    d.type_name(DataType::Text),
                    q("NewValue"),
                    d.type_name(DataType::Text),
                ),
            );

            (
                version_ddl,
                history_ddl,
                q(&config.history_table),
                q(&config.version_table),
            )
        };

        conn.execute(&version_ddl, &Params::new()).await?;
        conn.execute(&history_ddl, &Params::new()).await?;
        info!(
            "Audit storage ready: history={}, versions={}",
            config.history_table, config.version_table
        );

        Ok(Self {
            config,
            history_sql,
            version_sql,
        })
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Stored version of a row, `None` if it was never audited.
    pub async fn current_version(
        &self,
        conn: &mut dyn Connection,
        table: &str,
        row_id: i64,
    ) -> Result<Option<i64>> {
        let sql = format!(
            "SELECT Version FROM {} WHERE TableName=@TableName AND RowId=@RowId",
            self.version_sql
        );
        let value = conn.query_scalar(&sql, &row_key(table, row_id)).await?;
        Ok(value.and_then(|v| v.as_i64()))
    }

    /// Every history entry of a row, oldest first.
    pub async fn history(
        &self,
        conn: &mut dyn Connection,
        table: &str,
        row_id: i64,
    ) -> Result<Vec<HistoryEntry>> {
        let sql = format!(
            "SELECT UserName, ChangedAt, TableName, RowId, Version, ColumnName, OldValue, NewValue \
             FROM {} WHERE TableName=@TableName AND RowId=@RowId ORDER BY Version, Id",
            self.history_sql
        );
        let rows = conn.query_rows(&sql, &row_key(table, row_id)).await?;
        rows.iter().map(HistoryEntry::from_row).collect()
    }

    /// Current version of a row, creating it at 0 when absent.
    pub(crate) async fn ensure_version_row(
        &self,
        conn: &mut dyn Connection,
        table: &str,
        row_id: i64,
    ) -> Result<i64> {
        let key = row_key(table, row_id);
        let known = conn
            .exists(&self.version_sql, "TableName=@TableName AND RowId=@RowId", &key)
            .await?;
        if !known {
            let sql = format!(
                "INSERT INTO {} (TableName, RowId, Version) VALUES (@TableName, @RowId, 0)",
                self.version_sql
            );
            conn.execute(&sql, &key).await?;
            debug!("Created row version for {}#{}", table, row_id);
            return Ok(0);
        }

        self.current_version(conn, table, row_id).await?.ok_or_else(|| {
            DbError::ConcurrencyConflict(format!(
                "row version for {}#{} disappeared while saving",
                table, row_id
            ))
        })
    }

    /// Move a row from `expected` to `expected + 1`.
    ///
    /// Fails with a concurrency conflict when another writer got there first.
    pub(crate) async fn advance_version(
        &self,
        conn: &mut dyn Connection,
        table: &str,
        row_id: i64,
        expected: i64,
    ) -> Result<i64> {
        let next = expected + 1;
        let sql = format!(
            "UPDATE {} SET Version=@Next WHERE TableName=@TableName AND RowId=@RowId AND Version=@Expected",
            self.version_sql
        );
        let params = row_key(table, row_id)
            .with_value("Next", next)
            .with_value("Expected", expected);

        if conn.execute(&sql, &params).await? == 0 {
            return Err(DbError::ConcurrencyConflict(format!(
                "{}#{} is no longer at version {}",
                table, row_id, expected
            )));
        }
        Ok(next)
    }

    pub(crate) async fn append(&self, conn: &mut dyn Connection, entry: &HistoryEntry) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (UserName, ChangedAt, TableName, RowId, Version, ColumnName, OldValue, NewValue) \
             VALUES (@UserName, @ChangedAt, @TableName, @RowId, @Version, @ColumnName, @OldValue, @NewValue)",
            self.history_sql
        );
        let params = Params::new()
            .with_value("UserName", entry.user_name.as_str())
            .with_value("ChangedAt", entry.changed_at)
            .with_value("TableName", entry.table_name.as_str())
            .with_value("RowId", entry.row_id)
            .with_value("Version", entry.version)
            .with_value("ColumnName", entry.column_name.as_str())
            .with_value("OldValue", entry.old_value.as_str())
            .with_value("NewValue", entry.new_value.as_str());
        conn.execute(&sql, &params).await?;
        Ok(())
    }

    /// Display text for a lookup key read from the referenced table.
    pub(crate) async fn lookup_text(
        &self,
        conn: &mut dyn Connection,
        lookup: &LookupRef,
        key: &Value,
    ) -> Result<Option<String>> {
        let sql = {
            let d = conn.dialect();
            format!(
                "SELECT {} FROM {} WHERE {}=@Key",
                d.quote_identifier(&lookup.text_column),
                d.quote_identifier(&lookup.table),
                d.quote_identifier(&lookup.key_column)
            )
        };
        let params = Params::new().with_value("Key", key.clone());
        let text = conn.query_scalar(&sql, &params).await?;
        Ok(text.and_then(|t| t.display_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SqliteConnection;

    #[tokio::test]
    async fn test_version_advances_only_from_expected() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        let trail = AuditTrail::initialize(&mut conn, AuditConfig::default())
            .await
            .unwrap();

        assert_eq!(trail.ensure_version_row(&mut conn, "Orders", 5).await.unwrap(), 0);
        assert_eq!(trail.advance_version(&mut conn, "Orders", 5, 0).await.unwrap(), 1);

        let stale = trail.advance_version(&mut conn, "Orders", 5, 0).await;
        assert!(matches!(stale, Err(DbError::ConcurrencyConflict(_))));

        assert_eq!(trail.ensure_version_row(&mut conn, "Orders", 5).await.unwrap(), 1);
        assert_eq!(trail.current_version(&mut conn, "Orders", 6).await.unwrap(), None);
    }
}
