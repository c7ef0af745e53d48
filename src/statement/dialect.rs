use crate::core::DataType;
use std::fmt;

/// Engine-specific pieces of generated SQL.
///
/// Builders stay engine-agnostic; everything that differs between targets
/// (identifier delimiters, parameter markers, identity read-back, DDL) lives here.
pub trait Dialect: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn open_delimiter(&self) -> char;

    fn close_delimiter(&self) -> char;

    /// Delimit a single identifier segment, doubling any embedded closing delimiter.
    fn quote_segment(&self, segment: &str) -> String {
        let close = self.close_delimiter();
        let mut out = String::with_capacity(segment.len() + 2);
        out.push(self.open_delimiter());
        for ch in segment.chars() {
            if ch == close {
                out.push(close);
            }
            out.push(ch);
        }
        out.push(close);
        out
    }

    /// Delimit a possibly schema-qualified name, segment by segment.
    fn quote_identifier(&self, name: &str) -> String {
        name.split('.')
            .map(|segment| self.quote_segment(segment))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Named parameter marker. The name must match the bound parameter exactly.
    fn parameter(&self, name: &str) -> String {
        format!("@{}", name)
    }

    /// Text appended to an INSERT so the same round trip yields the generated identity.
    fn identity_return(&self, identity_column: &str) -> String;

    fn exists_query(&self, from: &str, where_clause: &str) -> String {
        format!(
            "SELECT CASE WHEN EXISTS (SELECT 1 FROM {} WHERE {}) THEN 1 ELSE 0 END",
            from, where_clause
        )
    }

    fn type_name(&self, data_type: DataType) -> &'static str;

    /// Type used for a column that takes part in a key or index.
    fn key_type_name(&self, data_type: DataType) -> &'static str {
        self.type_name(data_type)
    }

    /// Column definition for a surrogate auto-incrementing primary key.
    fn identity_column_ddl(&self, column: &str) -> String;

    fn create_table_if_absent(&self, table: &str, body: &str) -> String;
}

/// Microsoft SQL Server: `[bracket]` identifiers, `SCOPE_IDENTITY()` read-back.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServer;

impl Dialect for SqlServer {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn open_delimiter(&self) -> char {
        '['
    }

    fn close_delimiter(&self) -> char {
        ']'
    }

    fn identity_return(&self, _identity_column: &str) -> String {
        "; SELECT CAST(SCOPE_IDENTITY() AS BIGINT)".to_string()
    }

    fn type_name(&self, data_type: DataType) -> &'static str {
        match data_type {
            DataType::Integer => "BIGINT",
            DataType::Float => "FLOAT",
            DataType::Text => "NVARCHAR(MAX)",
            DataType::Boolean => "BIT",
            DataType::Timestamp => "DATETIME2",
        }
    }

    fn key_type_name(&self, data_type: DataType) -> &'static str {
        match data_type {
            DataType::Text => "NVARCHAR(450)",
            other => self.type_name(other),
        }
    }

    fn identity_column_ddl(&self, column: &str) -> String {
        format!("{} BIGINT IDENTITY(1,1) PRIMARY KEY", self.quote_identifier(column))
    }

    fn create_table_if_absent(&self, table: &str, body: &str) -> String {
        format!(
            "IF OBJECT_ID(N'{}', N'U') IS NULL CREATE TABLE {} ({})",
            table.replace('\'', "''"),
            self.quote_identifier(table),
            body
        )
    }
}

/// SQLite: `"double-quoted"` identifiers, `RETURNING` read-back.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Dialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn open_delimiter(&self) -> char {
        '"'
    }

    fn close_delimiter(&self) -> char {
        '"'
    }

    fn identity_return(&self, identity_column: &str) -> String {
        format!(" RETURNING {}", self.quote_identifier(identity_column))
    }

    fn type_name(&self, data_type: DataType) -> &'static str {
        match data_type {
            DataType::Integer => "INTEGER",
            DataType::Float => "REAL",
            DataType::Text => "TEXT",
            DataType::Boolean => "BOOLEAN",
            DataType::Timestamp => "DATETIME",
        }
    }

    fn identity_column_ddl(&self, column: &str) -> String {
        format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", self.quote_identifier(column))
    }

    fn create_table_if_absent(&self, table: &str, body: &str) -> String {
        format!("CREATE TABLE IF NOT EXISTS {} ({})", self.quote_identifier(table), body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_names_are_delimited_per_segment() {
        assert_eq!(SqlServer.quote_identifier("dbo.Greeting"), "[dbo].[Greeting]");
        assert_eq!(Sqlite.quote_identifier("main.Greeting"), r#""main"."Greeting""#);
    }

    #[test]
    fn test_closing_delimiter_is_escaped() {
        assert_eq!(SqlServer.quote_identifier("odd]name"), "[odd]]name]");
        assert_eq!(Sqlite.quote_identifier(r#"say"what"#), r#""say""what""#);
    }

    #[test]
    fn test_identity_return_clauses() {
        assert_eq!(
            SqlServer.identity_return("Id"),
            "; SELECT CAST(SCOPE_IDENTITY() AS BIGINT)"
        );
        assert_eq!(Sqlite.identity_return("Id"), r#" RETURNING "Id""#);
    }

    #[test]
    fn test_create_table_guard() {
        let ddl = SqlServer.create_table_if_absent("audit.RowVersion", "[Version] BIGINT");
        assert!(ddl.starts_with("IF OBJECT_ID(N'audit.RowVersion', N'U') IS NULL"));
        assert!(ddl.contains("CREATE TABLE [audit].[RowVersion] ([Version] BIGINT)"));
    }
}
