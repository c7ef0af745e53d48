// ============================================================================
// Statement Builder
// ============================================================================
//
// Pure, connection-free generation of single-table SELECT / INSERT / UPDATE /
// DELETE text. Parameters are named after their column, exactly.
//
// ============================================================================

use super::dialect::Dialect;
use crate::core::{DbError, Result};
use crate::metadata::{Action, TableMetadata};
use crate::tracking::ChangeSet;
use std::collections::HashMap;
use std::fmt;

/// Parameter name used by select-by-id, exists-by-id and delete.
pub const ID_PARAMETER: &str = "id";

/// Generated SQL text plus the named parameters it expects, in order of appearance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub parameters: Vec<String>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, parameters: Vec<String>) -> Self {
        Self {
            sql: sql.into(),
            parameters,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// A raw SQL expression emitted literally instead of a bound parameter.
///
/// Never build one from untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SqlExpr(String);

impl SqlExpr {
    pub fn new(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SqlExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Column name to raw expression overrides.
pub type RawExpressions = HashMap<String, SqlExpr>;

fn from_clause(meta: &TableMetadata, dialect: &dyn Dialect) -> String {
    match meta.select_override() {
        Some(select) => select.from.clone(),
        None => dialect.quote_identifier(meta.table()),
    }
}

fn id_predicate(meta: &TableMetadata, dialect: &dyn Dialect, purpose: &str) -> Result<String> {
    if let Some(select) = meta.select_override() {
        return Ok(select.where_by_id.clone());
    }
    let identity = meta.require_identity(purpose)?;
    Ok(format!(
        "{}={}",
        dialect.quote_identifier(&identity.column),
        dialect.parameter(ID_PARAMETER)
    ))
}

fn property_predicate(
    meta: &TableMetadata,
    dialect: &dyn Dialect,
    properties: &[&str],
) -> Result<(String, Vec<String>)> {
    if properties.is_empty() {
        return Err(DbError::Configuration(format!(
            "lookup on '{}' needs at least one property",
            meta.table()
        )));
    }

    let mut clauses = Vec::with_capacity(properties.len());
    for property in properties {
        let is_identity = meta.identity().is_some_and(|id| id.column == *property);
        if !is_identity && meta.column(property).is_none() {
            return Err(DbError::UnknownColumn(
                property.to_string(),
                meta.table().to_string(),
            ));
        }
        clauses.push(format!(
            "{}={}",
            dialect.quote_identifier(property),
            dialect.parameter(property)
        ));
    }

    Ok((
        clauses.join(" AND "),
        properties.iter().map(|p| p.to_string()).collect(),
    ))
}

pub fn build_select_by_id(meta: &TableMetadata, dialect: &dyn Dialect) -> Result<Statement> {
    let predicate = id_predicate(meta, dialect, "select by id")?;
    Ok(Statement::new(
        format!("SELECT * FROM {} WHERE {}", from_clause(meta, dialect), predicate),
        vec![ID_PARAMETER.to_string()],
    ))
}

/// `SELECT *` restricted by an AND of `<col>=@<col>` in the order given.
pub fn build_select_by_properties(
    meta: &TableMetadata,
    dialect: &dyn Dialect,
    properties: &[&str],
) -> Result<Statement> {
    let (predicate, parameters) = property_predicate(meta, dialect, properties)?;
    Ok(Statement::new(
        format!("SELECT * FROM {} WHERE {}", from_clause(meta, dialect), predicate),
        parameters,
    ))
}

pub fn build_exists_by_id(meta: &TableMetadata, dialect: &dyn Dialect) -> Result<Statement> {
    let predicate = id_predicate(meta, dialect, "exists by id")?;
    Ok(Statement::new(
        dialect.exists_query(&from_clause(meta, dialect), &predicate),
        vec![ID_PARAMETER.to_string()],
    ))
}

pub fn build_exists_by_properties(
    meta: &TableMetadata,
    dialect: &dyn Dialect,
    properties: &[&str],
) -> Result<Statement> {
    let (predicate, parameters) = property_predicate(meta, dialect, properties)?;
    Ok(Statement::new(
        dialect.exists_query(&from_clause(meta, dialect), &predicate),
        parameters,
    ))
}

pub fn build_insert(meta: &TableMetadata, dialect: &dyn Dialect) -> Result<Statement> {
    build_insert_with(meta, dialect, &RawExpressions::new())
}

/// INSERT of every insert-eligible column, in metadata order, followed by the
/// dialect's identity read-back when the table has an identity.
pub fn build_insert_with(
    meta: &TableMetadata,
    dialect: &dyn Dialect,
    raw: &RawExpressions,
) -> Result<Statement> {
    let table = dialect.quote_identifier(meta.table());
    let mut columns = Vec::new();
    let mut values = Vec::new();
    let mut parameters = Vec::new();

    for column in meta.columns_for(Action::Insert) {
        columns.push(dialect.quote_identifier(&column.column));
        match raw.get(&column.column) {
            Some(expr) => values.push(expr.to_string()),
            None => {
                values.push(dialect.parameter(&column.column));
                parameters.push(column.column.clone());
            }
        }
    }

    let mut sql = if columns.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", table)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            values.join(", ")
        )
    };

    if let Some(identity) = meta.identity() {
        sql.push_str(&dialect.identity_return(&identity.column));
    }

    Ok(Statement::new(sql, parameters))
}

pub fn build_update(
    meta: &TableMetadata,
    dialect: &dyn Dialect,
    changes: Option<&ChangeSet>,
) -> Result<Statement> {
    build_update_with(meta, dialect, changes, &RawExpressions::new())
}

/// UPDATE of the changed columns (or every update-eligible column when no
/// change set is given), keyed on `<identity>=@<identity>`.
///
/// An empty change set is a caller error: it would produce an empty SET list.
pub fn build_update_with(
    meta: &TableMetadata,
    dialect: &dyn Dialect,
    changes: Option<&ChangeSet>,
    raw: &RawExpressions,
) -> Result<Statement> {
    let identity = meta.require_identity("update")?;

    if let Some(changes) = changes {
        if changes.is_empty() {
            return Err(DbError::EmptyChangeSet(meta.table().to_string()));
        }
        for column in changes.columns() {
            let eligible = meta
                .column(column)
                .is_some_and(|c| c.is_mapped_for(Action::Update));
            if !eligible {
                return Err(DbError::UnknownColumn(
                    column.to_string(),
                    meta.table().to_string(),
                ));
            }
        }
    }

    let mut assignments = Vec::new();
    let mut parameters = Vec::new();
    for column in meta.columns_for(Action::Update) {
        if changes.is_some_and(|c| !c.contains(&column.column)) {
            continue;
        }
        let value = match raw.get(&column.column) {
            Some(expr) => expr.to_string(),
            None => {
                parameters.push(column.column.clone());
                dialect.parameter(&column.column)
            }
        };
        assignments.push(format!("{}={}", dialect.quote_identifier(&column.column), value));
    }

    if assignments.is_empty() {
        return Err(DbError::Configuration(format!(
            "'{}' has no update-eligible columns",
            meta.table()
        )));
    }

    parameters.push(identity.column.clone());
    Ok(Statement::new(
        format!(
            "UPDATE {} SET {} WHERE {}={}",
            dialect.quote_identifier(meta.table()),
            assignments.join(", "),
            dialect.quote_identifier(&identity.column),
            dialect.parameter(&identity.column)
        ),
        parameters,
    ))
}

pub fn build_delete(meta: &TableMetadata, dialect: &dyn Dialect) -> Result<Statement> {
    let identity = meta.require_identity("delete")?;
    Ok(Statement::new(
        format!(
            "DELETE FROM {} WHERE {}={}",
            dialect.quote_identifier(meta.table()),
            dialect.quote_identifier(&identity.column),
            dialect.parameter(ID_PARAMETER)
        ),
        vec![ID_PARAMETER.to_string()],
    ))
}
