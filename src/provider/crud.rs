// ============================================================================
// CRUD Provider
// ============================================================================
//
// Existence checks, insert/update/delete, merge-by-natural-key and the
// validation and post-load hooks for one record type. All statement text
// comes from the statement builder; every execution failure is wrapped with
// the statement and its parameters.
//
// ============================================================================

use super::criteria::Criteria;
use crate::connection::Connection;
use crate::core::{DbError, Identity, Params, Result, Row, SqlValue};
use crate::metadata::{Record, TableMetadata, assign_identity, resolve};
use crate::statement::{self, ID_PARAMETER, Statement};
use crate::tracking::ChangeSet;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// Bind every parameter of `stmt` from the record's current values.
///
/// `@id` and `@<identity>` both bind the record's identity.
pub fn bind_record<R: Record>(record: &R, meta: &TableMetadata, stmt: &Statement) -> Result<Params> {
    let mut params = Params::new();
    for name in &stmt.parameters {
        let is_identity =
            name == ID_PARAMETER || meta.identity().is_some_and(|id| &id.column == name);
        let value = if is_identity {
            record.id().to_value()
        } else {
            record
                .value(name)
                .ok_or_else(|| DbError::MissingParameter(name.clone()))?
        };
        params.set(name, value);
    }
    Ok(params)
}

fn id_params<I: Identity>(id: &I) -> Params {
    Params::new().with_value(ID_PARAMETER, id.to_value())
}

async fn execute(conn: &mut dyn Connection, stmt: &Statement, params: &Params) -> Result<u64> {
    conn.execute(&stmt.sql, params)
        .await
        .map_err(|err| DbError::crud(&stmt.sql, params.to_json(), err))
}

async fn query_rows(conn: &mut dyn Connection, stmt: &Statement, params: &Params) -> Result<Vec<Row>> {
    conn.query_rows(&stmt.sql, params)
        .await
        .map_err(|err| DbError::crud(&stmt.sql, params.to_json(), err))
}

/// Single-table persistence for records of type `R`.
pub struct CrudProvider<R: Record> {
    metadata: Arc<TableMetadata>,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> CrudProvider<R> {
    pub fn new() -> Result<Self> {
        Ok(Self {
            metadata: resolve::<R>()?,
            _record: PhantomData,
        })
    }

    pub fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }

    pub fn is_new(&self, record: &R) -> bool {
        record.id().is_unset()
    }

    pub async fn get(&self, conn: &mut dyn Connection, id: &R::Id) -> Result<Option<R>> {
        let stmt = statement::build_select_by_id(&self.metadata, conn.dialect())?;
        let rows = query_rows(conn, &stmt, &id_params(id)).await?;
        match rows.first() {
            Some(row) => Ok(Some(self.load(conn, row).await?)),
            None => Ok(None),
        }
    }

    pub async fn get_where(&self, conn: &mut dyn Connection, criteria: &Criteria) -> Result<Option<R>> {
        let stmt = self.select_where(conn, criteria)?;
        let rows = query_rows(conn, &stmt, criteria.params()).await?;
        match rows.first() {
            Some(row) => Ok(Some(self.load(conn, row).await?)),
            None => Ok(None),
        }
    }

    pub async fn list_where(&self, conn: &mut dyn Connection, criteria: &Criteria) -> Result<Vec<R>> {
        let stmt = self.select_where(conn, criteria)?;
        let rows = query_rows(conn, &stmt, criteria.params()).await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(self.load(conn, row).await?);
        }
        Ok(records)
    }

    pub async fn exists(&self, conn: &mut dyn Connection, id: &R::Id) -> Result<bool> {
        let stmt = statement::build_exists_by_id(&self.metadata, conn.dialect())?;
        self.scalar_flag(conn, &stmt, &id_params(id)).await
    }

    pub async fn exists_where(&self, conn: &mut dyn Connection, criteria: &Criteria) -> Result<bool> {
        let columns = criteria.columns();
        let stmt = statement::build_exists_by_properties(&self.metadata, conn.dialect(), &columns)?;
        self.scalar_flag(conn, &stmt, criteria.params()).await
    }

    /// Insert a new record and assign the generated identity onto it.
    pub async fn insert(&self, conn: &mut dyn Connection, record: &mut R) -> Result<R::Id> {
        if !self.is_new(record) {
            return Err(DbError::IdentityReuse(format!(
                "{} {:?} is already persisted; insert requires an unset identity",
                self.metadata.shape(),
                record.id()
            )));
        }
        self.validate(conn, record).await?;

        let stmt = statement::build_insert(&self.metadata, conn.dialect())?;
        let params = bind_record(record, &self.metadata, &stmt)?;

        if self.metadata.identity().is_none() {
            execute(conn, &stmt, &params).await?;
            return Ok(record.id());
        }

        let rows = query_rows(conn, &stmt, &params).await?;
        let generated = rows
            .first()
            .and_then(|row| row.value_at(0).cloned())
            .ok_or_else(|| {
                DbError::crud(
                    &stmt.sql,
                    params.to_json(),
                    DbError::Configuration("insert did not return a generated identity".into()),
                )
            })?;
        let id = R::Id::from_value(generated)?;

        assign_identity(record, id.clone())?;
        debug!("Inserted {} with identity {:?}", self.metadata.shape(), id);
        Ok(id)
    }

    /// Update an existing record. Returns the affected row count.
    ///
    /// A supplied but empty change set has nothing to write and is skipped.
    pub async fn update(
        &self,
        conn: &mut dyn Connection,
        record: &R,
        changes: Option<&ChangeSet>,
    ) -> Result<u64> {
        if changes.is_some_and(ChangeSet::is_empty) {
            warn!(
                "Skipping update of {} {:?}: change set is empty",
                self.metadata.shape(),
                record.id()
            );
            return Ok(0);
        }
        self.validate(conn, record).await?;

        let stmt = statement::build_update(&self.metadata, conn.dialect(), changes)?;
        let params = bind_record(record, &self.metadata, &stmt)?;
        execute(conn, &stmt, &params).await
    }

    /// Insert when new, update otherwise. Returns the record's identity.
    pub async fn save(
        &self,
        conn: &mut dyn Connection,
        record: &mut R,
        changes: Option<&ChangeSet>,
    ) -> Result<R::Id> {
        if self.is_new(record) {
            self.insert(conn, record).await
        } else {
            self.update(conn, record, changes).await?;
            Ok(record.id())
        }
    }

    /// Upsert by natural key.
    ///
    /// A new record first looks for a stored row matching `key_fields` (or every
    /// column marked as a key) and adopts its identity before saving.
    pub async fn merge(
        &self,
        conn: &mut dyn Connection,
        record: &mut R,
        key_fields: Option<&[&str]>,
        changes: Option<&ChangeSet>,
    ) -> Result<R::Id> {
        if self.is_new(record) {
            let keys: Vec<&str> = match key_fields {
                Some(fields) => fields.to_vec(),
                None => self.metadata.key_columns(),
            };
            if keys.is_empty() {
                return Err(DbError::Configuration(format!(
                    "'{}' has no key fields to merge on",
                    self.metadata.shape()
                )));
            }
            let identity = self.metadata.require_identity("merge")?;

            let criteria = Criteria::from_record(record, &keys)?;
            let stmt = statement::build_select_by_properties(&self.metadata, conn.dialect(), &keys)?;
            let rows = query_rows(conn, &stmt, criteria.params()).await?;
            if let Some(row) = rows.first() {
                let existing: R::Id = row.get_as(&identity.column)?;
                debug!(
                    "Merge matched existing {} {:?} on {:?}",
                    self.metadata.shape(),
                    existing,
                    keys
                );
                assign_identity(record, existing)?;
            }
        }
        self.save(conn, record, changes).await
    }

    pub async fn delete(&self, conn: &mut dyn Connection, id: &R::Id) -> Result<u64> {
        let stmt = statement::build_delete(&self.metadata, conn.dialect())?;
        execute(conn, &stmt, &id_params(id)).await
    }

    fn select_where(&self, conn: &mut dyn Connection, criteria: &Criteria) -> Result<Statement> {
        let columns = criteria.columns();
        statement::build_select_by_properties(&self.metadata, conn.dialect(), &columns)
    }

    async fn scalar_flag(&self, conn: &mut dyn Connection, stmt: &Statement, params: &Params) -> Result<bool> {
        let value = conn
            .query_scalar(&stmt.sql, params)
            .await
            .map_err(|err| DbError::crud(&stmt.sql, params.to_json(), err))?;
        Ok(value.and_then(|v| v.as_i64()).is_some_and(|n| n != 0))
    }

    async fn load(&self, conn: &mut dyn Connection, row: &Row) -> Result<R> {
        let mut record = R::from_row(row)?;
        if let Some(hook) = record.as_post_load() {
            hook.after_load(conn).await?;
        }
        Ok(record)
    }

    async fn validate(&self, conn: &mut dyn Connection, record: &R) -> Result<()> {
        if let Some(validator) = record.as_validate() {
            validator.validate().into_result()?;
            validator.validate_async(conn).await?.into_result()?;
        }
        Ok(())
    }
}
