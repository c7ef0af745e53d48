use super::trail::{AuditTrail, HistoryEntry};
use super::user::UserContext;
use crate::connection::Connection;
use crate::core::{DbError, Identity, Result, Value};
use crate::metadata::{Action, ColumnMetadata, Record, ValueKind};
use crate::provider::CrudProvider;
use crate::tracking::{ChangeSet, ChangeTracker};
use tracing::{debug, warn};

/// A [`ChangeTracker`] whose saves are written to the audit trail.
///
/// Each save runs in one transaction: bump the row version, then append one
/// history entry per modified column. Any failure rolls the whole save back.
/// When the connection already has an open transaction the save joins it and
/// leaves commit or rollback to the caller.
pub struct LoggedChangeTracker<R: Record> {
    tracker: ChangeTracker<R>,
}

impl<R: Record> LoggedChangeTracker<R> {
    pub fn new(record: R) -> Result<Self> {
        Ok(Self {
            tracker: ChangeTracker::new(record)?,
        })
    }

    pub fn tracker(&self) -> &ChangeTracker<R> {
        &self.tracker
    }

    pub fn record(&self) -> &R {
        self.tracker.record()
    }

    pub fn record_mut(&mut self) -> &mut R {
        self.tracker.record_mut()
    }

    pub fn into_inner(self) -> R {
        self.tracker.into_inner()
    }

    /// Record the tracked changes in the audit trail.
    ///
    /// Returns the new row version, or `None` when nothing changed and empty
    /// saves are not versioned.
    pub async fn save(
        &mut self,
        conn: &mut dyn Connection,
        trail: &AuditTrail,
        user: &dyn UserContext,
    ) -> Result<Option<i64>> {
        let changes = self.tracker.change_set(Action::Update);
        if self.skip(trail, &changes) {
            return Ok(None);
        }

        let owns = begin(conn).await?;
        let result = self.write_history(conn, trail, user, &changes).await;
        let version = finish(conn, owns, result).await?;

        self.tracker.accept_changes();
        Ok(Some(version))
    }

    /// Update the record through `provider` and audit it in the same transaction.
    pub async fn update_and_save(
        &mut self,
        conn: &mut dyn Connection,
        provider: &CrudProvider<R>,
        trail: &AuditTrail,
        user: &dyn UserContext,
    ) -> Result<Option<i64>> {
        let changes = self.tracker.change_set(Action::Update);
        if self.skip(trail, &changes) {
            return Ok(None);
        }

        let owns = begin(conn).await?;
        let result = self.update_then_log(conn, provider, trail, user, &changes).await;
        let version = finish(conn, owns, result).await?;

        self.tracker.accept_changes();
        Ok(Some(version))
    }

    fn skip(&self, trail: &AuditTrail, changes: &ChangeSet) -> bool {
        if changes.is_empty() && !trail.config().version_empty_saves {
            debug!(
                "No changes on {} {:?}; audit skipped",
                self.tracker.metadata().shape(),
                self.record().id()
            );
            return true;
        }
        false
    }

    async fn update_then_log(
        &self,
        conn: &mut dyn Connection,
        provider: &CrudProvider<R>,
        trail: &AuditTrail,
        user: &dyn UserContext,
        changes: &ChangeSet,
    ) -> Result<i64> {
        if !changes.is_empty() {
            provider.update(conn, self.record(), Some(changes)).await?;
        }
        self.write_history(conn, trail, user, changes).await
    }

    async fn write_history(
        &self,
        conn: &mut dyn Connection,
        trail: &AuditTrail,
        user: &dyn UserContext,
        changes: &ChangeSet,
    ) -> Result<i64> {
        let metadata = self.tracker.metadata();
        let table = metadata.table();
        let id = self.record().id();
        if id.is_unset() {
            return Err(DbError::Configuration(format!(
                "{} has no identity yet; insert it before auditing",
                metadata.shape()
            )));
        }
        let row_id = id.as_row_id().ok_or_else(|| {
            DbError::Configuration(format!(
                "{} identity {:?} is not numeric; audit rows are keyed by number",
                metadata.shape(),
                id
            ))
        })?;

        let current = trail.ensure_version_row(conn, table, row_id).await?;
        let version = trail.advance_version(conn, table, row_id, current).await?;

        let user_name = user.user_name();
        let changed_at = user.local_time();
        for change in changes {
            let column = metadata.column(&change.column).ok_or_else(|| {
                DbError::UnknownColumn(change.column.clone(), table.to_string())
            })?;
            let old_value = self.render(conn, trail, column, &change.old).await?;
            let new_value = self.render(conn, trail, column, &change.new).await?;

            trail
                .append(
                    conn,
                    &HistoryEntry {
                        user_name: user_name.clone(),
                        changed_at,
                        table_name: table.to_string(),
                        row_id,
                        version,
                        column_name: change.column.clone(),
                        old_value,
                        new_value,
                    },
                )
                .await?;
        }

        debug!(
            "Audited {} column(s) of {}#{} at version {}",
            changes.len(),
            table,
            row_id,
            version
        );
        Ok(version)
    }

    /// Display text of a column value for history.
    async fn render(
        &self,
        conn: &mut dyn Connection,
        trail: &AuditTrail,
        column: &ColumnMetadata,
        value: &Value,
    ) -> Result<String> {
        let text = if value.is_null() {
            None
        } else {
            match &column.kind {
                ValueKind::Raw => value.display_text(),
                ValueKind::Symbolic(symbol_of) => symbol_of(value)
                    .map(str::to_owned)
                    .or_else(|| value.display_text()),
                ValueKind::Lookup(lookup) => {
                    let resolved = match self.record().as_text_lookup() {
                        Some(lookup_capability) => {
                            lookup_capability
                                .lookup_text(conn, &column.column, value)
                                .await?
                        }
                        None => trail.lookup_text(conn, lookup, value).await?,
                    };
                    resolved.or_else(|| value.display_text())
                }
            }
        };

        Ok(text
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| trail.config().null_placeholder.clone()))
    }
}

/// Open a transaction unless one is already active. Returns whether it was opened here.
async fn begin(conn: &mut dyn Connection) -> Result<bool> {
    if conn.in_transaction() {
        return Ok(false);
    }
    conn.begin().await?;
    Ok(true)
}

async fn finish<T>(conn: &mut dyn Connection, owns: bool, result: Result<T>) -> Result<T> {
    if !owns {
        return result;
    }
    match result {
        Ok(value) => match conn.commit().await {
            Ok(()) => Ok(value),
            Err(err) => {
                rollback_quietly(conn).await;
                Err(err)
            }
        },
        Err(err) => {
            rollback_quietly(conn).await;
            Err(err)
        }
    }
}

async fn rollback_quietly(conn: &mut dyn Connection) {
    if conn.in_transaction() {
        if let Err(err) = conn.rollback().await {
            warn!("Rollback of audited save failed: {}", err);
        }
    }
}
