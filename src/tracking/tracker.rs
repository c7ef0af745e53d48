use super::change_set::ChangeSet;
use crate::core::{Result, Value};
use crate::metadata::{Action, Record, TableMetadata, resolve};
use std::collections::HashMap;
use std::sync::Arc;

/// Owns a record and remembers each mapped column's value as of construction
/// (or the last [`accept_changes`](Self::accept_changes)).
///
/// The snapshot is keyed by column name and compared with value equality.
pub struct ChangeTracker<R: Record> {
    record: R,
    metadata: Arc<TableMetadata>,
    snapshot: HashMap<String, Value>,
}

impl<R: Record> ChangeTracker<R> {
    pub fn new(record: R) -> Result<Self> {
        let metadata = resolve::<R>()?;
        let snapshot = take_snapshot(&metadata, &record);
        Ok(Self {
            record,
            metadata,
            snapshot,
        })
    }

    pub fn record(&self) -> &R {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut R {
        &mut self.record
    }

    pub fn into_inner(self) -> R {
        self.record
    }

    pub fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }

    /// The snapshotted ("old") value of a column.
    pub fn original(&self, column: &str) -> Option<&Value> {
        self.snapshot.get(column)
    }

    /// Columns mapped for `action` whose current value differs from the snapshot,
    /// in metadata order.
    pub fn modified_columns(&self, action: Action) -> Vec<String> {
        self.change_set(action)
            .columns()
            .map(str::to_owned)
            .collect()
    }

    pub fn change_set(&self, action: Action) -> ChangeSet {
        let mut changes = ChangeSet::new();
        for column in self.metadata.columns_for(action) {
            let old = self
                .snapshot
                .get(&column.column)
                .cloned()
                .unwrap_or(Value::Null);
            let new = self.record.value(&column.column).unwrap_or(Value::Null);
            if old != new {
                changes.push(column.column.clone(), old, new);
            }
        }
        changes
    }

    pub fn is_modified(&self, action: Action) -> bool {
        !self.change_set(action).is_empty()
    }

    /// Re-snapshot the current values, typically after a successful save.
    pub fn accept_changes(&mut self) {
        self.snapshot = take_snapshot(&self.metadata, &self.record);
    }
}

fn take_snapshot<R: Record>(metadata: &TableMetadata, record: &R) -> HashMap<String, Value> {
    metadata
        .columns()
        .iter()
        .map(|c| {
            (
                c.column.clone(),
                record.value(&c.column).unwrap_or(Value::Null),
            )
        })
        .collect()
}
