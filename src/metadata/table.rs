use super::descriptor::{Action, ColumnDescriptor, RecordDescriptor, SelectOverride, ValueKind};
use super::record::Record;
use crate::core::{DataType, DbError, Result};
use lazy_static::lazy_static;
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

lazy_static! {
    static ref METADATA_CACHE: RwLock<HashMap<TypeId, Arc<TableMetadata>>> =
        RwLock::new(HashMap::new());
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityColumn {
    pub field: String,
    pub column: String,
}

#[derive(Debug, Clone)]
pub struct ColumnMetadata {
    pub field: String,
    pub column: String,
    pub data_type: DataType,
    pub insert: bool,
    pub update: bool,
    pub key: bool,
    pub kind: ValueKind,
}

impl ColumnMetadata {
    pub fn new(column: impl Into<String>, data_type: DataType) -> Self {
        let column = column.into();
        Self {
            field: column.clone(),
            column,
            data_type,
            insert: true,
            update: true,
            key: false,
            kind: ValueKind::Raw,
        }
    }

    pub fn is_mapped_for(&self, action: Action) -> bool {
        match action {
            Action::Insert => self.insert,
            Action::Update => self.update,
        }
    }
}

/// Resolved mapping for one record shape.
///
/// The identity column never appears in `columns`.
#[derive(Debug, Clone)]
pub struct TableMetadata {
    shape: String,
    table: String,
    identity: Option<IdentityColumn>,
    columns: Vec<ColumnMetadata>,
    select_override: Option<SelectOverride>,
}

impl TableMetadata {
    /// Assemble metadata directly from resolved columns (used for introspected tables).
    pub fn from_columns(
        table: impl Into<String>,
        identity: Option<String>,
        columns: Vec<ColumnMetadata>,
    ) -> Result<Self> {
        let table = table.into();
        if let Some(identity) = &identity {
            if columns.iter().any(|c| &c.column == identity) {
                return Err(DbError::Configuration(format!(
                    "identity column '{}' cannot be listed as a data column of '{}'",
                    identity, table
                )));
            }
        }
        ensure_unique_columns(&table, columns.iter().map(|c| c.column.as_str()))?;

        Ok(Self {
            shape: table.clone(),
            table,
            identity: identity.map(|column| IdentityColumn {
                field: column.clone(),
                column,
            }),
            columns,
            select_override: None,
        })
    }

    pub fn shape(&self) -> &str {
        &self.shape
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn identity(&self) -> Option<&IdentityColumn> {
        self.identity.as_ref()
    }

    /// The identity column, or a configuration error naming `purpose`.
    pub fn require_identity(&self, purpose: &str) -> Result<&IdentityColumn> {
        self.identity.as_ref().ok_or_else(|| {
            DbError::Configuration(format!(
                "'{}' has no identity field; {} requires one",
                self.shape, purpose
            ))
        })
    }

    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.column == name)
    }

    pub fn columns_for(&self, action: Action) -> impl Iterator<Item = &ColumnMetadata> {
        self.columns.iter().filter(move |c| c.is_mapped_for(action))
    }

    pub fn insert_columns(&self) -> Vec<&str> {
        self.columns_for(Action::Insert).map(|c| c.column.as_str()).collect()
    }

    pub fn update_columns(&self) -> Vec<&str> {
        self.columns_for(Action::Update).map(|c| c.column.as_str()).collect()
    }

    pub fn key_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.key)
            .map(|c| c.column.as_str())
            .collect()
    }

    pub fn select_override(&self) -> Option<&SelectOverride> {
        self.select_override.as_ref()
    }
}

fn ensure_unique_columns<'a>(table: &str, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(DbError::Configuration(format!(
                "column '{}' is mapped more than once on '{}'",
                name, table
            )));
        }
    }
    Ok(())
}

fn matches_identity_convention(shape: &str, column: &ColumnDescriptor) -> bool {
    let shape_id = format!("{}id", shape.to_ascii_lowercase());
    let shape_snake_id = format!("{}_id", shape.to_ascii_lowercase());
    [column.column.to_ascii_lowercase(), column.field.to_ascii_lowercase()]
        .iter()
        .any(|name| name == "id" || *name == shape_id || *name == shape_snake_id)
}

fn find_identity(descriptor: &RecordDescriptor) -> Result<Option<&ColumnDescriptor>> {
    let flagged: Vec<&ColumnDescriptor> = descriptor
        .columns
        .iter()
        .filter(|c| c.identity && !c.excluded)
        .collect();

    match flagged.as_slice() {
        [single] => return Ok(Some(single)),
        [] => {}
        _ => {
            return Err(DbError::Configuration(format!(
                "'{}' marks more than one identity field",
                descriptor.shape
            )));
        }
    }

    let candidates = || descriptor.columns.iter().filter(|c| !c.excluded);
    let plain_id = candidates().find(|c| {
        c.column.eq_ignore_ascii_case("id") || c.field.eq_ignore_ascii_case("id")
    });
    Ok(plain_id.or_else(|| candidates().find(|c| matches_identity_convention(&descriptor.shape, c))))
}

/// Resolve a descriptor into table metadata.
///
/// A column is mapped for an action iff it is writable, is not the identity,
/// has a storage type, is not excluded, and its save restriction permits the action.
pub fn resolve_descriptor(descriptor: &RecordDescriptor) -> Result<TableMetadata> {
    let table = descriptor
        .table
        .clone()
        .unwrap_or_else(|| descriptor.shape.clone());

    let identity = find_identity(descriptor)?.map(|c| IdentityColumn {
        field: c.field.clone(),
        column: c.column.clone(),
    });

    let mut columns = Vec::new();
    for column in &descriptor.columns {
        if column.excluded || !column.writable {
            continue;
        }
        if identity.as_ref().is_some_and(|id| id.field == column.field) {
            continue;
        }
        let Some(data_type) = column.data_type else {
            continue;
        };

        columns.push(ColumnMetadata {
            field: column.field.clone(),
            column: column.column.clone(),
            data_type,
            insert: column.save.permits(Action::Insert),
            update: column.save.permits(Action::Update),
            key: column.key,
            kind: column.kind.clone(),
        });
    }

    ensure_unique_columns(&table, columns.iter().map(|c| c.column.as_str()))?;

    Ok(TableMetadata {
        shape: descriptor.shape.clone(),
        table,
        identity,
        columns,
        select_override: descriptor.select_override.clone(),
    })
}

/// Metadata for `R`, resolved on first use and cached for the life of the process.
pub fn resolve<R: Record>() -> Result<Arc<TableMetadata>> {
    let key = TypeId::of::<R>();
    if let Some(found) = METADATA_CACHE.read()?.get(&key) {
        return Ok(Arc::clone(found));
    }

    let resolved = Arc::new(resolve_descriptor(&R::descriptor())?);
    let mut cache = METADATA_CACHE.write()?;
    Ok(Arc::clone(cache.entry(key).or_insert(resolved)))
}
