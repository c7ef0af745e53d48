// ============================================================================
// Record Descriptors
// ============================================================================
//
// Statically declared mapping between a record shape and its table. Built
// once per type, either by `#[derive(Record)]` or by hand, and turned into
// `TableMetadata` by the resolver.
//
// ============================================================================

use crate::core::{DataType, Value};
use std::fmt;

/// The persistence action being performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Insert,
    Update,
}

/// Per-column restriction on which actions may write it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SaveAction {
    #[default]
    Both,
    InsertOnly,
    UpdateOnly,
}

impl SaveAction {
    pub fn permits(self, action: Action) -> bool {
        match (self, action) {
            (Self::Both, _) => true,
            (Self::InsertOnly, Action::Insert) => true,
            (Self::UpdateOnly, Action::Update) => true,
            _ => false,
        }
    }
}

/// Reference to a lookup table that turns a stored key into display text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRef {
    pub table: String,
    pub key_column: String,
    pub text_column: String,
}

impl LookupRef {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key_column: "Id".to_string(),
            text_column: "Name".to_string(),
        }
    }

    pub fn key_column(mut self, column: impl Into<String>) -> Self {
        self.key_column = column.into();
        self
    }

    pub fn text_column(mut self, column: impl Into<String>) -> Self {
        self.text_column = column.into();
        self
    }
}

/// How a column's value is rendered in audit history.
#[derive(Clone)]
pub enum ValueKind {
    Raw,
    Symbolic(fn(&Value) -> Option<&'static str>),
    Lookup(LookupRef),
}

impl fmt::Debug for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => write!(f, "Raw"),
            Self::Symbolic(_) => write!(f, "Symbolic"),
            Self::Lookup(lookup) => f.debug_tuple("Lookup").field(lookup).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
    pub field: String,
    pub column: String,
    /// `None` when the field's type has no storage mapping.
    pub data_type: Option<DataType>,
    pub writable: bool,
    pub identity: bool,
    pub excluded: bool,
    pub save: SaveAction,
    pub key: bool,
    pub kind: ValueKind,
}

impl ColumnDescriptor {
    pub fn new(field: impl Into<String>, data_type: DataType) -> Self {
        let field = field.into();
        Self {
            column: field.clone(),
            field,
            data_type: Some(data_type),
            writable: true,
            identity: false,
            excluded: false,
            save: SaveAction::Both,
            key: false,
            kind: ValueKind::Raw,
        }
    }

    pub fn column_name(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    pub fn excluded(mut self) -> Self {
        self.excluded = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    pub fn unsupported(mut self) -> Self {
        self.data_type = None;
        self
    }

    pub fn save_action(mut self, save: SaveAction) -> Self {
        self.save = save;
        self
    }

    pub fn key(mut self) -> Self {
        self.key = true;
        self
    }

    pub fn lookup(mut self, lookup: LookupRef) -> Self {
        self.kind = ValueKind::Lookup(lookup);
        self
    }

    pub fn symbolic(mut self, symbol_of: fn(&Value) -> Option<&'static str>) -> Self {
        self.kind = ValueKind::Symbolic(symbol_of);
        self
    }
}

/// Custom FROM clause and WHERE-by-id fragment replacing the default table SELECT.
///
/// The WHERE fragment must reference the `@id` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOverride {
    pub from: String,
    pub where_by_id: String,
}

impl SelectOverride {
    pub fn new(from: impl Into<String>, where_by_id: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            where_by_id: where_by_id.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordDescriptor {
    /// Name of the record shape (the Rust type name for derived records).
    pub shape: String,
    pub table: Option<String>,
    pub columns: Vec<ColumnDescriptor>,
    pub select_override: Option<SelectOverride>,
}

impl RecordDescriptor {
    pub fn new(shape: impl Into<String>) -> Self {
        Self {
            shape: shape.into(),
            table: None,
            columns: Vec::new(),
            select_override: None,
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    pub fn select_override(mut self, select: SelectOverride) -> Self {
        self.select_override = Some(select);
        self
    }
}
