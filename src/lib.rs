// ============================================================================
// rowkeeper Library
// ============================================================================
//
// Metadata-driven single-table CRUD plus transactional, versioned
// column-level audit history.
//
//   record type ──► metadata ──► statement builder ──► Connection
//        │                                                 ▲
//        └──► change tracker ──► audit trail ──────────────┘
//
// ============================================================================

pub mod audit;
pub mod connection;
pub mod core;
pub mod dynamic;
pub mod metadata;
pub mod provider;
pub mod statement;
pub mod tracking;

pub use crate::core::{DataType, DbError, Identity, Params, Result, Row, SqlValue, Symbolic, Value};

pub use metadata::{
    Action, ColumnDescriptor, LookupRef, PostLoad, Record, RecordDescriptor, SaveAction,
    SelectOverride, TableMetadata, TextLookup, Validate, ValidationResult, ValueKind,
};

pub use statement::{Dialect, SqlExpr, SqlServer, Sqlite, Statement};

pub use connection::{ColumnInfo, Connection, ConnectionConfig, SqliteConnection};

pub use dynamic::{DynamicCommand, DynamicValue};

pub use provider::{CrudProvider, Criteria};

pub use tracking::{Change, ChangeSet, ChangeTracker};

pub use audit::{AuditConfig, AuditTrail, HistoryEntry, LoggedChangeTracker, StaticUser, UserContext};

pub use rowkeeper_derive::{Record, SqlEnum};
