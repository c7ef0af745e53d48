//! Schema metadata: descriptors declared per record shape and the resolver
//! that turns them into cached [`TableMetadata`].

pub mod descriptor;
pub mod record;
pub mod table;

pub use descriptor::{
    Action, ColumnDescriptor, LookupRef, RecordDescriptor, SaveAction, SelectOverride, ValueKind,
};
pub use record::{
    PostLoad, Record, TextLookup, Validate, ValidationResult, assign_identity,
};
pub use table::{ColumnMetadata, IdentityColumn, TableMetadata, resolve, resolve_descriptor};
