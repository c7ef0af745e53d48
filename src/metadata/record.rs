use super::descriptor::RecordDescriptor;
use crate::connection::Connection;
use crate::core::{DbError, Identity, Result, Row, Value};
use async_trait::async_trait;

/// A typed record mapped to a single table.
///
/// Usually implemented with `#[derive(Record)]`. Optional capabilities
/// (validation, post-load, text lookup) are exposed through the `as_*`
/// accessors; the defaults report the capability as absent.
pub trait Record: Sized + Send + Sync + 'static {
    type Id: Identity;

    fn descriptor() -> RecordDescriptor;

    fn id(&self) -> Self::Id;

    /// Raw identity write. Use [`assign_identity`] outside of generated code.
    fn set_id(&mut self, id: Self::Id);

    /// Current value of a mapped column, by column name.
    fn value(&self, column: &str) -> Option<Value>;

    fn from_row(row: &Row) -> Result<Self>;

    fn as_validate(&self) -> Option<&dyn Validate> {
        None
    }

    fn as_post_load(&mut self) -> Option<&mut dyn PostLoad> {
        None
    }

    fn as_text_lookup(&self) -> Option<&dyn TextLookup> {
        None
    }
}

/// Set a record's identity exactly once.
pub fn assign_identity<R: Record>(record: &mut R, id: R::Id) -> Result<()> {
    let current = record.id();
    if !current.is_unset() {
        return Err(DbError::IdentityReuse(format!(
            "{} already has identity {:?}; refusing to assign {:?}",
            R::descriptor().shape,
            current,
            id
        )));
    }
    record.set_id(id);
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub message: String,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            message: String::new(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            message: message.into(),
        }
    }

    pub fn into_result(self) -> Result<()> {
        if self.is_valid {
            Ok(())
        } else {
            Err(DbError::Validation(self.message))
        }
    }
}

/// Checks run before a record is inserted or updated.
#[async_trait]
pub trait Validate: Send + Sync {
    fn validate(&self) -> ValidationResult {
        ValidationResult::valid()
    }

    async fn validate_async(&self, _conn: &mut dyn Connection) -> Result<ValidationResult> {
        Ok(ValidationResult::valid())
    }
}

/// Follow-up loading after a record is fetched.
#[async_trait]
pub trait PostLoad: Send {
    async fn after_load(&mut self, conn: &mut dyn Connection) -> Result<()>;
}

/// Resolves a stored lookup key to display text for audit history.
#[async_trait]
pub trait TextLookup: Send + Sync {
    async fn lookup_text(
        &self,
        conn: &mut dyn Connection,
        column: &str,
        key: &Value,
    ) -> Result<Option<String>>;
}
