use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Column '{0}' not found in table '{1}'")]
    UnknownColumn(String, String),

    #[error("Statement failed: {source}\n  statement: {statement}\n  parameters: {parameters}")]
    Crud {
        statement: String,
        parameters: String,
        #[source]
        source: Box<DbError>,
    },

    #[error("Identity already assigned: {0}")]
    IdentityReuse(String),

    #[error("Change set for '{0}' is empty; nothing to update")]
    EmptyChangeSet(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Missing parameter '{0}'")]
    MissingParameter(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Lookup error: {0}")]
    Lookup(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Lock error: {0}")]
    LockError(String),
}

impl DbError {
    /// Wrap a failure raised while executing `statement` with its bound parameters.
    pub fn crud(statement: impl Into<String>, parameters: impl Into<String>, source: DbError) -> Self {
        Self::Crud {
            statement: statement.into(),
            parameters: parameters.into(),
            source: Box::new(source),
        }
    }

    /// Errors that indicate a programming defect rather than a data or I/O condition.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::IdentityReuse(_) | Self::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
