use crate::core::{DbError, Result};

/// Audit storage configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditConfig {
    /// Table holding one row per changed column per save
    pub history_table: String,

    /// Table holding the current version of each audited row
    pub version_table: String,

    /// Text recorded for a value that renders to nothing
    pub null_placeholder: String,

    /// Bump the row version even when a save changed no columns
    pub version_empty_saves: bool,
}

impl AuditConfig {
    pub fn new() -> Self {
        Self {
            history_table: "ChangeHistory".to_string(),
            version_table: "RowVersion".to_string(),
            null_placeholder: "<null>".to_string(),
            version_empty_saves: false,
        }
    }

    /// Set the history table (may be schema-qualified)
    pub fn history_table(mut self, table: &str) -> Self {
        self.history_table = table.to_string();
        self
    }

    /// Set the row-version table (may be schema-qualified)
    pub fn version_table(mut self, table: &str) -> Self {
        self.version_table = table.to_string();
        self
    }

    pub fn null_placeholder(mut self, placeholder: &str) -> Self {
        self.null_placeholder = placeholder.to_string();
        self
    }

    pub fn version_empty_saves(mut self, enabled: bool) -> Self {
        self.version_empty_saves = enabled;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.history_table.trim().is_empty() {
            return Err(DbError::Configuration("history_table cannot be empty".to_string()));
        }

        if self.version_table.trim().is_empty() {
            return Err(DbError::Configuration("version_table cannot be empty".to_string()));
        }

        if self.history_table.eq_ignore_ascii_case(&self.version_table) {
            return Err(DbError::Configuration(
                "history_table and version_table must differ".to_string(),
            ));
        }

        if self.null_placeholder.is_empty() {
            return Err(DbError::Configuration("null_placeholder cannot be empty".to_string()));
        }

        Ok(())
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self::new()
    }
}
