use crate::core::{DbError, Result};
use std::time::Duration;

const URL_SCHEME: &str = "sqlite:";
const MEMORY_PATH: &str = ":memory:";

/// Database connection configuration
///
/// Similar to the `sqlite:` connection strings used by most SQLite drivers.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Database file path, or `:memory:` for a private in-memory database
    pub path: String,

    /// How long a statement waits on a locked database before failing
    pub busy_timeout: Duration,

    /// Enforce foreign key constraints
    pub foreign_keys: bool,
}

impl ConnectionConfig {
    /// Configuration for a file-backed database
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            busy_timeout: Duration::from_secs(5),
            foreign_keys: true,
        }
    }

    /// Configuration for a private in-memory database
    pub fn in_memory() -> Self {
        Self::new(MEMORY_PATH)
    }

    /// Set the busy timeout
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Enable or disable foreign key enforcement
    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == MEMORY_PATH
    }

    /// Parse from connection string
    ///
    /// Format: `sqlite::memory:` or `sqlite://path/to/file.db`
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let config = ConnectionConfig::from_url("sqlite://data/app.db")?;
    /// ```
    pub fn from_url(url: &str) -> Result<Self> {
        let Some(rest) = url.strip_prefix(URL_SCHEME) else {
            return Err(DbError::Configuration(format!(
                "URL must start with '{}': {}",
                URL_SCHEME, url
            )));
        };

        if rest == MEMORY_PATH {
            return Ok(Self::in_memory());
        }

        match rest.strip_prefix("//") {
            Some(path) if !path.is_empty() => Ok(Self::new(path)),
            _ => Err(DbError::Configuration(format!("Invalid SQLite URL: {}", url))),
        }
    }

    /// Convert to connection string
    pub fn to_url(&self) -> String {
        if self.is_in_memory() {
            format!("{}{}", URL_SCHEME, MEMORY_PATH)
        } else {
            format!("{}//{}", URL_SCHEME, self.path)
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(DbError::Configuration("path cannot be empty".to_string()));
        }

        if self.busy_timeout.is_zero() {
            return Err(DbError::Configuration("busy_timeout must be > 0".to_string()));
        }

        Ok(())
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert!(config.is_in_memory());
        assert!(config.foreign_keys);
        assert_eq!(config.busy_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_builder_pattern() {
        let config = ConnectionConfig::new("app.db")
            .busy_timeout(Duration::from_millis(250))
            .foreign_keys(false);

        assert_eq!(config.path, "app.db");
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert!(!config.foreign_keys);
    }

    #[test]
    fn test_from_url() {
        let config = ConnectionConfig::from_url("sqlite://data/app.db").unwrap();
        assert_eq!(config.path, "data/app.db");
        assert_eq!(config.to_url(), "sqlite://data/app.db");

        let memory = ConnectionConfig::from_url("sqlite::memory:").unwrap();
        assert!(memory.is_in_memory());
        assert_eq!(memory.to_url(), "sqlite::memory:");
    }

    #[test]
    fn test_invalid_url() {
        assert!(ConnectionConfig::from_url("postgres://localhost/db").is_err());
        assert!(ConnectionConfig::from_url("sqlite://").is_err());
        assert!(ConnectionConfig::from_url("sqlite:relative.db").is_err());
    }

    #[test]
    fn test_validate() {
        assert!(ConnectionConfig::in_memory().validate().is_ok());
        assert!(ConnectionConfig::new("  ").validate().is_err());
        assert!(
            ConnectionConfig::new("app.db")
                .busy_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }
}
