//! Transactional, versioned column-level history.

pub mod config;
pub mod logged;
pub mod trail;
pub mod user;

pub use config::AuditConfig;
pub use logged::LoggedChangeTracker;
pub use trail::{AuditTrail, HistoryEntry};
pub use user::{StaticUser, UserContext};
