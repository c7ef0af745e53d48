//! Snapshot-then-diff change tracking.

pub mod change_set;
pub mod tracker;

pub use change_set::{Change, ChangeSet};
pub use tracker::ChangeTracker;
