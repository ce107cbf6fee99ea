//! Repository modules implementing storage operations for the change log,
//! backup points, and retention.
//!
//! Each module adds methods to `ChangeTracker` via `impl ChangeTracker` blocks.

pub mod backup;
pub mod change_log;
pub mod retention;
