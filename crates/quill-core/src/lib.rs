//! # quill-core
//!
//! Core types for the Quill change-tracking and rollback subsystem.
//!
//! This crate provides the types shared across all Quill crates:
//! - Entity structs for the change log, backup points, and rollback plans
//! - Operation and risk-level enums
//! - The full-row snapshot alias used by compensating operations

pub mod entities;
pub mod enums;

/// A full-row snapshot as stored in `old_data`/`new_data`: column name to
/// JSON value. Kept as a JSON object (not a typed struct) because tracked
/// tables are free-form — the subsystem never validates them against a
/// schema catalogue.
pub type RowData = serde_json::Map<String, serde_json::Value>;
