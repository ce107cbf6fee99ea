//! Rollback planning and execution.
//!
//! Planning is always read-only: it selects the change-log entries after a
//! target instant and computes risk/warning metadata. Execution is the only
//! code in the repository performing compensating writes against arbitrary
//! tracked tables, and is gated on explicit confirmation.

pub mod executor;
pub mod planner;
