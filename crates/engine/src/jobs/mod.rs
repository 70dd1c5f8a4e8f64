//! Periodic background jobs.

pub mod retention_limits;

pub use retention_limits::{JobOutcome, RetentionLimitsJob};
