//! Tracing/logging initialization.
//!
//! Structured JSON logs filtered via `RUST_LOG`. Work item handlers and jobs
//! log with stable fields (`organization`, `work_item`, `kind`) so contained
//! failures can be diagnosed after the fact.

use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "info";

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
