//! Process-wide observability setup.

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times; subsequent calls become no-ops. Integration
/// tests call this freely without coordinating.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, layers).
pub mod tracing;
