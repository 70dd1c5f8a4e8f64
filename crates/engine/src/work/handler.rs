//! The work item handler contract.

use std::time::Duration;

use faultline_platform::{Lock, LockError};

use super::item::{WorkItem, WorkItemContext};

/// Handles one kind of work item.
///
/// Lock acquisition is mandatory before handling: at most one handler
/// instance executes per lock key at any time, across every process. The
/// default implementation returns a no-op lock for handlers whose work needs
/// no serialization.
pub trait WorkItemHandler: Send + Sync {
    /// The payload kind this handler is registered for.
    fn kind(&self) -> &'static str;

    /// Acquire the lock guarding this item, failing fast when it is already
    /// held (the work is presumed in flight elsewhere and the item is
    /// abandoned for later redelivery).
    fn acquire_lock(&self, item: &WorkItem) -> Result<Option<Box<dyn Lock>>, LockError> {
        let _ = item;
        Ok(Some(Box::new(NullLock)))
    }

    fn handle(&self, context: &WorkItemContext) -> anyhow::Result<()>;
}

/// Lock for handlers without serialization needs.
pub struct NullLock;

impl Lock for NullLock {
    fn key(&self) -> &str {
        ""
    }

    fn renew(&mut self, _extension: Duration) -> Result<(), LockError> {
        Ok(())
    }

    fn release(&mut self) -> Result<(), LockError> {
        Ok(())
    }
}

/// Map `completed` out of `total` steps into the `[start, end]` progress
/// range.
pub fn progress_between(total: usize, completed: usize, start: u8, end: u8) -> u8 {
    if total == 0 || start >= end {
        return end.max(start);
    }
    let completed = completed.min(total) as u64;
    let span = u64::from(end - start);
    start + ((span * completed) / total as u64) as u8
}
