//! Work item dispatch: typed payloads, handler contract, and the queue
//! processor.

pub mod handler;
pub mod item;
pub mod processor;

pub use handler::{NullLock, WorkItemHandler, progress_between};
pub use item::{
    CleanupBotEventsWorkItem, RemoveOrganizationWorkItem, WorkItem, WorkItemContext,
    WorkItemPayload, WorkItemStatus,
};
pub use processor::{AbandonReason, ProcessOutcome, ProcessorHandle, WorkItemProcessor};
