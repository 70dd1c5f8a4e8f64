//! `faultline-engine` — the asynchronous work-dispatch and safety-control
//! layer.
//!
//! Coordinates mutating, potentially long-running, potentially concurrent
//! operations across a distributed deployment: the work-item queue processor
//! with per-item locking and progress reporting, the prioritized event
//! pipeline with the bot throttle, the retention-enforcement sweep, the
//! organization-removal cascade, and listener-gated broadcast suppression.

pub mod billing;
pub mod handlers;
pub mod jobs;
pub mod message_service;
pub mod pipeline;
pub mod work;

pub use billing::{BillingError, BillingGateway, InMemoryBillingGateway};
pub use handlers::{CleanupBotEventsHandler, RemoveOrganizationHandler};
pub use jobs::{JobOutcome, RetentionLimitsJob};
pub use message_service::{
    ConnectionMapping, ConnectionMappingError, InMemoryConnectionMapping, MessageService,
};
pub use pipeline::{EventContext, EventPipeline, EventPipelinePlugin, ThrottleBotsPlugin};
pub use work::{
    AbandonReason, CleanupBotEventsWorkItem, ProcessOutcome, ProcessorHandle,
    RemoveOrganizationWorkItem, WorkItem, WorkItemContext, WorkItemHandler, WorkItemPayload,
    WorkItemProcessor, WorkItemStatus,
};
