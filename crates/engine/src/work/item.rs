//! Work items, their typed payloads, and the per-delivery handling context.

use std::sync::Arc;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use faultline_core::{OrganizationId, UserId};
use faultline_platform::{CancellationToken, MessageBus};

/// A typed work item payload. The `KIND` string routes the item to its
/// registered handler.
pub trait WorkItemPayload: Serialize + DeserializeOwned {
    const KIND: &'static str;
}

/// A durable, typed unit of deferred work transported by the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: Uuid,
    pub kind: String,
    pub payload: Value,
    pub correlation_id: Option<String>,
}

impl WorkItem {
    pub fn new<P: WorkItemPayload>(payload: &P) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::now_v7(),
            kind: P::KIND.to_string(),
            payload: serde_json::to_value(payload)?,
            correlation_id: None,
        })
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// Progress notification for a work item, published on the message bus so
/// external observers (e.g. a UI) can follow along. Best-effort status, not a
/// success signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemStatus {
    pub work_item_id: Uuid,
    pub kind: String,
    /// 0–100.
    pub progress: u8,
    pub message: Option<String>,
}

/// Context handed to a handler for one handling attempt.
pub struct WorkItemContext {
    item: WorkItem,
    cancellation: CancellationToken,
    status_bus: Arc<dyn MessageBus<WorkItemStatus>>,
}

impl WorkItemContext {
    pub fn new(
        item: WorkItem,
        cancellation: CancellationToken,
        status_bus: Arc<dyn MessageBus<WorkItemStatus>>,
    ) -> Self {
        Self {
            item,
            cancellation,
            status_bus,
        }
    }

    pub fn item(&self) -> &WorkItem {
        &self.item
    }

    /// Deserialize the payload as its declared type.
    pub fn payload<P: WorkItemPayload>(&self) -> anyhow::Result<P> {
        serde_json::from_value(self.item.payload.clone())
            .with_context(|| format!("deserializing {} work item payload", self.item.kind))
    }

    /// Cancellation signal derived from processor shutdown and the queue
    /// entry's visibility deadline. Handlers check it at safe points.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Report progress, fire and forget. Failures are logged and never affect
    /// the handling outcome.
    pub fn report_progress(&self, progress: u8, message: &str) {
        let status = WorkItemStatus {
            work_item_id: self.item.id,
            kind: self.item.kind.clone(),
            progress,
            message: Some(message.to_string()),
        };
        if let Err(e) = self.status_bus.publish(status) {
            debug!(error = ?e, work_item = %self.item.id, "progress report dropped");
        }
    }
}

/// Payload for the organization-removal cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveOrganizationWorkItem {
    pub organization_id: OrganizationId,
    /// The user who initiated the deletion, when there is one. The initiator
    /// is never deleted even if this is their only organization.
    pub current_user_id: Option<UserId>,
    pub is_global_admin: bool,
}

impl WorkItemPayload for RemoveOrganizationWorkItem {
    const KIND: &'static str = "remove-organization";
}

/// Payload for the deferred bot-traffic cleanup triggered by the throttle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupBotEventsWorkItem {
    pub organization_id: OrganizationId,
    pub client_ip_address: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

impl WorkItemPayload for CleanupBotEventsWorkItem {
    const KIND: &'static str = "cleanup-bot-events";
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_platform::InMemoryMessageBus;

    #[test]
    fn payload_round_trips_through_a_work_item() {
        let payload = RemoveOrganizationWorkItem {
            organization_id: OrganizationId::new(),
            current_user_id: Some(UserId::new()),
            is_global_admin: true,
        };

        let item = WorkItem::new(&payload).unwrap();
        assert_eq!(item.kind, RemoveOrganizationWorkItem::KIND);

        let bus = Arc::new(InMemoryMessageBus::new());
        let context = WorkItemContext::new(item, CancellationToken::new(), bus);
        let back: RemoveOrganizationWorkItem = context.payload().unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn mismatched_payload_type_is_an_error() {
        let payload = RemoveOrganizationWorkItem {
            organization_id: OrganizationId::new(),
            current_user_id: None,
            is_global_admin: false,
        };
        let item = WorkItem::new(&payload).unwrap();

        let bus = Arc::new(InMemoryMessageBus::new());
        let context = WorkItemContext::new(item, CancellationToken::new(), bus);
        assert!(context.payload::<CleanupBotEventsWorkItem>().is_err());
    }

    #[test]
    fn progress_reports_reach_subscribers() {
        let bus = Arc::new(InMemoryMessageBus::new());
        let sub = bus.subscribe();

        let payload = CleanupBotEventsWorkItem {
            organization_id: OrganizationId::new(),
            client_ip_address: "203.0.113.5".to_string(),
            window_start: Utc::now(),
            window_end: Utc::now(),
        };
        let item = WorkItem::new(&payload).unwrap();
        let context = WorkItemContext::new(item.clone(), CancellationToken::new(), bus);

        context.report_progress(40, "Removing web hooks");

        let statuses = sub.drain();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].work_item_id, item.id);
        assert_eq!(statuses[0].progress, 40);
    }
}
