//! Entity-changed notifications and the pre-publish gate.
//!
//! Repositories that publish change notifications do so through an
//! [`EntityChangedPublisher`] resolved once at construction. The publisher
//! consults an optional [`PublishGate`] before every publish; a denied
//! message is dropped silently (gating is an optimization, never a delivery
//! guarantee callers may rely on).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use faultline_core::{OrganizationId, ProjectId};
use faultline_platform::MessageBus;

/// What happened to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Saved,
    Removed,
}

/// Notification that an entity changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityChanged {
    /// Stable entity type name (e.g. "event", "stack").
    pub type_name: String,
    pub id: String,
    pub organization_id: Option<OrganizationId>,
    pub project_id: Option<ProjectId>,
    pub change_type: ChangeType,
}

impl EntityChanged {
    pub const EVENT: &'static str = "event";
    pub const STACK: &'static str = "stack";

    pub fn new(
        type_name: &str,
        id: impl ToString,
        organization_id: Option<OrganizationId>,
        project_id: Option<ProjectId>,
        change_type: ChangeType,
    ) -> Self {
        Self {
            type_name: type_name.to_string(),
            id: id.to_string(),
            organization_id,
            project_id,
            change_type,
        }
    }
}

/// Decides whether a change notification may be published.
///
/// Implementations must be cheap and must fail open: denying delivery is only
/// ever an optimization.
pub trait PublishGate: Send + Sync {
    fn allow(&self, message: &EntityChanged) -> bool;
}

/// Publishes entity-changed notifications through an optional gate.
#[derive(Clone)]
pub struct EntityChangedPublisher {
    bus: Arc<dyn MessageBus<EntityChanged>>,
    gate: Option<Arc<dyn PublishGate>>,
}

impl EntityChangedPublisher {
    pub fn new(bus: Arc<dyn MessageBus<EntityChanged>>) -> Self {
        Self { bus, gate: None }
    }

    pub fn with_gate(mut self, gate: Arc<dyn PublishGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Publish a notification, best effort. Gated-out or failed publishes
    /// are logged and dropped.
    pub fn publish(&self, message: EntityChanged) {
        if let Some(gate) = &self.gate {
            if !gate.allow(&message) {
                trace!(
                    type_name = %message.type_name,
                    id = %message.id,
                    "entity-changed publish cancelled by gate"
                );
                return;
            }
        }

        if let Err(e) = self.bus.publish(message) {
            warn!(error = ?e, "entity-changed publish failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_platform::InMemoryMessageBus;

    struct DenyAll;

    impl PublishGate for DenyAll {
        fn allow(&self, _message: &EntityChanged) -> bool {
            false
        }
    }

    fn message() -> EntityChanged {
        EntityChanged::new(
            EntityChanged::STACK,
            "s-1",
            Some(OrganizationId::new()),
            None,
            ChangeType::Saved,
        )
    }

    #[test]
    fn ungated_publisher_delivers() {
        let bus = Arc::new(InMemoryMessageBus::new());
        let sub = bus.subscribe();

        let publisher = EntityChangedPublisher::new(bus);
        publisher.publish(message());

        assert_eq!(sub.drain().len(), 1);
    }

    #[test]
    fn denying_gate_drops_the_message() {
        let bus = Arc::new(InMemoryMessageBus::new());
        let sub = bus.subscribe();

        let publisher = EntityChangedPublisher::new(bus).with_gate(Arc::new(DenyAll));
        publisher.publish(message());

        assert!(sub.drain().is_empty());
    }
}
