//! Listener-gated broadcast suppression.
//!
//! Entity-changed messages for stacks and events are only worth publishing
//! when someone is listening for that organization. The message service is a
//! [`PublishGate`] installed into the store's publisher at construction; it
//! consults a connection-mapping service and cancels delivery when the
//! organization has zero live subscriber connections. Purely an optimization:
//! cancellation is never a delivery guarantee, and any doubt publishes.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::{trace, warn};

use faultline_store::{EntityChanged, PublishGate};

#[derive(Debug, Error)]
#[error("connection mapping unavailable: {0}")]
pub struct ConnectionMappingError(pub String);

/// Tracks live subscriber connections grouped by organization id.
pub trait ConnectionMapping: Send + Sync {
    fn group_connection_count(&self, group: &str) -> Result<usize, ConnectionMappingError>;
}

pub struct MessageService {
    connections: Arc<dyn ConnectionMapping>,
}

impl MessageService {
    pub fn new(connections: Arc<dyn ConnectionMapping>) -> Self {
        Self { connections }
    }
}

impl PublishGate for MessageService {
    fn allow(&self, message: &EntityChanged) -> bool {
        // No organization to check: assume someone may be listening.
        let Some(organization_id) = message.organization_id else {
            return true;
        };

        match self
            .connections
            .group_connection_count(&organization_id.to_string())
        {
            Ok(0) => {
                trace!(
                    type_name = %message.type_name,
                    organization = %organization_id,
                    "cancelled entity changed message, no listeners"
                );
                false
            }
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "listener count unavailable, publishing anyway");
                true
            }
        }
    }
}

/// In-memory connection mapping for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryConnectionMapping {
    counts: RwLock<HashMap<String, usize>>,
}

impl InMemoryConnectionMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_group_count(&self, group: &str, count: usize) {
        self.counts
            .write()
            .unwrap()
            .insert(group.to_string(), count);
    }
}

impl ConnectionMapping for InMemoryConnectionMapping {
    fn group_connection_count(&self, group: &str) -> Result<usize, ConnectionMappingError> {
        Ok(self.counts.read().unwrap().get(group).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use faultline_core::models::Stack;
    use faultline_core::{OrganizationId, ProjectId};
    use faultline_platform::{InMemoryMessageBus, MessageBus};
    use faultline_store::{
        ChangeType, EntityChangedPublisher, InMemoryStackRepository, StackRepository,
    };

    fn gated_stacks(
        connections: Arc<InMemoryConnectionMapping>,
    ) -> (
        InMemoryStackRepository,
        faultline_platform::Subscription<EntityChanged>,
    ) {
        let bus = Arc::new(InMemoryMessageBus::new());
        let sub = bus.subscribe();
        let publisher = EntityChangedPublisher::new(bus)
            .with_gate(Arc::new(MessageService::new(connections)));
        (InMemoryStackRepository::new(Some(publisher)), sub)
    }

    #[test]
    fn zero_listeners_cancels_the_publish() {
        let connections = Arc::new(InMemoryConnectionMapping::new());
        let (stacks, sub) = gated_stacks(connections);

        let stack = Stack::new(OrganizationId::new(), ProjectId::new(), "NPE at startup");
        stacks.save(&stack).unwrap();

        assert!(sub.drain().is_empty());
    }

    #[test]
    fn live_listeners_let_the_publish_through() {
        let org = OrganizationId::new();
        let connections = Arc::new(InMemoryConnectionMapping::new());
        connections.set_group_count(&org.to_string(), 2);
        let (stacks, sub) = gated_stacks(connections);

        let stack = Stack::new(org, ProjectId::new(), "NPE at startup");
        stacks.save(&stack).unwrap();

        let published = sub.drain();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].change_type, ChangeType::Added);
        assert_eq!(published[0].organization_id, Some(org));
    }

    #[test]
    fn missing_organization_fails_open() {
        let service = MessageService::new(Arc::new(InMemoryConnectionMapping::new()));
        let message = EntityChanged::new(EntityChanged::STACK, "s-1", None, None, ChangeType::Saved);
        assert!(service.allow(&message));
    }

    struct BrokenConnectionMapping;

    impl ConnectionMapping for BrokenConnectionMapping {
        fn group_connection_count(&self, _group: &str) -> Result<usize, ConnectionMappingError> {
            Err(ConnectionMappingError("hub offline".to_string()))
        }
    }

    #[test]
    fn lookup_failure_fails_open() {
        let service = MessageService::new(Arc::new(BrokenConnectionMapping));
        let message = EntityChanged::new(
            EntityChanged::EVENT,
            "e-1",
            Some(OrganizationId::new()),
            None,
            ChangeType::Added,
        );
        assert!(service.allow(&message));
    }
}
