use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{EventId, OrganizationId, ProjectId, StackId};

/// An ingested error/telemetry event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub id: EventId,
    pub organization_id: OrganizationId,
    pub project_id: ProjectId,
    pub stack_id: Option<StackId>,

    /// When the event occurred (business time, not ingestion time).
    pub date: DateTime<Utc>,

    pub message: Option<String>,

    /// Client IP address of the reporting source, when known.
    pub client_ip_address: Option<String>,

    /// Hidden events are excluded from normal visibility and alerting
    /// (e.g. flagged as bot noise).
    pub is_hidden: bool,
}

impl TelemetryEvent {
    pub fn new(organization_id: OrganizationId, project_id: ProjectId) -> Self {
        Self {
            id: EventId::new(),
            organization_id,
            project_id,
            stack_id: None,
            date: Utc::now(),
            message: None,
            client_ip_address: None,
            is_hidden: false,
        }
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip_address = Some(ip.into());
        self
    }

    pub fn with_stack(mut self, stack_id: StackId) -> Self {
        self.stack_id = Some(stack_id);
        self
    }
}
