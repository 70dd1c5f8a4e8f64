use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{OrganizationId, ProjectId};

/// A project: the unit events are reported against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub organization_id: OrganizationId,
    pub name: String,

    /// Opt-in for bot throttling and retroactive bot-data cleanup.
    pub delete_bot_data_enabled: bool,

    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(organization_id: OrganizationId, name: impl Into<String>) -> Self {
        Self {
            id: ProjectId::new(),
            organization_id,
            name: name.into(),
            delete_bot_data_enabled: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_delete_bot_data_enabled(mut self, enabled: bool) -> Self {
        self.delete_bot_data_enabled = enabled;
        self
    }
}
