use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{OrganizationId, ProjectId, WebHookId};

/// A webhook registration scoped to an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebHook {
    pub id: WebHookId,
    pub organization_id: OrganizationId,
    pub project_id: Option<ProjectId>,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl WebHook {
    pub fn new(organization_id: OrganizationId, url: impl Into<String>) -> Self {
        Self {
            id: WebHookId::new(),
            organization_id,
            project_id: None,
            url: url.into(),
            created_at: Utc::now(),
        }
    }
}
