use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{OrganizationId, ProjectId, StackId};

/// A stack: a group of similar events, deduplicated by signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
    pub id: StackId,
    pub organization_id: OrganizationId,
    pub project_id: ProjectId,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl Stack {
    pub fn new(
        organization_id: OrganizationId,
        project_id: ProjectId,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: StackId::new(),
            organization_id,
            project_id,
            title: title.into(),
            created_at: Utc::now(),
        }
    }
}
