use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{OrganizationId, ProjectId, TokenId};

/// An access token scoped to an organization (and optionally a project).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    pub organization_id: OrganizationId,
    pub project_id: Option<ProjectId>,
    pub created_at: DateTime<Utc>,
}

impl Token {
    pub fn new(organization_id: OrganizationId) -> Self {
        Self {
            id: TokenId::new(),
            organization_id,
            project_id: None,
            created_at: Utc::now(),
        }
    }
}
