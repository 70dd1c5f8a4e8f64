use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{OrganizationId, UserId};

/// A user account. Users may belong to several organizations; membership is
/// tracked as a list of organization ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email_address: String,
    pub full_name: String,
    pub organization_ids: Vec<OrganizationId>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(email_address: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            email_address: email_address.into(),
            full_name: full_name.into(),
            organization_ids: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_membership(mut self, organization_id: OrganizationId) -> Self {
        self.organization_ids.push(organization_id);
        self
    }

    /// Whether the given organization is this user's only membership.
    pub fn is_only_membership(&self, organization_id: OrganizationId) -> bool {
        !self.organization_ids.is_empty()
            && self.organization_ids.iter().all(|id| *id == organization_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_membership_requires_exactly_that_organization() {
        let org = OrganizationId::new();
        let other = OrganizationId::new();

        let user = User::new("a@example.com", "A").with_membership(org);
        assert!(user.is_only_membership(org));

        let user = user.with_membership(other);
        assert!(!user.is_only_membership(org));

        let user = User::new("b@example.com", "B");
        assert!(!user.is_only_membership(org));
    }
}
