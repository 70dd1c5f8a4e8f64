use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::OrganizationId;

/// An organization: the root of the multi-tenant hierarchy and of the
/// deletion cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,

    /// How long this organization's events are kept, in days.
    /// `0` means unlimited (retention disabled).
    pub retention_days: u32,

    /// Customer identifier at the external billing provider, when the
    /// organization has a paid subscription.
    pub billing_customer_id: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Organization {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: OrganizationId::new(),
            name: name.into(),
            retention_days: 0,
            billing_customer_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    pub fn with_billing_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.billing_customer_id = Some(customer_id.into());
        self
    }

    /// Whether a finite retention period applies to this organization.
    pub fn has_retention(&self) -> bool {
        self.retention_days > 0
    }
}
