//! Organization removal: a multi-phase cascading delete.
//!
//! Serialized per organization by a cache lock. Phases run in a fixed order
//! with monotonically increasing progress reports; a failure at any phase
//! propagates and leaves partially-deleted state, recoverable by re-running
//! the same work item (deletes are idempotent and an already-absent
//! organization short-circuits at 100%).

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use faultline_core::ProjectId;
use faultline_platform::{Cache, CacheLockProvider, Lock, LockError, LockProvider};
use faultline_store::Database;

use crate::billing::BillingGateway;
use crate::work::{
    RemoveOrganizationWorkItem, WorkItem, WorkItemContext, WorkItemHandler, WorkItemPayload,
    progress_between,
};

const LOCK_DURATION: Duration = Duration::from_secs(15 * 60);

pub struct RemoveOrganizationHandler {
    db: Database,
    billing: Arc<dyn BillingGateway>,
    lock_provider: CacheLockProvider,
}

impl RemoveOrganizationHandler {
    pub fn new(db: Database, billing: Arc<dyn BillingGateway>, cache: Arc<dyn Cache>) -> Self {
        Self {
            db,
            billing,
            lock_provider: CacheLockProvider::new(cache),
        }
    }
}

impl WorkItemHandler for RemoveOrganizationHandler {
    fn kind(&self) -> &'static str {
        RemoveOrganizationWorkItem::KIND
    }

    fn acquire_lock(&self, item: &WorkItem) -> Result<Option<Box<dyn Lock>>, LockError> {
        // Keyed by organization so concurrent deletion/admin operations on
        // the same tenant serialize while different tenants run in parallel.
        let key = match item.payload.get("organization_id").and_then(|v| v.as_str()) {
            Some(organization_id) => format!("remove-organization:{organization_id}"),
            None => format!("remove-organization:{}", item.id),
        };
        self.lock_provider.acquire(&key, LOCK_DURATION, Duration::ZERO)
    }

    fn handle(&self, context: &WorkItemContext) -> anyhow::Result<()> {
        let wi: RemoveOrganizationWorkItem = context.payload()?;
        info!(organization = %wi.organization_id, "received remove organization work item");

        context.report_progress(0, "Starting deletion");
        let Some(organization) = self.db.organizations().get_by_id(wi.organization_id)? else {
            context.report_progress(100, "Organization deleted");
            return Ok(());
        };

        context.report_progress(10, "Removing subscriptions");
        if let Some(customer_id) = &organization.billing_customer_id {
            info!(
                organization = %organization.id,
                name = %organization.name,
                "canceling billing subscriptions"
            );
            for subscription_id in self.billing.active_subscriptions(customer_id)? {
                self.billing.cancel_subscription(&subscription_id)?;
            }
        }

        context.report_progress(20, "Removing users");
        for mut user in self.db.users().get_by_organization_id(organization.id)? {
            if user.is_only_membership(organization.id) && wi.current_user_id != Some(user.id) {
                info!(user = %user.id, "removing user with no other organization memberships");
                self.db.users().remove(user.id)?;
            } else {
                info!(
                    user = %user.id,
                    organization = %organization.id,
                    "removing user membership"
                );
                user.organization_ids.retain(|id| *id != organization.id);
                self.db.users().save(&user)?;
            }
        }

        context.report_progress(30, "Removing tokens");
        self.db
            .tokens()
            .remove_all_by_organization_id(organization.id)?;

        context.report_progress(40, "Removing web hooks");
        self.db
            .web_hooks()
            .remove_all_by_organization_id(organization.id)?;

        context.report_progress(50, "Removing projects");
        let projects = self.db.projects().get_by_organization_id(organization.id)?;
        if wi.is_global_admin && !projects.is_empty() {
            let total = projects.len();
            for (index, project) in projects.iter().enumerate() {
                info!(
                    organization = %organization.id,
                    project = %project.id,
                    name = %project.name,
                    "resetting all project data"
                );
                self.db
                    .events()
                    .remove_all_by_project_id(organization.id, project.id)?;
                self.db
                    .stacks()
                    .remove_all_by_project_id(organization.id, project.id)?;
                context.report_progress(
                    progress_between(total, index + 1, 51, 89),
                    "Removing projects",
                );
            }

            info!(organization = %organization.id, "deleting all projects");
            let ids: Vec<ProjectId> = projects.iter().map(|p| p.id).collect();
            self.db.projects().remove_all(&ids)?;
        }

        info!(organization = %organization.id, name = %organization.name, "deleting organization");
        context.report_progress(90, "Removing organization");
        self.db.organizations().remove(organization.id)?;

        context.report_progress(100, "Organization deleted");
        Ok(())
    }
}
