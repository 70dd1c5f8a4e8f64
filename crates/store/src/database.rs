//! Typed repository traits and the `Database` facade.
//!
//! One repository per entity, each exposing only the operations the
//! processing layer needs. Implementations decide storage; the traits stay
//! synchronous and object-safe so components can hold `Arc<dyn …>` handles.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use faultline_core::models::{
    Organization, Project, Stack, TelemetryEvent, Token, User, WebHook,
};
use faultline_core::{
    EventId, OrganizationId, ProjectId, StackId, UserId,
};

use crate::error::StoreError;
use crate::paging::{PageOptions, PagedResults};

pub trait OrganizationRepository: Send + Sync {
    fn get_by_id(&self, id: OrganizationId) -> Result<Option<Organization>, StoreError>;

    /// Page through organizations with a finite retention period
    /// (`retention_days > 0`).
    fn get_by_retention_days_enabled(
        &self,
        paging: &PageOptions,
    ) -> Result<PagedResults<Organization>, StoreError>;

    fn save(&self, organization: &Organization) -> Result<(), StoreError>;

    fn remove(&self, id: OrganizationId) -> Result<(), StoreError>;
}

pub trait ProjectRepository: Send + Sync {
    fn get_by_id(&self, id: ProjectId) -> Result<Option<Project>, StoreError>;

    fn get_by_organization_id(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Project>, StoreError>;

    fn save(&self, project: &Project) -> Result<(), StoreError>;

    /// Bulk-delete project records. Returns how many were removed.
    fn remove_all(&self, ids: &[ProjectId]) -> Result<u64, StoreError>;
}

pub trait EventRepository: Send + Sync {
    fn get_by_id(&self, id: EventId) -> Result<Option<TelemetryEvent>, StoreError>;

    fn get_by_organization_id(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<TelemetryEvent>, StoreError>;

    fn save(&self, event: &TelemetryEvent) -> Result<(), StoreError>;

    /// Delete all events for an organization dated at or before `cutoff`.
    fn remove_all_by_date(
        &self,
        organization_id: OrganizationId,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    fn remove_all_by_project_id(
        &self,
        organization_id: OrganizationId,
        project_id: ProjectId,
    ) -> Result<u64, StoreError>;

    /// Delete all events for an organization reported from `client_ip`
    /// within `[start, end]`.
    fn remove_all_by_client_ip_and_date(
        &self,
        organization_id: OrganizationId,
        client_ip: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

pub trait StackRepository: Send + Sync {
    fn get_by_id(&self, id: StackId) -> Result<Option<Stack>, StoreError>;

    fn get_by_organization_id(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Stack>, StoreError>;

    fn save(&self, stack: &Stack) -> Result<(), StoreError>;

    fn remove_all_by_project_id(
        &self,
        organization_id: OrganizationId,
        project_id: ProjectId,
    ) -> Result<u64, StoreError>;
}

pub trait TokenRepository: Send + Sync {
    fn get_by_organization_id(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Token>, StoreError>;

    fn save(&self, token: &Token) -> Result<(), StoreError>;

    fn remove_all_by_organization_id(
        &self,
        organization_id: OrganizationId,
    ) -> Result<u64, StoreError>;
}

pub trait UserRepository: Send + Sync {
    fn get_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Users holding a membership in the given organization.
    fn get_by_organization_id(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<User>, StoreError>;

    fn save(&self, user: &User) -> Result<(), StoreError>;

    fn remove(&self, id: UserId) -> Result<(), StoreError>;
}

pub trait WebHookRepository: Send + Sync {
    fn get_by_organization_id(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<WebHook>, StoreError>;

    fn save(&self, web_hook: &WebHook) -> Result<(), StoreError>;

    fn remove_all_by_organization_id(
        &self,
        organization_id: OrganizationId,
    ) -> Result<u64, StoreError>;
}

/// Facade bundling one repository handle per entity.
#[derive(Clone)]
pub struct Database {
    organizations: Arc<dyn OrganizationRepository>,
    projects: Arc<dyn ProjectRepository>,
    events: Arc<dyn EventRepository>,
    stacks: Arc<dyn StackRepository>,
    tokens: Arc<dyn TokenRepository>,
    users: Arc<dyn UserRepository>,
    web_hooks: Arc<dyn WebHookRepository>,
}

impl Database {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        organizations: Arc<dyn OrganizationRepository>,
        projects: Arc<dyn ProjectRepository>,
        events: Arc<dyn EventRepository>,
        stacks: Arc<dyn StackRepository>,
        tokens: Arc<dyn TokenRepository>,
        users: Arc<dyn UserRepository>,
        web_hooks: Arc<dyn WebHookRepository>,
    ) -> Self {
        Self {
            organizations,
            projects,
            events,
            stacks,
            tokens,
            users,
            web_hooks,
        }
    }

    pub fn organizations(&self) -> &dyn OrganizationRepository {
        self.organizations.as_ref()
    }

    pub fn projects(&self) -> &dyn ProjectRepository {
        self.projects.as_ref()
    }

    pub fn events(&self) -> &dyn EventRepository {
        self.events.as_ref()
    }

    pub fn stacks(&self) -> &dyn StackRepository {
        self.stacks.as_ref()
    }

    pub fn tokens(&self) -> &dyn TokenRepository {
        self.tokens.as_ref()
    }

    pub fn users(&self) -> &dyn UserRepository {
        self.users.as_ref()
    }

    pub fn web_hooks(&self) -> &dyn WebHookRepository {
        self.web_hooks.as_ref()
    }
}
