//! In-memory repositories for tests/dev.
//!
//! Event and stack repositories publish entity-changed notifications when
//! constructed with a publisher; the remaining repositories are plain maps.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use faultline_core::models::{
    Organization, Project, Stack, TelemetryEvent, Token, User, WebHook,
};
use faultline_core::{EventId, OrganizationId, ProjectId, StackId, TokenId, UserId, WebHookId};

use crate::database::{
    Database, EventRepository, OrganizationRepository, ProjectRepository, StackRepository,
    TokenRepository, UserRepository, WebHookRepository,
};
use crate::error::StoreError;
use crate::messages::{ChangeType, EntityChanged, EntityChangedPublisher};
use crate::paging::{PageOptions, PagedResults};

#[derive(Default)]
pub struct InMemoryOrganizationRepository {
    documents: RwLock<HashMap<OrganizationId, Organization>>,
}

impl InMemoryOrganizationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrganizationRepository for InMemoryOrganizationRepository {
    fn get_by_id(&self, id: OrganizationId) -> Result<Option<Organization>, StoreError> {
        Ok(self.documents.read().unwrap().get(&id).cloned())
    }

    fn get_by_retention_days_enabled(
        &self,
        paging: &PageOptions,
    ) -> Result<PagedResults<Organization>, StoreError> {
        let documents = self.documents.read().unwrap();
        let mut matching: Vec<Organization> = documents
            .values()
            .filter(|o| o.has_retention())
            .cloned()
            .collect();
        // UUIDv7 ids are time-ordered, giving a stable paging order.
        matching.sort_by_key(|o| *o.id.as_uuid());

        let total = matching.len() as u64;
        let offset = paging.cursor.unwrap_or(0) as usize;
        let page: Vec<Organization> = matching
            .into_iter()
            .skip(offset)
            .take(paging.limit)
            .collect();

        let consumed = offset + page.len();
        let next_cursor = if (consumed as u64) < total {
            Some(consumed as u64)
        } else {
            None
        };

        Ok(PagedResults {
            documents: page,
            total,
            next_cursor,
        })
    }

    fn save(&self, organization: &Organization) -> Result<(), StoreError> {
        self.documents
            .write()
            .unwrap()
            .insert(organization.id, organization.clone());
        Ok(())
    }

    fn remove(&self, id: OrganizationId) -> Result<(), StoreError> {
        self.documents.write().unwrap().remove(&id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryProjectRepository {
    documents: RwLock<HashMap<ProjectId, Project>>,
}

impl InMemoryProjectRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProjectRepository for InMemoryProjectRepository {
    fn get_by_id(&self, id: ProjectId) -> Result<Option<Project>, StoreError> {
        Ok(self.documents.read().unwrap().get(&id).cloned())
    }

    fn get_by_organization_id(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Project>, StoreError> {
        let documents = self.documents.read().unwrap();
        let mut projects: Vec<Project> = documents
            .values()
            .filter(|p| p.organization_id == organization_id)
            .cloned()
            .collect();
        projects.sort_by_key(|p| *p.id.as_uuid());
        Ok(projects)
    }

    fn save(&self, project: &Project) -> Result<(), StoreError> {
        self.documents
            .write()
            .unwrap()
            .insert(project.id, project.clone());
        Ok(())
    }

    fn remove_all(&self, ids: &[ProjectId]) -> Result<u64, StoreError> {
        let mut documents = self.documents.write().unwrap();
        let mut removed = 0;
        for id in ids {
            if documents.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

pub struct InMemoryEventRepository {
    documents: RwLock<HashMap<EventId, TelemetryEvent>>,
    publisher: Option<EntityChangedPublisher>,
}

impl Default for InMemoryEventRepository {
    fn default() -> Self {
        Self::new(None)
    }
}

impl InMemoryEventRepository {
    pub fn new(publisher: Option<EntityChangedPublisher>) -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            publisher,
        }
    }

    fn publish(&self, event: &TelemetryEvent, change_type: ChangeType) {
        if let Some(publisher) = &self.publisher {
            publisher.publish(EntityChanged::new(
                EntityChanged::EVENT,
                event.id,
                Some(event.organization_id),
                Some(event.project_id),
                change_type,
            ));
        }
    }

    fn remove_matching<F>(&self, predicate: F) -> u64
    where
        F: Fn(&TelemetryEvent) -> bool,
    {
        let removed: Vec<TelemetryEvent> = {
            let mut documents = self.documents.write().unwrap();
            let ids: Vec<EventId> = documents
                .values()
                .filter(|e| predicate(e))
                .map(|e| e.id)
                .collect();
            ids.iter().filter_map(|id| documents.remove(id)).collect()
        };

        for event in &removed {
            self.publish(event, ChangeType::Removed);
        }
        removed.len() as u64
    }
}

impl EventRepository for InMemoryEventRepository {
    fn get_by_id(&self, id: EventId) -> Result<Option<TelemetryEvent>, StoreError> {
        Ok(self.documents.read().unwrap().get(&id).cloned())
    }

    fn get_by_organization_id(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<TelemetryEvent>, StoreError> {
        let documents = self.documents.read().unwrap();
        let mut events: Vec<TelemetryEvent> = documents
            .values()
            .filter(|e| e.organization_id == organization_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| *e.id.as_uuid());
        Ok(events)
    }

    fn save(&self, event: &TelemetryEvent) -> Result<(), StoreError> {
        let change_type = {
            let mut documents = self.documents.write().unwrap();
            match documents.insert(event.id, event.clone()) {
                Some(_) => ChangeType::Saved,
                None => ChangeType::Added,
            }
        };
        self.publish(event, change_type);
        Ok(())
    }

    fn remove_all_by_date(
        &self,
        organization_id: OrganizationId,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        Ok(self.remove_matching(|e| e.organization_id == organization_id && e.date <= cutoff))
    }

    fn remove_all_by_project_id(
        &self,
        organization_id: OrganizationId,
        project_id: ProjectId,
    ) -> Result<u64, StoreError> {
        Ok(self.remove_matching(|e| {
            e.organization_id == organization_id && e.project_id == project_id
        }))
    }

    fn remove_all_by_client_ip_and_date(
        &self,
        organization_id: OrganizationId,
        client_ip: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        Ok(self.remove_matching(|e| {
            e.organization_id == organization_id
                && e.client_ip_address.as_deref() == Some(client_ip)
                && e.date >= start
                && e.date <= end
        }))
    }
}

pub struct InMemoryStackRepository {
    documents: RwLock<HashMap<StackId, Stack>>,
    publisher: Option<EntityChangedPublisher>,
}

impl Default for InMemoryStackRepository {
    fn default() -> Self {
        Self::new(None)
    }
}

impl InMemoryStackRepository {
    pub fn new(publisher: Option<EntityChangedPublisher>) -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            publisher,
        }
    }

    fn publish(&self, stack: &Stack, change_type: ChangeType) {
        if let Some(publisher) = &self.publisher {
            publisher.publish(EntityChanged::new(
                EntityChanged::STACK,
                stack.id,
                Some(stack.organization_id),
                Some(stack.project_id),
                change_type,
            ));
        }
    }
}

impl StackRepository for InMemoryStackRepository {
    fn get_by_id(&self, id: StackId) -> Result<Option<Stack>, StoreError> {
        Ok(self.documents.read().unwrap().get(&id).cloned())
    }

    fn get_by_organization_id(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Stack>, StoreError> {
        let documents = self.documents.read().unwrap();
        let mut stacks: Vec<Stack> = documents
            .values()
            .filter(|s| s.organization_id == organization_id)
            .cloned()
            .collect();
        stacks.sort_by_key(|s| *s.id.as_uuid());
        Ok(stacks)
    }

    fn save(&self, stack: &Stack) -> Result<(), StoreError> {
        let change_type = {
            let mut documents = self.documents.write().unwrap();
            match documents.insert(stack.id, stack.clone()) {
                Some(_) => ChangeType::Saved,
                None => ChangeType::Added,
            }
        };
        self.publish(stack, change_type);
        Ok(())
    }

    fn remove_all_by_project_id(
        &self,
        organization_id: OrganizationId,
        project_id: ProjectId,
    ) -> Result<u64, StoreError> {
        let removed: Vec<Stack> = {
            let mut documents = self.documents.write().unwrap();
            let ids: Vec<StackId> = documents
                .values()
                .filter(|s| s.organization_id == organization_id && s.project_id == project_id)
                .map(|s| s.id)
                .collect();
            ids.iter().filter_map(|id| documents.remove(id)).collect()
        };

        for stack in &removed {
            self.publish(stack, ChangeType::Removed);
        }
        Ok(removed.len() as u64)
    }
}

#[derive(Default)]
pub struct InMemoryTokenRepository {
    documents: RwLock<HashMap<TokenId, Token>>,
}

impl InMemoryTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenRepository for InMemoryTokenRepository {
    fn get_by_organization_id(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Token>, StoreError> {
        let documents = self.documents.read().unwrap();
        Ok(documents
            .values()
            .filter(|t| t.organization_id == organization_id)
            .cloned()
            .collect())
    }

    fn save(&self, token: &Token) -> Result<(), StoreError> {
        self.documents
            .write()
            .unwrap()
            .insert(token.id, token.clone());
        Ok(())
    }

    fn remove_all_by_organization_id(
        &self,
        organization_id: OrganizationId,
    ) -> Result<u64, StoreError> {
        let mut documents = self.documents.write().unwrap();
        let before = documents.len();
        documents.retain(|_, t| t.organization_id != organization_id);
        Ok((before - documents.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    documents: RwLock<HashMap<UserId, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserRepository for InMemoryUserRepository {
    fn get_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.documents.read().unwrap().get(&id).cloned())
    }

    fn get_by_organization_id(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<User>, StoreError> {
        let documents = self.documents.read().unwrap();
        let mut users: Vec<User> = documents
            .values()
            .filter(|u| u.organization_ids.contains(&organization_id))
            .cloned()
            .collect();
        users.sort_by_key(|u| *u.id.as_uuid());
        Ok(users)
    }

    fn save(&self, user: &User) -> Result<(), StoreError> {
        self.documents
            .write()
            .unwrap()
            .insert(user.id, user.clone());
        Ok(())
    }

    fn remove(&self, id: UserId) -> Result<(), StoreError> {
        self.documents.write().unwrap().remove(&id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryWebHookRepository {
    documents: RwLock<HashMap<WebHookId, WebHook>>,
}

impl InMemoryWebHookRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WebHookRepository for InMemoryWebHookRepository {
    fn get_by_organization_id(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<WebHook>, StoreError> {
        let documents = self.documents.read().unwrap();
        Ok(documents
            .values()
            .filter(|w| w.organization_id == organization_id)
            .cloned()
            .collect())
    }

    fn save(&self, web_hook: &WebHook) -> Result<(), StoreError> {
        self.documents
            .write()
            .unwrap()
            .insert(web_hook.id, web_hook.clone());
        Ok(())
    }

    fn remove_all_by_organization_id(
        &self,
        organization_id: OrganizationId,
    ) -> Result<u64, StoreError> {
        let mut documents = self.documents.write().unwrap();
        let before = documents.len();
        documents.retain(|_, w| w.organization_id != organization_id);
        Ok((before - documents.len()) as u64)
    }
}

impl Database {
    /// All-in-memory database. Event and stack repositories publish change
    /// notifications through `publisher` when one is given.
    pub fn in_memory(publisher: Option<EntityChangedPublisher>) -> Self {
        Self::new(
            Arc::new(InMemoryOrganizationRepository::new()),
            Arc::new(InMemoryProjectRepository::new()),
            Arc::new(InMemoryEventRepository::new(publisher.clone())),
            Arc::new(InMemoryStackRepository::new(publisher)),
            Arc::new(InMemoryTokenRepository::new()),
            Arc::new(InMemoryUserRepository::new()),
            Arc::new(InMemoryWebHookRepository::new()),
        )
    }
}
