//! `faultline-store` — repository abstractions over tenant-owned entities.
//!
//! Persistence engines are external; this crate defines the typed repository
//! traits the processing layer consumes, cursor pagination for large result
//! sets, entity-changed notifications with a pre-publish gate, and in-memory
//! implementations for tests/dev.

pub mod database;
pub mod error;
pub mod memory;
pub mod messages;
pub mod paging;

pub use database::{
    Database, EventRepository, OrganizationRepository, ProjectRepository, StackRepository,
    TokenRepository, UserRepository, WebHookRepository,
};
pub use error::StoreError;
pub use memory::{
    InMemoryEventRepository, InMemoryOrganizationRepository, InMemoryProjectRepository,
    InMemoryStackRepository, InMemoryTokenRepository, InMemoryUserRepository,
    InMemoryWebHookRepository,
};
pub use messages::{ChangeType, EntityChanged, EntityChangedPublisher, PublishGate};
pub use paging::{PageOptions, PagedResults};
