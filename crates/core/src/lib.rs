//! `faultline-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! strongly-typed identifiers, the domain error model, explicit application
//! configuration, and the tenant-owned entity models.

pub mod config;
pub mod error;
pub mod id;
pub mod models;

pub use config::{AppConfig, AppMode};
pub use error::{DomainError, DomainResult};
pub use id::{EventId, OrganizationId, ProjectId, StackId, TokenId, UserId, WebHookId};
