//! Work item handlers.

pub mod cleanup_bot_events;
pub mod remove_organization;

pub use cleanup_bot_events::CleanupBotEventsHandler;
pub use remove_organization::RemoveOrganizationHandler;
