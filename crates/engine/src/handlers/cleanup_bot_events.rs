//! Deferred cleanup of bot traffic flagged by the throttle.
//!
//! Purges events previously accepted from a client IP within the throttle
//! window, so a breach reduces bot noise retroactively and not just going
//! forward.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use faultline_platform::{Cache, CacheLockProvider, Lock, LockError, LockProvider};
use faultline_store::Database;

use crate::work::{
    CleanupBotEventsWorkItem, WorkItem, WorkItemContext, WorkItemHandler, WorkItemPayload,
};

const LOCK_DURATION: Duration = Duration::from_secs(5 * 60);

pub struct CleanupBotEventsHandler {
    db: Database,
    lock_provider: CacheLockProvider,
}

impl CleanupBotEventsHandler {
    pub fn new(db: Database, cache: Arc<dyn Cache>) -> Self {
        Self {
            db,
            lock_provider: CacheLockProvider::new(cache),
        }
    }
}

impl WorkItemHandler for CleanupBotEventsHandler {
    fn kind(&self) -> &'static str {
        CleanupBotEventsWorkItem::KIND
    }

    fn acquire_lock(&self, item: &WorkItem) -> Result<Option<Box<dyn Lock>>, LockError> {
        let organization = item
            .payload
            .get("organization_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let ip = item
            .payload
            .get("client_ip_address")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let key = format!("cleanup-bot-events:{organization}:{ip}");
        self.lock_provider.acquire(&key, LOCK_DURATION, Duration::ZERO)
    }

    fn handle(&self, context: &WorkItemContext) -> anyhow::Result<()> {
        let wi: CleanupBotEventsWorkItem = context.payload()?;

        let removed = self.db.events().remove_all_by_client_ip_and_date(
            wi.organization_id,
            &wi.client_ip_address,
            wi.window_start,
            wi.window_end,
        )?;

        info!(
            organization = %wi.organization_id,
            ip = %wi.client_ip_address,
            removed,
            "bot events removed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};

    use faultline_core::models::TelemetryEvent;
    use faultline_core::{OrganizationId, ProjectId};
    use faultline_platform::{CancellationToken, InMemoryCache, InMemoryMessageBus};
    use faultline_store::Database;

    fn handler() -> (Database, CleanupBotEventsHandler) {
        let db = Database::in_memory(None);
        let handler = CleanupBotEventsHandler::new(db.clone(), Arc::new(InMemoryCache::new()));
        (db, handler)
    }

    fn run(handler: &CleanupBotEventsHandler, payload: &CleanupBotEventsWorkItem) {
        let item = WorkItem::new(payload).unwrap();
        let bus = Arc::new(InMemoryMessageBus::new());
        let context = WorkItemContext::new(item, CancellationToken::new(), bus);
        handler.handle(&context).unwrap();
    }

    #[test]
    fn purges_only_the_flagged_ip_inside_the_window() {
        let (db, handler) = handler();
        let org = OrganizationId::new();
        let project = ProjectId::new();
        let now = Utc::now();

        let bot = TelemetryEvent::new(org, project)
            .with_client_ip("203.0.113.5")
            .with_date(now);
        let earlier = TelemetryEvent::new(org, project)
            .with_client_ip("203.0.113.5")
            .with_date(now - ChronoDuration::hours(2));
        let human = TelemetryEvent::new(org, project)
            .with_client_ip("198.51.100.7")
            .with_date(now);
        for event in [&bot, &earlier, &human] {
            db.events().save(event).unwrap();
        }

        run(
            &handler,
            &CleanupBotEventsWorkItem {
                organization_id: org,
                client_ip_address: "203.0.113.5".to_string(),
                window_start: now - ChronoDuration::minutes(5),
                window_end: now + ChronoDuration::minutes(5),
            },
        );

        assert!(db.events().get_by_id(bot.id).unwrap().is_none());
        assert!(db.events().get_by_id(earlier.id).unwrap().is_some());
        assert!(db.events().get_by_id(human.id).unwrap().is_some());
    }

    #[test]
    fn cleanup_for_the_same_ip_and_organization_serializes() {
        let (_db, handler) = handler();
        let payload = CleanupBotEventsWorkItem {
            organization_id: OrganizationId::new(),
            client_ip_address: "203.0.113.5".to_string(),
            window_start: Utc::now(),
            window_end: Utc::now(),
        };
        let item = WorkItem::new(&payload).unwrap();

        let held = handler.acquire_lock(&item).unwrap();
        assert!(held.is_some());
        assert!(handler.acquire_lock(&item).unwrap().is_none());
    }
}
