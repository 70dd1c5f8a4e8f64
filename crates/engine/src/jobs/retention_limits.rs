//! Retention enforcement sweep.
//!
//! Deletes events older than each organization's effective retention cutoff.
//! Guarded by a throttling lock (at most one run per period, independent of
//! the external scheduler) and paced so the sweep never hammers the backend.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{NaiveTime, Utc};
use tracing::{debug, error, info};

use faultline_core::models::Organization;
use faultline_core::AppConfig;
use faultline_platform::{Cache, CancellationToken, LockProvider, ThrottlingLockProvider};
use faultline_store::{Database, PageOptions};

/// Lock held for the duration of one sweep, renewed between pages.
const LOCK_DURATION: Duration = Duration::from_secs(2 * 60 * 60);

/// At most one sweep per this period, as a safety net against overlapping
/// invocations.
const RUN_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

const LOCK_KEY: &str = "retention-limits";

/// Result of one sweep attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    /// Another run already consumed this period's slot.
    LockNotAcquired,
}

pub struct RetentionLimitsJob {
    config: Arc<AppConfig>,
    db: Database,
    lock_provider: ThrottlingLockProvider,
    page_limit: usize,
    pacing: Duration,
}

impl RetentionLimitsJob {
    pub fn new(config: Arc<AppConfig>, db: Database, cache: Arc<dyn Cache>) -> Self {
        Self {
            config,
            db,
            lock_provider: ThrottlingLockProvider::new(cache, 1, RUN_PERIOD),
            page_limit: 100,
            pacing: Duration::from_secs(5),
        }
    }

    pub fn with_page_limit(mut self, page_limit: usize) -> Self {
        self.page_limit = page_limit.max(1);
        self
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// One sweep over all organizations with finite retention. Cancellation
    /// is checked before each organization and before fetching the next
    /// page; an in-flight per-organization deletion is never interrupted.
    pub fn run(&self, cancellation: &CancellationToken) -> anyhow::Result<JobOutcome> {
        let Some(mut lock) =
            self.lock_provider
                .acquire(LOCK_KEY, LOCK_DURATION, Duration::ZERO)?
        else {
            info!("retention sweep skipped, a run already happened this period");
            return Ok(JobOutcome::LockNotAcquired);
        };

        let mut paging = PageOptions::with_limit(self.page_limit);
        let mut results = self
            .db
            .organizations()
            .get_by_retention_days_enabled(&paging)?;

        while !results.documents.is_empty() && !cancellation.is_cancelled() {
            for organization in &results.documents {
                if cancellation.is_cancelled() {
                    break;
                }

                self.enforce_retention(organization);

                // Pacing only: bounds backend load, not correctness.
                thread::sleep(self.pacing);
            }

            let Some(cursor) = results.next_cursor else {
                break;
            };
            if cancellation.is_cancelled() {
                break;
            }

            paging.cursor = Some(cursor);
            results = self
                .db
                .organizations()
                .get_by_retention_days_enabled(&paging)?;

            if !results.documents.is_empty() {
                lock.renew(LOCK_DURATION)?;
            }
        }

        Ok(JobOutcome::Success)
    }

    /// Failures here are contained per organization: logged and skipped so
    /// one tenant cannot abort the sweep.
    fn enforce_retention(&self, organization: &Organization) {
        info!(
            organization = %organization.id,
            name = %organization.name,
            "enforcing event retention limits"
        );

        let days = effective_retention_days(organization, self.config.maximum_retention_days);
        let cutoff = (Utc::now().date_naive() - chrono::Days::new(u64::from(days)))
            .and_time(NaiveTime::MIN)
            .and_utc();

        match self.db.events().remove_all_by_date(organization.id, cutoff) {
            Ok(removed) => {
                debug!(organization = %organization.id, removed, "expired events removed");
            }
            Err(e) => {
                error!(
                    organization = %organization.id,
                    name = %organization.name,
                    error = ?e,
                    "failed to enforce retention limits"
                );
            }
        }
    }
}

/// The organization's retention clamped by the global maximum (when one is
/// configured).
fn effective_retention_days(organization: &Organization, maximum_retention_days: u32) -> u32 {
    let mut days = organization.retention_days;
    if maximum_retention_days > 0 && days > maximum_retention_days {
        days = maximum_retention_days;
    }
    days
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration as ChronoDuration};
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use faultline_core::models::TelemetryEvent;
    use faultline_core::{EventId, OrganizationId, ProjectId};
    use faultline_platform::InMemoryCache;
    use faultline_store::{
        EventRepository, InMemoryEventRepository, InMemoryOrganizationRepository,
        InMemoryProjectRepository, InMemoryStackRepository, InMemoryTokenRepository,
        InMemoryUserRepository, InMemoryWebHookRepository, StoreError,
    };

    fn db_with_events(events: Arc<dyn EventRepository>) -> Database {
        Database::new(
            Arc::new(InMemoryOrganizationRepository::new()),
            Arc::new(InMemoryProjectRepository::new()),
            events,
            Arc::new(InMemoryStackRepository::new(None)),
            Arc::new(InMemoryTokenRepository::new()),
            Arc::new(InMemoryUserRepository::new()),
            Arc::new(InMemoryWebHookRepository::new()),
        )
    }

    fn job(config: AppConfig, db: &Database) -> RetentionLimitsJob {
        RetentionLimitsJob::new(
            Arc::new(config),
            db.clone(),
            Arc::new(InMemoryCache::new()),
        )
        .with_pacing(Duration::from_millis(1))
    }

    fn event_aged(org: OrganizationId, days_old: i64) -> TelemetryEvent {
        TelemetryEvent::new(org, ProjectId::new())
            .with_date(Utc::now() - ChronoDuration::days(days_old))
    }

    #[test]
    fn events_past_the_cutoff_are_removed_and_recent_ones_kept() {
        let db = Database::in_memory(None);
        let org = Organization::new("org1").with_retention_days(30);
        db.organizations().save(&org).unwrap();

        let old = event_aged(org.id, 40);
        let recent = event_aged(org.id, 10);
        db.events().save(&old).unwrap();
        db.events().save(&recent).unwrap();

        let outcome = job(AppConfig::default(), &db)
            .run(&CancellationToken::new())
            .unwrap();

        assert_eq!(outcome, JobOutcome::Success);
        assert!(db.events().get_by_id(old.id).unwrap().is_none());
        assert!(db.events().get_by_id(recent.id).unwrap().is_some());
    }

    #[test]
    fn global_maximum_caps_generous_organization_retention() {
        let db = Database::in_memory(None);
        let org = Organization::new("org").with_retention_days(100);
        db.organizations().save(&org).unwrap();

        let event = event_aged(org.id, 35);
        db.events().save(&event).unwrap();

        job(AppConfig::default().with_maximum_retention_days(30), &db)
            .run(&CancellationToken::new())
            .unwrap();

        assert!(db.events().get_by_id(event.id).unwrap().is_none());
    }

    #[test]
    fn organizations_without_retention_are_untouched() {
        let db = Database::in_memory(None);
        let org = Organization::new("unlimited");
        db.organizations().save(&org).unwrap();

        let ancient = event_aged(org.id, 4000);
        db.events().save(&ancient).unwrap();

        job(AppConfig::default(), &db)
            .run(&CancellationToken::new())
            .unwrap();

        assert!(db.events().get_by_id(ancient.id).unwrap().is_some());
    }

    #[test]
    fn second_run_within_the_period_is_skipped() {
        let db = Database::in_memory(None);
        let job = job(AppConfig::default(), &db);

        assert_eq!(job.run(&CancellationToken::new()).unwrap(), JobOutcome::Success);
        assert_eq!(
            job.run(&CancellationToken::new()).unwrap(),
            JobOutcome::LockNotAcquired
        );
    }

    #[test]
    fn sweep_walks_every_page() {
        let db = Database::in_memory(None);
        let mut events = Vec::new();
        for i in 0..3 {
            let org = Organization::new(format!("org-{i}")).with_retention_days(30);
            db.organizations().save(&org).unwrap();
            let event = event_aged(org.id, 60);
            db.events().save(&event).unwrap();
            events.push(event);
        }

        job(AppConfig::default(), &db)
            .with_page_limit(1)
            .run(&CancellationToken::new())
            .unwrap();

        for event in events {
            assert!(db.events().get_by_id(event.id).unwrap().is_none());
        }
    }

    /// Delegates to an in-memory repository, failing retention deletes for
    /// one organization.
    struct FailingForOrganization {
        inner: InMemoryEventRepository,
        fail_for: OrganizationId,
    }

    impl EventRepository for FailingForOrganization {
        fn get_by_id(&self, id: EventId) -> Result<Option<TelemetryEvent>, StoreError> {
            self.inner.get_by_id(id)
        }

        fn get_by_organization_id(
            &self,
            organization_id: OrganizationId,
        ) -> Result<Vec<TelemetryEvent>, StoreError> {
            self.inner.get_by_organization_id(organization_id)
        }

        fn save(&self, event: &TelemetryEvent) -> Result<(), StoreError> {
            self.inner.save(event)
        }

        fn remove_all_by_date(
            &self,
            organization_id: OrganizationId,
            cutoff: DateTime<Utc>,
        ) -> Result<u64, StoreError> {
            if organization_id == self.fail_for {
                return Err(StoreError::Backend("index unavailable".to_string()));
            }
            self.inner.remove_all_by_date(organization_id, cutoff)
        }

        fn remove_all_by_project_id(
            &self,
            organization_id: OrganizationId,
            project_id: ProjectId,
        ) -> Result<u64, StoreError> {
            self.inner.remove_all_by_project_id(organization_id, project_id)
        }

        fn remove_all_by_client_ip_and_date(
            &self,
            organization_id: OrganizationId,
            client_ip: &str,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<u64, StoreError> {
            self.inner
                .remove_all_by_client_ip_and_date(organization_id, client_ip, start, end)
        }
    }

    #[test]
    fn one_failing_organization_does_not_abort_the_sweep() {
        let broken = Organization::new("broken").with_retention_days(30);
        let healthy = Organization::new("healthy").with_retention_days(30);

        let events = Arc::new(FailingForOrganization {
            inner: InMemoryEventRepository::new(None),
            fail_for: broken.id,
        });
        let db = db_with_events(events.clone());
        db.organizations().save(&broken).unwrap();
        db.organizations().save(&healthy).unwrap();

        let broken_event = event_aged(broken.id, 60);
        let healthy_event = event_aged(healthy.id, 60);
        db.events().save(&broken_event).unwrap();
        db.events().save(&healthy_event).unwrap();

        let outcome = job(AppConfig::default(), &db)
            .run(&CancellationToken::new())
            .unwrap();

        assert_eq!(outcome, JobOutcome::Success);
        assert!(db.events().get_by_id(broken_event.id).unwrap().is_some());
        assert!(db.events().get_by_id(healthy_event.id).unwrap().is_none());
    }

    /// Cancels the given token as a side effect of the first delete, so the
    /// sweep observes cancellation at the next organization boundary.
    struct CancellingRepository {
        inner: InMemoryEventRepository,
        token: CancellationToken,
        fired: AtomicBool,
    }

    impl EventRepository for CancellingRepository {
        fn get_by_id(&self, id: EventId) -> Result<Option<TelemetryEvent>, StoreError> {
            self.inner.get_by_id(id)
        }

        fn get_by_organization_id(
            &self,
            organization_id: OrganizationId,
        ) -> Result<Vec<TelemetryEvent>, StoreError> {
            self.inner.get_by_organization_id(organization_id)
        }

        fn save(&self, event: &TelemetryEvent) -> Result<(), StoreError> {
            self.inner.save(event)
        }

        fn remove_all_by_date(
            &self,
            organization_id: OrganizationId,
            cutoff: DateTime<Utc>,
        ) -> Result<u64, StoreError> {
            if !self.fired.swap(true, Ordering::SeqCst) {
                self.token.cancel();
            }
            self.inner.remove_all_by_date(organization_id, cutoff)
        }

        fn remove_all_by_project_id(
            &self,
            organization_id: OrganizationId,
            project_id: ProjectId,
        ) -> Result<u64, StoreError> {
            self.inner.remove_all_by_project_id(organization_id, project_id)
        }

        fn remove_all_by_client_ip_and_date(
            &self,
            organization_id: OrganizationId,
            client_ip: &str,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<u64, StoreError> {
            self.inner
                .remove_all_by_client_ip_and_date(organization_id, client_ip, start, end)
        }
    }

    #[test]
    fn cancellation_stops_the_sweep_at_the_next_organization_boundary() {
        let token = CancellationToken::new();
        let events = Arc::new(CancellingRepository {
            inner: InMemoryEventRepository::new(None),
            token: token.clone(),
            fired: AtomicBool::new(false),
        });
        let db = db_with_events(events);

        // UUIDv7 ordering: the first saved organization sweeps first.
        let first = Organization::new("first").with_retention_days(30);
        db.organizations().save(&first).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        let second = Organization::new("second").with_retention_days(30);
        db.organizations().save(&second).unwrap();

        let first_event = event_aged(first.id, 60);
        let second_event = event_aged(second.id, 60);
        db.events().save(&first_event).unwrap();
        db.events().save(&second_event).unwrap();

        let outcome = job(AppConfig::default(), &db).run(&token).unwrap();

        assert_eq!(outcome, JobOutcome::Success);
        assert!(db.events().get_by_id(first_event.id).unwrap().is_none());
        assert!(db.events().get_by_id(second_event.id).unwrap().is_some());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: the effective retention never exceeds the organization's
        /// own setting, nor a configured global maximum.
        #[test]
        fn effective_retention_is_clamped(org_days in 1u32..5000, max_days in 0u32..5000) {
            let organization = Organization::new("o").with_retention_days(org_days);
            let effective = effective_retention_days(&organization, max_days);

            prop_assert!(effective <= org_days);
            if max_days > 0 {
                prop_assert!(effective <= max_days);
            } else {
                prop_assert_eq!(effective, org_days);
            }
        }
    }
}
