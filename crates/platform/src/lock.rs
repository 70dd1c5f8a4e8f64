//! Distributed lock providers.
//!
//! Locks are named, time-boxed, and renewable. The lock provider is the sole
//! mutual-exclusion mechanism in the system; in-process locking is never
//! sufficient because multiple instances run concurrently.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::cache::{Cache, CacheError};
use crate::time::{bucket_end, floor_to_period};

/// How often a blocked `acquire` re-checks the backing cache.
const ACQUIRE_RETRY_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock backend error: {0}")]
    Backend(#[from] CacheError),
}

/// A held lock. Released explicitly or on drop (best effort).
pub trait Lock: Send {
    fn key(&self) -> &str;

    /// Extend ownership without losing it. Long-running holders renew at safe
    /// points so the lock cannot expire mid-operation.
    fn renew(&mut self, extension: Duration) -> Result<(), LockError>;

    fn release(&mut self) -> Result<(), LockError>;
}

/// Acquires named, time-boxed locks.
pub trait LockProvider: Send + Sync {
    /// Try to acquire `key` for `duration`, waiting up to `acquire_timeout`.
    /// Returns `None` when the lock could not be acquired in time; pass
    /// `Duration::ZERO` for try-once semantics.
    fn acquire(
        &self,
        key: &str,
        duration: Duration,
        acquire_timeout: Duration,
    ) -> Result<Option<Box<dyn Lock>>, LockError>;
}

/// Cache-backed mutual exclusion: ownership is a set-if-absent cache entry
/// with a TTL matching the lock duration.
#[derive(Clone)]
pub struct CacheLockProvider {
    cache: Arc<dyn Cache>,
}

impl CacheLockProvider {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }
}

impl LockProvider for CacheLockProvider {
    fn acquire(
        &self,
        key: &str,
        duration: Duration,
        acquire_timeout: Duration,
    ) -> Result<Option<Box<dyn Lock>>, LockError> {
        let cache_key = format!("lock:{key}");
        let lock_id = Uuid::now_v7().to_string();
        let started = Instant::now();

        loop {
            let expires_at = Utc::now() + chrono::Duration::from_std(duration).unwrap_or_default();
            if self
                .cache
                .add(&cache_key, Value::from(lock_id.clone()), Some(expires_at))?
            {
                debug!(key, "lock acquired");
                return Ok(Some(Box::new(CacheLock {
                    cache: self.cache.clone(),
                    cache_key,
                    key: key.to_string(),
                    lock_id,
                    released: false,
                })));
            }

            if started.elapsed() >= acquire_timeout {
                debug!(key, "lock not acquired within timeout");
                return Ok(None);
            }

            thread::sleep(ACQUIRE_RETRY_INTERVAL.min(acquire_timeout.saturating_sub(started.elapsed())));
        }
    }
}

struct CacheLock {
    cache: Arc<dyn Cache>,
    cache_key: String,
    key: String,
    lock_id: String,
    released: bool,
}

impl Lock for CacheLock {
    fn key(&self) -> &str {
        &self.key
    }

    fn renew(&mut self, extension: Duration) -> Result<(), LockError> {
        // Assumes this holder still owns the entry; renewal must happen
        // before the current TTL elapses.
        let expires_at = Utc::now() + chrono::Duration::from_std(extension).unwrap_or_default();
        self.cache
            .set(&self.cache_key, Value::from(self.lock_id.clone()), Some(expires_at))?;
        debug!(key = %self.key, "lock renewed");
        Ok(())
    }

    fn release(&mut self) -> Result<(), LockError> {
        if !self.released {
            self.released = true;
            self.cache.remove(&self.cache_key)?;
            debug!(key = %self.key, "lock released");
        }
        Ok(())
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            let _ = self.cache.remove(&self.cache_key);
        }
    }
}

/// Throttling lock: permits up to `max_hits` acquisitions per fixed period
/// rather than pure mutual exclusion. Used as a safety net against a job
/// running more often than intended, independent of its normal schedule.
#[derive(Clone)]
pub struct ThrottlingLockProvider {
    cache: Arc<dyn Cache>,
    max_hits: u32,
    period: Duration,
}

impl ThrottlingLockProvider {
    pub fn new(cache: Arc<dyn Cache>, max_hits: u32, period: Duration) -> Self {
        Self {
            cache,
            max_hits: max_hits.max(1),
            period,
        }
    }
}

impl LockProvider for ThrottlingLockProvider {
    fn acquire(
        &self,
        key: &str,
        _duration: Duration,
        acquire_timeout: Duration,
    ) -> Result<Option<Box<dyn Lock>>, LockError> {
        let started = Instant::now();

        loop {
            let now = Utc::now();
            let bucket_start = floor_to_period(now, self.period);
            let cache_key = format!("lock:throttle:{key}:{}", bucket_start.timestamp());

            // Failed attempts consume a slot too; the count tracks attempts
            // within the period, not successful holds.
            let count = self
                .cache
                .increment(&cache_key, 1, Some(bucket_end(now, self.period)))?;

            if count <= i64::from(self.max_hits) {
                debug!(key, count, "throttled lock acquired");
                return Ok(Some(Box::new(ThrottleLock {
                    key: key.to_string(),
                })));
            }

            if started.elapsed() >= acquire_timeout {
                debug!(key, count, "throttled lock not acquired, hit limit reached");
                return Ok(None);
            }

            thread::sleep(ACQUIRE_RETRY_INTERVAL.min(acquire_timeout.saturating_sub(started.elapsed())));
        }
    }
}

struct ThrottleLock {
    key: String,
}

impl Lock for ThrottleLock {
    fn key(&self) -> &str {
        &self.key
    }

    fn renew(&mut self, _extension: Duration) -> Result<(), LockError> {
        // Nothing to extend: the acquisition count is bucket-scoped.
        Ok(())
    }

    fn release(&mut self) -> Result<(), LockError> {
        Ok(())
    }
}
