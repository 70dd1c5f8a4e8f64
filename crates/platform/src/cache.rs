//! Key/value cache abstraction with TTL and atomic increment.
//!
//! The cache is the only shared mutable counter store in the system; the
//! `increment` operation must be atomic across concurrent callers (the
//! operation itself, not a read-modify-write pair).

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    /// An increment was applied to a non-numeric value.
    #[error("cache value for {key} is not a number")]
    NotANumber { key: String },

    #[error("cache serialization failed: {0}")]
    Serialization(String),

    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Key/value cache with per-entry expiry.
///
/// Values are JSON so the trait stays object-safe; use [`CacheExt`] for typed
/// access.
pub trait Cache: Send + Sync {
    /// Get a value, or `None` when absent or expired.
    fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Set a value unconditionally.
    fn set(
        &self,
        key: &str,
        value: Value,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), CacheError>;

    /// Set a value only if the key is absent (or expired). Returns `true`
    /// when this call created the entry.
    fn add(
        &self,
        key: &str,
        value: Value,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool, CacheError>;

    /// Atomically add `amount` to a numeric entry, initializing it (with the
    /// given expiry) when absent. Returns the resulting value.
    fn increment(
        &self,
        key: &str,
        amount: i64,
        expires_at_if_new: Option<DateTime<Utc>>,
    ) -> Result<i64, CacheError>;

    /// Remove a single entry. Returns `true` when an entry was present.
    fn remove(&self, key: &str) -> Result<bool, CacheError>;

    /// Remove every entry.
    fn remove_all(&self) -> Result<(), CacheError>;
}

/// Typed helpers over [`Cache`].
pub trait CacheExt: Cache {
    fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.get(key)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| CacheError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    fn set_as<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), CacheError> {
        let value =
            serde_json::to_value(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.set(key, value, expires_at)
    }
}

impl<C: Cache + ?Sized> CacheExt for C {}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory cache for tests/dev.
///
/// Expired entries are evicted lazily on access; there is no background
/// sweeper thread.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cache for InMemoryCache {
    fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let entries = self.entries.read().unwrap();
        let now = Utc::now();
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Ok(Some(entry.value.clone())),
            _ => Ok(None),
        }
    }

    fn set(
        &self,
        key: &str,
        value: Value,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), CacheError> {
        let mut entries = self.entries.write().unwrap();
        entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    fn add(
        &self,
        key: &str,
        value: Value,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool, CacheError> {
        let mut entries = self.entries.write().unwrap();
        let now = Utc::now();
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Ok(false),
            _ => {
                entries.insert(key.to_string(), Entry { value, expires_at });
                Ok(true)
            }
        }
    }

    fn increment(
        &self,
        key: &str,
        amount: i64,
        expires_at_if_new: Option<DateTime<Utc>>,
    ) -> Result<i64, CacheError> {
        let mut entries = self.entries.write().unwrap();
        let now = Utc::now();

        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                let current = entry.value.as_i64().ok_or_else(|| CacheError::NotANumber {
                    key: key.to_string(),
                })?;
                let next = current + amount;
                entry.value = Value::from(next);
                Ok(next)
            }
            _ => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::from(amount),
                        expires_at: expires_at_if_new,
                    },
                );
                Ok(amount)
            }
        }
    }

    fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let mut entries = self.entries.write().unwrap();
        Ok(entries.remove(key).is_some())
    }

    fn remove_all(&self) -> Result<(), CacheError> {
        let mut entries = self.entries.write().unwrap();
        entries.clear();
        Ok(())
    }
}
