//! Redis-backed cache (values stored as JSON strings).
//!
//! Gives the lock providers and throttle counters a distributed backend with
//! the same semantics as the in-memory cache: TTL expiry, set-if-absent, and
//! atomic increments.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use redis::Commands;
use serde_json::Value;

use crate::cache::{Cache, CacheError};

#[derive(Debug, Clone)]
pub struct RedisCache {
    client: Arc<redis::Client>,
}

impl RedisCache {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    pub fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(backend)?;
        Ok(Self::new(client))
    }

    fn connection(&self) -> Result<redis::Connection, CacheError> {
        self.client.get_connection().map_err(backend)
    }
}

fn backend(e: redis::RedisError) -> CacheError {
    CacheError::Backend(e.to_string())
}

fn ttl_seconds(expires_at: DateTime<Utc>) -> i64 {
    (expires_at - Utc::now()).num_seconds().max(1)
}

fn encode(value: &Value) -> Result<String, CacheError> {
    serde_json::to_string(value).map_err(|e| CacheError::Serialization(e.to_string()))
}

impl Cache for RedisCache {
    fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut con = self.connection()?;
        let raw: Option<String> = con.get(key).map_err(backend)?;
        match raw {
            Some(s) => serde_json::from_str(&s)
                .map(Some)
                .map_err(|e| CacheError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    fn set(
        &self,
        key: &str,
        value: Value,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), CacheError> {
        let mut con = self.connection()?;
        let payload = encode(&value)?;
        match expires_at {
            Some(at) => con
                .set_ex::<_, _, ()>(key, payload, ttl_seconds(at) as u64)
                .map_err(backend),
            None => con.set::<_, _, ()>(key, payload).map_err(backend),
        }
    }

    fn add(
        &self,
        key: &str,
        value: Value,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool, CacheError> {
        let mut con = self.connection()?;
        let payload = encode(&value)?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(payload).arg("NX");
        if let Some(at) = expires_at {
            cmd.arg("EX").arg(ttl_seconds(at));
        }

        let reply: Option<String> = cmd.query(&mut con).map_err(backend)?;
        Ok(reply.is_some())
    }

    fn increment(
        &self,
        key: &str,
        amount: i64,
        expires_at_if_new: Option<DateTime<Utc>>,
    ) -> Result<i64, CacheError> {
        let mut con = self.connection()?;
        let result: i64 = con.incr(key, amount).map_err(backend)?;

        // First write for this key: attach the TTL.
        if result == amount {
            if let Some(at) = expires_at_if_new {
                let _: bool = con.expire(key, ttl_seconds(at)).map_err(backend)?;
            }
        }

        Ok(result)
    }

    fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let mut con = self.connection()?;
        let removed: i64 = con.del(key).map_err(backend)?;
        Ok(removed > 0)
    }

    fn remove_all(&self) -> Result<(), CacheError> {
        let mut con = self.connection()?;
        redis::cmd("FLUSHDB").query::<()>(&mut con).map_err(backend)
    }
}
