//! `faultline-platform` — shared coordination primitives.
//!
//! Multiple instances of the system run concurrently with no shared process
//! memory; these abstractions (cache, locks, queues, message bus) are the only
//! coordination mechanisms components may rely on. In-memory implementations
//! are provided for tests/dev; distributed backends plug in behind the same
//! traits (see the `redis` feature).

pub mod bus;
pub mod cache;
pub mod cancellation;
pub mod lock;
pub mod queue;
pub mod time;

#[cfg(feature = "redis")]
pub mod redis_cache;

pub use bus::{BusError, InMemoryMessageBus, MessageBus, Subscription};
pub use cache::{Cache, CacheError, CacheExt, InMemoryCache};
pub use cancellation::CancellationToken;
pub use lock::{CacheLockProvider, Lock, LockError, LockProvider, ThrottlingLockProvider};
pub use queue::{InMemoryQueue, Queue, QueueEntry, QueueError, QueueStats};

#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;
