//! Typed work queue with at-least-once delivery.
//!
//! Delivered entries stay invisible to other consumers until completed,
//! abandoned, or their visibility timeout elapses (auto-abandon). Redelivery
//! and dead-lettering are the queue's own policy; consumers only complete or
//! abandon.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

/// How often a blocked `dequeue` re-checks for work.
const DEQUEUE_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum QueueError {
    /// The entry is not currently in flight (already completed, abandoned,
    /// or reclaimed after its visibility timeout).
    #[error("queue entry {0} is not in flight")]
    NotInFlight(Uuid),

    #[error("queue backend error: {0}")]
    Backend(String),
}

/// A delivered queue entry, owned by the consumer until completed/abandoned.
#[derive(Debug, Clone)]
pub struct QueueEntry<T> {
    pub id: Uuid,
    /// Delivery attempt number, starting at 1.
    pub attempts: u32,
    pub payload: T,
    /// Deadline after which the entry is reclaimed and becomes eligible for
    /// redelivery.
    pub visible_until: Instant,
}

/// Counters and gauges for a queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub queued: usize,
    pub working: usize,
    pub dead_lettered: usize,
    pub enqueued: u64,
    pub completed: u64,
    pub abandoned: u64,
}

/// Typed, at-least-once work-item transport.
pub trait Queue<T>: Send + Sync {
    fn enqueue(&self, payload: T) -> Result<Uuid, QueueError>;

    /// Receive the next entry, waiting up to `timeout`. Returns `None` when
    /// no entry became available in time.
    fn dequeue(&self, timeout: Duration) -> Result<Option<QueueEntry<T>>, QueueError>;

    /// Acknowledge an entry permanently.
    fn complete(&self, entry: &QueueEntry<T>) -> Result<(), QueueError>;

    /// Return an entry for redelivery (subject to the retry limit).
    fn abandon(&self, entry: &QueueEntry<T>) -> Result<(), QueueError>;

    fn stats(&self) -> QueueStats;
}

#[derive(Debug, Clone)]
struct Stored<T> {
    id: Uuid,
    attempts: u32,
    payload: T,
}

#[derive(Debug)]
struct InFlight<T> {
    item: Stored<T>,
    visible_until: Instant,
}

#[derive(Debug)]
struct State<T> {
    ready: VecDeque<Stored<T>>,
    in_flight: HashMap<Uuid, InFlight<T>>,
    dead: Vec<Stored<T>>,
    enqueued: u64,
    completed: u64,
    abandoned: u64,
}

impl<T> Default for State<T> {
    fn default() -> Self {
        Self {
            ready: VecDeque::new(),
            in_flight: HashMap::new(),
            dead: Vec::new(),
            enqueued: 0,
            completed: 0,
            abandoned: 0,
        }
    }
}

/// In-memory queue for tests/dev.
#[derive(Debug)]
pub struct InMemoryQueue<T> {
    state: Mutex<State<T>>,
    visibility_timeout: Duration,
    max_attempts: u32,
}

impl<T> Default for InMemoryQueue<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(State::default()),
            visibility_timeout: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl<T> InMemoryQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Move expired in-flight entries back to the ready list (or dead-letter
    /// them when their attempts are spent).
    fn reclaim(&self, state: &mut State<T>) {
        let now = Instant::now();
        let expired: Vec<Uuid> = state
            .in_flight
            .iter()
            .filter(|(_, f)| f.visible_until <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            if let Some(flight) = state.in_flight.remove(&id) {
                state.abandoned += 1;
                if flight.item.attempts >= self.max_attempts {
                    warn!(entry = %id, attempts = flight.item.attempts, "queue entry dead-lettered after visibility timeout");
                    state.dead.push(flight.item);
                } else {
                    state.ready.push_back(flight.item);
                }
            }
        }
    }
}

impl<T: Clone + Send + 'static> Queue<T> for InMemoryQueue<T> {
    fn enqueue(&self, payload: T) -> Result<Uuid, QueueError> {
        let mut state = self.state.lock().unwrap();
        let id = Uuid::now_v7();
        state.ready.push_back(Stored {
            id,
            attempts: 0,
            payload,
        });
        state.enqueued += 1;
        Ok(id)
    }

    fn dequeue(&self, timeout: Duration) -> Result<Option<QueueEntry<T>>, QueueError> {
        let deadline = Instant::now() + timeout;

        loop {
            {
                let mut state = self.state.lock().unwrap();
                self.reclaim(&mut state);

                if let Some(mut item) = state.ready.pop_front() {
                    item.attempts += 1;
                    let visible_until = Instant::now() + self.visibility_timeout;
                    let entry = QueueEntry {
                        id: item.id,
                        attempts: item.attempts,
                        payload: item.payload.clone(),
                        visible_until,
                    };
                    state.in_flight.insert(item.id, InFlight { item, visible_until });
                    return Ok(Some(entry));
                }
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(DEQUEUE_POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
        }
    }

    fn complete(&self, entry: &QueueEntry<T>) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        match state.in_flight.remove(&entry.id) {
            Some(_) => {
                state.completed += 1;
                Ok(())
            }
            None => Err(QueueError::NotInFlight(entry.id)),
        }
    }

    fn abandon(&self, entry: &QueueEntry<T>) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        match state.in_flight.remove(&entry.id) {
            Some(flight) => {
                state.abandoned += 1;
                if flight.item.attempts >= self.max_attempts {
                    warn!(entry = %entry.id, attempts = flight.item.attempts, "queue entry dead-lettered");
                    state.dead.push(flight.item);
                } else {
                    state.ready.push_back(flight.item);
                }
                Ok(())
            }
            None => Err(QueueError::NotInFlight(entry.id)),
        }
    }

    fn stats(&self) -> QueueStats {
        let state = self.state.lock().unwrap();
        QueueStats {
            queued: state.ready.len(),
            working: state.in_flight.len(),
            dead_lettered: state.dead.len(),
            enqueued: state.enqueued,
            completed: state.completed,
            abandoned: state.abandoned,
        }
    }
}
