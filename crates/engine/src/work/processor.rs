//! The work item queue processor.
//!
//! Dequeues items, resolves the handler for the payload kind, acquires the
//! handler's lock, and invokes the handler with a cancellable,
//! progress-reporting context. Items are completed on success and abandoned
//! on any failure; redelivery and retry policy belong to the queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use faultline_platform::{CancellationToken, MessageBus, Queue, QueueEntry};

use super::handler::WorkItemHandler;
use super::item::{WorkItem, WorkItemContext, WorkItemStatus};

/// How long one receive call waits before re-checking for shutdown.
const RECEIVE_TIMEOUT: Duration = Duration::from_millis(250);

/// Why an item was abandoned instead of completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    /// No handler registered for the payload kind (configuration error, not
    /// transient).
    HandlerNotFound,
    /// The guard lock is held elsewhere; the work is presumed in flight.
    LockUnavailable,
    /// Lock acquisition itself failed.
    LockFailed,
    /// The handler returned an error.
    HandlerFailed,
}

/// Outcome of handling one delivered item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed,
    Abandoned(AbandonReason),
}

/// Dispatches queued work items to registered handlers.
pub struct WorkItemProcessor {
    queue: Arc<dyn Queue<WorkItem>>,
    status_bus: Arc<dyn MessageBus<WorkItemStatus>>,
    handlers: HashMap<String, Arc<dyn WorkItemHandler>>,
}

impl WorkItemProcessor {
    pub fn new(
        queue: Arc<dyn Queue<WorkItem>>,
        status_bus: Arc<dyn MessageBus<WorkItemStatus>>,
    ) -> Self {
        Self {
            queue,
            status_bus,
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for its declared kind. The last registration for a
    /// kind wins.
    pub fn register(&mut self, handler: Arc<dyn WorkItemHandler>) {
        self.handlers.insert(handler.kind().to_string(), handler);
    }

    /// Handle one delivered entry through its registered handler.
    pub fn process_one(
        &self,
        entry: QueueEntry<WorkItem>,
        shutdown: &CancellationToken,
    ) -> ProcessOutcome {
        let item = entry.payload.clone();

        let Some(handler) = self.handlers.get(&item.kind) else {
            warn!(kind = %item.kind, work_item = %item.id, "no handler registered for work item");
            self.abandon(&entry);
            return ProcessOutcome::Abandoned(AbandonReason::HandlerNotFound);
        };

        // The lock is mandatory: a missing acquisition must prevent handling
        // so at most one handler runs per discriminator across processes.
        let lock = match handler.acquire_lock(&item) {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                debug!(kind = %item.kind, work_item = %item.id, "work item lock unavailable, abandoning");
                self.abandon(&entry);
                return ProcessOutcome::Abandoned(AbandonReason::LockUnavailable);
            }
            Err(e) => {
                error!(kind = %item.kind, work_item = %item.id, error = ?e, "work item lock acquisition failed");
                self.abandon(&entry);
                return ProcessOutcome::Abandoned(AbandonReason::LockFailed);
            }
        };
        let _lock = lock;

        let cancellation = shutdown.child().with_deadline(entry.visible_until);
        let context = WorkItemContext::new(item.clone(), cancellation, self.status_bus.clone());

        match handler.handle(&context) {
            Ok(()) => {
                if let Err(e) = self.queue.complete(&entry) {
                    warn!(work_item = %item.id, error = ?e, "failed to complete queue entry");
                }
                debug!(kind = %item.kind, work_item = %item.id, "work item completed");
                ProcessOutcome::Completed
            }
            Err(e) => {
                error!(kind = %item.kind, work_item = %item.id, error = ?e, "work item handler failed");
                self.abandon(&entry);
                ProcessOutcome::Abandoned(AbandonReason::HandlerFailed)
            }
        }
    }

    /// Receive loop: runs until the shutdown token is cancelled.
    pub fn run(&self, shutdown: &CancellationToken) {
        info!("work item processor started");

        while !shutdown.is_cancelled() {
            match self.queue.dequeue(RECEIVE_TIMEOUT) {
                Ok(Some(entry)) => {
                    self.process_one(entry, shutdown);
                }
                Ok(None) => continue,
                Err(e) => {
                    error!(error = ?e, "failed to receive from work item queue");
                    thread::sleep(RECEIVE_TIMEOUT);
                }
            }
        }

        info!("work item processor stopped");
    }

    /// Run the receive loop on a named background thread.
    pub fn spawn(self) -> ProcessorHandle {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        let join = thread::Builder::new()
            .name("work-item-processor".to_string())
            .spawn(move || self.run(&token))
            .expect("failed to spawn work item processor thread");

        ProcessorHandle {
            shutdown,
            join: Some(join),
        }
    }

    fn abandon(&self, entry: &QueueEntry<WorkItem>) {
        if let Err(e) = self.queue.abandon(entry) {
            warn!(work_item = %entry.payload.id, error = ?e, "failed to abandon queue entry");
        }
    }
}

/// Handle to control a running processor.
pub struct ProcessorHandle {
    shutdown: CancellationToken,
    join: Option<thread::JoinHandle<()>>,
}

impl ProcessorHandle {
    /// Request graceful shutdown and wait for the loop to stop.
    pub fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use serde::{Deserialize, Serialize};

    use faultline_platform::{
        CacheLockProvider, InMemoryCache, InMemoryMessageBus, InMemoryQueue, Lock, LockError,
        LockProvider,
    };

    use crate::work::item::WorkItemPayload;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct TestPayload {
        value: u32,
    }

    impl WorkItemPayload for TestPayload {
        const KIND: &'static str = "test";
    }

    struct SucceedingHandler;

    impl WorkItemHandler for SucceedingHandler {
        fn kind(&self) -> &'static str {
            TestPayload::KIND
        }

        fn handle(&self, context: &WorkItemContext) -> anyhow::Result<()> {
            let payload: TestPayload = context.payload()?;
            context.report_progress(100, &format!("done with {}", payload.value));
            Ok(())
        }
    }

    struct FailingHandler;

    impl WorkItemHandler for FailingHandler {
        fn kind(&self) -> &'static str {
            TestPayload::KIND
        }

        fn handle(&self, _context: &WorkItemContext) -> anyhow::Result<()> {
            Err(anyhow!("boom"))
        }
    }

    struct LockedHandler {
        locks: CacheLockProvider,
    }

    impl WorkItemHandler for LockedHandler {
        fn kind(&self) -> &'static str {
            TestPayload::KIND
        }

        fn acquire_lock(&self, _item: &WorkItem) -> Result<Option<Box<dyn Lock>>, LockError> {
            self.locks
                .acquire("test-handler", Duration::from_secs(30), Duration::ZERO)
        }

        fn handle(&self, _context: &WorkItemContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn setup() -> (
        Arc<InMemoryQueue<WorkItem>>,
        Arc<InMemoryMessageBus<WorkItemStatus>>,
        WorkItemProcessor,
    ) {
        let queue = Arc::new(InMemoryQueue::new());
        let bus = Arc::new(InMemoryMessageBus::new());
        let processor = WorkItemProcessor::new(queue.clone(), bus.clone());
        (queue, bus, processor)
    }

    fn enqueue_and_dequeue(queue: &InMemoryQueue<WorkItem>) -> QueueEntry<WorkItem> {
        let item = WorkItem::new(&TestPayload { value: 7 }).unwrap();
        queue.enqueue(item).unwrap();
        queue.dequeue(Duration::from_millis(100)).unwrap().unwrap()
    }

    #[test]
    fn successful_handling_completes_the_entry() {
        let (queue, bus, mut processor) = setup();
        processor.register(Arc::new(SucceedingHandler));
        let sub = bus.subscribe();

        let entry = enqueue_and_dequeue(&queue);
        let outcome = processor.process_one(entry, &CancellationToken::new());

        assert_eq!(outcome, ProcessOutcome::Completed);
        assert_eq!(queue.stats().completed, 1);
        assert_eq!(queue.stats().queued, 0);

        let statuses = sub.drain();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].progress, 100);
    }

    #[test]
    fn unregistered_kind_is_abandoned() {
        let (queue, _bus, processor) = setup();

        let entry = enqueue_and_dequeue(&queue);
        let outcome = processor.process_one(entry, &CancellationToken::new());

        assert_eq!(
            outcome,
            ProcessOutcome::Abandoned(AbandonReason::HandlerNotFound)
        );
        // The item went back to the queue for later redelivery.
        assert_eq!(queue.stats().queued, 1);
    }

    #[test]
    fn handler_failure_abandons_and_redelivers() {
        let (queue, _bus, mut processor) = setup();
        processor.register(Arc::new(FailingHandler));

        let entry = enqueue_and_dequeue(&queue);
        let outcome = processor.process_one(entry, &CancellationToken::new());

        assert_eq!(
            outcome,
            ProcessOutcome::Abandoned(AbandonReason::HandlerFailed)
        );

        let redelivered = queue.dequeue(Duration::from_millis(100)).unwrap().unwrap();
        assert_eq!(redelivered.attempts, 2);
    }

    #[test]
    fn held_lock_prevents_handling() {
        let (queue, _bus, mut processor) = setup();
        let cache: Arc<InMemoryCache> = Arc::new(InMemoryCache::new());
        let locks = CacheLockProvider::new(cache.clone());
        processor.register(Arc::new(LockedHandler {
            locks: locks.clone(),
        }));

        // Another process already holds the handler's lock.
        let _held = locks
            .acquire("test-handler", Duration::from_secs(30), Duration::ZERO)
            .unwrap()
            .unwrap();

        let entry = enqueue_and_dequeue(&queue);
        let outcome = processor.process_one(entry, &CancellationToken::new());

        assert_eq!(
            outcome,
            ProcessOutcome::Abandoned(AbandonReason::LockUnavailable)
        );
    }

    #[test]
    fn lock_is_released_after_handling() {
        let (queue, _bus, mut processor) = setup();
        let cache: Arc<InMemoryCache> = Arc::new(InMemoryCache::new());
        let locks = CacheLockProvider::new(cache.clone());
        processor.register(Arc::new(LockedHandler {
            locks: locks.clone(),
        }));

        let entry = enqueue_and_dequeue(&queue);
        assert_eq!(
            processor.process_one(entry, &CancellationToken::new()),
            ProcessOutcome::Completed
        );

        // The guard was dropped with the handling attempt.
        assert!(
            locks
                .acquire("test-handler", Duration::from_secs(30), Duration::ZERO)
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn spawned_processor_drains_the_queue_and_shuts_down() {
        let (queue, _bus, mut processor) = setup();
        processor.register(Arc::new(SucceedingHandler));

        for value in 0..3 {
            queue
                .enqueue(WorkItem::new(&TestPayload { value }).unwrap())
                .unwrap();
        }

        let handle = processor.spawn();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while queue.stats().completed < 3 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        handle.shutdown();

        assert_eq!(queue.stats().completed, 3);
        assert_eq!(queue.stats().queued, 0);
    }
}
