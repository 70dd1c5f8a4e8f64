//! The prioritized event-processing pipeline.
//!
//! An ordered chain of plugins invoked over each batch of newly-ingested
//! events before persistence. Plugins may flag events (hidden/discarded) but
//! never remove entries from the batch; later plugins see the mutations of
//! earlier ones.

pub mod throttle_bots;

use std::sync::Arc;

use tracing::error;

use faultline_core::models::{Project, TelemetryEvent};

pub use throttle_bots::ThrottleBotsPlugin;

/// Per-event state shared by all pipeline stages of one ingestion call.
#[derive(Debug, Clone)]
pub struct EventContext {
    event: TelemetryEvent,
    project: Project,
    is_hidden: bool,
    is_discarded: bool,
}

impl EventContext {
    pub fn new(event: TelemetryEvent, project: Project) -> Self {
        Self {
            event,
            project,
            is_hidden: false,
            is_discarded: false,
        }
    }

    pub fn event(&self) -> &TelemetryEvent {
        &self.event
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Exclude the event from normal visibility and alerting.
    pub fn mark_hidden(&mut self) {
        self.is_hidden = true;
    }

    pub fn is_hidden(&self) -> bool {
        self.is_hidden
    }

    /// Drop the event entirely: it will not be persisted.
    pub fn discard(&mut self) {
        self.is_discarded = true;
    }

    pub fn is_discarded(&self) -> bool {
        self.is_discarded
    }

    /// Consume the context, yielding the event to persist with the plugin
    /// flags applied, or `None` when the event was discarded.
    pub fn into_event(self) -> Option<TelemetryEvent> {
        if self.is_discarded {
            return None;
        }
        let mut event = self.event;
        event.is_hidden = event.is_hidden || self.is_hidden;
        Some(event)
    }
}

/// One pipeline stage.
pub trait EventPipelinePlugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lower priorities run earlier.
    fn priority(&self) -> i32;

    /// Process a whole batch. Implementations must not assume a single-event
    /// batch.
    fn process_batch(&self, batch: &mut [EventContext]) -> anyhow::Result<()>;
}

/// Runs plugins over event batches in ascending priority order.
pub struct EventPipeline {
    plugins: Vec<Arc<dyn EventPipelinePlugin>>,
}

impl EventPipeline {
    pub fn new(mut plugins: Vec<Arc<dyn EventPipelinePlugin>>) -> Self {
        plugins.sort_by_key(|p| p.priority());
        Self { plugins }
    }

    /// Run every plugin over the batch, sequentially. A plugin failure is
    /// logged and does not stop the remaining plugins; the batch must still
    /// reach persistence even when one check errors.
    pub fn run(&self, batch: &mut [EventContext]) {
        for plugin in &self.plugins {
            if let Err(e) = plugin.process_batch(batch) {
                error!(plugin = plugin.name(), error = ?e, "event pipeline plugin failed");
            }
        }
    }
}
