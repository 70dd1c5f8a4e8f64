//! Bot traffic throttle (pipeline stage, runs first).
//!
//! Caps event volume accepted from a single source IP within a fixed time
//! bucket. On breach the triggering events are hidden immediately and one
//! deferred cleanup work item per (IP, bucket) is enqueued so previously
//! accepted events from the same source get purged retroactively.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;

use faultline_core::{AppConfig, AppMode};
use faultline_platform::time::{bucket_end, floor_to_period};
use faultline_platform::{Cache, Queue};

use crate::work::{CleanupBotEventsWorkItem, WorkItem};

use super::{EventContext, EventPipelinePlugin};

const THROTTLING_PERIOD: Duration = Duration::from_secs(5 * 60);

pub struct ThrottleBotsPlugin {
    config: Arc<AppConfig>,
    cache: Arc<dyn Cache>,
    work_items: Arc<dyn Queue<WorkItem>>,
    period: Duration,
}

impl ThrottleBotsPlugin {
    pub fn new(
        config: Arc<AppConfig>,
        cache: Arc<dyn Cache>,
        work_items: Arc<dyn Queue<WorkItem>>,
    ) -> Self {
        Self {
            config,
            cache,
            work_items,
            period: THROTTLING_PERIOD,
        }
    }
}

impl EventPipelinePlugin for ThrottleBotsPlugin {
    fn name(&self) -> &'static str {
        "throttle_bots"
    }

    fn priority(&self) -> i32 {
        0
    }

    fn process_batch(&self, batch: &mut [EventContext]) -> anyhow::Result<()> {
        if self.config.mode == AppMode::Development {
            return Ok(());
        }

        let Some(first) = batch.first() else {
            return Ok(());
        };
        if !first.project().delete_bot_data_enabled {
            return Ok(());
        }
        let organization_id = first.event().organization_id;

        // Group batch positions by client IP, first-seen order. Events
        // without an IP are exempt from throttling.
        let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
        for (i, context) in batch.iter().enumerate() {
            let Some(ip) = context.event().client_ip_address.clone() else {
                continue;
            };
            match groups.iter_mut().find(|(key, _)| *key == ip) {
                Some((_, indexes)) => indexes.push(i),
                None => groups.push((ip, vec![i])),
            }
        }

        for (ip, indexes) in groups {
            // A private/reserved source ends the entire invocation, not just
            // this group.
            if is_private_network(&ip) {
                return Ok(());
            }

            let now = Utc::now();
            let window_start = floor_to_period(now, self.period);
            let window_end = bucket_end(now, self.period);

            let counter_key = format!("bot:{ip}:{}", window_start.timestamp());
            let count =
                self.cache
                    .increment(&counter_key, indexes.len() as i64, Some(window_end))?;

            if count < i64::from(self.config.bot_throttle_limit) {
                continue;
            }

            info!(
                ip = %ip,
                organization = %organization_id,
                count,
                window_start = %window_start,
                "bot throttle triggered"
            );

            // One cleanup item per (IP, window), no matter how many times the
            // threshold is crossed within it.
            let marker_key = format!("bot:clean:{ip}:{}", window_start.timestamp());
            if self.cache.increment(&marker_key, 1, Some(window_end))? == 1 {
                let work_item = WorkItem::new(&CleanupBotEventsWorkItem {
                    organization_id,
                    client_ip_address: ip.clone(),
                    window_start,
                    window_end,
                })?;
                self.work_items.enqueue(work_item)?;
            }

            for i in &indexes {
                batch[*i].mark_hidden();
            }
        }

        Ok(())
    }
}

/// Private, loopback, link-local, and unique-local sources are exempt from
/// throttling. Unparsable addresses are treated as public.
fn is_private_network(ip: &str) -> bool {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()
        }
        Ok(IpAddr::V6(v6)) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
        Err(_) => false,
    }
}
