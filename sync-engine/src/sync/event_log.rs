//! Per-order sync event timeline
//!
//! Append-only, bounded to the configured capacity (oldest dropped first).
//! Timelines outlive the order itself so the history of an uploaded order
//! can still be inspected, until [`SyncEventLog::prune_settled`] drops them
//! after the retention window.

use std::sync::Arc;

use shared::{OrderTimeline, SyncEvent, SyncEventType};

use crate::store::{LocalStore, Partition};
use crate::utils::{Clock, SyncResult};

pub const DEFAULT_LOG_CAPACITY: usize = 100;

#[derive(Clone)]
pub struct SyncEventLog {
    store: LocalStore,
    clock: Arc<dyn Clock>,
    device_id: String,
    capacity: usize,
}

impl SyncEventLog {
    pub fn new(
        store: LocalStore,
        clock: Arc<dyn Clock>,
        device_id: impl Into<String>,
        capacity: usize,
    ) -> Self {
        Self {
            store,
            clock,
            device_id: device_id.into(),
            capacity: capacity.max(1),
        }
    }

    /// Append an event to the order's timeline
    pub fn record(
        &self,
        order_id: &str,
        event_type: SyncEventType,
        details: Option<String>,
    ) -> SyncResult<SyncEvent> {
        let event = SyncEvent {
            timestamp: self.clock.now_millis(),
            event_type,
            device_id: self.device_id.clone(),
            details,
        };

        let mut timeline = self
            .store
            .get::<OrderTimeline>(order_id)?
            .unwrap_or_else(|| OrderTimeline::new(order_id));
        timeline.push(event.clone(), self.capacity);
        self.store.upsert_one(&timeline)?;

        tracing::debug!(order_id, event = ?event_type, "Sync event recorded");
        Ok(event)
    }

    /// Events of one order, oldest first
    pub fn timeline(&self, order_id: &str) -> SyncResult<Vec<SyncEvent>> {
        Ok(self
            .store
            .get::<OrderTimeline>(order_id)?
            .map(|t| t.events.into_iter().collect())
            .unwrap_or_default())
    }

    pub fn has_event(&self, order_id: &str, event_type: SyncEventType) -> SyncResult<bool> {
        Ok(self
            .store
            .get::<OrderTimeline>(order_id)?
            .is_some_and(|t| t.contains(event_type)))
    }

    /// Drop the timeline of an order that will never be uploaded
    pub fn forget(&self, order_id: &str) -> SyncResult<()> {
        self.store.delete(Partition::SyncLogs, order_id)?;
        Ok(())
    }

    /// Drop timelines idle since before `cutoff` whose order has left the store
    pub fn prune_settled(&self, cutoff: i64) -> SyncResult<usize> {
        let idle = self.store.get_all_matching(|t: &OrderTimeline| {
            t.events.back().is_none_or(|e| e.timestamp < cutoff)
        })?;
        let mut pruned = 0;
        for timeline in idle {
            if self.store.contains(Partition::Orders, &timeline.order_id)? {
                continue;
            }
            self.forget(&timeline.order_id)?;
            pruned += 1;
        }
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned settled sync timelines");
        }
        Ok(pruned)
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}
