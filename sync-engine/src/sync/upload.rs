//! Upload pipeline
//!
//! One pass over the unsynced index, oldest order first. A failing order
//! never stops the pass: it keeps its place in the index, its
//! `sync_attempts` goes up by one and the next order is tried.
//!
//! # Crash safety
//!
//! An acknowledged order is first rewritten with `synced = true` (which
//! drops it from the unsynced index) and only then deleted. A crash between
//! the two steps leaves a synced leftover that [`UploadPipeline::purge_synced`]
//! removes at the start of the next pass, never a second upload.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use pos_client::SyncApi;
use shared::{LocalOrder, OrderUploadPayload, SyncEventType};

use crate::store::{Index, LocalStore, Partition};
use crate::sync::conflict::{ConflictResolver, Resolution, detect_conflicts};
use crate::sync::SyncEventLog;
use crate::utils::{SyncError, SyncResult};

/// What to do when the existence check itself fails (not a 404)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExistenceCheckPolicy {
    /// Log and upload anyway
    #[default]
    FailOpen,
    /// Count as a failed attempt and keep the order for the next pass
    FailSafe,
}

impl ExistenceCheckPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExistenceCheckPolicy::FailOpen => "fail_open",
            ExistenceCheckPolicy::FailSafe => "fail_safe",
        }
    }
}

impl fmt::Display for ExistenceCheckPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExistenceCheckPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail_open" => Ok(ExistenceCheckPolicy::FailOpen),
            "fail_safe" => Ok(ExistenceCheckPolicy::FailSafe),
            other => Err(format!("unknown existence check policy: {other}")),
        }
    }
}

/// Result of processing one order
#[derive(Debug, Clone, PartialEq)]
pub enum OrderOutcome {
    /// Accepted by the server and removed locally
    Uploaded {
        order_id: String,
        server_order_number: Option<String>,
    },
    /// Server already held an identical copy; removed locally without upload
    AlreadyOnServer { order_id: String },
    /// Conflict resolved in favour of the server copy; removed locally
    AdoptedServer { order_id: String, order: LocalOrder },
    /// Manual conflict pending
    AwaitingOperator { order_id: String },
    /// Draft (`pending` status), not eligible for upload
    SkippedDraft { order_id: String },
    /// Discarded locally while its sync was in flight
    Discarded { order_id: String },
    /// Kept locally for the next pass
    Failed {
        order_id: String,
        error: String,
        transient: bool,
    },
}

impl OrderOutcome {
    pub fn order_id(&self) -> &str {
        match self {
            OrderOutcome::Uploaded { order_id, .. }
            | OrderOutcome::AlreadyOnServer { order_id }
            | OrderOutcome::AdoptedServer { order_id, .. }
            | OrderOutcome::AwaitingOperator { order_id }
            | OrderOutcome::SkippedDraft { order_id }
            | OrderOutcome::Discarded { order_id }
            | OrderOutcome::Failed { order_id, .. } => order_id,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, OrderOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadReport {
    pub outcomes: Vec<OrderOutcome>,
    /// Synced leftovers removed before the pass
    pub purged: usize,
}

impl UploadReport {
    pub fn uploaded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, OrderOutcome::Uploaded { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }

    /// At least one order failed on a transient network error
    pub fn hit_transient(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| matches!(o, OrderOutcome::Failed { transient: true, .. }))
    }

    pub fn outcome(&self, order_id: &str) -> Option<&OrderOutcome> {
        self.outcomes.iter().find(|o| o.order_id() == order_id)
    }
}

#[derive(Clone)]
pub struct UploadPipeline {
    store: LocalStore,
    api: Arc<dyn SyncApi>,
    resolver: ConflictResolver,
    events: SyncEventLog,
    policy: ExistenceCheckPolicy,
}

impl UploadPipeline {
    pub fn new(
        store: LocalStore,
        api: Arc<dyn SyncApi>,
        resolver: ConflictResolver,
        events: SyncEventLog,
        policy: ExistenceCheckPolicy,
    ) -> Self {
        Self {
            store,
            api,
            resolver,
            events,
            policy,
        }
    }

    /// Upload every eligible unsynced order
    ///
    /// Only a storage fault aborts the pass.
    pub async fn run(&self) -> SyncResult<UploadReport> {
        let mut report = UploadReport {
            purged: self.purge_synced()?,
            ..Default::default()
        };

        let mut orders: Vec<LocalOrder> = self.store.get_by_index(Index::UnsyncedOrders)?;
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        tracing::info!(count = orders.len(), "Upload pass started");

        for order in orders {
            let outcome = self.upload_one(order).await?;
            report.outcomes.push(outcome);
        }

        tracing::info!(
            uploaded = report.uploaded(),
            failed = report.failed(),
            purged = report.purged,
            "Upload pass finished"
        );
        Ok(report)
    }

    /// Delete orders left with `synced = true` by an interrupted pass
    pub fn purge_synced(&self) -> SyncResult<usize> {
        let leftovers = self.store.get_all_matching(|o: &LocalOrder| o.synced)?;
        for order in &leftovers {
            self.store.delete(Partition::Orders, &order.id)?;
            tracing::info!(order_id = %order.id, "Purged already-synced order");
        }
        Ok(leftovers.len())
    }

    /// Process a single order
    pub async fn upload_one(&self, order: LocalOrder) -> SyncResult<OrderOutcome> {
        let order_id = order.id.clone();

        if !order.is_finalized() {
            return Ok(OrderOutcome::SkippedDraft { order_id });
        }
        if self.resolver.is_blocked(&order_id)? {
            tracing::debug!(order_id = %order_id, "Skipping order with unresolved conflict");
            return Ok(OrderOutcome::AwaitingOperator { order_id });
        }

        let accepted_locally = self
            .resolver
            .conflict(&order_id)?
            .is_some_and(|c| c.accepts_local());

        if !accepted_locally {
            match self.api.fetch_order(&order_id).await {
                Ok(None) => {}
                Ok(Some(server)) => {
                    if !self.still_pending(&order_id)? {
                        return Ok(self.discarded(order_id));
                    }
                    let fields = detect_conflicts(&order, &server);
                    if fields.is_empty() {
                        tracing::info!(order_id = %order_id, "Server already holds this order");
                        self.finish_synced(order, server.order_number)?;
                        return Ok(OrderOutcome::AlreadyOnServer { order_id });
                    }
                    match self.resolver.resolve(&order, &server, fields)? {
                        Resolution::Upload => {}
                        Resolution::AdoptServer(adopted) => {
                            self.mark_synced_and_remove(&adopted)?;
                            return Ok(OrderOutcome::AdoptedServer {
                                order_id,
                                order: adopted,
                            });
                        }
                        Resolution::AwaitOperator => {
                            return Ok(OrderOutcome::AwaitingOperator { order_id });
                        }
                    }
                }
                Err(e) => match self.policy {
                    ExistenceCheckPolicy::FailOpen => {
                        tracing::warn!(
                            order_id = %order_id,
                            error = %e,
                            "Existence check failed, uploading anyway"
                        );
                    }
                    ExistenceCheckPolicy::FailSafe => {
                        return self.record_failure(order_id, SyncError::from(e));
                    }
                },
            }
            if !self.still_pending(&order_id)? {
                return Ok(self.discarded(order_id));
            }
        }

        self.events
            .record(&order_id, SyncEventType::SyncAttempted, None)?;
        let timeline = self.events.timeline(&order_id)?;
        let payload = OrderUploadPayload::from_order(&order, self.events.device_id(), timeline);

        match self.api.upload_order(&payload).await {
            Ok(response) if response.success => {
                let number = response.order_number.clone();
                self.finish_synced(order, number.clone())?;
                tracing::info!(
                    order_id = %order_id,
                    server_order_number = number.as_deref().unwrap_or("-"),
                    "Order uploaded"
                );
                Ok(OrderOutcome::Uploaded {
                    order_id,
                    server_order_number: number,
                })
            }
            Ok(response) => {
                let error = SyncError::UploadRejected {
                    order_id: order_id.clone(),
                    reason: response.error.unwrap_or_else(|| "unknown".to_string()),
                };
                self.record_failure(order_id, error)
            }
            Err(e) => self.record_failure(order_id, SyncError::from(e)),
        }
    }

    fn finish_synced(&self, order: LocalOrder, server_order_number: Option<String>) -> SyncResult<()> {
        self.mark_synced_and_remove(&order)?;
        self.events
            .record(&order.id, SyncEventType::SyncSuccess, server_order_number)?;
        Ok(())
    }

    fn mark_synced_and_remove(&self, order: &LocalOrder) -> SyncResult<()> {
        let mut synced = order.clone();
        synced.synced = true;
        self.store.upsert_one(&synced)?;
        self.store.delete(Partition::Orders, &synced.id)?;
        Ok(())
    }

    /// Whether the order is still stored and unsynced after a round trip
    fn still_pending(&self, order_id: &str) -> SyncResult<bool> {
        Ok(self
            .store
            .get::<LocalOrder>(order_id)?
            .is_some_and(|o| !o.synced))
    }

    fn discarded(&self, order_id: String) -> OrderOutcome {
        tracing::info!(order_id = %order_id, "Order left the store during its sync, dropping it");
        OrderOutcome::Discarded { order_id }
    }

    /// Bump `sync_attempts` on the stored order
    ///
    /// The stored copy is re-read in the same write transaction: an order
    /// discarded while the request was in flight stays gone.
    fn record_failure(&self, order_id: String, error: SyncError) -> SyncResult<OrderOutcome> {
        if let SyncError::StorageUnavailable(_) = error {
            return Err(error);
        }
        let bumped = self.store.update(&order_id, |o: &mut LocalOrder| {
            if o.synced {
                return false;
            }
            o.sync_attempts += 1;
            true
        })?;
        let Some(order) = bumped else {
            return Ok(self.discarded(order_id));
        };

        tracing::warn!(
            order_id = %order_id,
            attempts = order.sync_attempts,
            error = %error,
            "Order upload failed"
        );
        Ok(OrderOutcome::Failed {
            order_id,
            error: error.to_string(),
            transient: error.is_transient(),
        })
    }
}
