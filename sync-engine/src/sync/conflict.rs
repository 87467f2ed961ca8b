//! Conflict detection and resolution
//!
//! A conflict exists when the server already holds an order with the same
//! offline id and at least one of `total_amount`, `status` or
//! `payment_status` differs from the local copy.
//!
//! | Strategy | Local copy | Upload | Record |
//! |----------|-----------|--------|--------|
//! | first_write_wins | replaced by server values, then dropped | no | resolved |
//! | last_write_wins | kept | yes | resolved |
//! | manual | kept | no, until an operator decides | unresolved |

use std::sync::Arc;

use serde_json::Value;
use shared::models::LAST_CONFLICT_RESOLUTION_KEY;
use shared::money::amounts_equal;
use shared::{
    ConflictField, ConflictRecord, ConflictStrategy, LocalOrder, ManualDecision, ServerOrder,
    SettingRecord, SyncEventType,
};

use crate::store::{LocalStore, Partition};
use crate::sync::SyncEventLog;
use crate::utils::{Clock, SyncError, SyncResult};

/// Fields that differ between the local and the server copy, in fixed order
pub fn detect_conflicts(local: &LocalOrder, server: &ServerOrder) -> Vec<ConflictField> {
    let mut fields = Vec::new();
    if !amounts_equal(local.total_amount, server.total_amount) {
        fields.push(ConflictField::TotalAmount);
    }
    if local.status.as_str() != server.status {
        fields.push(ConflictField::Status);
    }
    if local.payment_status.as_str() != server.payment_status {
        fields.push(ConflictField::PaymentStatus);
    }
    fields
}

/// Copy the server's values into the local order
///
/// Unknown status strings keep the local value.
pub fn adopt_server(local: &LocalOrder, server: &ServerOrder) -> LocalOrder {
    let mut adopted = local.clone();
    adopted.subtotal = server.subtotal;
    adopted.tax_amount = server.tax_amount;
    adopted.discount_amount = server.discount_amount;
    adopted.total_amount = server.total_amount;
    if server.customer_id.is_some() {
        adopted.customer_id = server.customer_id;
    }
    match server.status.parse() {
        Ok(status) => adopted.status = status,
        Err(e) => tracing::warn!(order_id = %local.id, error = %e, "Keeping local status"),
    }
    match server.payment_status.parse() {
        Ok(status) => adopted.payment_status = status,
        Err(e) => tracing::warn!(order_id = %local.id, error = %e, "Keeping local payment status"),
    }
    if let Some(number) = &server.order_number {
        adopted.order_number = number.clone();
    }
    adopted.version = local.version.max(1) + 1;
    adopted
}

/// What the upload pipeline should do with the order after resolution
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Upload the local copy
    Upload,
    /// Server copy wins; the adopted order must not be uploaded
    AdoptServer(LocalOrder),
    /// Waiting for an operator decision
    AwaitOperator,
}

#[derive(Clone)]
pub struct ConflictResolver {
    store: LocalStore,
    events: SyncEventLog,
    clock: Arc<dyn Clock>,
    strategy: ConflictStrategy,
}

impl ConflictResolver {
    pub fn new(
        store: LocalStore,
        events: SyncEventLog,
        clock: Arc<dyn Clock>,
        strategy: ConflictStrategy,
    ) -> Self {
        Self {
            store,
            events,
            clock,
            strategy,
        }
    }

    pub fn strategy(&self) -> ConflictStrategy {
        self.strategy
    }

    /// Apply the configured strategy to a detected conflict
    pub fn resolve(
        &self,
        local: &LocalOrder,
        server: &ServerOrder,
        fields: Vec<ConflictField>,
    ) -> SyncResult<Resolution> {
        let now = self.clock.now_millis();
        let mut record = ConflictRecord {
            order_id: local.id.clone(),
            local: local.clone(),
            server: server.clone(),
            conflict_fields: fields,
            strategy: self.strategy,
            resolved: false,
            resolved_at: None,
            detected_at: now,
            decision: None,
        };
        let field_list = record.field_names().join(",");

        tracing::warn!(
            order_id = %local.id,
            fields = %field_list,
            strategy = %self.strategy,
            "Order conflicts with server copy"
        );
        self.events.record(
            &local.id,
            SyncEventType::ConflictDetected,
            Some(field_list.clone()),
        )?;

        let resolution = match self.strategy {
            ConflictStrategy::FirstWriteWins => {
                record.resolved = true;
                record.resolved_at = Some(now);
                Resolution::AdoptServer(adopt_server(local, server))
            }
            ConflictStrategy::LastWriteWins => {
                record.resolved = true;
                record.resolved_at = Some(now);
                Resolution::Upload
            }
            ConflictStrategy::Manual => Resolution::AwaitOperator,
        };

        self.store.upsert_one(&record)?;
        if record.resolved {
            self.stamp_resolution(now)?;
            self.events.record(
                &local.id,
                SyncEventType::ConflictResolved,
                Some(self.strategy.to_string()),
            )?;
        }
        Ok(resolution)
    }

    /// Operator decision on a manual conflict
    ///
    /// `KeepLocal` marks the record resolved; the order uploads on the next
    /// pass without another existence check. `KeepServer` adopts the server
    /// copy and removes the local order.
    pub fn resolve_manual(&self, order_id: &str, decision: ManualDecision) -> SyncResult<()> {
        let mut record = self
            .store
            .get::<ConflictRecord>(order_id)?
            .ok_or_else(|| SyncError::not_found(format!("conflict for order {order_id}")))?;
        if record.resolved {
            return Err(SyncError::validation(format!(
                "conflict for order {order_id} is already resolved"
            )));
        }

        let now = self.clock.now_millis();
        record.resolved = true;
        record.resolved_at = Some(now);
        record.decision = Some(decision);

        if decision == ManualDecision::KeepServer {
            if let Some(local) = self.store.get::<LocalOrder>(order_id)? {
                let mut adopted = adopt_server(&local, &record.server);
                adopted.synced = true;
                self.store.upsert_one(&adopted)?;
                self.store.delete(Partition::Orders, order_id)?;
            }
        }

        self.store.upsert_one(&record)?;
        self.stamp_resolution(now)?;
        self.events.record(
            order_id,
            SyncEventType::ConflictResolved,
            Some(format!("manual:{decision:?}")),
        )?;
        tracing::info!(order_id, ?decision, "Manual conflict resolved");
        Ok(())
    }

    fn stamp_resolution(&self, at: i64) -> SyncResult<()> {
        self.store.upsert_one(&SettingRecord {
            key: LAST_CONFLICT_RESOLUTION_KEY.to_string(),
            value: Value::from(at),
            updated_at: at,
        })?;
        Ok(())
    }

    /// Time of the latest resolution, kept apart from the records so it
    /// survives their pruning
    pub fn last_resolution_at(&self) -> SyncResult<Option<i64>> {
        Ok(self
            .store
            .get::<SettingRecord>(LAST_CONFLICT_RESOLUTION_KEY)?
            .and_then(|r| r.value.as_i64()))
    }

    /// Delete resolved records resolved before `cutoff` whose order has
    /// left the store
    pub fn prune_settled(&self, cutoff: i64) -> SyncResult<usize> {
        let settled = self.store.get_all_matching(|c: &ConflictRecord| {
            c.resolved && c.resolved_at.is_some_and(|at| at < cutoff)
        })?;
        let mut pruned = 0;
        for record in settled {
            if self.store.contains(Partition::Orders, &record.order_id)? {
                continue;
            }
            self.store.delete(Partition::Conflicts, &record.order_id)?;
            pruned += 1;
        }
        Ok(pruned)
    }

    pub fn conflict(&self, order_id: &str) -> SyncResult<Option<ConflictRecord>> {
        Ok(self.store.get(order_id)?)
    }

    /// Whether the order is blocked on an operator decision
    pub fn is_blocked(&self, order_id: &str) -> SyncResult<bool> {
        Ok(self
            .conflict(order_id)?
            .is_some_and(|c| !c.resolved && c.strategy == ConflictStrategy::Manual))
    }
}
