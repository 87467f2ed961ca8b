//! Sync bookkeeping models: event timeline, conflicts, status projection

use super::order::LocalOrder;
use crate::protocol::ServerOrder;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Sync Events
// ============================================================================

/// Lifecycle event type recorded in an order's timeline
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncEventType {
    Created,
    SyncAttempted,
    SyncSuccess,
    ConflictDetected,
    ConflictResolved,
}

/// Immutable timeline entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub timestamp: i64,
    pub event_type: SyncEventType,
    pub device_id: String,
    #[serde(default)]
    pub details: Option<String>,
}

/// Bounded per-order timeline (stored in the `sync_logs` partition)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTimeline {
    pub order_id: String,
    pub events: VecDeque<SyncEvent>,
}

impl OrderTimeline {
    pub fn new(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            events: VecDeque::new(),
        }
    }

    /// Append an event, discarding the oldest ones beyond `capacity`
    pub fn push(&mut self, event: SyncEvent, capacity: usize) {
        self.events.push_back(event);
        while self.events.len() > capacity.max(1) {
            self.events.pop_front();
        }
    }

    pub fn contains(&self, event_type: SyncEventType) -> bool {
        self.events.iter().any(|e| e.event_type == event_type)
    }
}

// ============================================================================
// Conflicts
// ============================================================================

/// Conflict resolution strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Server's existing version is authoritative
    FirstWriteWins,
    /// Local version is authoritative and is uploaded as-is
    #[default]
    LastWriteWins,
    /// Neither version applied until an operator decides
    Manual,
}

impl ConflictStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::FirstWriteWins => "first_write_wins",
            ConflictStrategy::LastWriteWins => "last_write_wins",
            ConflictStrategy::Manual => "manual",
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first_write_wins" => Ok(ConflictStrategy::FirstWriteWins),
            "last_write_wins" => Ok(ConflictStrategy::LastWriteWins),
            "manual" => Ok(ConflictStrategy::Manual),
            other => Err(format!("unknown conflict strategy: {other}")),
        }
    }
}

/// Field compared between the local and the server order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictField {
    TotalAmount,
    Status,
    PaymentStatus,
}

impl ConflictField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictField::TotalAmount => "total_amount",
            ConflictField::Status => "status",
            ConflictField::PaymentStatus => "payment_status",
        }
    }
}

/// Operator decision for a manual conflict
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ManualDecision {
    /// Upload the local version
    KeepLocal,
    /// Adopt the server version and drop the local copy
    KeepServer,
}

/// A local order paired with the diverging server snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub order_id: String,
    pub local: LocalOrder,
    pub server: ServerOrder,
    pub conflict_fields: Vec<ConflictField>,
    pub strategy: ConflictStrategy,
    pub resolved: bool,
    #[serde(default)]
    pub resolved_at: Option<i64>,
    pub detected_at: i64,
    #[serde(default)]
    pub decision: Option<ManualDecision>,
}

impl ConflictRecord {
    pub fn field_names(&self) -> Vec<&'static str> {
        self.conflict_fields.iter().map(ConflictField::as_str).collect()
    }

    /// Manual conflict the operator resolved in favor of the local version
    pub fn accepts_local(&self) -> bool {
        self.resolved && self.decision == Some(ManualDecision::KeepLocal)
    }
}

// ============================================================================
// Status projection
// ============================================================================

/// Process-wide sync status as seen by subscribers
///
/// Derived state only: recomputed from the order and conflict partitions,
/// never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub online: bool,
    pub last_sync_at: Option<i64>,
    pub pending_orders: usize,
    pub unresolved_conflicts: usize,
    pub sync_in_progress: bool,
    pub last_conflict_resolution_at: Option<i64>,
}
