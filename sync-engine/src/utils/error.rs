//! Engine error taxonomy
//!
//! Per-order, per-entity and per-record failures are logged and isolated by
//! the components themselves; these errors only reach the caller of an
//! engine operation when that operation as a whole cannot proceed.

use pos_client::ClientError;
use shared::models::OrderError;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Local store inaccessible; fatal for the calling operation only
    #[error("Local store unavailable: {0}")]
    StorageUnavailable(#[from] StoreError),

    /// Network operation attempted while offline
    #[error("Network operation attempted while offline")]
    Offline,

    /// Server answered `success: false`
    #[error("Server rejected order {order_id}: {reason}")]
    UploadRejected { order_id: String, reason: String },

    /// Timeout, connection failure or 5xx
    #[error("Transient network failure: {0}")]
    NetworkTransient(String),

    /// Any other non-success answer from the server
    #[error("Server request failed: {0}")]
    Remote(String),

    /// Manual conflict waiting for an operator decision
    #[error("Order {0} has an unresolved conflict")]
    ConflictUnresolved(String),

    #[error("Order {0} is already synced and cannot be modified")]
    AlreadySynced(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl SyncError {
    pub fn validation(msg: impl Into<String>) -> Self {
        SyncError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        SyncError::NotFound(msg.into())
    }

    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::NetworkTransient(_))
    }
}

impl From<ClientError> for SyncError {
    fn from(e: ClientError) -> Self {
        if e.is_transient() {
            SyncError::NetworkTransient(e.to_string())
        } else {
            SyncError::Remote(e.to_string())
        }
    }
}

impl From<OrderError> for SyncError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::AlreadySynced(id) => SyncError::AlreadySynced(id),
            other => SyncError::Validation(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::StorageUnavailable(StoreError::Serialization(e))
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
