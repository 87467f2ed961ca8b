//! Shared types for the POS sync workspace
//!
//! Data model mirrored on the checkout terminal, the wire protocol spoken
//! with the backend transaction server, and small money/time utilities used
//! by both `pos-client` and `sync-engine`.

pub mod models;
pub mod money;
pub mod protocol;
pub mod util;

// Re-exports
pub use models::{
    ConflictField, ConflictRecord, ConflictStrategy, LocalCustomer, LocalOrder, LocalOrderItem,
    LocalProduct, ManualDecision, OrderStatus, OrderTimeline, PaymentStatus, SettingRecord,
    StoreSettings, SyncEvent, SyncEventType, SyncStatus,
};
pub use protocol::{OrderUploadPayload, ServerOrder, UploadItem, UploadResponse};
pub use serde::{Deserialize, Serialize};
