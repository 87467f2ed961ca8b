//! Order synchronization
//!
//! - **orchestrator**: connectivity transitions, retry, status ownership
//! - **upload**: per-order upload pass over the unsynced index
//! - **conflict**: local/server divergence detection and strategies
//! - **event_log**: bounded per-order sync timeline
//! - **status**: observer registry for status and restore callbacks
//! - **monitor**: periodic health probe driving connectivity

pub mod conflict;
pub mod event_log;
pub mod monitor;
pub mod orchestrator;
pub mod status;
pub mod upload;

pub use conflict::{ConflictResolver, Resolution, adopt_server, detect_conflicts};
pub use event_log::SyncEventLog;
pub use monitor::ConnectivityMonitor;
pub use orchestrator::{CycleOutcome, CycleReport, RetryPolicy, SyncOrchestrator, SyncSettings};
pub use status::{ObserverRegistry, StatusHub, SubscriptionId};
pub use upload::{ExistenceCheckPolicy, OrderOutcome, UploadPipeline, UploadReport};
