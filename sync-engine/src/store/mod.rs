//! Local durable store
//!
//! Partitioned key/value record store on the terminal. It is the single
//! source of truth while offline.

mod partition;
mod storage;

pub use partition::{Index, Partition, Record};
pub use storage::{BatchReport, LocalStore, StoreError, StoreResult};
