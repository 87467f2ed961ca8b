//! 工具模块 - 错误类型、日志、时钟

pub mod clock;
pub mod error;
pub mod logger;

pub use clock::{Clock, SystemClock};
pub use error::{SyncError, SyncResult};
