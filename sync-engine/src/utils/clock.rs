//! Time source for the engine
//!
//! Retry delays and timestamps go through [`Clock`] so tests can drive
//! elapsed time without real sleeps.

use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Clock: Send + Sync {
    /// Current UTC time in Unix millis
    fn now_millis(&self) -> i64;

    async fn sleep(&self, duration: Duration);
}

/// Wall clock + tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        shared::util::now_millis()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
