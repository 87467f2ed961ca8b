//! 后台任务注册表
//!
//! 二进制里所有常驻任务 (目前是联网探测) 都经由这里启动：
//! panic 会被捕获并记录，关闭时统一取消并等待结束。

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Entry {
    name: &'static str,
    handle: JoinHandle<()>,
}

/// 常驻任务集合 + 共享的取消令牌
///
/// ```ignore
/// let mut tasks = BackgroundTasks::new();
/// tasks.spawn("connectivity_monitor", monitor.run(tasks.shutdown_token()));
/// // ... 定期 tasks.stopped() 检查
/// tasks.shutdown().await;
/// ```
pub struct BackgroundTasks {
    entries: Vec<Entry>,
    shutdown: CancellationToken,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// 任务内部用来监听关闭信号
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// 启动一个常驻任务；它应当只在取消令牌触发后返回
    pub fn spawn<F>(&mut self, name: &'static str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(()) if shutdown.is_cancelled() => {
                    tracing::debug!(task = name, "Background task stopped");
                }
                Ok(()) => {
                    tracing::warn!(task = name, "Background task returned before shutdown");
                }
                Err(payload) => {
                    tracing::error!(
                        task = name,
                        panic = %panic_message(payload.as_ref()),
                        "Background task panicked"
                    );
                }
            }
        });
        tracing::debug!(task = name, "Background task started");
        self.entries.push(Entry { name, handle });
    }

    /// 在未请求关闭的情况下已经结束的任务
    pub fn stopped(&self) -> Vec<&'static str> {
        if self.shutdown.is_cancelled() {
            return Vec::new();
        }
        self.entries
            .iter()
            .filter(|e| e.handle.is_finished())
            .map(|e| e.name)
            .collect()
    }

    /// 触发取消并等待所有任务结束
    pub async fn shutdown(self) {
        tracing::info!(count = self.entries.len(), "Stopping background tasks");
        self.shutdown.cancel();

        for entry in self.entries {
            if let Err(e) = entry.handle.await {
                tracing::error!(task = entry.name, error = %e, "Background task join failed");
            }
        }
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}
