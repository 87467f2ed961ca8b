use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use pos_client::{ClientConfig, SyncApi};
use sync_engine::{
    BackgroundTasks, ConnectivityMonitor, LocalStore, SyncOrchestrator, SystemClock,
    setup_environment,
};

/// 后台任务存活检查间隔
const TASK_CHECK_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 设置环境 (dotenv, 日志) 并加载配置
    let config = setup_environment();
    tracing::info!(
        environment = %config.environment,
        server = %config.server_url,
        "POS sync engine starting..."
    );

    // 2. 打开本地存储
    let store_path = config.store_path();
    let store = LocalStore::open(&store_path)
        .with_context(|| format!("failed to open local store at {}", store_path.display()))?;

    // 3. 服务器客户端
    let client = ClientConfig::new(&config.server_url)
        .with_timeout_ms(config.request_timeout_ms)
        .build_http_client()
        .context("failed to build HTTP client")?;
    let api: Arc<dyn SyncApi> = Arc::new(client);

    // 4. 同步编排器
    let orchestrator =
        SyncOrchestrator::new(store, api.clone(), Arc::new(SystemClock), config.sync_settings())?;
    orchestrator.subscribe(|status| {
        tracing::info!(
            online = status.online,
            pending = status.pending_orders,
            conflicts = status.unresolved_conflicts,
            syncing = status.sync_in_progress,
            "Sync status changed"
        );
    });
    orchestrator.subscribe_restored(|orders| {
        tracing::info!(count = orders.len(), "Unsynced orders restored after reconnect");
    });

    // 5. 后台任务
    let mut tasks = BackgroundTasks::new();
    let monitor = ConnectivityMonitor::new(
        api,
        orchestrator.clone(),
        config.connectivity_check_interval(),
    );
    let shutdown = tasks.shutdown_token();
    tasks.spawn("connectivity_monitor", monitor.run(shutdown));

    // 6. 等待 Ctrl-C；常驻任务意外退出时同样停止，交给外部进程管理重启
    let mut task_check = tokio::time::interval(TASK_CHECK_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let outcome = loop {
        tokio::select! {
            result = &mut ctrl_c => {
                tracing::info!("Shutdown signal received");
                break result.context("failed to listen for shutdown signal");
            }
            _ = task_check.tick() => {
                let stopped = tasks.stopped();
                if !stopped.is_empty() {
                    tracing::error!(tasks = ?stopped, "Background tasks stopped unexpectedly");
                    break Err(anyhow::anyhow!("background tasks stopped: {}", stopped.join(", ")));
                }
            }
        }
    };

    tasks.shutdown().await;
    outcome
}
