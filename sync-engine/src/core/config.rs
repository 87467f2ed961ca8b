use std::path::PathBuf;
use std::time::Duration;

use shared::ConflictStrategy;

use crate::sync::{ExistenceCheckPolicy, RetryPolicy, SyncSettings};

/// 终端同步引擎配置
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | ./data | 工作目录 (本地数据库、日志) |
/// | SERVER_URL | http://localhost:3000 | 交易服务器地址 |
/// | REQUEST_TIMEOUT_MS | 30000 | 请求超时(毫秒) |
/// | SYNC_MAX_RETRIES | 3 | 同步周期失败后的重试次数 |
/// | SYNC_RETRY_DELAY_MS | 5000 | 重试间隔(毫秒) |
/// | CONFLICT_STRATEGY | last_write_wins | first_write_wins / last_write_wins / manual |
/// | EXISTENCE_CHECK_POLICY | fail_open | fail_open / fail_safe |
/// | SYNC_LOG_CAPACITY | 100 | 每个订单保留的同步事件数 |
/// | SYNC_HISTORY_RETENTION_HOURS | 168 | 已上传订单的时间线/冲突记录保留时长(小时) |
/// | CONNECTIVITY_CHECK_INTERVAL_MS | 10000 | 联网探测间隔(毫秒) |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_DIR | - | 日志目录 (未设置则输出到 stdout) |
/// | ENVIRONMENT | development | 运行环境 |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/pos SERVER_URL=https://pos.example.com cargo run -p sync-engine
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存储本地数据库等文件
    pub work_dir: String,
    /// 交易服务器 base URL
    pub server_url: String,
    /// 请求超时时间 (毫秒)
    pub request_timeout_ms: u64,
    /// 同步周期失败后的最大重试次数
    pub sync_max_retries: u32,
    /// 重试间隔 (毫秒)
    pub sync_retry_delay_ms: u64,
    /// 冲突解决策略
    pub conflict_strategy: ConflictStrategy,
    /// 存在性检查失败时的处理策略
    pub existence_check_policy: ExistenceCheckPolicy,
    /// 每个订单的同步事件保留上限
    pub sync_log_capacity: usize,
    /// 已离开本地存储的订单，其同步历史的保留时长 (小时)
    pub history_retention_hours: u64,
    /// 联网探测间隔 (毫秒)
    pub connectivity_check_interval_ms: u64,
    /// 日志级别
    pub log_level: String,
    /// 日志目录
    pub log_dir: Option<String>,
    /// 运行环境: development | staging | production
    pub environment: String,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置或无法解析，使用默认值
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "./data".into()),
            server_url: std::env::var("SERVER_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            request_timeout_ms: env_or("REQUEST_TIMEOUT_MS", 30_000),
            sync_max_retries: env_or("SYNC_MAX_RETRIES", 3),
            sync_retry_delay_ms: env_or("SYNC_RETRY_DELAY_MS", 5_000),
            conflict_strategy: env_or("CONFLICT_STRATEGY", ConflictStrategy::LastWriteWins),
            existence_check_policy: env_or("EXISTENCE_CHECK_POLICY", ExistenceCheckPolicy::FailOpen),
            sync_log_capacity: env_or("SYNC_LOG_CAPACITY", 100),
            history_retention_hours: env_or("SYNC_HISTORY_RETENTION_HOURS", 168),
            connectivity_check_interval_ms: env_or("CONNECTIVITY_CHECK_INTERVAL_MS", 10_000),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_dir: std::env::var("LOG_DIR").ok(),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
        }
    }

    /// 使用自定义值覆盖部分配置
    ///
    /// 常用于测试场景
    pub fn with_overrides(work_dir: impl Into<String>, server_url: impl Into<String>) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config.server_url = server_url.into();
        config
    }

    /// 本地数据库文件: {work_dir}/data/pos.redb
    pub fn store_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("data").join("pos.redb")
    }

    pub fn connectivity_check_interval(&self) -> Duration {
        Duration::from_millis(self.connectivity_check_interval_ms)
    }

    /// 同步引擎参数
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            conflict_strategy: self.conflict_strategy,
            existence_check_policy: self.existence_check_policy,
            retry: RetryPolicy {
                max_retries: self.sync_max_retries,
                delay: Duration::from_millis(self.sync_retry_delay_ms),
            },
            sync_log_capacity: self.sync_log_capacity,
            history_retention: Duration::from_secs(self.history_retention_hours * 3600),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
