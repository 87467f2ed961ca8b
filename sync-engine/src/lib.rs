//! POS Sync Engine - 收银终端离线优先订单同步
//!
//! # 架构概述
//!
//! 终端在断网时照常收银，订单写入本地持久存储；联网后由同步编排器
//! 上传待同步订单、处理冲突并刷新商品/客户/门店设置镜像。
//!
//! - **本地存储** (`store`): redb 分区存储 + 二级索引
//! - **设备标识** (`device`): 首次运行生成并持久化
//! - **目录镜像** (`catalog`): 商品、客户、门店设置
//! - **订单采集** (`orders`): 本地下单、草稿、单号分配
//! - **同步** (`sync`): 编排器、上传管线、冲突处理、事件日志
//!
//! # 模块结构
//!
//! ```text
//! sync-engine/src/
//! ├── core/          # 配置、后台任务
//! ├── store/         # redb 存储
//! ├── catalog.rs     # 目录镜像
//! ├── device.rs      # 设备标识
//! ├── orders/        # 订单采集
//! ├── sync/          # 同步编排
//! └── utils/         # 错误、日志、时钟
//! ```

pub mod catalog;
pub mod core;
pub mod device;
pub mod orders;
pub mod store;
pub mod sync;
pub mod utils;

// Re-export 公共类型
pub use catalog::{CatalogMirror, EntityOutcome, MirrorReport};
pub use crate::core::{BackgroundTasks, Config};
pub use device::DeviceIdentity;
pub use orders::{OrderCapture, PaymentInput, SaleInput, SaleItemInput};
pub use store::{Index, LocalStore, Partition, StoreError};
pub use sync::{
    ConnectivityMonitor, CycleOutcome, CycleReport, ExistenceCheckPolicy, OrderOutcome,
    RetryPolicy, SubscriptionId, SyncOrchestrator, SyncSettings, UploadReport,
};
pub use utils::{Clock, SyncError, SyncResult, SystemClock};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

/// 加载 .env 并初始化日志
pub fn setup_environment() -> Config {
    dotenv::dotenv().ok();
    let config = Config::from_env();
    init_logger_with_file(Some(&config.log_level), config.log_dir.as_deref());
    config
}
