//! 核心模块 - 配置与后台任务
//!
//! - [`Config`] - 引擎配置 (环境变量)
//! - [`BackgroundTasks`] - 后台任务生命周期

pub mod config;
pub mod tasks;

pub use config::Config;
pub use tasks::BackgroundTasks;
