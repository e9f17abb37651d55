// ==========================================
// 化工批次排产系统 - 配置层
// ==========================================
// 职责: 排产参数管理
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod scheduling_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use scheduling_config_trait::{
    SchedulingConfig, SchedulingConfigReader, DEFAULT_MAX_BATCHES_PER_CAMPAIGN,
    MAX_RETRY_INCREMENT_MINUTES,
};
