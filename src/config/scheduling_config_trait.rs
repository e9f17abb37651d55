// ==========================================
// 化工批次排产系统 - 排产配置读取 Trait
// ==========================================
// 职责: 定义排产引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use std::error::Error;

/// 前推步长上限（分钟）
pub const MAX_RETRY_INCREMENT_MINUTES: i64 = 24 * 60;

/// 单次排产活动默认批数上限
pub const DEFAULT_MAX_BATCHES_PER_CAMPAIGN: u32 = 1000;

/// 排产引擎参数
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulingConfig {
    pub batch_size: f64,               // 活动固定批量
    pub retry_increment_minutes: i64,  // 前推步长（分钟）
    pub max_retry_steps: u32,          // 前推次数上界
    pub max_batches_per_campaign: u32, // 单次活动批数上限
    pub default_batch_duration_minutes: i64, // 配方无时长信息时的默认批次时长
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000.0,
            retry_increment_minutes: 15,
            max_retry_steps: 2880,
            max_batches_per_campaign: DEFAULT_MAX_BATCHES_PER_CAMPAIGN,
            default_batch_duration_minutes: 480,
        }
    }
}

// ==========================================
// SchedulingConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
pub trait SchedulingConfigReader: Send + Sync {
    /// 活动固定批量
    ///
    /// # 默认值
    /// - 1000
    fn get_campaign_batch_size(&self) -> Result<f64, Box<dyn Error>>;

    /// 前推步长（分钟），取值 1..=MAX_RETRY_INCREMENT_MINUTES
    ///
    /// # 默认值
    /// - 15
    fn get_retry_increment_minutes(&self) -> Result<i64, Box<dyn Error>>;

    /// 前推次数上界
    ///
    /// # 默认值
    /// - 2880（15 分钟步长下为 30 天）
    fn get_max_retry_steps(&self) -> Result<u32, Box<dyn Error>>;

    /// 单次活动批数上限（超出即拒绝，不拆分）
    ///
    /// # 默认值
    /// - 1000
    fn get_max_batches_per_campaign(&self) -> Result<u32, Box<dyn Error>>;

    /// 默认批次时长（分钟）
    ///
    /// # 默认值
    /// - 480
    fn get_default_batch_duration_minutes(&self) -> Result<i64, Box<dyn Error>>;

    /// 一次读出全部排产参数
    fn load_scheduling_config(&self) -> Result<SchedulingConfig, Box<dyn Error>> {
        Ok(SchedulingConfig {
            batch_size: self.get_campaign_batch_size()?,
            retry_increment_minutes: self.get_retry_increment_minutes()?,
            max_retry_steps: self.get_max_retry_steps()?,
            max_batches_per_campaign: self.get_max_batches_per_campaign()?,
            default_batch_duration_minutes: self.get_default_batch_duration_minutes()?,
        })
    }
}
