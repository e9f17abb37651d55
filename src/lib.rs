// ==========================================
// 化工批次排产系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 公用工程能力约束下的批次排产与物料扣减
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 排产规则
pub mod engine;

// 配置层 - 排产参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA/建库）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 用例门面
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{BatchStatus, EventKind, TransactionType, UtilityKind};

// 领域实体
pub use domain::{
    ActionLog, ActionType, Equipment, InventoryTransaction, MaintenanceEvent, Material, Recipe,
    ResourceUsageInterval, ScheduledBatch, ScheduledEvent, Step, TimeWindow,
};

// 引擎
pub use engine::{
    BatchMaterializer, CampaignScheduler, EquipmentConflictDetector, PlantTimeline,
    SchedulingError, UtilityCapacityTracker,
};

// API
pub use api::{ApiError, InventoryApi, ResourceLocks, SchedulingApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "化工批次排产系统";
