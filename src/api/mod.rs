// ==========================================
// 化工批次排产系统 - API 层
// ==========================================
// 职责: 用例门面；串联资源锁、仓储与引擎
// ==========================================

pub mod error;
pub mod inventory_api;
pub mod resource_locks;
pub mod scheduling_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use inventory_api::{InventoryApi, MaterialRegistration};
pub use resource_locks::{ResourceKey, ResourceLocks};
pub use scheduling_api::{
    BatchCommand, BatchOutcome, CampaignCommand, CampaignOutcome, MaintenanceCommand,
    SchedulingApi, UtilityCapacityView,
};
