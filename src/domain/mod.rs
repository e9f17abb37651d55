// ==========================================
// 化工批次排产系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod action_log;
pub mod batch;
pub mod equipment;
pub mod material;
pub mod recipe;
pub mod timeline;
pub mod types;

// 重导出核心类型
pub use action_log::{ActionLog, ActionType};
pub use batch::{MaintenanceEvent, ScheduledBatch, ScheduledEvent};
pub use equipment::{plant_capacity, Equipment, UtilityRating};
pub use material::{InventoryTransaction, LedgerReconciliation, Material};
pub use recipe::{Ingredient, Recipe, Step, UtilityDemand};
pub use timeline::{ResourceUsageInterval, TimeWindow};
pub use types::{BatchStatus, EventKind, TransactionType, UtilityKind};
