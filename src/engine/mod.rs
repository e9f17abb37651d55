// ==========================================
// 化工批次排产系统 - 引擎层
// ==========================================
// 职责: 实现排产规则引擎,不拼 SQL
// 红线: Engine 不拼 SQL, 同步执行, 拒绝必须附带原因
// ==========================================

pub mod batch_materializer;
pub mod campaign_scheduler;
pub mod equipment_conflict;
pub mod error;
pub mod interval_math;
pub mod utility_capacity;

// 重导出核心引擎
pub use batch_materializer::{
    BatchMaterializer, BatchRequest, InventoryDeduction, MaterializationPlan,
    MaterializationWarning,
};
pub use campaign_scheduler::{
    lay_out_steps, validate_recipe, BatchPlacement, CampaignPlan, CampaignRequest,
    CampaignScheduler, StepSlot,
};
pub use equipment_conflict::{EquipmentCalendar, EquipmentConflictDetector, EquipmentPool};
pub use error::{InventoryShortage, SchedulingError, SchedulingResult};
pub use interval_math::{critical_points, midpoint, overlaps};
pub use utility_capacity::{PlantTimeline, UtilityCapacityTracker, LOAD_EPSILON};
