// ==========================================
// 化工批次排产系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod action_log_repo;
pub mod batch_repo;
pub mod equipment_repo;
pub mod error;
pub mod material_repo;
pub mod recipe_repo;
pub(crate) mod row_codec;
pub mod timeline_repo;

// 重导出核心仓储
pub use action_log_repo::ActionLogRepository;
pub use batch_repo::{BatchRepository, BatchWrite, MaterialConsumption};
pub use equipment_repo::EquipmentRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use material_repo::MaterialRepository;
pub use recipe_repo::RecipeRepository;
pub use timeline_repo::TimelineRepository;
