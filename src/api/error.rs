// ==========================================
// 化工批次排产系统 - API层错误类型
// ==========================================
// 职责: 统一引擎层与仓储层错误，供调用方按类别匹配
// 红线: 拒绝必须带显式原因
// ==========================================

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::domain::batch::ScheduledEvent;
use crate::engine::error::{InventoryShortage, SchedulingError};
use crate::repository::error::RepositoryError;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 排产拒绝
    // ==========================================
    #[error("无可行排产时段: batch_number={batch_number}, attempts={attempts}, last_tried={last_tried}: {reason}")]
    InfeasibleSchedule {
        batch_number: i32,
        attempts: u32,
        last_tried: NaiveDateTime,
        reason: String,
    },

    #[error("设备时间冲突: equipment_id={equipment_id}, conflicts={}", .conflicts.len())]
    EquipmentConflict {
        equipment_id: String,
        conflicts: Vec<ScheduledEvent>,
    },

    #[error("库存不足: {}", .shortages.iter().map(|s| s.material_id.as_str()).collect::<Vec<_>>().join(", "))]
    InsufficientInventory { shortages: Vec<InventoryShortage> },

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("锁获取失败: {0}")]
    LockError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 SchedulingError 转换
// ==========================================
impl From<SchedulingError> for ApiError {
    fn from(err: SchedulingError) -> Self {
        match err {
            SchedulingError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            SchedulingError::InfeasibleSchedule {
                batch_number,
                attempts,
                last_tried,
                reason,
            } => ApiError::InfeasibleSchedule {
                batch_number,
                attempts,
                last_tried,
                reason,
            },
            SchedulingError::EquipmentConflict {
                equipment_id,
                conflicts,
            } => ApiError::EquipmentConflict {
                equipment_id,
                conflicts,
            },
            SchedulingError::InsufficientInventory { shortages } => {
                ApiError::InsufficientInventory { shortages }
            }
            SchedulingError::InvalidInput(msg) => ApiError::InvalidInput(msg),
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// 目的: 将Repository层的技术错误转换为调用方可匹配的业务错误
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::LockError(msg) => ApiError::LockError(msg),
            RepositoryError::DatabaseTransactionError(msg)
            | RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::CheckConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("检查约束违反: {}", msg))
            }

            // 事务内复检
            RepositoryError::InsufficientStock {
                material_id,
                on_hand,
                required,
            } => ApiError::InsufficientInventory {
                shortages: vec![InventoryShortage {
                    material_id,
                    on_hand_qty: on_hand,
                    required_qty: required,
                }],
            },
            RepositoryError::EquipmentBooked {
                equipment_id,
                event_id,
            } => ApiError::BusinessRuleViolation(format!(
                "设备 {} 已被事件 {} 占用",
                equipment_id, event_id
            )),

            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_transaction_shortage_maps_to_insufficient_inventory() {
        let err: ApiError = RepositoryError::InsufficientStock {
            material_id: "NaOH".to_string(),
            on_hand: 100.0,
            required: 150.0,
        }
        .into();

        match err {
            ApiError::InsufficientInventory { shortages } => {
                assert_eq!(shortages[0].shortfall(), 50.0)
            }
            other => panic!("Expected InsufficientInventory, got {:?}", other),
        }
    }

    #[test]
    fn test_engine_not_found_maps_to_not_found() {
        let err: ApiError = SchedulingError::not_found("Recipe", "R1").into();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
