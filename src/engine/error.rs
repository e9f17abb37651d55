// ==========================================
// 化工批次排产系统 - 引擎层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 红线: 所有错误同步返回，引擎内不自动重试
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::batch::ScheduledEvent;
use crate::domain::types::UtilityKind;

/// 引擎层错误类型
#[derive(Error, Debug, Clone)]
pub enum SchedulingError {
    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    /// 有界搜索耗尽仍未找到可行时段
    #[error("无可行排产时段: batch_number={batch_number}, attempts={attempts}, last_tried={last_tried}: {reason}")]
    InfeasibleSchedule {
        batch_number: i32,
        attempts: u32,
        last_tried: NaiveDateTime,
        reason: String,
    },

    /// 设备时间冲突（附带全部冲突事件，不自动消解）
    #[error("设备时间冲突: equipment_id={equipment_id}, conflicts={}", .conflicts.len())]
    EquipmentConflict {
        equipment_id: String,
        conflicts: Vec<ScheduledEvent>,
    },

    /// 任一配料库存不足则整单拒绝
    #[error("库存不足: {}", format_shortages(.shortages))]
    InsufficientInventory { shortages: Vec<InventoryShortage> },

    #[error("无效输入: {0}")]
    InvalidInput(String),
}

/// 库存短缺明细
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryShortage {
    pub material_id: String,
    pub on_hand_qty: f64,
    pub required_qty: f64,
}

impl InventoryShortage {
    pub fn shortfall(&self) -> f64 {
        self.required_qty - self.on_hand_qty
    }
}

fn format_shortages(shortages: &[InventoryShortage]) -> String {
    shortages
        .iter()
        .map(|s| {
            format!(
                "{}(现存={:.3}, 需求={:.3})",
                s.material_id, s.on_hand_qty, s.required_qty
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

impl SchedulingError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        SchedulingError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    /// 工序负荷本身超过全厂能力，任何时段都不可行
    pub(crate) fn demand_exceeds_capacity(
        batch_number: i32,
        at: NaiveDateTime,
        utility: UtilityKind,
        demand: f64,
        capacity: f64,
    ) -> Self {
        SchedulingError::InfeasibleSchedule {
            batch_number,
            attempts: 0,
            last_tried: at,
            reason: format!(
                "{} 工序负荷 {:.3} 超过全厂能力 {:.3}",
                utility, demand, capacity
            ),
        }
    }
}

/// Result 类型别名
pub type SchedulingResult<T> = Result<T, SchedulingError>;
