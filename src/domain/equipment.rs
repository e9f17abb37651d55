// ==========================================
// 化工批次排产系统 - 设备领域模型
// ==========================================
// 公用工程源设备（如锅炉）把额定能力计入全厂该公用工程的能力池
// ==========================================

use serde::{Deserialize, Serialize};

use crate::domain::types::UtilityKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Equipment {
    pub equipment_id: String,                // 设备ID
    pub name: String,                        // 设备名称
    pub equipment_type: String,              // 设备类型 (REACTOR/BOILER/...)
    pub utility_sources: Vec<UtilityRating>, // 作为公用工程源的额定能力
}

impl Equipment {
    /// 对某公用工程的供给能力（非源设备为 None）
    pub fn supplies(&self, utility: UtilityKind) -> Option<f64> {
        let total: f64 = self
            .utility_sources
            .iter()
            .filter(|r| r.utility == utility)
            .map(|r| r.capacity)
            .sum();
        if self.utility_sources.iter().any(|r| r.utility == utility) {
            Some(total)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UtilityRating {
    pub utility: UtilityKind,
    pub capacity: f64,
}

/// 全厂公用工程能力 = 所有源设备额定能力之和
///
/// 没有任何源设备时为 0，任何正负荷工序都不可行。
pub fn plant_capacity(equipment: &[Equipment], utility: UtilityKind) -> f64 {
    equipment
        .iter()
        .filter_map(|e| e.supplies(utility))
        .filter(|c| c.is_finite() && *c > 0.0)
        .sum()
}
