// ==========================================
// 化工批次排产系统 - 配方领域模型
// ==========================================
// 红线: 配方在排产过程中只读；批次冻结配方版本
// ==========================================

use serde::{Deserialize, Serialize};

use crate::domain::types::UtilityKind;

// ==========================================
// Recipe - 配方
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub recipe_id: String,                   // 配方ID
    pub name: String,                        // 配方名称
    pub version: i32,                        // 配方版本
    pub standard_yield: Option<f64>,         // 标准产量（配料定额的基准）
    pub yield_unit: String,                  // 产量单位
    pub total_duration_minutes: Option<i64>, // 名义总时长（分钟）
    pub steps: Vec<Step>,                    // 工序
    pub ingredients: Vec<Ingredient>,        // 配料
}

impl Recipe {
    /// 按工序序号排序后的工序列表
    pub fn ordered_steps(&self) -> Vec<&Step> {
        let mut steps: Vec<&Step> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.sequence_no);
        steps
    }

    /// 工序总时长（分钟），工序首尾相接
    pub fn step_duration_minutes(&self) -> i64 {
        self.steps.iter().map(|s| s.duration_minutes.max(0)).sum()
    }

    /// 有效标准产量（未声明或非正数视为未声明）
    pub fn effective_yield(&self) -> Option<f64> {
        self.standard_yield.filter(|y| y.is_finite() && *y > 0.0)
    }

    /// 配方涉及的全部公用工程（正负荷，去重、有序）
    pub fn demanded_utilities(&self) -> Vec<UtilityKind> {
        let mut utilities: Vec<UtilityKind> = self
            .steps
            .iter()
            .flat_map(|s| s.demands.iter())
            .filter(|d| d.load > 0.0)
            .map(|d| d.utility)
            .collect();
        utilities.sort();
        utilities.dedup();
        utilities
    }

    /// 某公用工程的单工序最大负荷
    pub fn peak_demand(&self, utility: UtilityKind) -> f64 {
        self.steps
            .iter()
            .map(|s| s.demand_for(utility))
            .fold(0.0, f64::max)
    }
}

// ==========================================
// Step - 工序
// ==========================================
// 同一批次内工序严格串行：N+1 在 N 结束时开始
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub sequence_no: i32,            // 工序序号（配方内唯一且递增）
    pub name: String,                // 工序名称
    pub duration_minutes: i64,       // 时长（分钟）
    pub demands: Vec<UtilityDemand>, // 公用工程需求
}

impl Step {
    /// 对某公用工程的负荷（无需求为 0）
    pub fn demand_for(&self, utility: UtilityKind) -> f64 {
        self.demands
            .iter()
            .filter(|d| d.utility == utility)
            .map(|d| d.load)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UtilityDemand {
    pub utility: UtilityKind,
    pub load: f64,
}

// ==========================================
// Ingredient - 配料（相对标准产量）
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ingredient {
    pub material_id: String, // 物料ID
    pub quantity: f64,       // 标准产量下的用量
    pub unit: String,        // 单位
}
