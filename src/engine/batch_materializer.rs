// ==========================================
// 化工批次排产系统 - 批次物化引擎
// ==========================================
// 职责: 把一个时段落位变成可提交的批次（配料缩放 + 库存预扣 + 公用工程占用）
// 输入: 配方 + 设备 + 开始时间 + 批量 + 库存快照 + 时间线
// 输出: MaterializationPlan（只算不写，由仓储层在一个事务内落库）
// 红线: 任一配料不足即整单拒绝；结存不得为负
// ==========================================

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

use crate::domain::batch::ScheduledBatch;
use crate::domain::material::Material;
use crate::domain::recipe::Recipe;
use crate::domain::timeline::ResourceUsageInterval;
use crate::domain::types::BatchStatus;
use crate::engine::campaign_scheduler::lay_out_steps;
use crate::engine::error::{InventoryShortage, SchedulingError, SchedulingResult};
use crate::engine::utility_capacity::PlantTimeline;

// ==========================================
// 请求与结果
// ==========================================

#[derive(Debug, Clone)]
pub struct BatchRequest<'a> {
    pub recipe: &'a Recipe,
    pub equipment_id: String,
    pub start: NaiveDateTime,
    pub batch_size: f64,
    /// 活动落位给出的结束时间；单批次为空
    pub end: Option<NaiveDateTime>,
    /// 活动落位时已判定可行的占用；为空则在此按工序展开并判定
    pub usage: Option<Vec<ResourceUsageInterval>>,
    pub campaign_id: Option<String>,
    pub batch_number: i32,
}

/// 单个物料的扣减明细
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryDeduction {
    pub material_id: String,
    pub required_qty: f64,
    pub unit: String,
    pub on_hand_before: f64,
    pub balance_after: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MaterializationWarning {
    /// 配方无有效标准产量，按系数 1 使用配料定额
    Unscaled { recipe_id: String },
    /// 扣减后低于最低库存（不阻断）
    BelowMinimumStock {
        material_id: String,
        balance_after: f64,
        min_stock: f64,
    },
}

#[derive(Debug, Clone)]
pub struct MaterializationPlan {
    pub batch: ScheduledBatch,
    pub deductions: Vec<InventoryDeduction>,
    pub usage: Vec<ResourceUsageInterval>,
    pub warnings: Vec<MaterializationWarning>,
}

// ==========================================
// BatchMaterializer - 批次物化引擎
// ==========================================
#[derive(Debug, Clone)]
pub struct BatchMaterializer {
    default_duration_minutes: i64,
}

impl BatchMaterializer {
    pub fn new(default_duration_minutes: i64) -> Self {
        Self {
            default_duration_minutes: default_duration_minutes.max(0),
        }
    }

    /// 缩放系数
    ///
    /// # 返回
    /// - (batch_size / standard_yield, None)
    /// - 无有效标准产量: (1.0, Some(Unscaled))
    pub fn scale_factor(
        &self,
        recipe: &Recipe,
        batch_size: f64,
    ) -> (f64, Option<MaterializationWarning>) {
        match recipe.effective_yield() {
            Some(y) => (batch_size / y, None),
            None => (
                1.0,
                Some(MaterializationWarning::Unscaled {
                    recipe_id: recipe.recipe_id.clone(),
                }),
            ),
        }
    }

    /// 结束时间：显式结束 > 工序总时长 > 名义总时长（无工序时） > 默认时长
    ///
    /// 有工序时批次时长与排产活动一致，恒等于工序时长之和，
    /// 保证设备占用窗口覆盖最后一道工序
    pub fn resolve_end(&self, request: &BatchRequest<'_>) -> NaiveDateTime {
        if let Some(end) = request.end {
            return end;
        }
        let recipe = request.recipe;
        let minutes = match recipe.step_duration_minutes() {
            m if m > 0 => m,
            _ => recipe
                .total_duration_minutes
                .filter(|m| *m > 0)
                .unwrap_or(self.default_duration_minutes),
        };
        request.start + Duration::minutes(minutes)
    }

    /// 生成物化计划
    ///
    /// # 参数
    /// - `materials`: 物料库存快照（按 material_id）
    /// - `timeline`: 单批次路径用于判定公用工程可行性
    #[instrument(skip(self, request, materials, timeline), fields(
        recipe_id = %request.recipe.recipe_id,
        equipment_id = %request.equipment_id,
        batch_size = request.batch_size,
    ))]
    pub fn plan(
        &self,
        request: &BatchRequest<'_>,
        materials: &HashMap<String, Material>,
        timeline: &PlantTimeline,
    ) -> SchedulingResult<MaterializationPlan> {
        let recipe = request.recipe;
        if !request.batch_size.is_finite() || request.batch_size <= 0.0 {
            return Err(SchedulingError::InvalidInput(format!(
                "批量必须为正数: {}",
                request.batch_size
            )));
        }
        if request.equipment_id.trim().is_empty() {
            return Err(SchedulingError::InvalidInput("设备ID不能为空".to_string()));
        }

        let mut warnings = Vec::new();
        let (scale_factor, unscaled) = self.scale_factor(recipe, request.batch_size);
        if let Some(w) = unscaled {
            warn!(recipe_id = %recipe.recipe_id, "配方无标准产量，配料不缩放");
            warnings.push(w);
        }

        let end = self.resolve_end(request);
        if end < request.start {
            return Err(SchedulingError::InvalidInput(format!(
                "结束时间早于开始时间: {} < {}",
                end, request.start
            )));
        }

        let batch_id = uuid::Uuid::new_v4().to_string();

        let usage = match &request.usage {
            Some(usage) => usage.clone(),
            None => self.lay_out_usage(recipe, request.start, timeline)?,
        };
        let usage: Vec<ResourceUsageInterval> =
            usage.into_iter().map(|iv| iv.with_batch(&batch_id)).collect();

        let deductions = self.deductions(recipe, scale_factor, materials)?;
        for d in &deductions {
            if let Some(m) = materials.get(&d.material_id) {
                if d.balance_after < m.min_stock_qty {
                    warnings.push(MaterializationWarning::BelowMinimumStock {
                        material_id: d.material_id.clone(),
                        balance_after: d.balance_after,
                        min_stock: m.min_stock_qty,
                    });
                }
            }
        }

        let batch = ScheduledBatch {
            batch_id,
            recipe_id: recipe.recipe_id.clone(),
            recipe_version: recipe.version,
            equipment_id: request.equipment_id.clone(),
            campaign_id: request.campaign_id.clone(),
            batch_number: request.batch_number,
            batch_size: request.batch_size,
            scale_factor,
            start_time: request.start,
            end_time: end,
            status: BatchStatus::Scheduled,
            created_at: chrono::Local::now().naive_local(),
        };

        debug!(
            batch_id = %batch.batch_id,
            scale_factor,
            deductions = deductions.len(),
            usage = usage.len(),
            warnings = warnings.len(),
            "批次物化计划生成"
        );

        Ok(MaterializationPlan {
            batch,
            deductions,
            usage,
            warnings,
        })
    }

    /// 单批次路径：按工序展开并逐工序判定
    fn lay_out_usage(
        &self,
        recipe: &Recipe,
        start: NaiveDateTime,
        timeline: &PlantTimeline,
    ) -> SchedulingResult<Vec<ResourceUsageInterval>> {
        let utilities = recipe.demanded_utilities();
        let mut usage = Vec::new();
        for slot in lay_out_steps(recipe, start) {
            for utility in &utilities {
                let load = slot.step.demand_for(*utility);
                if load <= 0.0 || slot.window.is_empty() {
                    continue;
                }
                if !timeline.feasible(*utility, slot.window.start, slot.window.end, load) {
                    return Err(SchedulingError::InfeasibleSchedule {
                        batch_number: 1,
                        attempts: 0,
                        last_tried: start,
                        reason: format!(
                            "工序 {} 在 {} 的 {} 负荷 {:.3} 超出剩余能力",
                            slot.step.sequence_no, slot.window.start, utility, load
                        ),
                    });
                }
                usage.push(ResourceUsageInterval::new(*utility, slot.window, load));
            }
        }
        Ok(usage)
    }

    /// 配料需求汇总并对照库存快照；收集全部短缺后统一拒绝
    fn deductions(
        &self,
        recipe: &Recipe,
        scale_factor: f64,
        materials: &HashMap<String, Material>,
    ) -> SchedulingResult<Vec<InventoryDeduction>> {
        let mut order: Vec<String> = Vec::new();
        let mut required: HashMap<String, (f64, String)> = HashMap::new();
        for ingredient in &recipe.ingredients {
            let entry = required
                .entry(ingredient.material_id.clone())
                .or_insert_with(|| {
                    order.push(ingredient.material_id.clone());
                    (0.0, ingredient.unit.clone())
                });
            entry.0 += ingredient.quantity * scale_factor;
        }

        let mut deductions = Vec::with_capacity(order.len());
        let mut shortages = Vec::new();
        for material_id in order {
            let Some((required_qty, unit)) = required.remove(&material_id) else {
                continue;
            };
            let material = materials
                .get(&material_id)
                .ok_or_else(|| SchedulingError::not_found("Material", &material_id))?;

            let balance_after = material.on_hand_qty - required_qty;
            if balance_after < 0.0 {
                shortages.push(InventoryShortage {
                    material_id: material_id.clone(),
                    on_hand_qty: material.on_hand_qty,
                    required_qty,
                });
                continue;
            }
            deductions.push(InventoryDeduction {
                material_id,
                required_qty,
                unit,
                on_hand_before: material.on_hand_qty,
                balance_after,
            });
        }

        if !shortages.is_empty() {
            warn!(shortages = shortages.len(), "库存不足，拒绝物化");
            return Err(SchedulingError::InsufficientInventory { shortages });
        }
        Ok(deductions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::recipe::{Ingredient, Step, UtilityDemand};
    use crate::domain::types::UtilityKind;
    use crate::engine::utility_capacity::UtilityCapacityTracker;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn material(id: &str, on_hand: f64, min_stock: f64) -> Material {
        Material {
            material_id: id.to_string(),
            name: id.to_string(),
            unit: "kg".to_string(),
            on_hand_qty: on_hand,
            min_stock_qty: min_stock,
            updated_at: at(0, 0),
        }
    }

    fn stock(items: Vec<Material>) -> HashMap<String, Material> {
        items.into_iter().map(|m| (m.material_id.clone(), m)).collect()
    }

    fn recipe(standard_yield: Option<f64>) -> Recipe {
        Recipe {
            recipe_id: "RCP-NEUT".to_string(),
            name: "中和".to_string(),
            version: 3,
            standard_yield,
            yield_unit: "kg".to_string(),
            total_duration_minutes: None,
            steps: vec![Step {
                sequence_no: 1,
                name: "中和".to_string(),
                duration_minutes: 90,
                demands: vec![UtilityDemand {
                    utility: UtilityKind::CoolingWater,
                    load: 10.0,
                }],
            }],
            ingredients: vec![Ingredient {
                material_id: "NaOH".to_string(),
                quantity: 50.0,
                unit: "kg".to_string(),
            }],
        }
    }

    fn request(recipe: &Recipe, batch_size: f64) -> BatchRequest<'_> {
        BatchRequest {
            recipe,
            equipment_id: "R-101".to_string(),
            start: at(8, 0),
            batch_size,
            end: None,
            usage: None,
            campaign_id: None,
            batch_number: 1,
        }
    }

    fn cooling(capacity: f64) -> PlantTimeline {
        let mut timeline = PlantTimeline::new();
        timeline.insert(UtilityCapacityTracker::new(UtilityKind::CoolingWater, capacity));
        timeline
    }

    #[test]
    fn test_ingredients_scale_linearly() {
        // 标准产量 1000，批量 3000 → NaOH 50 * 3 = 150
        let r = recipe(Some(1000.0));
        let plan = BatchMaterializer::new(480)
            .plan(&request(&r, 3000.0), &stock(vec![material("NaOH", 400.0, 0.0)]), &cooling(50.0))
            .unwrap();

        assert_eq!(plan.batch.scale_factor, 3.0);
        assert_eq!(plan.batch.recipe_version, 3);
        assert_eq!(plan.deductions.len(), 1);
        assert_eq!(plan.deductions[0].required_qty, 150.0);
        assert_eq!(plan.deductions[0].balance_after, 250.0);
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn test_batch_window_covers_every_step_usage() {
        // 名义总时长短于工序时长：批次窗口仍以工序为准
        let mut r = recipe(Some(1000.0));
        r.total_duration_minutes = Some(30);
        let plan = BatchMaterializer::new(480)
            .plan(&request(&r, 1000.0), &stock(vec![material("NaOH", 400.0, 0.0)]), &cooling(50.0))
            .unwrap();

        assert_eq!(plan.batch.end_time, at(9, 30));
        let last_usage_end = plan.usage.iter().map(|iv| iv.window.end).max().unwrap();
        assert_eq!(last_usage_end, plan.batch.end_time);
        assert!(plan
            .usage
            .iter()
            .all(|iv| iv.window.start >= plan.batch.start_time));
    }

    #[test]
    fn test_shortage_rejects_whole_batch() {
        let r = recipe(Some(1000.0));
        let result = BatchMaterializer::new(480).plan(
            &request(&r, 3000.0),
            &stock(vec![material("NaOH", 100.0, 0.0)]),
            &cooling(50.0),
        );

        match result {
            Err(SchedulingError::InsufficientInventory { shortages }) => {
                assert_eq!(shortages.len(), 1);
                assert_eq!(shortages[0].material_id, "NaOH");
                assert_eq!(shortages[0].on_hand_qty, 100.0);
                assert_eq!(shortages[0].required_qty, 150.0);
            }
            other => panic!("Expected InsufficientInventory, got {:?}", other),
        }
    }

    #[test]
    fn test_exact_balance_is_allowed() {
        let r = recipe(Some(1000.0));
        let plan = BatchMaterializer::new(480)
            .plan(&request(&r, 3000.0), &stock(vec![material("NaOH", 150.0, 0.0)]), &cooling(50.0))
            .unwrap();
        assert_eq!(plan.deductions[0].balance_after, 0.0);
    }

    #[test]
    fn test_missing_yield_falls_back_with_warning() {
        let r = recipe(None);
        let plan = BatchMaterializer::new(480)
            .plan(&request(&r, 3000.0), &stock(vec![material("NaOH", 400.0, 0.0)]), &cooling(50.0))
            .unwrap();

        assert_eq!(plan.batch.scale_factor, 1.0);
        assert_eq!(plan.deductions[0].required_qty, 50.0);
        assert!(plan.warnings.contains(&MaterializationWarning::Unscaled {
            recipe_id: "RCP-NEUT".to_string()
        }));
    }

    #[test]
    fn test_below_minimum_stock_warns_without_blocking() {
        let r = recipe(Some(1000.0));
        let plan = BatchMaterializer::new(480)
            .plan(&request(&r, 1000.0), &stock(vec![material("NaOH", 80.0, 40.0)]), &cooling(50.0))
            .unwrap();

        assert_eq!(
            plan.warnings,
            vec![MaterializationWarning::BelowMinimumStock {
                material_id: "NaOH".to_string(),
                balance_after: 30.0,
                min_stock: 40.0,
            }]
        );
    }

    #[test]
    fn test_missing_material_is_not_found() {
        let r = recipe(Some(1000.0));
        let result = BatchMaterializer::new(480).plan(&request(&r, 1000.0), &HashMap::new(), &cooling(50.0));
        assert!(matches!(result, Err(SchedulingError::NotFound { .. })));
    }

    #[test]
    fn test_end_time_resolution_order() {
        let materializer = BatchMaterializer::new(480);
        let mut r = recipe(Some(1000.0));

        assert_eq!(materializer.resolve_end(&request(&r, 1000.0)), at(9, 30));

        // 有工序时名义总时长不参与（无论长短）
        r.total_duration_minutes = Some(180);
        assert_eq!(materializer.resolve_end(&request(&r, 1000.0)), at(9, 30));
        r.total_duration_minutes = Some(30);
        assert_eq!(materializer.resolve_end(&request(&r, 1000.0)), at(9, 30));

        let mut explicit = request(&r, 1000.0);
        explicit.end = Some(at(10, 0));
        assert_eq!(materializer.resolve_end(&explicit), at(10, 0));

        r.steps.clear();
        assert_eq!(materializer.resolve_end(&request(&r, 1000.0)), at(8, 30));

        r.total_duration_minutes = None;
        assert_eq!(materializer.resolve_end(&request(&r, 1000.0)), at(16, 0));
    }

    #[test]
    fn test_single_batch_checks_utility_capacity() {
        let r = recipe(Some(1000.0));
        let stock = stock(vec![material("NaOH", 400.0, 0.0)]);

        let plan = BatchMaterializer::new(480)
            .plan(&request(&r, 1000.0), &stock, &cooling(10.0))
            .unwrap();
        assert_eq!(plan.usage.len(), 1);
        assert_eq!(plan.usage[0].batch_id.as_deref(), Some(plan.batch.batch_id.as_str()));

        let result = BatchMaterializer::new(480).plan(&request(&r, 1000.0), &stock, &cooling(5.0));
        assert!(matches!(result, Err(SchedulingError::InfeasibleSchedule { .. })));
    }
}
