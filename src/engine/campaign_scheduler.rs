// ==========================================
// 化工批次排产系统 - 排产活动调度引擎
// ==========================================
// 职责: 目标产量 → 固定批量拆分 → 逐批贪心前推找最早可行时段
// 输入: 配方 + 目标产量 + 最早开始 + 全厂时间线 + 候选设备池
// 输出: 按批次序号排列的落位结果 + 更新后的时间线
// 红线: 整批可行才提交，不做部分提交；搜索步数有上界
// ==========================================

use chrono::{Duration, NaiveDateTime};
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

use crate::config::{
    SchedulingConfig, DEFAULT_MAX_BATCHES_PER_CAMPAIGN, MAX_RETRY_INCREMENT_MINUTES,
};
use crate::domain::batch::ScheduledEvent;
use crate::domain::recipe::{Recipe, Step};
use crate::domain::timeline::{ResourceUsageInterval, TimeWindow};
use crate::domain::types::EventKind;
use crate::engine::equipment_conflict::{EquipmentConflictDetector, EquipmentPool};
use crate::engine::error::{SchedulingError, SchedulingResult};
use crate::engine::utility_capacity::{PlantTimeline, LOAD_EPSILON};

// ==========================================
// 请求与结果
// ==========================================

#[derive(Debug, Clone)]
pub struct CampaignRequest<'a> {
    pub recipe: &'a Recipe,
    pub target_quantity: f64,
    pub earliest_start: NaiveDateTime,
}

/// 单批次落位结果
#[derive(Debug, Clone)]
pub struct BatchPlacement {
    pub batch_number: i32,                 // 批次序号（从1开始）
    pub batch_size: f64,                   // 批量
    pub start: NaiveDateTime,              // 开始
    pub end: NaiveDateTime,                // 结束 = 开始 + 工序总时长
    pub equipment_id: Option<String>,      // 分配设备（无设备约束时为空）
    pub usage: Vec<ResourceUsageInterval>, // 本批次提交的公用工程占用
    pub attempts: u32,                     // 前推次数
}

impl BatchPlacement {
    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.start,
            end: self.end,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CampaignPlan {
    pub placements: Vec<BatchPlacement>,
    pub timeline: PlantTimeline, // 含本次提交的时间线
    pub equipment: EquipmentPool, // 含本次占用的设备日历
}

impl CampaignPlan {
    pub fn total_quantity(&self) -> f64 {
        self.placements.iter().map(|p| p.batch_size).sum()
    }

    pub fn makespan_end(&self) -> Option<NaiveDateTime> {
        self.placements.iter().map(|p| p.end).max()
    }
}

// ==========================================
// 工序展开
// ==========================================

/// 工序时段（工序首尾相接）
#[derive(Debug, Clone)]
pub struct StepSlot<'a> {
    pub step: &'a Step,
    pub window: TimeWindow,
}

/// 以 start 为起点按序号展开工序
pub fn lay_out_steps(recipe: &Recipe, start: NaiveDateTime) -> Vec<StepSlot<'_>> {
    let mut offset = start;
    recipe
        .ordered_steps()
        .into_iter()
        .map(|step| {
            let window = TimeWindow::from_minutes(offset, step.duration_minutes);
            offset = window.end;
            StepSlot { step, window }
        })
        .collect()
}

/// 配方结构校验：有工序、序号唯一、时长与负荷非负
pub fn validate_recipe(recipe: &Recipe) -> SchedulingResult<()> {
    if recipe.steps.is_empty() {
        return Err(SchedulingError::InvalidInput(format!(
            "配方 {} 没有工序",
            recipe.recipe_id
        )));
    }

    let mut seen = HashSet::new();
    for step in &recipe.steps {
        if !seen.insert(step.sequence_no) {
            return Err(SchedulingError::InvalidInput(format!(
                "配方 {} 工序序号重复: {}",
                recipe.recipe_id, step.sequence_no
            )));
        }
        if step.duration_minutes < 0 {
            return Err(SchedulingError::InvalidInput(format!(
                "配方 {} 工序 {} 时长为负",
                recipe.recipe_id, step.sequence_no
            )));
        }
        if step.demands.iter().any(|d| !d.load.is_finite() || d.load < 0.0) {
            return Err(SchedulingError::InvalidInput(format!(
                "配方 {} 工序 {} 公用工程负荷无效",
                recipe.recipe_id, step.sequence_no
            )));
        }
    }
    Ok(())
}

// ==========================================
// CampaignScheduler - 排产活动调度引擎
// ==========================================
#[derive(Debug, Clone)]
pub struct CampaignScheduler {
    batch_size: f64,
    retry_increment: Duration,
    max_retry_steps: u32,
    max_batches: u32,
    detector: EquipmentConflictDetector,
}

impl CampaignScheduler {
    pub fn new(batch_size: f64, retry_increment_minutes: i64, max_retry_steps: u32) -> Self {
        Self {
            batch_size,
            retry_increment: Duration::minutes(
                retry_increment_minutes.clamp(1, MAX_RETRY_INCREMENT_MINUTES),
            ),
            max_retry_steps,
            max_batches: DEFAULT_MAX_BATCHES_PER_CAMPAIGN,
            detector: EquipmentConflictDetector::new(),
        }
    }

    pub fn from_config(config: &SchedulingConfig) -> Self {
        Self::new(
            config.batch_size,
            config.retry_increment_minutes,
            config.max_retry_steps,
        )
        .with_max_batches(config.max_batches_per_campaign)
    }

    /// 单次活动批数上限
    pub fn with_max_batches(mut self, max_batches: u32) -> Self {
        self.max_batches = max_batches.max(1);
        self
    }

    pub fn batch_size(&self) -> f64 {
        self.batch_size
    }

    /// 拆分批量：批数向上取整，末批承担余量
    pub fn split_batches(&self, target_quantity: f64) -> SchedulingResult<Vec<f64>> {
        if !target_quantity.is_finite() || target_quantity <= 0.0 {
            return Err(SchedulingError::InvalidInput(format!(
                "目标产量必须为正数: {}",
                target_quantity
            )));
        }
        if !self.batch_size.is_finite() || self.batch_size <= 0.0 {
            return Err(SchedulingError::InvalidInput(format!(
                "批量配置必须为正数: {}",
                self.batch_size
            )));
        }

        // 先按浮点比较上限，再转换并分配
        let raw_count = (target_quantity / self.batch_size).ceil();
        if raw_count > f64::from(self.max_batches) {
            return Err(SchedulingError::InvalidInput(format!(
                "目标产量 {} 按批量 {} 需 {} 批，超过单次活动上限 {} 批",
                target_quantity, self.batch_size, raw_count, self.max_batches
            )));
        }
        let count = (raw_count as usize).max(1);
        let mut sizes = vec![self.batch_size; count];
        let remainder = target_quantity - self.batch_size * (count - 1) as f64;
        if let Some(last) = sizes.last_mut() {
            *last = remainder;
        }
        Ok(sizes)
    }

    /// 执行排产活动
    ///
    /// # 规则
    /// 1) 批次按序号依次处理，每批都从 earliest_start 开始尝试
    /// 2) 全部正负荷工序在活动级时间线上可行、且设备池有空闲设备 → 整批提交
    /// 3) 否则丢弃试排，开始时间前推一个步长重试
    /// 4) 前推超过 max_retry_steps 次 → InfeasibleSchedule
    ///
    /// # 返回
    /// 新的 CampaignPlan；入参 timeline/pool 不被修改
    #[instrument(skip(self, request, timeline, pool), fields(
        recipe_id = %request.recipe.recipe_id,
        target_quantity = request.target_quantity,
        earliest_start = %request.earliest_start,
    ))]
    pub fn schedule(
        &self,
        request: &CampaignRequest<'_>,
        timeline: &PlantTimeline,
        pool: &EquipmentPool,
    ) -> SchedulingResult<CampaignPlan> {
        let recipe = request.recipe;
        validate_recipe(recipe)?;
        if recipe.step_duration_minutes() <= 0 {
            return Err(SchedulingError::InvalidInput(format!(
                "配方 {} 工序总时长为 0",
                recipe.recipe_id
            )));
        }

        let sizes = self.split_batches(request.target_quantity)?;
        let utilities = recipe.demanded_utilities();

        // 单工序负荷超过全厂能力时任何时段都不可行
        for utility in &utilities {
            let demand = recipe.peak_demand(*utility);
            let capacity = timeline.capacity(*utility);
            if demand > capacity + LOAD_EPSILON {
                warn!(%utility, demand, capacity, "工序负荷超过全厂能力");
                return Err(SchedulingError::demand_exceeds_capacity(
                    1,
                    request.earliest_start,
                    *utility,
                    demand,
                    capacity,
                ));
            }
        }

        info!(
            batch_count = sizes.len(),
            batch_size = self.batch_size,
            utilities = ?utilities,
            equipment_count = pool.calendars().len(),
            "开始排产活动"
        );

        let template = lay_out_steps(recipe, request.earliest_start);
        let batch_minutes = recipe.step_duration_minutes();

        let mut timeline = timeline.clone();
        let mut pool = pool.clone();
        let mut placements = Vec::with_capacity(sizes.len());

        for (idx, batch_size) in sizes.into_iter().enumerate() {
            let batch_number = (idx + 1) as i32;
            let mut tentative = request.earliest_start;
            let mut attempts: u32 = 0;

            loop {
                let shift = tentative - request.earliest_start;
                let window = TimeWindow::from_minutes(tentative, batch_minutes);

                let utilities_ok = template.iter().all(|slot| {
                    let w = slot.window.shifted(shift);
                    utilities.iter().all(|u| {
                        timeline.feasible(*u, w.start, w.end, slot.step.demand_for(*u))
                    })
                });

                let assignment = if !utilities_ok {
                    None
                } else if pool.is_unconstrained() {
                    Some(None)
                } else {
                    pool.first_free(&self.detector, &window)
                        .map(|id| Some(id.to_string()))
                };

                if let Some(equipment_id) = assignment {
                    let mut usage = Vec::new();
                    for slot in &template {
                        let w = slot.window.shifted(shift);
                        for u in &utilities {
                            if let Some(iv) = timeline.commit(*u, w, slot.step.demand_for(*u)) {
                                usage.push(iv);
                            }
                        }
                    }

                    if let Some(id) = &equipment_id {
                        pool.book(ScheduledEvent {
                            event_id: format!("campaign-batch-{}", batch_number),
                            equipment_id: id.clone(),
                            kind: EventKind::Batch,
                            window,
                            label: format!("{}#{}", recipe.recipe_id, batch_number),
                        });
                    }

                    debug!(
                        batch_number,
                        start = %window.start,
                        end = %window.end,
                        attempts,
                        equipment_id = ?equipment_id,
                        "批次落位"
                    );

                    placements.push(BatchPlacement {
                        batch_number,
                        batch_size,
                        start: window.start,
                        end: window.end,
                        equipment_id,
                        usage,
                        attempts,
                    });
                    break;
                }

                if attempts >= self.max_retry_steps {
                    let horizon_minutes =
                        self.retry_increment.num_minutes() * i64::from(self.max_retry_steps);
                    warn!(batch_number, attempts, last_tried = %tentative, "搜索上界耗尽");
                    return Err(SchedulingError::InfeasibleSchedule {
                        batch_number,
                        attempts,
                        last_tried: tentative,
                        reason: format!(
                            "{} 分钟前推范围内无满足公用工程能力与设备空闲的时段",
                            horizon_minutes
                        ),
                    });
                }

                tentative = match tentative.checked_add_signed(self.retry_increment) {
                    Some(next) => next,
                    None => {
                        return Err(SchedulingError::InfeasibleSchedule {
                            batch_number,
                            attempts,
                            last_tried: tentative,
                            reason: "前推超出可表示的时间范围".to_string(),
                        })
                    }
                };
                attempts += 1;
            }
        }

        info!(placed = placements.len(), "排产活动完成");

        Ok(CampaignPlan {
            placements,
            timeline,
            equipment: pool,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::recipe::UtilityDemand;
    use crate::domain::types::UtilityKind;
    use crate::engine::equipment_conflict::EquipmentCalendar;
    use crate::engine::utility_capacity::UtilityCapacityTracker;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn steam_step(seq: i32, minutes: i64, load: f64) -> Step {
        Step {
            sequence_no: seq,
            name: format!("step-{}", seq),
            duration_minutes: minutes,
            demands: if load > 0.0 {
                vec![UtilityDemand {
                    utility: UtilityKind::Steam,
                    load,
                }]
            } else {
                vec![]
            },
        }
    }

    fn recipe(steps: Vec<Step>) -> Recipe {
        Recipe {
            recipe_id: "RCP-HYD".to_string(),
            name: "水解".to_string(),
            version: 1,
            standard_yield: Some(1000.0),
            yield_unit: "kg".to_string(),
            total_duration_minutes: None,
            steps,
            ingredients: vec![],
        }
    }

    fn steam_timeline(capacity: f64) -> PlantTimeline {
        let mut timeline = PlantTimeline::new();
        timeline.insert(UtilityCapacityTracker::new(UtilityKind::Steam, capacity));
        timeline
    }

    #[test]
    fn test_split_batches_rounds_up_and_keeps_total() {
        let scheduler = CampaignScheduler::new(1000.0, 15, 10);
        assert_eq!(scheduler.split_batches(3000.0).unwrap(), vec![1000.0; 3]);
        assert_eq!(
            scheduler.split_batches(2500.0).unwrap(),
            vec![1000.0, 1000.0, 500.0]
        );
        assert_eq!(scheduler.split_batches(1.0).unwrap(), vec![1.0]);
        assert!(scheduler.split_batches(0.0).is_err());
        assert!(scheduler.split_batches(f64::NAN).is_err());
    }

    #[test]
    fn test_split_batches_rejects_count_over_limit() {
        let scheduler = CampaignScheduler::new(1000.0, 15, 10);
        assert!(matches!(
            scheduler.split_batches(1e22),
            Err(SchedulingError::InvalidInput(_))
        ));
        assert!(matches!(
            scheduler.split_batches(1e12),
            Err(SchedulingError::InvalidInput(_))
        ));
        assert_eq!(scheduler.split_batches(1_000_000.0).unwrap().len(), 1000);
        assert!(scheduler.split_batches(1_000_001.0).is_err());

        let narrow = CampaignScheduler::new(1000.0, 15, 10).with_max_batches(2);
        assert_eq!(narrow.split_batches(2000.0).unwrap().len(), 2);
        assert!(narrow.split_batches(2000.5).is_err());
    }

    #[test]
    fn test_oversized_retry_increment_is_clamped() {
        // 构造不 panic，步长按上限截断
        let scheduler = CampaignScheduler::new(1000.0, i64::MAX, 2);
        assert_eq!(scheduler.retry_increment.num_minutes(), MAX_RETRY_INCREMENT_MINUTES);
    }

    #[test]
    fn test_lay_out_steps_back_to_back() {
        let r = recipe(vec![steam_step(2, 30, 0.0), steam_step(1, 60, 5.0)]);
        let slots = lay_out_steps(&r, at(8, 0));
        assert_eq!(slots[0].step.sequence_no, 1);
        assert_eq!(slots[0].window, TimeWindow::new(at(8, 0), at(9, 0)).unwrap());
        assert_eq!(slots[1].window, TimeWindow::new(at(9, 0), at(9, 30)).unwrap());
    }

    #[test]
    fn test_hydrolysis_batches_stagger_under_steam_limit() {
        // 能力 40，水解 15 × 120 分钟，3 批同一时刻请求 → 15*3 = 45 > 40
        let r = recipe(vec![steam_step(1, 120, 15.0)]);
        let scheduler = CampaignScheduler::new(1000.0, 15, 100);
        let request = CampaignRequest {
            recipe: &r,
            target_quantity: 3000.0,
            earliest_start: at(8, 0),
        };

        let plan = scheduler
            .schedule(&request, &steam_timeline(40.0), &EquipmentPool::unconstrained())
            .unwrap();

        let starts: Vec<NaiveDateTime> = plan.placements.iter().map(|p| p.start).collect();
        assert_eq!(starts, vec![at(8, 0), at(8, 0), at(10, 0)]);
        assert_eq!(plan.placements[2].attempts, 8);
        assert_eq!(plan.placements[2].end, at(12, 0));
        assert_eq!(plan.total_quantity(), 3000.0);
    }

    #[test]
    fn test_input_timeline_is_not_mutated() {
        let r = recipe(vec![steam_step(1, 60, 10.0)]);
        let scheduler = CampaignScheduler::new(1000.0, 15, 10);
        let timeline = steam_timeline(40.0);
        let request = CampaignRequest {
            recipe: &r,
            target_quantity: 2000.0,
            earliest_start: at(8, 0),
        };

        let plan = scheduler
            .schedule(&request, &timeline, &EquipmentPool::unconstrained())
            .unwrap();

        assert!(timeline.tracker(UtilityKind::Steam).unwrap().committed().is_empty());
        assert_eq!(
            plan.timeline.tracker(UtilityKind::Steam).unwrap().committed().len(),
            2
        );
    }

    #[test]
    fn test_zero_demand_steps_are_not_recorded() {
        let r = recipe(vec![
            steam_step(1, 30, 0.0),
            steam_step(2, 60, 12.0),
            steam_step(3, 30, 0.0),
        ]);
        let scheduler = CampaignScheduler::new(1000.0, 15, 10);
        let request = CampaignRequest {
            recipe: &r,
            target_quantity: 1000.0,
            earliest_start: at(8, 0),
        };

        let plan = scheduler
            .schedule(&request, &steam_timeline(40.0), &EquipmentPool::unconstrained())
            .unwrap();

        let placement = &plan.placements[0];
        assert_eq!(placement.usage.len(), 1);
        assert_eq!(
            placement.usage[0].window,
            TimeWindow::new(at(8, 30), at(9, 30)).unwrap()
        );
        assert_eq!(placement.end, at(10, 0));
    }

    #[test]
    fn test_no_steam_source_fails_immediately() {
        let r = recipe(vec![steam_step(1, 60, 5.0)]);
        let scheduler = CampaignScheduler::new(1000.0, 15, 1_000_000);
        let request = CampaignRequest {
            recipe: &r,
            target_quantity: 1000.0,
            earliest_start: at(8, 0),
        };

        match scheduler.schedule(&request, &PlantTimeline::new(), &EquipmentPool::unconstrained()) {
            Err(SchedulingError::InfeasibleSchedule { attempts, .. }) => assert_eq!(attempts, 0),
            other => panic!("Expected InfeasibleSchedule, got {:?}", other),
        }
    }

    #[test]
    fn test_search_is_bounded() {
        // 已有负荷长期占满：每次前推都失败，最终在上界处报错
        let mut tracker = UtilityCapacityTracker::new(UtilityKind::Steam, 20.0);
        tracker.commit(TimeWindow::from_minutes(at(0, 0), 60 * 24 * 7), 20.0);
        let mut timeline = PlantTimeline::new();
        timeline.insert(tracker);

        let r = recipe(vec![steam_step(1, 60, 10.0)]);
        let scheduler = CampaignScheduler::new(1000.0, 15, 8);
        let request = CampaignRequest {
            recipe: &r,
            target_quantity: 1000.0,
            earliest_start: at(8, 0),
        };

        match scheduler.schedule(&request, &timeline, &EquipmentPool::unconstrained()) {
            Err(SchedulingError::InfeasibleSchedule {
                batch_number,
                attempts,
                last_tried,
                ..
            }) => {
                assert_eq!(batch_number, 1);
                assert_eq!(attempts, 8);
                assert_eq!(last_tried, at(10, 0));
            }
            other => panic!("Expected InfeasibleSchedule, got {:?}", other),
        }
    }

    #[test]
    fn test_equipment_pool_prevents_double_booking() {
        let r = recipe(vec![steam_step(1, 60, 5.0)]);
        let scheduler = CampaignScheduler::new(1000.0, 15, 100);
        let pool = EquipmentPool::new(vec![
            EquipmentCalendar::new("R-101", vec![]),
            EquipmentCalendar::new("R-102", vec![]),
        ]);
        let request = CampaignRequest {
            recipe: &r,
            target_quantity: 3000.0,
            earliest_start: at(8, 0),
        };

        let plan = scheduler.schedule(&request, &steam_timeline(100.0), &pool).unwrap();

        let assigned: Vec<(Option<String>, NaiveDateTime)> = plan
            .placements
            .iter()
            .map(|p| (p.equipment_id.clone(), p.start))
            .collect();
        assert_eq!(
            assigned,
            vec![
                (Some("R-101".to_string()), at(8, 0)),
                (Some("R-102".to_string()), at(8, 0)),
                (Some("R-101".to_string()), at(9, 0)),
            ]
        );
    }

    #[test]
    fn test_duplicate_sequence_rejected() {
        let r = recipe(vec![steam_step(1, 60, 5.0), steam_step(1, 30, 5.0)]);
        assert!(matches!(
            validate_recipe(&r),
            Err(SchedulingError::InvalidInput(_))
        ));
    }
}
