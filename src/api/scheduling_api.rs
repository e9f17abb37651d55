// ==========================================
// 化工批次排产系统 - 排产 API
// ==========================================
// 职责: 排产活动、单批次落地、设备冲突查询、检修登记、公用工程余量查询
// 流程: 加资源锁 → 仓储读取 → 引擎判定 → 单事务落库 → 操作日志
// 红线: 任一环节失败不留下部分写入
// ==========================================

use chrono::{NaiveDateTime, Timelike};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, instrument, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::api::resource_locks::{ResourceKey, ResourceLocks};
use crate::config::{ConfigManager, SchedulingConfig, SchedulingConfigReader};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::batch::{MaintenanceEvent, ScheduledBatch, ScheduledEvent};
use crate::domain::equipment::plant_capacity;
use crate::domain::material::{InventoryTransaction, Material};
use crate::domain::recipe::Recipe;
use crate::domain::timeline::TimeWindow;
use crate::domain::types::UtilityKind;
use crate::engine::batch_materializer::{
    BatchMaterializer, BatchRequest, MaterializationPlan, MaterializationWarning,
};
use crate::engine::campaign_scheduler::{CampaignRequest, CampaignScheduler};
use crate::engine::equipment_conflict::{EquipmentCalendar, EquipmentConflictDetector, EquipmentPool};
use crate::engine::utility_capacity::{PlantTimeline, UtilityCapacityTracker};
use crate::repository::{
    ActionLogRepository, BatchRepository, BatchWrite, EquipmentRepository, MaterialConsumption,
    MaterialRepository, RecipeRepository, RepositoryError, TimelineRepository,
};

// ==========================================
// 请求 / 响应
// ==========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignCommand {
    pub recipe_id: String,
    pub target_quantity: f64,
    pub earliest_start: NaiveDateTime,
    pub equipment_ids: Vec<String>, // 候选设备（按优先顺序）
    pub actor: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignOutcome {
    pub campaign_id: String,
    pub batches: Vec<ScheduledBatch>,
    pub ledger: Vec<InventoryTransaction>,
    pub warnings: Vec<MaterializationWarning>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchCommand {
    pub recipe_id: String,
    pub equipment_id: String,
    pub start: NaiveDateTime,
    pub batch_size: f64,
    pub actor: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub batch: ScheduledBatch,
    pub ledger: Vec<InventoryTransaction>,
    pub warnings: Vec<MaterializationWarning>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceCommand {
    pub equipment_id: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub reason: String,
    pub actor: String,
}

/// 公用工程余量视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilityCapacityView {
    pub utility: UtilityKind,
    pub window: TimeWindow,
    pub capacity: f64,
    pub peak_load: f64,
    pub available: f64,
}

// ==========================================
// SchedulingApi - 排产 API
// ==========================================
pub struct SchedulingApi {
    recipe_repo: Arc<RecipeRepository>,
    equipment_repo: Arc<EquipmentRepository>,
    material_repo: Arc<MaterialRepository>,
    batch_repo: Arc<BatchRepository>,
    timeline_repo: Arc<TimelineRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    config: Arc<ConfigManager>,
    locks: Arc<ResourceLocks>,
    detector: EquipmentConflictDetector,
}

impl SchedulingApi {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        recipe_repo: Arc<RecipeRepository>,
        equipment_repo: Arc<EquipmentRepository>,
        material_repo: Arc<MaterialRepository>,
        batch_repo: Arc<BatchRepository>,
        timeline_repo: Arc<TimelineRepository>,
        action_log_repo: Arc<ActionLogRepository>,
        config: Arc<ConfigManager>,
        locks: Arc<ResourceLocks>,
    ) -> Self {
        Self {
            recipe_repo,
            equipment_repo,
            material_repo,
            batch_repo,
            timeline_repo,
            action_log_repo,
            config,
            locks,
            detector: EquipmentConflictDetector::new(),
        }
    }

    /// 由共享连接装配全部仓储
    pub fn from_connection(conn: Arc<Mutex<Connection>>, locks: Arc<ResourceLocks>) -> ApiResult<Self> {
        let config = ConfigManager::from_connection(conn.clone())
            .map_err(|e| ApiError::InternalError(format!("配置管理器初始化失败: {}", e)))?;
        Ok(Self::new(
            Arc::new(RecipeRepository::new(conn.clone())),
            Arc::new(EquipmentRepository::new(conn.clone())),
            Arc::new(MaterialRepository::new(conn.clone())),
            Arc::new(BatchRepository::new(conn.clone())),
            Arc::new(TimelineRepository::new(conn.clone())),
            Arc::new(ActionLogRepository::new(conn)),
            Arc::new(config),
            locks,
        ))
    }

    // ==========================================
    // 排产活动
    // ==========================================

    /// 排产活动：拆批 → 逐批找时段 → 逐批物化 → 单事务落库
    ///
    /// # 返回
    /// - Ok(CampaignOutcome): 全部批次已落库
    /// - Err: InvalidInput / NotFound / InfeasibleSchedule / InsufficientInventory / EquipmentConflict
    #[instrument(skip(self, cmd), fields(recipe_id = %cmd.recipe_id, target_quantity = cmd.target_quantity))]
    pub fn schedule_campaign(&self, cmd: &CampaignCommand) -> ApiResult<CampaignOutcome> {
        if cmd.equipment_ids.is_empty() {
            return Err(ApiError::InvalidInput("候选设备不能为空".to_string()));
        }
        ensure_whole_second("earliest_start", cmd.earliest_start)?;
        let recipe = self.load_recipe(&cmd.recipe_id)?;
        for equipment_id in &cmd.equipment_ids {
            self.ensure_equipment(equipment_id)?;
        }
        let config = self.scheduling_config()?;

        let keys = lock_keys(&recipe, cmd.equipment_ids.iter());
        let handles = self.locks.handles(keys)?;
        let _guards = ResourceLocks::lock_all(&handles)?;

        let timeline = self.load_timeline(&recipe.demanded_utilities())?;
        let mut calendars = Vec::with_capacity(cmd.equipment_ids.len());
        for equipment_id in &cmd.equipment_ids {
            let events = self.batch_repo.find_events_by_equipment(equipment_id)?;
            calendars.push(EquipmentCalendar::new(equipment_id, events));
        }
        let pool = EquipmentPool::new(calendars);

        let scheduler = CampaignScheduler::from_config(&config);
        let request = CampaignRequest {
            recipe: &recipe,
            target_quantity: cmd.target_quantity,
            earliest_start: cmd.earliest_start,
        };
        let plan = scheduler.schedule(&request, &timeline, &pool)?;

        // 逐批物化；库存快照随批次滚动，整活动合计不足同样拒绝
        let campaign_id = uuid::Uuid::new_v4().to_string();
        let materializer = BatchMaterializer::new(config.default_batch_duration_minutes);
        let mut snapshot = self.material_snapshot(&recipe)?;
        let mut plans = Vec::with_capacity(plan.placements.len());
        for placement in &plan.placements {
            let equipment_id = placement.equipment_id.clone().ok_or_else(|| {
                ApiError::InternalError(format!("批次 {} 未分配设备", placement.batch_number))
            })?;
            let batch_request = BatchRequest {
                recipe: &recipe,
                equipment_id,
                start: placement.start,
                batch_size: placement.batch_size,
                end: Some(placement.end),
                usage: Some(placement.usage.clone()),
                campaign_id: Some(campaign_id.clone()),
                batch_number: placement.batch_number,
            };
            let materialized = materializer.plan(&batch_request, &snapshot, &plan.timeline)?;
            roll_snapshot(&mut snapshot, &materialized);
            plans.push(materialized);
        }

        let ledger = self.commit(&plans)?;

        let warnings: Vec<MaterializationWarning> =
            plans.iter().flat_map(|p| p.warnings.iter().cloned()).collect();
        let batches: Vec<ScheduledBatch> = plans.into_iter().map(|p| p.batch).collect();

        let config_snapshot = match self.config.get_config_snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "读取配置快照失败，审计记录不含配置");
                String::new()
            }
        };
        self.record_action(ActionLog::new(
            ActionType::ScheduleCampaign,
            &cmd.actor,
            json!({
                "campaign_id": campaign_id,
                "recipe_id": recipe.recipe_id,
                "recipe_version": recipe.version,
                "target_quantity": cmd.target_quantity,
                "earliest_start": cmd.earliest_start.to_string(),
                "equipment_ids": cmd.equipment_ids,
                "batch_ids": batches.iter().map(|b| b.batch_id.clone()).collect::<Vec<_>>(),
                "config": config_snapshot,
            }),
            format!(
                "排产活动 {}: {} 批, 目标产量 {}",
                campaign_id,
                batches.len(),
                cmd.target_quantity
            ),
        ));

        info!(
            campaign_id = %campaign_id,
            batches = batches.len(),
            warnings = warnings.len(),
            "排产活动已落库"
        );

        Ok(CampaignOutcome {
            campaign_id,
            batches,
            ledger,
            warnings,
        })
    }

    // ==========================================
    // 单批次落地
    // ==========================================

    /// 在指定设备与开始时间落地一个批次
    #[instrument(skip(self, cmd), fields(recipe_id = %cmd.recipe_id, equipment_id = %cmd.equipment_id, start = %cmd.start))]
    pub fn materialize_batch(&self, cmd: &BatchCommand) -> ApiResult<BatchOutcome> {
        ensure_whole_second("start", cmd.start)?;
        let recipe = self.load_recipe(&cmd.recipe_id)?;
        self.ensure_equipment(&cmd.equipment_id)?;
        let config = self.scheduling_config()?;

        let keys = lock_keys(&recipe, std::iter::once(&cmd.equipment_id));
        let handles = self.locks.handles(keys)?;
        let _guards = ResourceLocks::lock_all(&handles)?;

        let materializer = BatchMaterializer::new(config.default_batch_duration_minutes);
        let request = BatchRequest {
            recipe: &recipe,
            equipment_id: cmd.equipment_id.clone(),
            start: cmd.start,
            batch_size: cmd.batch_size,
            end: None,
            usage: None,
            campaign_id: None,
            batch_number: 1,
        };

        let window = TimeWindow {
            start: cmd.start,
            end: materializer.resolve_end(&request),
        };
        let events = self.batch_repo.find_events_by_equipment(&cmd.equipment_id)?;
        self.detector
            .ensure_available(&cmd.equipment_id, &window, &events, None)?;

        let timeline = self.load_timeline(&recipe.demanded_utilities())?;
        let snapshot = self.material_snapshot(&recipe)?;
        let plan = materializer.plan(&request, &snapshot, &timeline)?;

        let ledger = self.commit(std::slice::from_ref(&plan))?;

        self.record_action(ActionLog::new(
            ActionType::MaterializeBatch,
            &cmd.actor,
            json!({
                "batch_id": plan.batch.batch_id,
                "recipe_id": recipe.recipe_id,
                "recipe_version": recipe.version,
                "equipment_id": cmd.equipment_id,
                "start": cmd.start.to_string(),
                "end": plan.batch.end_time.to_string(),
                "batch_size": cmd.batch_size,
                "scale_factor": plan.batch.scale_factor,
            }),
            format!("单批次落地 {} @ {}", plan.batch.batch_id, cmd.equipment_id),
        ));

        info!(batch_id = %plan.batch.batch_id, ledger = ledger.len(), "批次已落库");

        Ok(BatchOutcome {
            batch: plan.batch,
            ledger,
            warnings: plan.warnings,
        })
    }

    // ==========================================
    // 设备冲突 / 检修
    // ==========================================

    /// 查询设备在时间窗内的冲突事件（无冲突返回空列表）
    pub fn check_equipment_conflicts(
        &self,
        equipment_id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        exclude_event_id: Option<&str>,
    ) -> ApiResult<Vec<ScheduledEvent>> {
        let window = TimeWindow::new(start, end)
            .ok_or_else(|| ApiError::InvalidInput(format!("时间窗起止倒置: {} > {}", start, end)))?;
        self.ensure_equipment(equipment_id)?;

        let events = self.batch_repo.find_events_by_equipment(equipment_id)?;
        Ok(self
            .detector
            .find_conflicts(equipment_id, &window, &events, exclude_event_id))
    }

    /// 登记检修窗口（与现有批次/检修冲突即拒绝）
    #[instrument(skip(self, cmd), fields(equipment_id = %cmd.equipment_id))]
    pub fn schedule_maintenance(&self, cmd: &MaintenanceCommand) -> ApiResult<MaintenanceEvent> {
        ensure_whole_second("start", cmd.start)?;
        ensure_whole_second("end", cmd.end)?;
        let window = TimeWindow::new(cmd.start, cmd.end)
            .filter(|w| !w.is_empty())
            .ok_or_else(|| ApiError::InvalidInput("检修时间窗必须满足 start < end".to_string()))?;
        self.ensure_equipment(&cmd.equipment_id)?;

        let handles = self
            .locks
            .handles([ResourceKey::Equipment(cmd.equipment_id.clone())])?;
        let _guards = ResourceLocks::lock_all(&handles)?;

        let events = self.batch_repo.find_events_by_equipment(&cmd.equipment_id)?;
        self.detector
            .ensure_available(&cmd.equipment_id, &window, &events, None)?;

        let event = MaintenanceEvent {
            event_id: uuid::Uuid::new_v4().to_string(),
            equipment_id: cmd.equipment_id.clone(),
            window,
            reason: cmd.reason.clone(),
            created_at: chrono::Local::now().naive_local(),
        };
        self.batch_repo
            .insert_maintenance(&event)
            .map_err(|e| self.resolve_booked(e))?;

        self.record_action(ActionLog::new(
            ActionType::ScheduleMaintenance,
            &cmd.actor,
            json!({
                "event_id": event.event_id,
                "equipment_id": event.equipment_id,
                "start": cmd.start.to_string(),
                "end": cmd.end.to_string(),
            }),
            format!("检修登记 {}: {}", cmd.equipment_id, cmd.reason),
        ));

        Ok(event)
    }

    // ==========================================
    // 公用工程余量
    // ==========================================

    /// 时间窗内某公用工程的能力、峰值负荷与余量
    pub fn utility_capacity(
        &self,
        utility: UtilityKind,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> ApiResult<UtilityCapacityView> {
        let window = TimeWindow::new(start, end)
            .ok_or_else(|| ApiError::InvalidInput(format!("时间窗起止倒置: {} > {}", start, end)))?;

        let timeline = self.load_timeline(&[utility])?;
        let capacity = timeline.capacity(utility);
        let peak_load = timeline
            .tracker(utility)
            .map(|t| t.peak_load(&window))
            .unwrap_or(0.0);

        Ok(UtilityCapacityView {
            utility,
            window,
            capacity,
            peak_load,
            available: (capacity - peak_load).max(0.0),
        })
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    fn load_recipe(&self, recipe_id: &str) -> ApiResult<Recipe> {
        self.recipe_repo
            .find_by_id(recipe_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Recipe(id={})不存在", recipe_id)))
    }

    fn ensure_equipment(&self, equipment_id: &str) -> ApiResult<()> {
        if self.equipment_repo.exists(equipment_id)? {
            Ok(())
        } else {
            Err(ApiError::NotFound(format!("Equipment(id={})不存在", equipment_id)))
        }
    }

    fn scheduling_config(&self) -> ApiResult<SchedulingConfig> {
        self.config
            .load_scheduling_config()
            .map_err(|e| ApiError::InternalError(format!("读取排产配置失败: {}", e)))
    }

    /// 全厂时间线：能力 = 设备额定能力合计，占用 = 已提交区间
    fn load_timeline(&self, utilities: &[UtilityKind]) -> ApiResult<PlantTimeline> {
        let equipment = self.equipment_repo.find_all()?;
        let mut timeline = PlantTimeline::new();
        for utility in utilities {
            let intervals = self.timeline_repo.find_by_utility(*utility)?;
            timeline.insert(UtilityCapacityTracker::with_intervals(
                *utility,
                plant_capacity(&equipment, *utility),
                intervals,
            ));
        }
        Ok(timeline)
    }

    fn material_snapshot(&self, recipe: &Recipe) -> ApiResult<HashMap<String, Material>> {
        let ids: Vec<String> = recipe
            .ingredients
            .iter()
            .map(|i| i.material_id.clone())
            .collect();
        Ok(self.material_repo.find_by_ids(&ids)?)
    }

    /// 写操作日志；业务数据已提交，日志失败只告警不回报
    fn record_action(&self, log: ActionLog) {
        if let Err(e) = self.action_log_repo.insert(&log) {
            warn!(
                action_type = %log.action_type,
                action_id = %log.action_id,
                error = %e,
                "操作日志写入失败"
            );
        }
    }

    fn commit(&self, plans: &[MaterializationPlan]) -> ApiResult<Vec<InventoryTransaction>> {
        let writes: Vec<BatchWrite<'_>> = plans
            .iter()
            .map(|p| BatchWrite {
                batch: &p.batch,
                usage: &p.usage,
                consumptions: p
                    .deductions
                    .iter()
                    .map(|d| MaterialConsumption {
                        material_id: d.material_id.clone(),
                        quantity: d.required_qty,
                    })
                    .collect(),
            })
            .collect();

        self.batch_repo
            .commit_materializations(&writes)
            .map_err(|e| self.resolve_booked(e))
    }

    /// 事务内复检到的设备占用 → 带事件明细的 EquipmentConflict
    fn resolve_booked(&self, err: RepositoryError) -> ApiError {
        if let RepositoryError::EquipmentBooked {
            equipment_id,
            event_id,
        } = &err
        {
            warn!(%equipment_id, %event_id, "提交时设备已被占用");
            if let Ok(events) = self.batch_repo.find_events_by_equipment(equipment_id) {
                let conflicts: Vec<ScheduledEvent> = events
                    .into_iter()
                    .filter(|e| &e.event_id == event_id)
                    .collect();
                if !conflicts.is_empty() {
                    return ApiError::EquipmentConflict {
                        equipment_id: equipment_id.clone(),
                        conflicts,
                    };
                }
            }
        }
        err.into()
    }
}

/// 落库时间精度为秒，带亚秒部分的输入直接拒绝
fn ensure_whole_second(field: &str, t: NaiveDateTime) -> ApiResult<()> {
    if t.nanosecond() == 0 {
        Ok(())
    } else {
        Err(ApiError::InvalidInput(format!(
            "{} 必须精确到秒: {}",
            field, t
        )))
    }
}

/// 用例涉及的全部资源键
fn lock_keys<'a, I>(recipe: &Recipe, equipment_ids: I) -> Vec<ResourceKey>
where
    I: Iterator<Item = &'a String>,
{
    recipe
        .demanded_utilities()
        .into_iter()
        .map(ResourceKey::Utility)
        .chain(equipment_ids.map(|id| ResourceKey::Equipment(id.clone())))
        .collect()
}

/// 按本批扣减结果更新快照，供同一活动后续批次判定
fn roll_snapshot(snapshot: &mut HashMap<String, Material>, plan: &MaterializationPlan) {
    for d in &plan.deductions {
        if let Some(m) = snapshot.get_mut(&d.material_id) {
            m.on_hand_qty = d.balance_after;
        }
    }
}
