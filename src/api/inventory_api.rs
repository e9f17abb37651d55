// ==========================================
// 化工批次排产系统 - 库存 API
// ==========================================
// 职责: 物料建档（期初）、入库、低库存查询、流水查询、台账核对
// 红线: 现存量只经由流水变动；所有写入必须记录操作日志
// ==========================================

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::material::{InventoryTransaction, LedgerReconciliation, Material};
use crate::repository::{ActionLogRepository, MaterialRepository};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialRegistration {
    pub material_id: String,
    pub name: String,
    pub unit: String,
    pub opening_qty: f64,
    pub min_stock_qty: f64,
    pub reference: Option<String>,
    pub actor: String,
}

// ==========================================
// InventoryApi - 库存 API
// ==========================================
pub struct InventoryApi {
    material_repo: Arc<MaterialRepository>,
    action_log_repo: Arc<ActionLogRepository>,
}

impl InventoryApi {
    pub fn new(material_repo: Arc<MaterialRepository>, action_log_repo: Arc<ActionLogRepository>) -> Self {
        Self {
            material_repo,
            action_log_repo,
        }
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self::new(
            Arc::new(MaterialRepository::new(conn.clone())),
            Arc::new(ActionLogRepository::new(conn)),
        )
    }

    /// 建立物料，期初量经由 OPENING 流水入账
    pub fn register_material(&self, reg: &MaterialRegistration) -> ApiResult<Material> {
        if reg.material_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("物料ID不能为空".to_string()));
        }
        if !reg.opening_qty.is_finite() || reg.opening_qty < 0.0 {
            return Err(ApiError::InvalidInput(format!(
                "期初量必须为非负数: {}",
                reg.opening_qty
            )));
        }
        if !reg.min_stock_qty.is_finite() || reg.min_stock_qty < 0.0 {
            return Err(ApiError::InvalidInput(format!(
                "最低库存必须为非负数: {}",
                reg.min_stock_qty
            )));
        }

        let material = Material {
            material_id: reg.material_id.trim().to_string(),
            name: reg.name.clone(),
            unit: reg.unit.clone(),
            on_hand_qty: reg.opening_qty,
            min_stock_qty: reg.min_stock_qty,
            updated_at: chrono::Local::now().naive_local(),
        };
        self.material_repo
            .insert_with_opening(&material, reg.reference.as_deref())?;

        self.record_action(ActionLog::new(
            ActionType::RegisterMaterial,
            &reg.actor,
            json!({
                "material_id": material.material_id,
                "opening_qty": reg.opening_qty,
                "min_stock_qty": reg.min_stock_qty,
            }),
            format!("物料建档 {} 期初 {}", material.material_id, reg.opening_qty),
        ));

        info!(material_id = %material.material_id, opening_qty = reg.opening_qty, "物料建档");
        Ok(material)
    }

    /// 物料入库
    pub fn receive_material(
        &self,
        material_id: &str,
        quantity: f64,
        reference: Option<&str>,
        actor: &str,
    ) -> ApiResult<InventoryTransaction> {
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(ApiError::InvalidInput(format!("入库数量必须为正数: {}", quantity)));
        }

        let at: NaiveDateTime = chrono::Local::now().naive_local();
        let txn = self.material_repo.receive(material_id, quantity, reference, at)?;

        self.record_action(ActionLog::new(
            ActionType::ReceiveMaterial,
            actor,
            json!({
                "material_id": material_id,
                "quantity": quantity,
                "reference": reference,
                "balance_after": txn.balance_after,
            }),
            format!("物料入库 {} +{}", material_id, quantity),
        ));

        Ok(txn)
    }

    /// 写操作日志；库存已变动，日志失败只告警不回报
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

    pub fn get_material(&self, material_id: &str) -> ApiResult<Material> {
        self.material_repo
            .find_by_id(material_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Material(id={})不存在", material_id)))
    }

    /// 低于最低库存的物料
    pub fn list_low_stock(&self) -> ApiResult<Vec<Material>> {
        Ok(self.material_repo.find_below_minimum()?)
    }

    /// 物料流水（按发生顺序）
    pub fn list_transactions(&self, material_id: &str) -> ApiResult<Vec<InventoryTransaction>> {
        self.get_material(material_id)?;
        Ok(self.material_repo.list_transactions(material_id)?)
    }

    /// 台账核对
    pub fn reconcile_ledger(&self, material_id: &str) -> ApiResult<LedgerReconciliation> {
        let rec = self.material_repo.reconcile(material_id)?;
        if !rec.consistent {
            warn!(
                material_id,
                on_hand = rec.on_hand_qty,
                ledger_sum = rec.ledger_sum,
                "台账与现存量不一致"
            );
        }
        Ok(rec)
    }
}
