// ==========================================
// 化工批次排产系统 - 物料与库存流水领域模型
// ==========================================
// 红线: 现存量不得为负；每次变动必须配一条流水
// 不变量: 流水带符号数量按时间顺序求和 = 现存量
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::types::TransactionType;

// ==========================================
// Material - 物料
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    pub material_id: String,       // 物料ID
    pub name: String,              // 物料名称
    pub unit: String,              // 计量单位
    pub on_hand_qty: f64,          // 现存量
    pub min_stock_qty: f64,        // 最低库存
    pub updated_at: NaiveDateTime, // 更新时间
}

impl Material {
    /// 是否低于最低库存
    pub fn is_below_minimum(&self) -> bool {
        self.on_hand_qty < self.min_stock_qty
    }
}

// ==========================================
// InventoryTransaction - 库存流水（只追加）
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryTransaction {
    pub transaction_id: String,             // 流水ID
    pub material_id: String,                // 物料ID
    pub transaction_type: TransactionType,  // 流水类型
    pub quantity: f64,                      // 带符号数量（消耗为负）
    pub balance_after: f64,                 // 变动后结存
    pub batch_id: Option<String>,           // 关联批次
    pub reference: Option<String>,          // 外部单据号
    pub created_at: NaiveDateTime,          // 发生时间
}

// ==========================================
// LedgerReconciliation - 台账核对结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerReconciliation {
    pub material_id: String,
    pub on_hand_qty: f64,       // 物料表现存量
    pub ledger_sum: f64,        // 流水合计
    pub last_balance: Option<f64>, // 最后一条流水的结存
    pub transaction_count: usize,
    pub consistent: bool,
}
