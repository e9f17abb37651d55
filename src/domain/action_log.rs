// ==========================================
// 化工批次排产系统 - 操作日志领域模型
// ==========================================
// 红线: 所有写入必须记录
// 用途: 审计追踪
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ==========================================
// ActionLog - 操作日志
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLog {
    pub action_id: String,               // 日志ID
    pub action_type: String,             // 操作类型 (存储为字符串)
    pub action_ts: NaiveDateTime,        // 操作时间戳
    pub actor: String,                   // 操作人
    pub payload_json: Option<JsonValue>, // 操作参数 (JSON)
    pub detail: Option<String>,          // 详细描述
}

impl ActionLog {
    pub fn new(action_type: ActionType, actor: &str, payload: JsonValue, detail: String) -> Self {
        Self {
            action_id: uuid::Uuid::new_v4().to_string(),
            action_type: action_type.as_str().to_string(),
            action_ts: chrono::Local::now().naive_local(),
            actor: actor.to_string(),
            payload_json: Some(payload),
            detail: Some(detail),
        }
    }
}

// ==========================================
// ActionType - 操作类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    ScheduleCampaign,    // 排产活动
    MaterializeBatch,    // 单批次落地
    ScheduleMaintenance, // 登记检修
    RegisterMaterial,    // 建立物料（期初）
    ReceiveMaterial,     // 物料入库
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::ScheduleCampaign => "SCHEDULE_CAMPAIGN",
            ActionType::MaterializeBatch => "MATERIALIZE_BATCH",
            ActionType::ScheduleMaintenance => "SCHEDULE_MAINTENANCE",
            ActionType::RegisterMaterial => "REGISTER_MATERIAL",
            ActionType::ReceiveMaterial => "RECEIVE_MATERIAL",
        }
    }
}
