// ==========================================
// 化工批次排产系统 - 排产批次与设备占用
// ==========================================
// 红线: 批次开始/结束时间一经提交不在本引擎内修改
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::timeline::TimeWindow;
use crate::domain::types::{BatchStatus, EventKind};

// ==========================================
// ScheduledBatch - 排产批次
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledBatch {
    pub batch_id: String,            // 批次ID
    pub recipe_id: String,           // 配方ID
    pub recipe_version: i32,         // 排产时冻结的配方版本
    pub equipment_id: String,        // 设备ID
    pub campaign_id: Option<String>, // 所属排产活动（单批次为空）
    pub batch_number: i32,           // 活动内批次序号（从1开始）
    pub batch_size: f64,             // 批量
    pub scale_factor: f64,           // 相对标准产量的缩放系数
    pub start_time: NaiveDateTime,   // 开始时间
    pub end_time: NaiveDateTime,     // 结束时间
    pub status: BatchStatus,         // 状态
    pub created_at: NaiveDateTime,   // 创建时间
}

impl ScheduledBatch {
    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.start_time,
            end: self.end_time,
        }
    }

    /// 转为设备占用事件
    pub fn as_event(&self) -> ScheduledEvent {
        ScheduledEvent {
            event_id: self.batch_id.clone(),
            equipment_id: self.equipment_id.clone(),
            kind: EventKind::Batch,
            window: self.window(),
            label: format!("{}#{}", self.recipe_id, self.batch_number),
        }
    }
}

// ==========================================
// MaintenanceEvent - 检修窗口
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceEvent {
    pub event_id: String,
    pub equipment_id: String,
    pub window: TimeWindow,
    pub reason: String,
    pub created_at: NaiveDateTime,
}

impl MaintenanceEvent {
    pub fn as_event(&self) -> ScheduledEvent {
        ScheduledEvent {
            event_id: self.event_id.clone(),
            equipment_id: self.equipment_id.clone(),
            kind: EventKind::Maintenance,
            window: self.window,
            label: self.reason.clone(),
        }
    }
}

// ==========================================
// ScheduledEvent - 设备占用的统一视图（批次 + 检修）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub event_id: String,
    pub equipment_id: String,
    pub kind: EventKind,
    pub window: TimeWindow,
    pub label: String, // 展示用说明
}
