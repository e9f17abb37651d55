// ==========================================
// 化工批次排产系统 - 领域类型定义
// ==========================================
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 公用工程类型 (Utility Kind)
// ==========================================
// 红线: 每次可行性检查只针对一种公用工程
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UtilityKind {
    Steam,        // 蒸汽
    CoolingWater, // 循环冷却水
    Electricity,  // 电力
    Nitrogen,     // 氮气
}

impl UtilityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UtilityKind::Steam => "STEAM",
            UtilityKind::CoolingWater => "COOLING_WATER",
            UtilityKind::Electricity => "ELECTRICITY",
            UtilityKind::Nitrogen => "NITROGEN",
        }
    }
}

impl fmt::Display for UtilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UtilityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "STEAM" => Ok(UtilityKind::Steam),
            "COOLING_WATER" => Ok(UtilityKind::CoolingWater),
            "ELECTRICITY" => Ok(UtilityKind::Electricity),
            "NITROGEN" => Ok(UtilityKind::Nitrogen),
            other => Err(format!("未知公用工程类型: {}", other)),
        }
    }
}

// ==========================================
// 批次状态 (Batch Status)
// ==========================================
// 本引擎只创建 SCHEDULED；后续流转由外部协作方负责
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Scheduled,  // 已排产
    InProgress, // 生产中
    Completed,  // 已完工
    Cancelled,  // 已取消
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Scheduled => "SCHEDULED",
            BatchStatus::InProgress => "IN_PROGRESS",
            BatchStatus::Completed => "COMPLETED",
            BatchStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCHEDULED" => Ok(BatchStatus::Scheduled),
            "IN_PROGRESS" => Ok(BatchStatus::InProgress),
            "COMPLETED" => Ok(BatchStatus::Completed),
            "CANCELLED" => Ok(BatchStatus::Cancelled),
            other => Err(format!("未知批次状态: {}", other)),
        }
    }
}

// ==========================================
// 设备占用事件类型 (Event Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Batch,       // 生产批次
    Maintenance, // 检修窗口
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Batch => write!(f, "BATCH"),
            EventKind::Maintenance => write!(f, "MAINTENANCE"),
        }
    }
}

// ==========================================
// 库存流水类型 (Transaction Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Opening,  // 期初
    Received, // 入库
    Consumed, // 批次消耗
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Opening => "OPENING",
            TransactionType::Received => "RECEIVED",
            TransactionType::Consumed => "CONSUMED",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPENING" => Ok(TransactionType::Opening),
            "RECEIVED" => Ok(TransactionType::Received),
            "CONSUMED" => Ok(TransactionType::Consumed),
            other => Err(format!("未知流水类型: {}", other)),
        }
    }
}
