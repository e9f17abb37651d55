// ==========================================
// 化工批次排产系统 - 时间窗与资源占用区间
// ==========================================
// 红线: 时间窗一律为左闭右开 [start, end)
// ==========================================

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::domain::types::UtilityKind;

// ==========================================
// TimeWindow - 左闭右开时间窗
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDateTime, // 开始（含）
    pub end: NaiveDateTime,   // 结束（不含）
}

impl TimeWindow {
    /// 创建时间窗
    ///
    /// # 返回
    /// - Some: start <= end
    /// - None: 起止倒置
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Option<Self> {
        if start <= end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    /// 从开始时间和分钟数创建
    pub fn from_minutes(start: NaiveDateTime, minutes: i64) -> Self {
        Self {
            start,
            end: start + Duration::minutes(minutes.max(0)),
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// t 是否落在窗口内（左闭右开）
    pub fn contains(&self, t: NaiveDateTime) -> bool {
        self.start <= t && t < self.end
    }

    /// 整体平移
    pub fn shifted(&self, offset: Duration) -> Self {
        Self {
            start: self.start + offset,
            end: self.end + offset,
        }
    }
}

// ==========================================
// ResourceUsageInterval - 公用工程占用区间
// ==========================================
// 红线: 提交后不可修改，只追加
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsageInterval {
    pub interval_id: String,      // 区间ID
    pub utility: UtilityKind,     // 公用工程类型
    pub window: TimeWindow,       // 占用时间窗
    pub load: f64,                // 负荷
    pub batch_id: Option<String>, // 关联批次（预排阶段为空）
}

impl ResourceUsageInterval {
    pub fn new(utility: UtilityKind, window: TimeWindow, load: f64) -> Self {
        Self {
            interval_id: uuid::Uuid::new_v4().to_string(),
            utility,
            window,
            load,
            batch_id: None,
        }
    }

    pub fn with_batch(mut self, batch_id: &str) -> Self {
        self.batch_id = Some(batch_id.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_window_rejects_inverted_bounds() {
        assert!(TimeWindow::new(at(10, 0), at(9, 0)).is_none());
        assert!(TimeWindow::new(at(9, 0), at(9, 0)).unwrap().is_empty());
    }

    #[test]
    fn test_window_contains_is_half_open() {
        let w = TimeWindow::from_minutes(at(8, 0), 60);
        assert!(w.contains(at(8, 0)));
        assert!(w.contains(at(8, 59)));
        assert!(!w.contains(at(9, 0)));
        assert_eq!(w.duration(), Duration::minutes(60));
    }
}
