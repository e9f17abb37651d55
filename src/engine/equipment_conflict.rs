// ==========================================
// 化工批次排产系统 - 设备冲突检测
// ==========================================
// 职责: 找出目标设备上与候选时间窗重叠的全部事件（批次 + 检修）
// 红线: 冲突即硬拒绝，本引擎不自动改排
// ==========================================

use tracing::debug;

use crate::domain::batch::ScheduledEvent;
use crate::domain::timeline::TimeWindow;
use crate::engine::error::{SchedulingError, SchedulingResult};
use crate::engine::interval_math::overlaps;

#[derive(Debug, Default, Clone, Copy)]
pub struct EquipmentConflictDetector;

impl EquipmentConflictDetector {
    pub fn new() -> Self {
        Self
    }

    /// 查找冲突事件
    ///
    /// # 参数
    /// - `equipment_id`: 目标设备
    /// - `window`: 候选时间窗
    /// - `events`: 现有事件（可混有其它设备，按设备过滤）
    /// - `exclude_event_id`: 原地编辑时排除自身
    ///
    /// # 返回
    /// 冲突事件列表；无冲突返回空列表
    pub fn find_conflicts(
        &self,
        equipment_id: &str,
        window: &TimeWindow,
        events: &[ScheduledEvent],
        exclude_event_id: Option<&str>,
    ) -> Vec<ScheduledEvent> {
        events
            .iter()
            .filter(|e| e.equipment_id == equipment_id)
            .filter(|e| exclude_event_id.map_or(true, |id| e.event_id != id))
            .filter(|e| overlaps(window, &e.window))
            .cloned()
            .collect()
    }

    /// 断言设备在时间窗内空闲
    pub fn ensure_available(
        &self,
        equipment_id: &str,
        window: &TimeWindow,
        events: &[ScheduledEvent],
        exclude_event_id: Option<&str>,
    ) -> SchedulingResult<()> {
        let conflicts = self.find_conflicts(equipment_id, window, events, exclude_event_id);
        if conflicts.is_empty() {
            return Ok(());
        }

        debug!(
            equipment_id,
            start = %window.start,
            end = %window.end,
            conflicts = conflicts.len(),
            "设备时间冲突"
        );
        Err(SchedulingError::EquipmentConflict {
            equipment_id: equipment_id.to_string(),
            conflicts,
        })
    }
}

// ==========================================
// EquipmentCalendar - 单台设备的占用日历
// ==========================================
#[derive(Debug, Clone)]
pub struct EquipmentCalendar {
    pub equipment_id: String,
    pub events: Vec<ScheduledEvent>,
}

impl EquipmentCalendar {
    pub fn new(equipment_id: &str, events: Vec<ScheduledEvent>) -> Self {
        Self {
            equipment_id: equipment_id.to_string(),
            events,
        }
    }

    pub fn is_free(&self, detector: &EquipmentConflictDetector, window: &TimeWindow) -> bool {
        detector
            .find_conflicts(&self.equipment_id, window, &self.events, None)
            .is_empty()
    }
}

// ==========================================
// EquipmentPool - 候选设备池
// ==========================================
// 空设备池表示不做设备约束（仅公用工程排产）
#[derive(Debug, Clone, Default)]
pub struct EquipmentPool {
    calendars: Vec<EquipmentCalendar>,
}

impl EquipmentPool {
    pub fn unconstrained() -> Self {
        Self::default()
    }

    pub fn new(calendars: Vec<EquipmentCalendar>) -> Self {
        Self { calendars }
    }

    pub fn is_unconstrained(&self) -> bool {
        self.calendars.is_empty()
    }

    pub fn calendars(&self) -> &[EquipmentCalendar] {
        &self.calendars
    }

    /// 按给定顺序返回第一台空闲设备
    pub fn first_free(
        &self,
        detector: &EquipmentConflictDetector,
        window: &TimeWindow,
    ) -> Option<&str> {
        self.calendars
            .iter()
            .find(|c| c.is_free(detector, window))
            .map(|c| c.equipment_id.as_str())
    }

    /// 登记占用
    pub fn book(&mut self, event: ScheduledEvent) {
        if let Some(calendar) = self
            .calendars
            .iter_mut()
            .find(|c| c.equipment_id == event.equipment_id)
        {
            calendar.events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::EventKind;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn event(id: &str, equipment: &str, h1: u32, h2: u32, kind: EventKind) -> ScheduledEvent {
        ScheduledEvent {
            event_id: id.to_string(),
            equipment_id: equipment.to_string(),
            kind,
            window: TimeWindow::new(at(h1, 0), at(h2, 0)).unwrap(),
            label: id.to_string(),
        }
    }

    #[test]
    fn test_reports_every_overlap_shape() {
        let detector = EquipmentConflictDetector::new();
        let events = vec![
            event("starts-during", "R-101", 11, 14, EventKind::Batch),
            event("ends-during", "R-101", 8, 11, EventKind::Batch),
            event("contains", "R-101", 6, 16, EventKind::Maintenance),
            event("touching", "R-101", 12, 13, EventKind::Batch),
            event("other-equipment", "R-102", 10, 12, EventKind::Batch),
        ];
        let candidate = TimeWindow::new(at(10, 0), at(12, 0)).unwrap();

        let ids: Vec<String> = detector
            .find_conflicts("R-101", &candidate, &events, None)
            .into_iter()
            .map(|e| e.event_id)
            .collect();
        assert_eq!(ids, vec!["starts-during", "ends-during", "contains"]);
    }

    #[test]
    fn test_no_conflict_returns_empty() {
        let detector = EquipmentConflictDetector::new();
        let events = vec![event("a", "R-101", 8, 10, EventKind::Batch)];
        let candidate = TimeWindow::new(at(10, 0), at(12, 0)).unwrap();

        assert!(detector.find_conflicts("R-101", &candidate, &events, None).is_empty());
        assert!(detector.ensure_available("R-101", &candidate, &events, None).is_ok());
    }

    #[test]
    fn test_exclude_event_for_in_place_edit() {
        let detector = EquipmentConflictDetector::new();
        let events = vec![event("self", "R-101", 10, 12, EventKind::Batch)];
        let moved = TimeWindow::new(at(11, 0), at(13, 0)).unwrap();

        assert!(detector
            .ensure_available("R-101", &moved, &events, Some("self"))
            .is_ok());
        match detector.ensure_available("R-101", &moved, &events, None) {
            Err(SchedulingError::EquipmentConflict { conflicts, .. }) => {
                assert_eq!(conflicts.len(), 1)
            }
            other => panic!("Expected EquipmentConflict, got {:?}", other),
        }
    }

    #[test]
    fn test_pool_picks_first_free_in_order() {
        let detector = EquipmentConflictDetector::new();
        let mut pool = EquipmentPool::new(vec![
            EquipmentCalendar::new("R-101", vec![event("a", "R-101", 8, 12, EventKind::Batch)]),
            EquipmentCalendar::new("R-102", vec![]),
        ]);
        let window = TimeWindow::new(at(9, 0), at(10, 0)).unwrap();

        assert_eq!(pool.first_free(&detector, &window), Some("R-102"));
        pool.book(event("b", "R-102", 9, 10, EventKind::Batch));
        assert_eq!(pool.first_free(&detector, &window), None);
    }
}
