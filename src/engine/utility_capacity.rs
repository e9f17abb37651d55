// ==========================================
// 化工批次排产系统 - 公用工程能力跟踪
// ==========================================
// 职责: 判定"在 [start, end) 追加负荷 L 后是否仍不超能力 C"
// 方法: 关键点扫描 + 分段中点采样（负荷分段恒定，采样精确）
// 红线: 提交不复检，调用方必须先调用 feasible
// ==========================================

use chrono::NaiveDateTime;
use std::collections::BTreeMap;

use crate::domain::timeline::{ResourceUsageInterval, TimeWindow};
use crate::domain::types::UtilityKind;
use crate::engine::interval_math::{critical_points, midpoint};

/// 负荷比较容差（避免浮点累加误差误判）
pub const LOAD_EPSILON: f64 = 1e-9;

// ==========================================
// UtilityCapacityTracker - 单一公用工程时间线
// ==========================================
#[derive(Debug, Clone)]
pub struct UtilityCapacityTracker {
    utility: UtilityKind,
    capacity: f64,
    // 按 start 升序，便于二分定位重叠子集
    committed: Vec<ResourceUsageInterval>,
}

impl UtilityCapacityTracker {
    pub fn new(utility: UtilityKind, capacity: f64) -> Self {
        Self {
            utility,
            capacity: if capacity.is_finite() { capacity.max(0.0) } else { 0.0 },
            committed: Vec::new(),
        }
    }

    /// 以已提交区间初始化（忽略其它公用工程与零负荷区间）
    pub fn with_intervals<I>(utility: UtilityKind, capacity: f64, intervals: I) -> Self
    where
        I: IntoIterator<Item = ResourceUsageInterval>,
    {
        let mut tracker = Self::new(utility, capacity);
        let mut committed: Vec<ResourceUsageInterval> = intervals
            .into_iter()
            .filter(|iv| iv.utility == utility && iv.load > 0.0 && !iv.window.is_empty())
            .collect();
        committed.sort_by_key(|iv| iv.window.start);
        tracker.committed = committed;
        tracker
    }

    pub fn utility(&self) -> UtilityKind {
        self.utility
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn committed(&self) -> &[ResourceUsageInterval] {
        &self.committed
    }

    /// 与 [start, end) 重叠的已提交区间
    fn overlapping(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> impl Iterator<Item = &ResourceUsageInterval> + '_ {
        let upper = self.committed.partition_point(|iv| iv.window.start < end);
        self.committed[..upper]
            .iter()
            .filter(move |iv| iv.window.end > start)
    }

    /// 可行性判定
    ///
    /// # 规则
    /// - 负荷 <= 0：恒可行
    /// - 空窗口：恒可行
    /// - 任一恒负荷段内 已有负荷 + 候选负荷 > 能力 → 不可行
    pub fn feasible(&self, start: NaiveDateTime, end: NaiveDateTime, load: f64) -> bool {
        if load <= 0.0 || start >= end {
            return true;
        }
        if load > self.capacity + LOAD_EPSILON {
            return false;
        }

        let overlapping: Vec<&ResourceUsageInterval> = self.overlapping(start, end).collect();
        if overlapping.is_empty() {
            return true;
        }

        let points = critical_points(start, end, overlapping.iter().map(|iv| &iv.window));
        points.windows(2).all(|pair| {
            let sample_at = midpoint(pair[0], pair[1]);
            let existing: f64 = overlapping
                .iter()
                .filter(|iv| iv.window.contains(sample_at))
                .map(|iv| iv.load)
                .sum();
            existing + load <= self.capacity + LOAD_EPSILON
        })
    }

    /// 提交占用区间（零负荷不记录）
    pub fn commit(&mut self, window: TimeWindow, load: f64) -> Option<ResourceUsageInterval> {
        if load <= 0.0 || window.is_empty() {
            return None;
        }
        let interval = ResourceUsageInterval::new(self.utility, window, load);
        self.insert_sorted(interval.clone());
        Some(interval)
    }

    fn insert_sorted(&mut self, interval: ResourceUsageInterval) {
        let idx = self
            .committed
            .partition_point(|iv| iv.window.start <= interval.window.start);
        self.committed.insert(idx, interval);
    }

    /// t 时刻的总负荷
    pub fn load_at(&self, t: NaiveDateTime) -> f64 {
        self.committed
            .iter()
            .filter(|iv| iv.window.contains(t))
            .map(|iv| iv.load)
            .sum()
    }

    /// 窗口内的峰值负荷
    pub fn peak_load(&self, window: &TimeWindow) -> f64 {
        if window.is_empty() {
            return 0.0;
        }
        let overlapping: Vec<&ResourceUsageInterval> =
            self.overlapping(window.start, window.end).collect();
        let points = critical_points(window.start, window.end, overlapping.iter().map(|iv| &iv.window));
        points
            .windows(2)
            .map(|pair| {
                let sample_at = midpoint(pair[0], pair[1]);
                overlapping
                    .iter()
                    .filter(|iv| iv.window.contains(sample_at))
                    .map(|iv| iv.load)
                    .sum::<f64>()
            })
            .fold(0.0, f64::max)
    }
}

// ==========================================
// PlantTimeline - 全厂公用工程时间线
// ==========================================
// 显式值对象：传入调度调用、再从结果中取回，不使用全局状态
#[derive(Debug, Clone, Default)]
pub struct PlantTimeline {
    trackers: BTreeMap<UtilityKind, UtilityCapacityTracker>,
}

impl PlantTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tracker: UtilityCapacityTracker) {
        self.trackers.insert(tracker.utility(), tracker);
    }

    pub fn tracker(&self, utility: UtilityKind) -> Option<&UtilityCapacityTracker> {
        self.trackers.get(&utility)
    }

    pub fn utilities(&self) -> impl Iterator<Item = UtilityKind> + '_ {
        self.trackers.keys().copied()
    }

    /// 全厂能力（无跟踪器视为无源设备，能力为 0）
    pub fn capacity(&self, utility: UtilityKind) -> f64 {
        self.trackers.get(&utility).map(|t| t.capacity()).unwrap_or(0.0)
    }

    pub fn feasible(
        &self,
        utility: UtilityKind,
        start: NaiveDateTime,
        end: NaiveDateTime,
        load: f64,
    ) -> bool {
        match self.trackers.get(&utility) {
            Some(tracker) => tracker.feasible(start, end, load),
            None => load <= 0.0 || start >= end,
        }
    }

    /// 提交占用；无跟踪器时按能力 0 建立（调用方须已判定可行）
    pub fn commit(
        &mut self,
        utility: UtilityKind,
        window: TimeWindow,
        load: f64,
    ) -> Option<ResourceUsageInterval> {
        self.trackers
            .entry(utility)
            .or_insert_with(|| UtilityCapacityTracker::new(utility, 0.0))
            .commit(window, load)
    }
}
