// ==========================================
// 化工批次排产系统 - 区间运算
// ==========================================
// 职责: 重叠判定、关键时间点扫描
// 红线: 无状态纯函数；区间一律左闭右开
// ==========================================

use chrono::NaiveDateTime;
use std::collections::BTreeSet;

use crate::domain::timeline::TimeWindow;

/// 左闭右开重叠判定：首尾相接不算重叠
///
/// 同时覆盖"在窗口内开始"、"在窗口内结束"、"包含/被包含"三种形态。
#[inline]
pub fn overlaps(a: &TimeWindow, b: &TimeWindow) -> bool {
    a.start < b.end && b.start < a.end
}

/// 关键时间点：窗口两端 + 所有严格落在窗口内部的区间端点（升序、去重）
///
/// 相邻两点之间负荷恒定，因此每段取一个采样点即可精确判定。
pub fn critical_points<'a, I>(
    window_start: NaiveDateTime,
    window_end: NaiveDateTime,
    windows: I,
) -> Vec<NaiveDateTime>
where
    I: IntoIterator<Item = &'a TimeWindow>,
{
    let mut points = BTreeSet::new();
    points.insert(window_start);
    points.insert(window_end);

    for w in windows {
        for t in [w.start, w.end] {
            if window_start < t && t < window_end {
                points.insert(t);
            }
        }
    }

    points.into_iter().collect()
}

/// 两个时间点的中点
#[inline]
pub fn midpoint(a: NaiveDateTime, b: NaiveDateTime) -> NaiveDateTime {
    a + (b - a) / 2
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

    fn w(h1: u32, m1: u32, h2: u32, m2: u32) -> TimeWindow {
        TimeWindow::new(at(h1, m1), at(h2, m2)).unwrap()
    }

    #[test]
    fn test_touching_windows_do_not_overlap() {
        assert!(!overlaps(&w(8, 0, 10, 0), &w(10, 0, 12, 0)));
        assert!(!overlaps(&w(10, 0, 12, 0), &w(8, 0, 10, 0)));
    }

    #[test]
    fn test_overlap_shapes() {
        let candidate = w(10, 0, 12, 0);
        // 在候选窗口内开始
        assert!(overlaps(&candidate, &w(11, 0, 13, 0)));
        // 在候选窗口内结束
        assert!(overlaps(&candidate, &w(9, 0, 10, 30)));
        // 完全包含候选窗口
        assert!(overlaps(&candidate, &w(9, 0, 13, 0)));
        // 被候选窗口包含
        assert!(overlaps(&candidate, &w(10, 30, 11, 0)));
        // 完全相同
        assert!(overlaps(&candidate, &w(10, 0, 12, 0)));
        // 完全分离
        assert!(!overlaps(&candidate, &w(13, 0, 14, 0)));
    }

    #[test]
    fn test_critical_points_keep_only_interior_boundaries() {
        let committed = vec![w(7, 0, 9, 0), w(8, 30, 11, 0), w(9, 0, 9, 45), w(12, 0, 13, 0)];
        let points = critical_points(at(8, 0), at(10, 0), committed.iter());

        assert_eq!(points, vec![at(8, 0), at(8, 30), at(9, 0), at(9, 45), at(10, 0)]);
    }

    #[test]
    fn test_critical_points_without_intervals() {
        let points = critical_points(at(8, 0), at(10, 0), std::iter::empty());
        assert_eq!(points, vec![at(8, 0), at(10, 0)]);
    }

    #[test]
    fn test_midpoint() {
        assert_eq!(midpoint(at(8, 0), at(10, 0)), at(9, 0));
        assert_eq!(midpoint(at(8, 0), at(8, 1)), at(8, 0) + chrono::Duration::seconds(30));
    }
}
