// ==========================================
// 化工批次排产系统 - 公用工程占用区间仓储
// ==========================================
// 红线: 只追加，不提供更新/删除
// ==========================================

use crate::domain::timeline::{ResourceUsageInterval, TimeWindow};
use crate::domain::types::UtilityKind;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_codec::{enum_from_row, ts_from_row, ts_to_sql};
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// TimelineRepository - 占用区间仓储
// ==========================================
pub struct TimelineRepository {
    conn: Arc<Mutex<Connection>>,
}

impl TimelineRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 单独写入一条占用（不关联批次的预留）
    pub fn insert(&self, interval: &ResourceUsageInterval) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        insert_interval(&conn, interval)
    }

    /// 某公用工程的全部已提交占用（按开始时间升序）
    pub fn find_by_utility(&self, utility: UtilityKind) -> RepositoryResult<Vec<ResourceUsageInterval>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT interval_id, utility, start_time, end_time, load, batch_id
            FROM resource_usage_interval
            WHERE utility = ?1
            ORDER BY start_time, rowid
            "#,
        )?;
        let intervals = stmt
            .query_map(params![utility.as_str()], map_interval)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(intervals)
    }

    /// 与时间窗重叠的占用（左闭右开）
    pub fn find_overlapping(
        &self,
        utility: UtilityKind,
        window: &TimeWindow,
    ) -> RepositoryResult<Vec<ResourceUsageInterval>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT interval_id, utility, start_time, end_time, load, batch_id
            FROM resource_usage_interval
            WHERE utility = ?1 AND start_time < ?3 AND end_time > ?2
            ORDER BY start_time, rowid
            "#,
        )?;
        let intervals = stmt
            .query_map(
                params![utility.as_str(), ts_to_sql(&window.start), ts_to_sql(&window.end)],
                map_interval,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(intervals)
    }

    pub fn find_by_batch(&self, batch_id: &str) -> RepositoryResult<Vec<ResourceUsageInterval>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT interval_id, utility, start_time, end_time, load, batch_id
            FROM resource_usage_interval
            WHERE batch_id = ?1
            ORDER BY start_time, utility
            "#,
        )?;
        let intervals = stmt
            .query_map(params![batch_id], map_interval)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(intervals)
    }

    pub fn count(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let n = conn.query_row("SELECT COUNT(*) FROM resource_usage_interval", [], |row| row.get(0))?;
        Ok(n)
    }
}

fn map_interval(row: &Row<'_>) -> SqliteResult<ResourceUsageInterval> {
    Ok(ResourceUsageInterval {
        interval_id: row.get(0)?,
        utility: enum_from_row(row, 1)?,
        window: TimeWindow {
            start: ts_from_row(row, 2)?,
            end: ts_from_row(row, 3)?,
        },
        load: row.get(4)?,
        batch_id: row.get(5)?,
    })
}

pub(crate) fn insert_interval(conn: &Connection, interval: &ResourceUsageInterval) -> RepositoryResult<()> {
    conn.execute(
        r#"
        INSERT INTO resource_usage_interval (
            interval_id, utility, start_time, end_time, load, batch_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            interval.interval_id,
            interval.utility.as_str(),
            ts_to_sql(&interval.window.start),
            ts_to_sql(&interval.window.end),
            interval.load,
            interval.batch_id,
        ],
    )?;
    Ok(())
}
