// ==========================================
// 化工批次排产系统 - 行映射辅助
// ==========================================
// 时间统一以 "%Y-%m-%d %H:%M:%S" 文本存储（字典序 = 时间序）
// ==========================================

use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::Row;
use std::str::FromStr;

pub(crate) const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) fn ts_to_sql(t: &NaiveDateTime) -> String {
    t.format(TS_FORMAT).to_string()
}

pub(crate) fn ts_from_row(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&raw, TS_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// 文本列 → 领域枚举
pub(crate) fn enum_from_row<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}
