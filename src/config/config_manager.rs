// ==========================================
// 化工批次排产系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::scheduling_config_trait::{
    SchedulingConfigReader, DEFAULT_MAX_BATCHES_PER_CAMPAIGN, MAX_RETRY_INCREMENT_MINUTES,
};
use crate::db::open_sqlite_connection;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tracing::warn;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at)
             VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 从 config_kv 表读取配置值，带默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, Box<dyn Error>> {
        Ok(self.get_config_value(key)?.unwrap_or_else(|| default.to_string()))
    }

    /// 读取并解析，解析失败或不满足约束时回退默认值
    fn parse_or_default<T>(
        &self,
        key: &str,
        default: T,
        valid: impl Fn(&T) -> bool,
    ) -> Result<T, Box<dyn Error>>
    where
        T: std::str::FromStr + Copy + std::fmt::Display,
    {
        let raw = match self.get_config_value(key)? {
            Some(v) => v,
            None => return Ok(default),
        };
        match raw.trim().parse::<T>() {
            Ok(v) if valid(&v) => Ok(v),
            _ => {
                warn!(key, value = %raw, default = %default, "配置值无效，使用默认值");
                Ok(default)
            }
        }
    }

    /// 获取所有配置的快照（JSON格式）
    ///
    /// # 用途
    /// - 排产活动审计日志中记录当时的参数
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        let json_value = json!(config_map);
        Ok(serde_json::to_string(&json_value)?)
    }

    /// 从配置快照恢复配置
    ///
    /// # 返回
    /// - Ok(usize): 恢复的配置项数量
    ///
    /// # 注意
    /// - 此方法会覆盖现有的 global 配置
    pub fn restore_config_from_snapshot(&self, snapshot_json: &str) -> Result<usize, Box<dyn Error>> {
        let config_map: BTreeMap<String, String> = serde_json::from_str(snapshot_json)?;

        let mut conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let tx = conn.transaction()?;

        let mut count = 0;
        for (key, value) in config_map.iter() {
            count += tx.execute(
                "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
                 ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
                params![key, value],
            )?;
        }

        tx.commit()?;
        Ok(count)
    }
}

// ==========================================
// SchedulingConfigReader Trait 实现
// ==========================================
impl SchedulingConfigReader for ConfigManager {
    fn get_campaign_batch_size(&self) -> Result<f64, Box<dyn Error>> {
        self.parse_or_default(config_keys::CAMPAIGN_BATCH_SIZE, 1000.0, |v: &f64| {
            v.is_finite() && *v > 0.0
        })
    }

    fn get_retry_increment_minutes(&self) -> Result<i64, Box<dyn Error>> {
        self.parse_or_default(config_keys::RETRY_INCREMENT_MINUTES, 15, |v: &i64| {
            *v > 0 && *v <= MAX_RETRY_INCREMENT_MINUTES
        })
    }

    fn get_max_retry_steps(&self) -> Result<u32, Box<dyn Error>> {
        self.parse_or_default(config_keys::MAX_RETRY_STEPS, 2880, |_: &u32| true)
    }

    fn get_max_batches_per_campaign(&self) -> Result<u32, Box<dyn Error>> {
        self.parse_or_default(
            config_keys::MAX_BATCHES_PER_CAMPAIGN,
            DEFAULT_MAX_BATCHES_PER_CAMPAIGN,
            |v: &u32| *v > 0,
        )
    }

    fn get_default_batch_duration_minutes(&self) -> Result<i64, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::DEFAULT_BATCH_DURATION_MINUTES, "480")?;
        Ok(value.trim().parse::<i64>().ok().filter(|m| *m > 0).unwrap_or(480))
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 排产活动
    pub const CAMPAIGN_BATCH_SIZE: &str = "campaign_batch_size";
    pub const RETRY_INCREMENT_MINUTES: &str = "retry_increment_minutes";
    pub const MAX_RETRY_STEPS: &str = "max_retry_steps";
    pub const MAX_BATCHES_PER_CAMPAIGN: &str = "max_batches_per_campaign";

    // 单批次
    pub const DEFAULT_BATCH_DURATION_MINUTES: &str = "default_batch_duration_minutes";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulingConfig;

    fn setup() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_defaults_when_table_empty() {
        let config = setup().load_scheduling_config().unwrap();
        assert_eq!(config, SchedulingConfig::default());
    }

    #[test]
    fn test_overrides_and_invalid_values() {
        let manager = setup();
        manager.set_global_config_value(config_keys::CAMPAIGN_BATCH_SIZE, "500").unwrap();
        manager.set_global_config_value(config_keys::RETRY_INCREMENT_MINUTES, "-5").unwrap();
        manager.set_global_config_value(config_keys::MAX_RETRY_STEPS, "96").unwrap();
        manager.set_global_config_value(config_keys::MAX_BATCHES_PER_CAMPAIGN, "0").unwrap();
        manager
            .set_global_config_value(config_keys::DEFAULT_BATCH_DURATION_MINUTES, "abc")
            .unwrap();

        let config = manager.load_scheduling_config().unwrap();
        assert_eq!(config.batch_size, 500.0);
        assert_eq!(config.retry_increment_minutes, 15);
        assert_eq!(config.max_retry_steps, 96);
        assert_eq!(config.max_batches_per_campaign, 1000);
        assert_eq!(config.default_batch_duration_minutes, 480);
    }

    #[test]
    fn test_retry_increment_upper_bound() {
        let manager = setup();
        manager
            .set_global_config_value(config_keys::RETRY_INCREMENT_MINUTES, "1440")
            .unwrap();
        assert_eq!(manager.get_retry_increment_minutes().unwrap(), 1440);

        manager
            .set_global_config_value(config_keys::RETRY_INCREMENT_MINUTES, "9223372036854775807")
            .unwrap();
        assert_eq!(manager.get_retry_increment_minutes().unwrap(), 15);

        // 越界值回落默认后可直接构造引擎
        let config = manager.load_scheduling_config().unwrap();
        let scheduler = crate::engine::CampaignScheduler::from_config(&config);
        assert_eq!(scheduler.batch_size(), 1000.0);
    }

    #[test]
    fn test_snapshot_round_trip_through_restore() {
        let manager = setup();
        manager.set_global_config_value(config_keys::MAX_RETRY_STEPS, "10").unwrap();
        let snapshot = manager.get_config_snapshot().unwrap();

        manager.set_global_config_value(config_keys::MAX_RETRY_STEPS, "99").unwrap();
        assert_eq!(manager.restore_config_from_snapshot(&snapshot).unwrap(), 1);
        assert_eq!(manager.get_max_retry_steps().unwrap(), 10);
    }
}
