// ==========================================
// 化工批次排产系统 - SQLite 连接初始化与建库
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键、busy_timeout）
// - 统一建库脚本，库存非负由 CHECK 约束兜底
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 建库（幂等）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id    TEXT NOT NULL,
    key         TEXT NOT NULL,
    value       TEXT NOT NULL,
    updated_at  TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

-- ===== 配方 =====
CREATE TABLE IF NOT EXISTS recipe (
    recipe_id               TEXT PRIMARY KEY,
    name                    TEXT NOT NULL,
    version                 INTEGER NOT NULL DEFAULT 1,
    standard_yield          REAL,
    yield_unit              TEXT NOT NULL DEFAULT '',
    total_duration_minutes  INTEGER
);

CREATE TABLE IF NOT EXISTS recipe_step (
    recipe_id         TEXT NOT NULL REFERENCES recipe(recipe_id) ON DELETE CASCADE,
    sequence_no       INTEGER NOT NULL,
    name              TEXT NOT NULL,
    duration_minutes  INTEGER NOT NULL CHECK (duration_minutes >= 0),
    PRIMARY KEY (recipe_id, sequence_no)
);

CREATE TABLE IF NOT EXISTS recipe_step_demand (
    recipe_id    TEXT NOT NULL,
    sequence_no  INTEGER NOT NULL,
    utility      TEXT NOT NULL,
    load         REAL NOT NULL CHECK (load >= 0),
    PRIMARY KEY (recipe_id, sequence_no, utility),
    FOREIGN KEY (recipe_id, sequence_no)
        REFERENCES recipe_step(recipe_id, sequence_no) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS recipe_ingredient (
    recipe_id    TEXT NOT NULL REFERENCES recipe(recipe_id) ON DELETE CASCADE,
    material_id  TEXT NOT NULL,
    quantity     REAL NOT NULL CHECK (quantity >= 0),
    unit         TEXT NOT NULL,
    PRIMARY KEY (recipe_id, material_id)
);

-- ===== 设备 =====
CREATE TABLE IF NOT EXISTS equipment (
    equipment_id    TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    equipment_type  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS equipment_utility (
    equipment_id  TEXT NOT NULL REFERENCES equipment(equipment_id) ON DELETE CASCADE,
    utility       TEXT NOT NULL,
    capacity      REAL NOT NULL CHECK (capacity >= 0),
    PRIMARY KEY (equipment_id, utility)
);

-- ===== 物料与库存流水 =====
CREATE TABLE IF NOT EXISTS material (
    material_id    TEXT PRIMARY KEY,
    name           TEXT NOT NULL,
    unit           TEXT NOT NULL,
    on_hand_qty    REAL NOT NULL CHECK (on_hand_qty >= 0),
    min_stock_qty  REAL NOT NULL DEFAULT 0,
    updated_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS inventory_transaction (
    transaction_id    TEXT PRIMARY KEY,
    material_id       TEXT NOT NULL REFERENCES material(material_id),
    transaction_type  TEXT NOT NULL,
    quantity          REAL NOT NULL,
    balance_after     REAL NOT NULL CHECK (balance_after >= 0),
    batch_id          TEXT,
    reference         TEXT,
    created_at        TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_inventory_transaction_material
    ON inventory_transaction(material_id, created_at);

-- ===== 批次与设备占用 =====
CREATE TABLE IF NOT EXISTS scheduled_batch (
    batch_id        TEXT PRIMARY KEY,
    recipe_id       TEXT NOT NULL REFERENCES recipe(recipe_id),
    recipe_version  INTEGER NOT NULL,
    equipment_id    TEXT NOT NULL REFERENCES equipment(equipment_id),
    campaign_id     TEXT,
    batch_number    INTEGER NOT NULL,
    batch_size      REAL NOT NULL,
    scale_factor    REAL NOT NULL,
    start_time      TEXT NOT NULL,
    end_time        TEXT NOT NULL,
    status          TEXT NOT NULL,
    created_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_scheduled_batch_equipment
    ON scheduled_batch(equipment_id, start_time);
CREATE INDEX IF NOT EXISTS idx_scheduled_batch_campaign
    ON scheduled_batch(campaign_id, batch_number);

CREATE TABLE IF NOT EXISTS maintenance_event (
    event_id      TEXT PRIMARY KEY,
    equipment_id  TEXT NOT NULL REFERENCES equipment(equipment_id),
    start_time    TEXT NOT NULL,
    end_time      TEXT NOT NULL,
    reason        TEXT NOT NULL,
    created_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_maintenance_event_equipment
    ON maintenance_event(equipment_id, start_time);

-- ===== 公用工程占用（只追加） =====
CREATE TABLE IF NOT EXISTS resource_usage_interval (
    interval_id  TEXT PRIMARY KEY,
    utility      TEXT NOT NULL,
    start_time   TEXT NOT NULL,
    end_time     TEXT NOT NULL,
    load         REAL NOT NULL CHECK (load > 0),
    batch_id     TEXT REFERENCES scheduled_batch(batch_id)
);
CREATE INDEX IF NOT EXISTS idx_resource_usage_utility
    ON resource_usage_interval(utility, start_time);

-- ===== 审计 =====
CREATE TABLE IF NOT EXISTS action_log (
    action_id     TEXT PRIMARY KEY,
    action_type   TEXT NOT NULL,
    action_ts     TEXT NOT NULL,
    actor         TEXT NOT NULL,
    payload_json  TEXT,
    detail        TEXT
);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();

        assert_eq!(read_schema_version(&conn).unwrap(), None);
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_negative_on_hand_rejected_by_check() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO material (material_id, name, unit, on_hand_qty, updated_at)
             VALUES ('M1', 'M1', 'kg', -1.0, '2026-01-01 00:00:00')",
            [],
        );
        assert!(result.is_err());
    }
}
