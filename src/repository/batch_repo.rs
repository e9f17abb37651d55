// ==========================================
// 化工批次排产系统 - 批次与检修数据仓储
// ==========================================
// 职责: 批次/检修的读写；批次落库的原子提交
// 红线: 一次提交 = 一个 IMMEDIATE 事务；任一步失败整体回滚
// ==========================================

use crate::domain::batch::{MaintenanceEvent, ScheduledBatch, ScheduledEvent};
use crate::domain::material::InventoryTransaction;
use crate::domain::timeline::{ResourceUsageInterval, TimeWindow};
use crate::domain::types::{BatchStatus, EventKind, TransactionType};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::material_repo::{insert_transaction, read_on_hand, update_on_hand};
use crate::repository::row_codec::{enum_from_row, ts_from_row, ts_to_sql};
use crate::repository::timeline_repo::insert_interval;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row, TransactionBehavior};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// 单个批次的落库内容
#[derive(Debug, Clone)]
pub struct BatchWrite<'a> {
    pub batch: &'a ScheduledBatch,
    pub usage: &'a [ResourceUsageInterval],
    pub consumptions: Vec<MaterialConsumption>,
}

/// 物料消耗（正数）
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialConsumption {
    pub material_id: String,
    pub quantity: f64,
}

// ==========================================
// BatchRepository - 批次仓储
// ==========================================
pub struct BatchRepository {
    conn: Arc<Mutex<Connection>>,
}

impl BatchRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 原子提交
    // ==========================================

    /// 提交一组批次（批次 + 占用区间 + 消耗流水 + 结存）
    ///
    /// # 事务内复检
    /// - 设备在批次时间窗内无其它批次/检修 → 否则 EquipmentBooked
    /// - 结存 - 消耗 >= 0 → 否则 InsufficientStock
    ///
    /// # 返回
    /// 写入的消耗流水
    pub fn commit_materializations(
        &self,
        writes: &[BatchWrite<'_>],
    ) -> RepositoryResult<Vec<InventoryTransaction>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut ledger = Vec::new();
        for write in writes {
            let batch = write.batch;

            if let Some(event_id) =
                find_overlapping_event_id(&tx, &batch.equipment_id, &batch.window())?
            {
                warn!(
                    equipment_id = %batch.equipment_id,
                    event_id = %event_id,
                    "提交前复检发现设备占用"
                );
                return Err(RepositoryError::EquipmentBooked {
                    equipment_id: batch.equipment_id.clone(),
                    event_id,
                });
            }

            insert_batch(&tx, batch)?;
            for interval in write.usage {
                insert_interval(&tx, interval)?;
            }

            for consumption in &write.consumptions {
                let on_hand = read_on_hand(&tx, &consumption.material_id)?.ok_or_else(|| {
                    RepositoryError::not_found("Material", &consumption.material_id)
                })?;
                let balance_after = on_hand - consumption.quantity;
                if balance_after < 0.0 {
                    return Err(RepositoryError::InsufficientStock {
                        material_id: consumption.material_id.clone(),
                        on_hand,
                        required: consumption.quantity,
                    });
                }

                update_on_hand(&tx, &consumption.material_id, balance_after, batch.created_at)?;
                let txn = InventoryTransaction {
                    transaction_id: uuid::Uuid::new_v4().to_string(),
                    material_id: consumption.material_id.clone(),
                    transaction_type: TransactionType::Consumed,
                    quantity: -consumption.quantity,
                    balance_after,
                    batch_id: Some(batch.batch_id.clone()),
                    reference: batch.campaign_id.clone(),
                    created_at: batch.created_at,
                };
                insert_transaction(&tx, &txn)?;
                ledger.push(txn);
            }
        }

        tx.commit()?;
        debug!(batches = writes.len(), ledger = ledger.len(), "批次提交完成");
        Ok(ledger)
    }

    /// 写入检修窗口（事务内复检设备占用）
    pub fn insert_maintenance(&self, event: &MaintenanceEvent) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(event_id) = find_overlapping_event_id(&tx, &event.equipment_id, &event.window)? {
            return Err(RepositoryError::EquipmentBooked {
                equipment_id: event.equipment_id.clone(),
                event_id,
            });
        }

        tx.execute(
            r#"
            INSERT INTO maintenance_event (
                event_id, equipment_id, start_time, end_time, reason, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                event.event_id,
                event.equipment_id,
                ts_to_sql(&event.window.start),
                ts_to_sql(&event.window.end),
                event.reason,
                ts_to_sql(&event.created_at),
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find_by_id(&self, batch_id: &str) -> RepositoryResult<Option<ScheduledBatch>> {
        let conn = self.get_conn()?;
        let batch = conn
            .query_row(
                &format!("{} WHERE batch_id = ?1", SELECT_BATCH),
                params![batch_id],
                map_batch,
            )
            .optional()?;
        Ok(batch)
    }

    pub fn find_by_campaign(&self, campaign_id: &str) -> RepositoryResult<Vec<ScheduledBatch>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE campaign_id = ?1 ORDER BY batch_number",
            SELECT_BATCH
        ))?;
        let batches = stmt
            .query_map(params![campaign_id], map_batch)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(batches)
    }

    pub fn find_by_equipment(&self, equipment_id: &str) -> RepositoryResult<Vec<ScheduledBatch>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE equipment_id = ?1 ORDER BY start_time",
            SELECT_BATCH
        ))?;
        let batches = stmt
            .query_map(params![equipment_id], map_batch)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(batches)
    }

    /// 设备上的全部占用事件（未取消批次 + 检修），按开始时间排序
    pub fn find_events_by_equipment(&self, equipment_id: &str) -> RepositoryResult<Vec<ScheduledEvent>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT event_id, equipment_id, kind, start_time, end_time, label FROM (
                SELECT batch_id AS event_id, equipment_id, 'BATCH' AS kind,
                       start_time, end_time, recipe_id || '#' || batch_number AS label
                FROM scheduled_batch
                WHERE equipment_id = ?1 AND status != 'CANCELLED'
                UNION ALL
                SELECT event_id, equipment_id, 'MAINTENANCE' AS kind,
                       start_time, end_time, reason AS label
                FROM maintenance_event
                WHERE equipment_id = ?1
            )
            ORDER BY start_time, event_id
            "#,
        )?;
        let events = stmt
            .query_map(params![equipment_id], map_event)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(events)
    }

    pub fn count(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let n = conn.query_row("SELECT COUNT(*) FROM scheduled_batch", [], |row| row.get(0))?;
        Ok(n)
    }
}

const SELECT_BATCH: &str = r#"
    SELECT batch_id, recipe_id, recipe_version, equipment_id, campaign_id,
           batch_number, batch_size, scale_factor, start_time, end_time,
           status, created_at
    FROM scheduled_batch
"#;

fn map_batch(row: &Row<'_>) -> SqliteResult<ScheduledBatch> {
    let status: BatchStatus = enum_from_row(row, 10)?;
    Ok(ScheduledBatch {
        batch_id: row.get(0)?,
        recipe_id: row.get(1)?,
        recipe_version: row.get(2)?,
        equipment_id: row.get(3)?,
        campaign_id: row.get(4)?,
        batch_number: row.get(5)?,
        batch_size: row.get(6)?,
        scale_factor: row.get(7)?,
        start_time: ts_from_row(row, 8)?,
        end_time: ts_from_row(row, 9)?,
        status,
        created_at: ts_from_row(row, 11)?,
    })
}

fn map_event(row: &Row<'_>) -> SqliteResult<ScheduledEvent> {
    let kind: String = row.get(2)?;
    Ok(ScheduledEvent {
        event_id: row.get(0)?,
        equipment_id: row.get(1)?,
        kind: if kind == "MAINTENANCE" {
            EventKind::Maintenance
        } else {
            EventKind::Batch
        },
        window: TimeWindow {
            start: ts_from_row(row, 3)?,
            end: ts_from_row(row, 4)?,
        },
        label: row.get(5)?,
    })
}

fn insert_batch(conn: &Connection, batch: &ScheduledBatch) -> RepositoryResult<()> {
    conn.execute(
        r#"
        INSERT INTO scheduled_batch (
            batch_id, recipe_id, recipe_version, equipment_id, campaign_id,
            batch_number, batch_size, scale_factor, start_time, end_time,
            status, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
        params![
            batch.batch_id,
            batch.recipe_id,
            batch.recipe_version,
            batch.equipment_id,
            batch.campaign_id,
            batch.batch_number,
            batch.batch_size,
            batch.scale_factor,
            ts_to_sql(&batch.start_time),
            ts_to_sql(&batch.end_time),
            batch.status.as_str(),
            ts_to_sql(&batch.created_at),
        ],
    )?;
    Ok(())
}

/// 设备在时间窗内的第一个占用事件（左闭右开）
fn find_overlapping_event_id(
    conn: &Connection,
    equipment_id: &str,
    window: &TimeWindow,
) -> RepositoryResult<Option<String>> {
    let start = ts_to_sql(&window.start);
    let end = ts_to_sql(&window.end);
    let id = conn
        .query_row(
            r#"
            SELECT batch_id FROM scheduled_batch
            WHERE equipment_id = ?1 AND status != 'CANCELLED'
              AND start_time < ?3 AND end_time > ?2
            UNION ALL
            SELECT event_id FROM maintenance_event
            WHERE equipment_id = ?1 AND start_time < ?3 AND end_time > ?2
            LIMIT 1
            "#,
            params![equipment_id, start, end],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}
