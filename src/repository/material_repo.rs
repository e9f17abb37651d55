// ==========================================
// 化工批次排产系统 - 物料与库存流水仓储
// ==========================================
// 红线: 现存量每次变动都与一条流水同事务写入
// ==========================================

use crate::domain::material::{InventoryTransaction, LedgerReconciliation, Material};
use crate::domain::types::TransactionType;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_codec::{enum_from_row, ts_from_row, ts_to_sql};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row, TransactionBehavior};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// 台账核对容差
const LEDGER_EPSILON: f64 = 1e-6;

// ==========================================
// MaterialRepository - 物料仓储
// ==========================================
pub struct MaterialRepository {
    conn: Arc<Mutex<Connection>>,
}

impl MaterialRepository {
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
    // 写入操作
    // ==========================================

    /// 建立物料，期初量记为一条 OPENING 流水
    ///
    /// # 返回
    /// 期初流水
    pub fn insert_with_opening(
        &self,
        material: &Material,
        reference: Option<&str>,
    ) -> RepositoryResult<InventoryTransaction> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO material (
                material_id, name, unit, on_hand_qty, min_stock_qty, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                material.material_id,
                material.name,
                material.unit,
                material.on_hand_qty,
                material.min_stock_qty,
                ts_to_sql(&material.updated_at),
            ],
        )?;

        let opening = InventoryTransaction {
            transaction_id: uuid::Uuid::new_v4().to_string(),
            material_id: material.material_id.clone(),
            transaction_type: TransactionType::Opening,
            quantity: material.on_hand_qty,
            balance_after: material.on_hand_qty,
            batch_id: None,
            reference: reference.map(str::to_string),
            created_at: material.updated_at,
        };
        insert_transaction(&tx, &opening)?;

        tx.commit()?;
        Ok(opening)
    }

    /// 入库：事务内读取结存 → 累加 → 写流水
    pub fn receive(
        &self,
        material_id: &str,
        quantity: f64,
        reference: Option<&str>,
        at: NaiveDateTime,
    ) -> RepositoryResult<InventoryTransaction> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let on_hand = read_on_hand(&tx, material_id)?
            .ok_or_else(|| RepositoryError::not_found("Material", material_id))?;
        let balance_after = on_hand + quantity;

        update_on_hand(&tx, material_id, balance_after, at)?;
        let received = InventoryTransaction {
            transaction_id: uuid::Uuid::new_v4().to_string(),
            material_id: material_id.to_string(),
            transaction_type: TransactionType::Received,
            quantity,
            balance_after,
            batch_id: None,
            reference: reference.map(str::to_string),
            created_at: at,
        };
        insert_transaction(&tx, &received)?;

        tx.commit()?;
        Ok(received)
    }

    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find_by_id(&self, material_id: &str) -> RepositoryResult<Option<Material>> {
        let conn = self.get_conn()?;
        let material = conn
            .query_row(
                &format!("{} WHERE material_id = ?1", SELECT_MATERIAL),
                params![material_id],
                map_material,
            )
            .optional()?;
        Ok(material)
    }

    /// 批量查询（库存快照），缺失的 id 不出现在结果中
    pub fn find_by_ids(&self, material_ids: &[String]) -> RepositoryResult<HashMap<String, Material>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!("{} WHERE material_id = ?1", SELECT_MATERIAL))?;

        let mut snapshot = HashMap::with_capacity(material_ids.len());
        for id in material_ids {
            if let Some(m) = stmt.query_row(params![id], map_material).optional()? {
                snapshot.insert(m.material_id.clone(), m);
            }
        }
        Ok(snapshot)
    }

    pub fn find_all(&self) -> RepositoryResult<Vec<Material>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!("{} ORDER BY material_id", SELECT_MATERIAL))?;
        let materials = stmt
            .query_map([], map_material)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(materials)
    }

    /// 低于最低库存的物料
    pub fn find_below_minimum(&self) -> RepositoryResult<Vec<Material>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE on_hand_qty < min_stock_qty ORDER BY material_id",
            SELECT_MATERIAL
        ))?;
        let materials = stmt
            .query_map([], map_material)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(materials)
    }

    /// 物料流水（按发生顺序）
    pub fn list_transactions(&self, material_id: &str) -> RepositoryResult<Vec<InventoryTransaction>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT transaction_id, material_id, transaction_type, quantity,
                   balance_after, batch_id, reference, created_at
            FROM inventory_transaction
            WHERE material_id = ?1
            ORDER BY created_at, rowid
            "#,
        )?;
        let txns = stmt
            .query_map(params![material_id], map_transaction)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(txns)
    }

    /// 批次关联的流水
    pub fn list_transactions_by_batch(&self, batch_id: &str) -> RepositoryResult<Vec<InventoryTransaction>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT transaction_id, material_id, transaction_type, quantity,
                   balance_after, batch_id, reference, created_at
            FROM inventory_transaction
            WHERE batch_id = ?1
            ORDER BY rowid
            "#,
        )?;
        let txns = stmt
            .query_map(params![batch_id], map_transaction)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(txns)
    }

    /// 台账核对：流水合计与最后结存都应等于现存量
    pub fn reconcile(&self, material_id: &str) -> RepositoryResult<LedgerReconciliation> {
        let material = self
            .find_by_id(material_id)?
            .ok_or_else(|| RepositoryError::not_found("Material", material_id))?;
        let txns = self.list_transactions(material_id)?;

        let ledger_sum: f64 = txns.iter().map(|t| t.quantity).sum();
        let last_balance = txns.last().map(|t| t.balance_after);
        let consistent = (ledger_sum - material.on_hand_qty).abs() <= LEDGER_EPSILON
            && last_balance.map_or(txns.is_empty(), |b| {
                (b - material.on_hand_qty).abs() <= LEDGER_EPSILON
            });

        Ok(LedgerReconciliation {
            material_id: material.material_id,
            on_hand_qty: material.on_hand_qty,
            ledger_sum,
            last_balance,
            transaction_count: txns.len(),
            consistent,
        })
    }
}

// ==========================================
// 事务内共用的写入/读取（供批次提交复用）
// ==========================================

const SELECT_MATERIAL: &str = r#"
    SELECT material_id, name, unit, on_hand_qty, min_stock_qty, updated_at
    FROM material
"#;

fn map_material(row: &Row<'_>) -> SqliteResult<Material> {
    Ok(Material {
        material_id: row.get(0)?,
        name: row.get(1)?,
        unit: row.get(2)?,
        on_hand_qty: row.get(3)?,
        min_stock_qty: row.get(4)?,
        updated_at: ts_from_row(row, 5)?,
    })
}

fn map_transaction(row: &Row<'_>) -> SqliteResult<InventoryTransaction> {
    Ok(InventoryTransaction {
        transaction_id: row.get(0)?,
        material_id: row.get(1)?,
        transaction_type: enum_from_row(row, 2)?,
        quantity: row.get(3)?,
        balance_after: row.get(4)?,
        batch_id: row.get(5)?,
        reference: row.get(6)?,
        created_at: ts_from_row(row, 7)?,
    })
}

pub(crate) fn read_on_hand(conn: &Connection, material_id: &str) -> RepositoryResult<Option<f64>> {
    let qty = conn
        .query_row(
            "SELECT on_hand_qty FROM material WHERE material_id = ?1",
            params![material_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(qty)
}

pub(crate) fn update_on_hand(
    conn: &Connection,
    material_id: &str,
    on_hand: f64,
    at: NaiveDateTime,
) -> RepositoryResult<()> {
    conn.execute(
        "UPDATE material SET on_hand_qty = ?2, updated_at = ?3 WHERE material_id = ?1",
        params![material_id, on_hand, ts_to_sql(&at)],
    )?;
    Ok(())
}

pub(crate) fn insert_transaction(conn: &Connection, txn: &InventoryTransaction) -> RepositoryResult<()> {
    conn.execute(
        r#"
        INSERT INTO inventory_transaction (
            transaction_id, material_id, transaction_type, quantity,
            balance_after, batch_id, reference, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            txn.transaction_id,
            txn.material_id,
            txn.transaction_type.as_str(),
            txn.quantity,
            txn.balance_after,
            txn.batch_id,
            txn.reference,
            ts_to_sql(&txn.created_at),
        ],
    )?;
    Ok(())
}
