// ==========================================
// 化工批次排产系统 - 设备数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::domain::equipment::{Equipment, UtilityRating};
use crate::domain::types::UtilityKind;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_codec::enum_from_row;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// ==========================================
// EquipmentRepository - 设备仓储
// ==========================================
pub struct EquipmentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl EquipmentRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入设备及其公用工程额定能力
    pub fn insert(&self, equipment: &Equipment) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO equipment (equipment_id, name, equipment_type) VALUES (?1, ?2, ?3)",
            params![equipment.equipment_id, equipment.name, equipment.equipment_type],
        )?;
        for rating in &equipment.utility_sources {
            tx.execute(
                "INSERT INTO equipment_utility (equipment_id, utility, capacity) VALUES (?1, ?2, ?3)",
                params![equipment.equipment_id, rating.utility.as_str(), rating.capacity],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn find_by_id(&self, equipment_id: &str) -> RepositoryResult<Option<Equipment>> {
        let conn = self.get_conn()?;

        let header = conn
            .query_row(
                "SELECT equipment_id, name, equipment_type FROM equipment WHERE equipment_id = ?1",
                params![equipment_id],
                |row| {
                    Ok(Equipment {
                        equipment_id: row.get(0)?,
                        name: row.get(1)?,
                        equipment_type: row.get(2)?,
                        utility_sources: Vec::new(),
                    })
                },
            )
            .optional()?;

        let Some(mut equipment) = header else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            r#"
            SELECT utility, capacity
            FROM equipment_utility
            WHERE equipment_id = ?1
            ORDER BY utility
            "#,
        )?;
        equipment.utility_sources = stmt
            .query_map(params![equipment_id], |row| {
                Ok(UtilityRating {
                    utility: enum_from_row(row, 0)?,
                    capacity: row.get(1)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(Some(equipment))
    }

    /// 查询全部设备（按 equipment_id 排序）
    pub fn find_all(&self) -> RepositoryResult<Vec<Equipment>> {
        let conn = self.get_conn()?;

        let mut ratings: HashMap<String, Vec<UtilityRating>> = HashMap::new();
        {
            let mut stmt = conn.prepare(
                "SELECT equipment_id, utility, capacity FROM equipment_utility ORDER BY equipment_id, utility",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    let utility: UtilityKind = enum_from_row(row, 1)?;
                    Ok((
                        row.get::<_, String>(0)?,
                        UtilityRating {
                            utility,
                            capacity: row.get(2)?,
                        },
                    ))
                })?
                .collect::<SqliteResult<Vec<_>>>()?;
            for (id, rating) in rows {
                ratings.entry(id).or_default().push(rating);
            }
        }

        let mut stmt = conn.prepare(
            "SELECT equipment_id, name, equipment_type FROM equipment ORDER BY equipment_id",
        )?;
        let mut equipment = stmt
            .query_map([], |row| {
                Ok(Equipment {
                    equipment_id: row.get(0)?,
                    name: row.get(1)?,
                    equipment_type: row.get(2)?,
                    utility_sources: Vec::new(),
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        for e in &mut equipment {
            e.utility_sources = ratings.remove(&e.equipment_id).unwrap_or_default();
        }

        Ok(equipment)
    }

    /// 校验设备存在
    pub fn exists(&self, equipment_id: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM equipment WHERE equipment_id = ?1",
                params![equipment_id],
                |_row| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::equipment::plant_capacity;

    fn setup() -> EquipmentRepository {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        EquipmentRepository::new(Arc::new(Mutex::new(conn)))
    }

    fn boiler(id: &str, steam: f64) -> Equipment {
        Equipment {
            equipment_id: id.to_string(),
            name: id.to_string(),
            equipment_type: "BOILER".to_string(),
            utility_sources: vec![UtilityRating {
                utility: UtilityKind::Steam,
                capacity: steam,
            }],
        }
    }

    #[test]
    fn test_find_all_sums_to_plant_capacity() {
        let repo = setup();
        repo.insert(&boiler("B-1", 25.0)).unwrap();
        repo.insert(&boiler("B-2", 15.0)).unwrap();
        repo.insert(&Equipment {
            equipment_id: "R-101".to_string(),
            name: "反应釜".to_string(),
            equipment_type: "REACTOR".to_string(),
            utility_sources: vec![],
        })
        .unwrap();

        let all = repo.find_all().unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(plant_capacity(&all, UtilityKind::Steam), 40.0);
        assert_eq!(plant_capacity(&all, UtilityKind::Nitrogen), 0.0);

        let one = repo.find_by_id("B-1").unwrap().unwrap();
        assert_eq!(one.supplies(UtilityKind::Steam), Some(25.0));
        assert!(repo.exists("R-101").unwrap());
        assert!(!repo.exists("R-999").unwrap());
    }
}
