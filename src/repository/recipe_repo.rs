// ==========================================
// 化工批次排产系统 - 配方数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::domain::recipe::{Ingredient, Recipe, Step, UtilityDemand};
use crate::domain::types::UtilityKind;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_codec::enum_from_row;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// ==========================================
// RecipeRepository - 配方仓储
// ==========================================
// 职责: recipe / recipe_step / recipe_step_demand / recipe_ingredient 四表映射
pub struct RecipeRepository {
    conn: Arc<Mutex<Connection>>,
}

impl RecipeRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入配方（含工序、公用工程需求、配料；同一事务）
    pub fn insert(&self, recipe: &Recipe) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO recipe (
                recipe_id, name, version, standard_yield, yield_unit, total_duration_minutes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                recipe.recipe_id,
                recipe.name,
                recipe.version,
                recipe.standard_yield,
                recipe.yield_unit,
                recipe.total_duration_minutes,
            ],
        )?;

        for step in &recipe.steps {
            tx.execute(
                r#"
                INSERT INTO recipe_step (recipe_id, sequence_no, name, duration_minutes)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![recipe.recipe_id, step.sequence_no, step.name, step.duration_minutes],
            )?;
            for demand in &step.demands {
                tx.execute(
                    r#"
                    INSERT INTO recipe_step_demand (recipe_id, sequence_no, utility, load)
                    VALUES (?1, ?2, ?3, ?4)
                    "#,
                    params![
                        recipe.recipe_id,
                        step.sequence_no,
                        demand.utility.as_str(),
                        demand.load
                    ],
                )?;
            }
        }

        for ingredient in &recipe.ingredients {
            tx.execute(
                r#"
                INSERT INTO recipe_ingredient (recipe_id, material_id, quantity, unit)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![
                    recipe.recipe_id,
                    ingredient.material_id,
                    ingredient.quantity,
                    ingredient.unit
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// 按 recipe_id 查询完整配方
    ///
    /// # 返回
    /// - Ok(Some(Recipe)): 找到
    /// - Ok(None): 未找到
    pub fn find_by_id(&self, recipe_id: &str) -> RepositoryResult<Option<Recipe>> {
        let conn = self.get_conn()?;

        let header = conn
            .query_row(
                r#"
                SELECT recipe_id, name, version, standard_yield, yield_unit, total_duration_minutes
                FROM recipe
                WHERE recipe_id = ?1
                "#,
                params![recipe_id],
                |row| {
                    Ok(Recipe {
                        recipe_id: row.get(0)?,
                        name: row.get(1)?,
                        version: row.get(2)?,
                        standard_yield: row.get(3)?,
                        yield_unit: row.get(4)?,
                        total_duration_minutes: row.get(5)?,
                        steps: Vec::new(),
                        ingredients: Vec::new(),
                    })
                },
            )
            .optional()?;

        let Some(mut recipe) = header else {
            return Ok(None);
        };

        let mut demands: HashMap<i32, Vec<UtilityDemand>> = HashMap::new();
        {
            let mut stmt = conn.prepare(
                r#"
                SELECT sequence_no, utility, load
                FROM recipe_step_demand
                WHERE recipe_id = ?1
                ORDER BY sequence_no, utility
                "#,
            )?;
            let rows = stmt
                .query_map(params![recipe_id], |row| {
                    let utility: UtilityKind = enum_from_row(row, 1)?;
                    Ok((
                        row.get::<_, i32>(0)?,
                        UtilityDemand {
                            utility,
                            load: row.get(2)?,
                        },
                    ))
                })?
                .collect::<SqliteResult<Vec<_>>>()?;
            for (seq, demand) in rows {
                demands.entry(seq).or_default().push(demand);
            }
        }

        let mut stmt = conn.prepare(
            r#"
            SELECT sequence_no, name, duration_minutes
            FROM recipe_step
            WHERE recipe_id = ?1
            ORDER BY sequence_no
            "#,
        )?;
        recipe.steps = stmt
            .query_map(params![recipe_id], |row| {
                Ok(Step {
                    sequence_no: row.get(0)?,
                    name: row.get(1)?,
                    duration_minutes: row.get(2)?,
                    demands: Vec::new(),
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        for step in &mut recipe.steps {
            step.demands = demands.remove(&step.sequence_no).unwrap_or_default();
        }

        let mut stmt = conn.prepare(
            r#"
            SELECT material_id, quantity, unit
            FROM recipe_ingredient
            WHERE recipe_id = ?1
            ORDER BY material_id
            "#,
        )?;
        recipe.ingredients = stmt
            .query_map(params![recipe_id], |row| {
                Ok(Ingredient {
                    material_id: row.get(0)?,
                    quantity: row.get(1)?,
                    unit: row.get(2)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(Some(recipe))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> RecipeRepository {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        RecipeRepository::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_insert_and_find_by_id() {
        let repo = setup();
        let recipe = Recipe {
            recipe_id: "RCP-1".to_string(),
            name: "酯化".to_string(),
            version: 2,
            standard_yield: Some(1000.0),
            yield_unit: "kg".to_string(),
            total_duration_minutes: None,
            steps: vec![
                Step {
                    sequence_no: 20,
                    name: "冷却".to_string(),
                    duration_minutes: 30,
                    demands: vec![UtilityDemand {
                        utility: UtilityKind::CoolingWater,
                        load: 8.0,
                    }],
                },
                Step {
                    sequence_no: 10,
                    name: "反应".to_string(),
                    duration_minutes: 120,
                    demands: vec![
                        UtilityDemand {
                            utility: UtilityKind::Steam,
                            load: 15.0,
                        },
                        UtilityDemand {
                            utility: UtilityKind::Electricity,
                            load: 4.0,
                        },
                    ],
                },
            ],
            ingredients: vec![Ingredient {
                material_id: "NaOH".to_string(),
                quantity: 50.0,
                unit: "kg".to_string(),
            }],
        };

        repo.insert(&recipe).unwrap();
        let loaded = repo.find_by_id("RCP-1").unwrap().unwrap();

        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.steps.len(), 2);
        assert_eq!(loaded.steps[0].sequence_no, 10);
        assert_eq!(loaded.steps[0].demand_for(UtilityKind::Steam), 15.0);
        assert_eq!(loaded.steps[0].demands.len(), 2);
        assert_eq!(loaded.steps[1].demand_for(UtilityKind::CoolingWater), 8.0);
        assert_eq!(loaded.ingredients[0].quantity, 50.0);
    }

    #[test]
    fn test_find_missing_returns_none() {
        let repo = setup();
        assert!(repo.find_by_id("NOPE").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_sequence_rejected_by_primary_key() {
        let repo = setup();
        let step = Step {
            sequence_no: 1,
            name: "s".to_string(),
            duration_minutes: 10,
            demands: vec![],
        };
        let recipe = Recipe {
            recipe_id: "RCP-DUP".to_string(),
            name: "dup".to_string(),
            version: 1,
            standard_yield: None,
            yield_unit: String::new(),
            total_duration_minutes: None,
            steps: vec![step.clone(), step],
            ingredients: vec![],
        };

        assert!(matches!(
            repo.insert(&recipe),
            Err(RepositoryError::UniqueConstraintViolation(_))
        ));
        assert!(repo.find_by_id("RCP-DUP").unwrap().is_none());
    }
}
