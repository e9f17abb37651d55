// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的数据库初始化、测试数据生成等功能
// ==========================================
#![allow(dead_code)]

use batch_aps::api::{InventoryApi, MaterialRegistration, ResourceLocks, SchedulingApi};
use batch_aps::domain::equipment::{Equipment, UtilityRating};
use batch_aps::domain::recipe::{Ingredient, Recipe, Step, UtilityDemand};
use batch_aps::domain::types::UtilityKind;
use batch_aps::repository::{
    BatchRepository, EquipmentRepository, MaterialRepository, RecipeRepository, TimelineRepository,
};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().unwrap().to_string();

    let conn = open_test_connection(&db_path)?;
    batch_aps::db::init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 打开测试连接（统一 PRAGMA）
pub fn open_test_connection(db_path: &str) -> rusqlite::Result<Connection> {
    batch_aps::db::open_sqlite_connection(db_path)
}

/// 2026-03-{day} {h}:{m}
pub fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, day)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

// ==========================================
// 测试数据
// ==========================================

pub fn utility_source(id: &str, utility: UtilityKind, capacity: f64) -> Equipment {
    Equipment {
        equipment_id: id.to_string(),
        name: id.to_string(),
        equipment_type: "UTILITY".to_string(),
        utility_sources: vec![UtilityRating { utility, capacity }],
    }
}

pub fn reactor(id: &str) -> Equipment {
    Equipment {
        equipment_id: id.to_string(),
        name: id.to_string(),
        equipment_type: "REACTOR".to_string(),
        utility_sources: vec![],
    }
}

pub fn step(seq: i32, minutes: i64, demands: &[(UtilityKind, f64)]) -> Step {
    Step {
        sequence_no: seq,
        name: format!("step-{}", seq),
        duration_minutes: minutes,
        demands: demands
            .iter()
            .map(|(utility, load)| UtilityDemand {
                utility: *utility,
                load: *load,
            })
            .collect(),
    }
}

pub fn ingredient(material_id: &str, quantity: f64) -> Ingredient {
    Ingredient {
        material_id: material_id.to_string(),
        quantity,
        unit: "kg".to_string(),
    }
}

pub fn recipe(id: &str, standard_yield: Option<f64>, steps: Vec<Step>, ingredients: Vec<Ingredient>) -> Recipe {
    Recipe {
        recipe_id: id.to_string(),
        name: id.to_string(),
        version: 1,
        standard_yield,
        yield_unit: "kg".to_string(),
        total_duration_minutes: None,
        steps,
        ingredients,
    }
}

/// 单工序水解配方：蒸汽负荷 steam，时长 minutes，每 1000 kg 消耗 NaOH 50 kg
pub fn hydrolysis_recipe(steam: f64, minutes: i64) -> Recipe {
    recipe(
        "RCP-HYD",
        Some(1000.0),
        vec![step(1, minutes, &[(UtilityKind::Steam, steam)])],
        vec![ingredient("NaOH", 50.0)],
    )
}

// ==========================================
// 测试环境
// ==========================================

pub struct TestEnv {
    pub _temp_file: NamedTempFile,
    pub db_path: String,
    pub conn: Arc<Mutex<Connection>>,
    pub scheduling: Arc<SchedulingApi>,
    pub inventory: Arc<InventoryApi>,
    pub recipes: RecipeRepository,
    pub equipment: EquipmentRepository,
    pub materials: MaterialRepository,
    pub batches: BatchRepository,
    pub timeline: TimelineRepository,
}

pub fn setup_env() -> TestEnv {
    batch_aps::logging::init_test();
    let (temp_file, db_path) = create_test_db().unwrap();
    let conn = Arc::new(Mutex::new(open_test_connection(&db_path).unwrap()));
    let locks = Arc::new(ResourceLocks::new());

    TestEnv {
        scheduling: Arc::new(SchedulingApi::from_connection(conn.clone(), locks).unwrap()),
        inventory: Arc::new(InventoryApi::from_connection(conn.clone())),
        recipes: RecipeRepository::new(conn.clone()),
        equipment: EquipmentRepository::new(conn.clone()),
        materials: MaterialRepository::new(conn.clone()),
        batches: BatchRepository::new(conn.clone()),
        timeline: TimelineRepository::new(conn.clone()),
        _temp_file: temp_file,
        db_path,
        conn,
    }
}

impl TestEnv {
    /// 建立物料（期初）
    pub fn register_material(&self, material_id: &str, opening_qty: f64, min_stock_qty: f64) {
        self.inventory
            .register_material(&MaterialRegistration {
                material_id: material_id.to_string(),
                name: material_id.to_string(),
                unit: "kg".to_string(),
                opening_qty,
                min_stock_qty,
                reference: Some("INIT".to_string()),
                actor: "test".to_string(),
            })
            .unwrap();
    }

    /// 蒸汽源 + 若干反应釜
    pub fn seed_plant(&self, steam_capacity: f64, reactors: &[&str]) {
        self.equipment
            .insert(&utility_source("BOILER-1", UtilityKind::Steam, steam_capacity))
            .unwrap();
        for id in reactors {
            self.equipment.insert(&reactor(id)).unwrap();
        }
    }

    pub fn on_hand(&self, material_id: &str) -> f64 {
        self.materials
            .find_by_id(material_id)
            .unwrap()
            .unwrap()
            .on_hand_qty
    }
}
