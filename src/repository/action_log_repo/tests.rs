use super::ActionLogRepository;
use crate::domain::action_log::{ActionLog, ActionType};
use rusqlite::Connection;
use serde_json::json;
use std::sync::{Arc, Mutex};

fn setup_test_db() -> Arc<Mutex<Connection>> {
    let conn = Connection::open_in_memory().unwrap();
    crate::db::configure_sqlite_connection(&conn).unwrap();
    crate::db::init_schema(&conn).unwrap();
    Arc::new(Mutex::new(conn))
}

#[test]
fn test_insert_and_find_by_id() {
    let repo = ActionLogRepository::new(setup_test_db());

    let log = ActionLog::new(
        ActionType::ReceiveMaterial,
        "planner",
        json!({ "material_id": "NaOH", "quantity": 40.0 }),
        "入库 NaOH 40".to_string(),
    );
    let id = repo.insert(&log).unwrap();

    let found = repo.find_by_id(&id).unwrap().unwrap();
    assert_eq!(found.action_type, "RECEIVE_MATERIAL");
    assert_eq!(found.actor, "planner");
    assert_eq!(found.payload_json.unwrap()["material_id"], "NaOH");
}

#[test]
fn test_find_by_id_missing() {
    let repo = ActionLogRepository::new(setup_test_db());
    assert!(repo.find_by_id("none").unwrap().is_none());
}

#[test]
fn test_find_by_action_type_and_recent() {
    let repo = ActionLogRepository::new(setup_test_db());
    for i in 0..3 {
        repo.insert(&ActionLog::new(
            ActionType::ScheduleCampaign,
            "planner",
            json!({ "i": i }),
            format!("campaign {}", i),
        ))
        .unwrap();
    }
    repo.insert(&ActionLog::new(
        ActionType::ScheduleMaintenance,
        "maint",
        json!({}),
        "检修".to_string(),
    ))
    .unwrap();

    assert_eq!(repo.find_by_action_type("SCHEDULE_CAMPAIGN", 10).unwrap().len(), 3);
    assert_eq!(repo.find_by_action_type("SCHEDULE_CAMPAIGN", 2).unwrap().len(), 2);
    assert_eq!(repo.find_recent(10).unwrap().len(), 4);
}
