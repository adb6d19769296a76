use super::ActionLogRepository;
use crate::domain::action_log::{ActionLog, ActionType};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

fn setup_test_db() -> Arc<Mutex<Connection>> {
    let conn = Connection::open_in_memory().unwrap();
    crate::db::configure_sqlite_connection(&conn).unwrap();

    conn.execute(
        r#"
        CREATE TABLE action_log (
            action_id TEXT PRIMARY KEY,
            handoff_id TEXT,
            action_type TEXT NOT NULL,
            action_ts TEXT NOT NULL,
            actor TEXT NOT NULL,
            payload_json TEXT,
            detail TEXT
        )
        "#,
        [],
    )
    .unwrap();

    Arc::new(Mutex::new(conn))
}

fn ts(minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 2, 10)
        .unwrap()
        .and_hms_opt(10, minute, 0)
        .unwrap()
}

fn make_test_log(action_id: &str, handoff_id: Option<&str>, actor: &str, minute: u32) -> ActionLog {
    ActionLog {
        action_id: action_id.to_string(),
        handoff_id: handoff_id.map(|s| s.to_string()),
        action_type: ActionType::Claim.as_str().to_string(),
        action_ts: ts(minute),
        actor: actor.to_string(),
        payload_json: Some(serde_json::json!({ "outcome": "claimed" })),
        detail: Some("Test log".to_string()),
    }
}

#[test]
fn test_insert_and_find_by_id() {
    let repo = ActionLogRepository::new(setup_test_db());

    let log = make_test_log("log1", Some("H1"), "agent_a", 1);
    assert_eq!(repo.insert(&log).unwrap(), "log1");

    let found = repo.find_by_id("log1").unwrap().unwrap();
    assert_eq!(found.handoff_id.as_deref(), Some("H1"));
    assert_eq!(found.actor, "agent_a");
    assert_eq!(found.action_ts, ts(1));
    assert_eq!(found.payload_json, Some(serde_json::json!({ "outcome": "claimed" })));
}

#[test]
fn test_find_by_handoff_and_actor() {
    let repo = ActionLogRepository::new(setup_test_db());

    repo.insert(&make_test_log("log1", Some("H1"), "agent_a", 1)).unwrap();
    repo.insert(&make_test_log("log2", Some("H1"), "agent_b", 2)).unwrap();
    repo.insert(&make_test_log("log3", Some("H2"), "agent_a", 3)).unwrap();
    repo.insert(&make_test_log("log4", None, "agent_a", 4)).unwrap();

    let h1 = repo.find_by_handoff_id("H1").unwrap();
    assert_eq!(h1.len(), 2);
    assert_eq!(h1[0].action_id, "log2"); // 新 → 旧
    assert_eq!(repo.count_by_handoff("H1").unwrap(), 2);

    let by_a = repo.find_by_actor("agent_a", 10).unwrap();
    assert_eq!(by_a.len(), 3);
    assert_eq!(by_a[0].action_id, "log4");
}
