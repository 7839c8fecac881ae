use attrman_core::db::open_db_in_memory;
use attrman_core::{
    AttributeParams, DataOption, DataType, EngineConfig, MigrationError, ObjectManager,
    ObjectType,
};
use rusqlite::Connection;
use serde_json::json;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn sequential() -> EngineConfig {
    EngineConfig {
        transactional_ddl: false,
        ..EngineConfig::default()
    }
}

fn column(conn: &Connection, table: &str, name: &str) -> Option<(String, bool, Option<String>)> {
    let mut stmt = conn
        .prepare("SELECT type, \"notnull\", dflt_value FROM pragma_table_info(?1) WHERE name = ?2;")
        .unwrap();
    let mut rows = stmt.query([table, name]).unwrap();
    rows.next().unwrap().map(|row| {
        (
            row.get::<_, String>(0).unwrap(),
            row.get::<_, i64>(1).unwrap() == 1,
            row.get::<_, Option<String>>(2).unwrap(),
        )
    })
}

fn table_exists(conn: &Connection, table: &str) -> bool {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
        [table],
        |row| row.get::<_, i64>(0),
    )
    .unwrap()
        == 1
}

fn lookup_values(conn: &Connection, table: &str) -> Vec<String> {
    let mut stmt = conn
        .prepare(&format!("SELECT value FROM \"{table}\" ORDER BY position;"))
        .unwrap();
    stmt.query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<Vec<String>, _>>()
        .unwrap()
}

fn select_params(name: &str, options: serde_json::Value) -> AttributeParams {
    let mut params = AttributeParams::new(name, DataType::Select);
    params.data_option = DataOption::from_value(json!({ "options": options })).unwrap();
    params
}

#[test]
fn nothing_pending_is_a_successful_no_op() {
    let conn = open_db_in_memory().unwrap();
    let manager = ObjectManager::try_new(&conn, EngineConfig::default()).unwrap();

    assert!(manager.migration_execute().unwrap());

    manager
        .add(ObjectType::Ticket, AttributeParams::new("vip_note", DataType::Text))
        .unwrap();
    assert!(manager.migration_execute().unwrap());
    let schema_after_first = conn
        .query_row("PRAGMA schema_version;", [], |row| row.get::<_, i64>(0))
        .unwrap();

    assert!(manager.migration_execute().unwrap());
    let schema_after_second = conn
        .query_row("PRAGMA schema_version;", [], |row| row.get::<_, i64>(0))
        .unwrap();
    assert_eq!(schema_after_first, schema_after_second);
}

#[test]
fn add_then_migrate_creates_columns_per_storage_mapping() {
    let conn = open_db_in_memory().unwrap();
    let manager = ObjectManager::try_new(&conn, EngineConfig::default()).unwrap();

    manager
        .add(ObjectType::Ticket, AttributeParams::new("vip_note", DataType::Text))
        .unwrap();
    manager
        .add(ObjectType::Ticket, AttributeParams::new("long_story", DataType::Richtext))
        .unwrap();
    let mut flag = AttributeParams::new("is_escalated", DataType::Boolean);
    flag.data_option = DataOption::from_value(json!({ "null": false, "default": false })).unwrap();
    manager.add(ObjectType::Ticket, flag).unwrap();
    manager
        .add(ObjectType::User, AttributeParams::new("birthday", DataType::Date))
        .unwrap();

    assert!(manager.pending_migration().unwrap());
    assert!(manager.migration_execute().unwrap());
    assert!(!manager.pending_migration().unwrap());

    assert_eq!(
        column(&conn, "tickets", "vip_note"),
        Some(("VARCHAR(255)".to_string(), false, None))
    );
    assert_eq!(
        column(&conn, "tickets", "long_story").map(|(sql_type, ..)| sql_type),
        Some("TEXT".to_string())
    );
    assert_eq!(
        column(&conn, "tickets", "is_escalated"),
        Some(("BOOLEAN".to_string(), true, Some("0".to_string())))
    );
    assert_eq!(
        column(&conn, "users", "birthday").map(|(sql_type, ..)| sql_type),
        Some("DATE".to_string())
    );
    for definition in manager.list(ObjectType::Ticket).unwrap() {
        assert!(definition.migrated, "{} should be migrated", definition.name);
    }
}

#[test]
fn enumeration_gets_lookup_table_kept_in_sync() {
    let conn = open_db_in_memory().unwrap();
    let manager = ObjectManager::try_new(&conn, EngineConfig::default()).unwrap();

    manager
        .add(
            ObjectType::Ticket,
            select_params("impact", json!({ "high": "High", "low": "Low" })),
        )
        .unwrap();
    manager.migration_execute().unwrap();
    assert!(table_exists(&conn, "tickets_impact_options"));
    assert_eq!(lookup_values(&conn, "tickets_impact_options"), vec!["high", "low"]);

    manager
        .add(
            ObjectType::Ticket,
            select_params(
                "impact",
                json!([
                    { "value": "low", "name": "Low" },
                    { "value": "medium", "name": "Medium" },
                    { "value": "high", "name": "High" }
                ]),
            ),
        )
        .unwrap();
    manager.migration_execute().unwrap();
    assert_eq!(
        lookup_values(&conn, "tickets_impact_options"),
        vec!["low", "medium", "high"]
    );
}

#[test]
fn type_conversion_rebuilds_column_and_keeps_values() {
    let conn = open_db_in_memory().unwrap();
    let manager = ObjectManager::try_new(&conn, EngineConfig::default()).unwrap();

    manager
        .add(ObjectType::Ticket, AttributeParams::new("impact", DataType::Text))
        .unwrap();
    manager.migration_execute().unwrap();
    conn.execute(
        "INSERT INTO tickets (number, title, impact) VALUES ('10001', 'printer', 'high');",
        [],
    )
    .unwrap();

    let mut params = AttributeParams::new("impact", DataType::Select);
    params.data_option_new = Some(
        DataOption::from_value(json!({
            "maxlength": 40,
            "options": { "high": "High", "low": "Low" }
        }))
        .unwrap(),
    );
    manager.add(ObjectType::Ticket, params).unwrap();
    manager.migration_execute().unwrap();

    assert_eq!(
        column(&conn, "tickets", "impact").map(|(sql_type, ..)| sql_type),
        Some("VARCHAR(40)".to_string())
    );
    assert!(column(&conn, "tickets", "impact$previous").is_none());
    let value: String = conn
        .query_row("SELECT impact FROM tickets WHERE number = '10001';", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(value, "high");
    assert!(table_exists(&conn, "tickets_impact_options"));
}

#[test]
fn rebuild_does_not_collide_with_attribute_named_like_temporary_column() {
    let conn = open_db_in_memory().unwrap();
    let manager = ObjectManager::try_new(&conn, EngineConfig::default()).unwrap();

    manager
        .add(ObjectType::Ticket, AttributeParams::new("rating", DataType::Text))
        .unwrap();
    manager
        .add(
            ObjectType::Ticket,
            AttributeParams::new("rating__previous", DataType::Text),
        )
        .unwrap();
    manager.migration_execute().unwrap();
    conn.execute(
        "INSERT INTO tickets (number, title, rating, rating__previous) VALUES ('10002', 'vpn', 'good', 'bad');",
        [],
    )
    .unwrap();

    let mut params = AttributeParams::new("rating", DataType::Text);
    params.data_option = DataOption::from_value(json!({ "maxlength": 40 })).unwrap();
    manager.add(ObjectType::Ticket, params).unwrap();
    assert!(manager.migration_execute().unwrap());
    assert!(!manager.pending_migration().unwrap());

    assert_eq!(
        column(&conn, "tickets", "rating").map(|(sql_type, ..)| sql_type),
        Some("VARCHAR(40)".to_string())
    );
    let (rating, previous): (String, String) = conn
        .query_row(
            "SELECT rating, rating__previous FROM tickets WHERE number = '10002';",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(rating, "good");
    assert_eq!(previous, "bad");
}

#[test]
fn removal_drops_column_lookup_table_and_definition() {
    let conn = open_db_in_memory().unwrap();
    let manager = ObjectManager::try_new(&conn, EngineConfig::default()).unwrap();

    manager
        .add(
            ObjectType::Organization,
            select_params("segment", json!({ "smb": "SMB", "enterprise": "Enterprise" })),
        )
        .unwrap();
    manager.migration_execute().unwrap();
    assert!(column(&conn, "organizations", "segment").is_some());

    manager.remove(ObjectType::Organization, "segment").unwrap();
    manager.migration_execute().unwrap();

    assert!(column(&conn, "organizations", "segment").is_none());
    assert!(!table_exists(&conn, "organizations_segment_options"));
    assert!(manager
        .get(ObjectType::Organization, "segment")
        .unwrap()
        .is_none());
}

fn add_users_then_tickets(manager: &ObjectManager<'_>) {
    manager
        .add(ObjectType::User, AttributeParams::new("alpha_flag", DataType::Boolean))
        .unwrap();
    manager
        .add(ObjectType::Ticket, AttributeParams::new("zeta_flag", DataType::Boolean))
        .unwrap();
}

#[test]
fn transactional_failure_applies_nothing_and_retry_converges() {
    let conn = open_db_in_memory().unwrap();
    let manager = ObjectManager::try_new(&conn, EngineConfig::default()).unwrap();
    add_users_then_tickets(&manager);
    conn.execute_batch("DROP TABLE tickets;").unwrap();

    let err = manager.migration_execute().unwrap_err();
    match &err {
        MigrationError::Ddl {
            object_type,
            name,
            statement,
            ..
        } => {
            assert_eq!(*object_type, ObjectType::Ticket);
            assert_eq!(name, "zeta_flag");
            assert!(statement.contains("ALTER TABLE \"tickets\""));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_retryable());
    assert!(column(&conn, "users", "alpha_flag").is_none());
    assert_eq!(manager.list_pending().unwrap().len(), 2);

    conn.execute_batch("CREATE TABLE tickets (id INTEGER PRIMARY KEY);")
        .unwrap();
    assert!(manager.migration_execute().unwrap());
    assert!(column(&conn, "users", "alpha_flag").is_some());
    assert!(column(&conn, "tickets", "zeta_flag").is_some());
    assert!(manager.list_pending().unwrap().is_empty());
}

#[test]
fn sequential_failure_keeps_earlier_progress() {
    let conn = open_db_in_memory().unwrap();
    let manager = ObjectManager::try_new(&conn, sequential()).unwrap();
    add_users_then_tickets(&manager);
    conn.execute_batch("DROP TABLE tickets;").unwrap();

    let err = manager.migration_execute().unwrap_err();
    assert!(matches!(err, MigrationError::Ddl { .. }));
    assert!(column(&conn, "users", "alpha_flag").is_some());
    let pending: Vec<String> = manager
        .list_pending()
        .unwrap()
        .into_iter()
        .map(|definition| definition.name)
        .collect();
    assert_eq!(pending, vec!["zeta_flag"]);

    conn.execute_batch("CREATE TABLE tickets (id INTEGER PRIMARY KEY);")
        .unwrap();
    assert!(manager.migration_execute().unwrap());
    assert!(column(&conn, "tickets", "zeta_flag").is_some());
    assert!(!manager.pending_migration().unwrap());
}

fn epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

#[test]
fn held_lock_fails_fast_with_already_in_progress() {
    let conn = open_db_in_memory().unwrap();
    let manager = ObjectManager::try_new(&conn, EngineConfig::default()).unwrap();
    manager
        .add(ObjectType::Ticket, AttributeParams::new("vip_note", DataType::Text))
        .unwrap();
    conn.execute(
        "INSERT INTO schema_migration_lock (id, owner, acquired_at) VALUES (1, 'deploy-7', ?1);",
        [epoch_ms()],
    )
    .unwrap();

    match manager.migration_execute() {
        Err(MigrationError::AlreadyInProgress { owner }) => {
            assert_eq!(owner.as_deref(), Some("deploy-7"));
        }
        other => panic!("expected lock conflict, got {other:?}"),
    }
    assert!(manager.pending_migration().unwrap());
}

#[test]
fn stale_lock_is_taken_over_and_released() {
    let conn = open_db_in_memory().unwrap();
    let config = EngineConfig {
        lock_stale_after: Duration::from_secs(60),
        ..EngineConfig::default()
    };
    let manager = ObjectManager::try_new(&conn, config).unwrap();
    manager
        .add(ObjectType::Ticket, AttributeParams::new("vip_note", DataType::Text))
        .unwrap();
    conn.execute(
        "INSERT INTO schema_migration_lock (id, owner, acquired_at) VALUES (1, 'crashed', ?1);",
        [epoch_ms() - 120_000],
    )
    .unwrap();

    assert!(manager.migration_execute().unwrap());
    let remaining: i64 = conn
        .query_row("SELECT COUNT(*) FROM schema_migration_lock;", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(remaining, 0);
}

#[test]
fn lock_is_released_after_failure() {
    let conn = open_db_in_memory().unwrap();
    let manager = ObjectManager::try_new(&conn, EngineConfig::default()).unwrap();
    add_users_then_tickets(&manager);
    conn.execute_batch("DROP TABLE tickets;").unwrap();
    manager.migration_execute().unwrap_err();

    let remaining: i64 = conn
        .query_row("SELECT COUNT(*) FROM schema_migration_lock;", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(remaining, 0);
}

#[test]
fn generous_ddl_timeout_does_not_interfere() {
    let conn = open_db_in_memory().unwrap();
    let config = EngineConfig {
        ddl_timeout: Some(Duration::from_secs(60)),
        ..EngineConfig::default()
    };
    let manager = ObjectManager::try_new(&conn, config).unwrap();
    manager
        .add(ObjectType::Ticket, AttributeParams::new("vip_note", DataType::Text))
        .unwrap();

    assert!(manager.migration_execute().unwrap());
    assert!(column(&conn, "tickets", "vip_note").is_some());
    // The deadline handler is cleared after the run.
    conn.query_row("SELECT COUNT(*) FROM tickets;", [], |row| row.get::<_, i64>(0))
        .unwrap();
}

fn lock_rows(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM schema_migration_lock;", [], |row| {
        row.get(0)
    })
    .unwrap()
}

fn add_three_text_attributes(manager: &ObjectManager<'_>) {
    for name in ["vip_note", "escalation_note", "billing_note"] {
        manager
            .add(ObjectType::Ticket, AttributeParams::new(name, DataType::Text))
            .unwrap();
    }
}

#[test]
fn exceeded_ddl_timeout_fails_transactional_run_and_applies_nothing() {
    let conn = open_db_in_memory().unwrap();
    let config = EngineConfig {
        ddl_timeout: Some(Duration::from_nanos(1)),
        ..EngineConfig::default()
    };
    let manager = ObjectManager::try_new(&conn, config).unwrap();
    add_three_text_attributes(&manager);

    let err = manager.migration_execute().unwrap_err();
    assert!(
        matches!(err, MigrationError::Timeout { .. }),
        "expected timeout, got {err:?}"
    );
    assert!(!err.is_retryable());
    assert_eq!(err.error_code(), "timeout");

    assert_eq!(manager.list_pending().unwrap().len(), 3);
    for name in ["vip_note", "escalation_note", "billing_note"] {
        assert!(column(&conn, "tickets", name).is_none(), "{name} was applied");
    }
    assert_eq!(lock_rows(&conn), 0);
}

#[test]
fn exceeded_ddl_timeout_stops_sequential_run() {
    let conn = open_db_in_memory().unwrap();
    let config = EngineConfig {
        ddl_timeout: Some(Duration::from_nanos(1)),
        ..sequential()
    };
    let manager = ObjectManager::try_new(&conn, config).unwrap();
    add_three_text_attributes(&manager);

    assert!(matches!(
        manager.migration_execute(),
        Err(MigrationError::Timeout { .. })
    ));
    assert!(manager.pending_migration().unwrap());
    assert_eq!(lock_rows(&conn), 0);

    // The next run without a bound converges.
    let relaxed = ObjectManager::try_new(&conn, sequential()).unwrap();
    assert!(relaxed.migration_execute().unwrap());
    assert!(!relaxed.pending_migration().unwrap());
    assert!(column(&conn, "tickets", "billing_note").is_some());
}

#[test]
fn second_connection_sees_held_lock() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("attrman.db");
    let first = attrman_core::open_db(&path).unwrap();
    let second = attrman_core::open_db(&path).unwrap();

    let manager = ObjectManager::try_new(&second, EngineConfig::default()).unwrap();
    manager
        .add(ObjectType::Ticket, AttributeParams::new("vip_note", DataType::Text))
        .unwrap();

    first
        .execute(
            "INSERT INTO schema_migration_lock (id, owner, acquired_at) VALUES (1, 'other-host', ?1);",
            [epoch_ms()],
        )
        .unwrap();
    assert!(matches!(
        manager.migration_execute(),
        Err(MigrationError::AlreadyInProgress { owner: Some(_) })
    ));

    first
        .execute("DELETE FROM schema_migration_lock;", [])
        .unwrap();
    assert!(manager.migration_execute().unwrap());
}
