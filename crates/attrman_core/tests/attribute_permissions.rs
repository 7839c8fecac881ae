use attrman_core::db::open_db_in_memory;
use attrman_core::model::screen::ScreenRules;
use attrman_core::{
    AttributeError, AttributeParams, DataType, EngineConfig, ObjectManager, ObjectType,
    PermissionLookupError, PermissionSource, ScreenVisibilityRule, Viewer, VisibilityPolicy,
    WILDCARD_ROLE,
};
use rusqlite::Connection;

struct UnavailableRoleStore;

impl PermissionSource for UnavailableRoleStore {
    fn permissions(&self) -> Result<Vec<String>, PermissionLookupError> {
        Err(PermissionLookupError::new("role store offline"))
    }
}

fn manager(conn: &Connection, policy: VisibilityPolicy) -> ObjectManager<'_> {
    let config = EngineConfig {
        visibility_policy: policy,
        ..EngineConfig::default()
    };
    ObjectManager::try_new(conn, config).unwrap()
}

fn add_with_create_rules(manager: &ObjectManager<'_>, rules: &[(&str, ScreenVisibilityRule)]) {
    let mut create = ScreenRules::new();
    for (key, rule) in rules {
        create.insert(key.to_string(), rule.clone());
    }
    let mut params = AttributeParams::new("test_permissions", DataType::Text);
    params.screens.insert("create".to_string(), create);
    manager.add(ObjectType::Ticket, params).unwrap();
    assert!(manager.migration_execute().unwrap());
}

fn agent_and_org_admin() -> Viewer {
    Viewer::new(["admin.organization", "ticket.agent"])
}

#[test]
fn admin_rule_wins_over_conflicting_agent_rule() {
    let conn = open_db_in_memory().unwrap();
    let manager = manager(&conn, VisibilityPolicy::Refine);
    add_with_create_rules(
        &manager,
        &[
            ("admin.organization", ScreenVisibilityRule::shown(true)),
            ("ticket.agent", ScreenVisibilityRule::shown(false)),
        ],
    );

    let visibility = manager
        .effective_visibility(
            ObjectType::Ticket,
            "test_permissions",
            "create",
            &agent_and_org_admin(),
        )
        .unwrap();
    assert!(visibility.shown);

    let views = manager
        .by_object(ObjectType::Ticket, &agent_and_org_admin())
        .unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].name, "test_permissions");
    assert!(views[0].screen["create"].shown);

    let agent_only = manager
        .by_object(ObjectType::Ticket, &Viewer::new(["ticket.agent"]))
        .unwrap();
    assert!(!agent_only[0].screen["create"].shown);
}

#[test]
fn namespace_grant_covers_nested_permission_rules() {
    let conn = open_db_in_memory().unwrap();
    let manager = manager(&conn, VisibilityPolicy::Refine);
    add_with_create_rules(
        &manager,
        &[
            (WILDCARD_ROLE, ScreenVisibilityRule::shown(false)),
            ("admin.organization", ScreenVisibilityRule::shown(true)),
        ],
    );

    let views = manager
        .by_object(ObjectType::Ticket, &Viewer::new(["admin"]))
        .unwrap();
    assert!(views[0].screen["create"].shown);
}

#[test]
fn held_role_rules_refine_wildcard_under_default_policy() {
    let conn = open_db_in_memory().unwrap();
    let manager = manager(&conn, VisibilityPolicy::Refine);
    add_with_create_rules(
        &manager,
        &[
            (WILDCARD_ROLE, ScreenVisibilityRule::shown(true)),
            ("admin.organization", ScreenVisibilityRule::shown(false)),
            ("ticket.agent", ScreenVisibilityRule::shown(false)),
        ],
    );

    let views = manager
        .by_object(ObjectType::Ticket, &agent_and_org_admin())
        .unwrap();
    assert!(!views[0].screen["create"].shown);
}

#[test]
fn wildcard_keys_win_under_wildcard_authoritative_policy() {
    let conn = open_db_in_memory().unwrap();
    let manager = manager(&conn, VisibilityPolicy::WildcardAuthoritative);
    add_with_create_rules(
        &manager,
        &[
            (WILDCARD_ROLE, ScreenVisibilityRule::shown(true)),
            ("admin.organization", ScreenVisibilityRule::shown(false)),
            (
                "ticket.agent",
                ScreenVisibilityRule::shown(false).with_hint("required", true),
            ),
        ],
    );

    let views = manager
        .by_object(ObjectType::Ticket, &agent_and_org_admin())
        .unwrap();
    let create = &views[0].screen["create"];
    assert!(create.shown);
    // Keys the wildcard leaves unset are still filled by role rules.
    assert_eq!(create.extra.get("required"), Some(&serde_json::json!(true)));
}

#[test]
fn wildcard_overwrites_role_rules_when_all_are_set() {
    let rules = [
        (WILDCARD_ROLE, ScreenVisibilityRule::shown(true)),
        ("admin.organization", ScreenVisibilityRule::shown(false)),
        ("ticket.agent", ScreenVisibilityRule::shown(false)),
    ];
    for (policy, expected_shown) in [
        (VisibilityPolicy::WildcardAuthoritative, true),
        (VisibilityPolicy::Refine, false),
    ] {
        let conn = open_db_in_memory().unwrap();
        let manager = manager(&conn, policy);
        add_with_create_rules(&manager, &rules);

        let shown = manager
            .effective_visibility(
                ObjectType::Ticket,
                "test_permissions",
                "create",
                &agent_and_org_admin(),
            )
            .unwrap()
            .shown;
        assert_eq!(shown, expected_shown, "policy {}", policy.as_str());
    }
}

#[test]
fn field_level_merge_keeps_wildcard_item_class() {
    for policy in [
        VisibilityPolicy::Refine,
        VisibilityPolicy::WildcardAuthoritative,
    ] {
        let conn = open_db_in_memory().unwrap();
        let manager = manager(&conn, policy);
        add_with_create_rules(
            &manager,
            &[
                (
                    WILDCARD_ROLE,
                    ScreenVisibilityRule::shown(true).with_item_class("column"),
                ),
                ("admin.organization", ScreenVisibilityRule::shown(false)),
                ("ticket.agent", ScreenVisibilityRule::shown(false)),
            ],
        );

        let views = manager
            .by_object(ObjectType::Ticket, &agent_and_org_admin())
            .unwrap();
        assert_eq!(
            views[0].screen["create"].item_class.as_deref(),
            Some("column"),
            "policy {}",
            policy.as_str()
        );
    }
}

#[test]
fn rules_for_permissions_the_viewer_lacks_are_ignored() {
    let conn = open_db_in_memory().unwrap();
    let manager = manager(&conn, VisibilityPolicy::Refine);
    add_with_create_rules(
        &manager,
        &[
            (WILDCARD_ROLE, ScreenVisibilityRule::shown(true)),
            ("admin.organization", ScreenVisibilityRule::shown(false)),
        ],
    );

    let views = manager
        .by_object(ObjectType::Ticket, &Viewer::new(["ticket.customer"]))
        .unwrap();
    assert!(views[0].screen["create"].shown);
}

#[test]
fn permission_lookup_failures_propagate() {
    let conn = open_db_in_memory().unwrap();
    let manager = manager(&conn, VisibilityPolicy::Refine);
    add_with_create_rules(
        &manager,
        &[(WILDCARD_ROLE, ScreenVisibilityRule::shown(true))],
    );

    match manager.by_object(ObjectType::Ticket, &UnavailableRoleStore) {
        Err(AttributeError::PermissionLookup(err)) => {
            assert_eq!(err.message, "role store offline");
        }
        other => panic!("lookup failure must propagate, got {other:?}"),
    }
    assert!(matches!(
        manager.effective_visibility(
            ObjectType::Ticket,
            "test_permissions",
            "create",
            &UnavailableRoleStore
        ),
        Err(AttributeError::PermissionLookup(_))
    ));
}

#[test]
fn unmigrated_definitions_are_excluded_from_reads() {
    let conn = open_db_in_memory().unwrap();
    let manager = manager(&conn, VisibilityPolicy::Refine);

    let mut params = AttributeParams::new("draft_field", DataType::Text);
    params.position = 5;
    manager.add(ObjectType::Ticket, params).unwrap();
    assert!(manager
        .by_object(ObjectType::Ticket, &Viewer::anonymous())
        .unwrap()
        .is_empty());

    manager.migration_execute().unwrap();
    let views = manager
        .by_object(ObjectType::Ticket, &Viewer::anonymous())
        .unwrap();
    assert_eq!(views.len(), 1);
    assert!(views[0].screen.is_empty());
}

#[test]
fn by_object_orders_by_position() {
    let conn = open_db_in_memory().unwrap();
    let manager = manager(&conn, VisibilityPolicy::Refine);

    for (name, position) in [("third_field", 30), ("first_field", 10), ("second_field", 20)] {
        let mut params = AttributeParams::new(name, DataType::Text);
        params.position = position;
        manager.add(ObjectType::Ticket, params).unwrap();
    }
    let mut inactive = AttributeParams::new("retired_field", DataType::Text);
    inactive.active = false;
    manager.add(ObjectType::Ticket, inactive).unwrap();
    manager.migration_execute().unwrap();

    let names: Vec<String> = manager
        .by_object(ObjectType::Ticket, &Viewer::anonymous())
        .unwrap()
        .into_iter()
        .map(|view| view.name)
        .collect();
    assert_eq!(names, vec!["first_field", "second_field", "third_field"]);
}
