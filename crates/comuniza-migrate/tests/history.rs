//! End-to-end run of the checked-in platform history against a live store,
//! with data seeded between the initial nodes and the follow-up nodes the
//! way a deployed environment would have accumulated it.

use comuniza_migrate::{
    platform_history, Migrator, MigratorConfig, NodeId, Row, Store, TokenSpec, Value,
};
use std::collections::HashSet;

fn open_migrator() -> (tempfile::TempDir, Migrator) {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();
    let store = Store::open(&db).unwrap();
    (dir, Migrator::new(store, MigratorConfig::default()))
}

/// Apply the initial nodes, then seed rows shaped like pre-migration
/// production data.
fn seed(migrator: &Migrator) {
    let history = platform_history();
    let initial: Vec<_> = history
        .into_iter()
        .filter(|n| n.id.name.starts_with("0001"))
        .collect();
    migrator.apply_all(&initial).unwrap();

    let store = migrator.store();
    store
        .put_row(
            "item",
            1,
            &Row::new()
                .with("name", "ladder")
                .with("status", "active")
                .with("is_public", true)
                .with("owner_id", 7i64)
                .with("share_token", "LEGACY0001"),
        )
        .unwrap();
    store
        .put_row(
            "item",
            2,
            &Row::new()
                .with("name", "drill")
                .with("status", "active")
                .with("is_public", false)
                .with("owner_id", 7i64)
                .with("share_token", ""),
        )
        .unwrap();
    store
        .put_row(
            "item",
            3,
            &Row::new()
                .with("name", "tent")
                .with("status", "archived")
                .with("is_public", false)
                .with("owner_id", 9i64)
                .with("share_token", ""),
        )
        .unwrap();

    store
        .put_row(
            "group",
            1,
            &Row::new().with("name", "neighbours").with("status", "active"),
        )
        .unwrap();
    store
        .put_row(
            "group",
            2,
            &Row::new()
                .with("name", "makers")
                .with("status", "active")
                .with("notification_settings", "{\"new_item\":false}"),
        )
        .unwrap();
    store
        .put_row(
            "group",
            3,
            &Row::new().with("name", "dormant").with("status", "archived"),
        )
        .unwrap();
}

#[test]
fn test_full_history_applies_over_seeded_data() {
    let (_dir, migrator) = open_migrator();
    seed(&migrator);

    let history = platform_history();
    let report = migrator.apply_all(&history).unwrap();

    // Initial nodes were already recorded; only the follow-ups run.
    assert_eq!(report.skipped.len(), 3);
    assert_eq!(report.applied.len(), 3);
    assert_eq!(migrator.records().unwrap().len(), history.len());

    let store = migrator.store();

    // Share tokens: the legacy token survives, the empty ones got fresh
    // unique tokens from the standard policy.
    let spec = TokenSpec::default();
    let mut tokens = HashSet::new();
    for (id, row) in store.scan_rows("item").unwrap() {
        let token = row.get("share_token").unwrap().as_text().unwrap().to_string();
        if id == 1 {
            assert_eq!(token, "LEGACY0001");
        } else {
            assert_eq!(token.len(), spec.length);
            assert!(token.chars().all(|c| spec.alphabet.contains(c)));
        }
        assert!(tokens.insert(token));
    }
    assert_eq!(tokens.len(), 3);

    // Visibility: boolean retyped through the explicit mapping, then renamed.
    let item = store.entity("item").unwrap().unwrap();
    assert!(item.has_field("visibility"));
    assert!(!item.has_field("is_public"));
    let visibility = |id: u64| {
        store
            .row("item", id)
            .unwrap()
            .unwrap()
            .get("visibility")
            .cloned()
            .unwrap()
    };
    assert_eq!(visibility(1), Value::Text("public".into()));
    assert_eq!(visibility(2), Value::Text("private".into()));
    assert_eq!(visibility(3), Value::Text("private".into()));

    // Notification defaults: active groups without settings are backfilled,
    // custom settings and archived groups are untouched.
    let settings = |id: u64| {
        store
            .row("group", id)
            .unwrap()
            .unwrap()
            .get("notification_settings")
            .cloned()
    };
    assert_eq!(
        settings(1),
        Some(Value::Text(
            "{\"new_item\":true,\"new_member\":true}".into()
        ))
    );
    assert_eq!(settings(2), Some(Value::Text("{\"new_item\":false}".into())));
    assert_eq!(settings(3), None);

    // Re-running the full history changes nothing.
    let report = migrator.apply_all(&history).unwrap();
    assert!(report.applied.is_empty());
    assert_eq!(report.skipped.len(), history.len());
    assert_eq!(migrator.records().unwrap().len(), history.len());
}

#[test]
fn test_visibility_rollback_restores_boolean() {
    let (_dir, migrator) = open_migrator();
    seed(&migrator);

    let history = platform_history();
    migrator.apply_all(&history).unwrap();

    let unapplied = migrator
        .rollback(&history, &NodeId::new("items", "0003_visibility"))
        .unwrap();
    assert_eq!(unapplied, vec![NodeId::new("items", "0003_visibility")]);

    let store = migrator.store();
    let item = store.entity("item").unwrap().unwrap();
    assert!(item.has_field("is_public"));
    assert!(!item.has_field("visibility"));

    // The retype mapping inverts cleanly, so the original booleans return.
    let is_public = |id: u64| {
        store
            .row("item", id)
            .unwrap()
            .unwrap()
            .get("is_public")
            .cloned()
            .unwrap()
    };
    assert_eq!(is_public(1), Value::Bool(true));
    assert_eq!(is_public(2), Value::Bool(false));
    assert_eq!(is_public(3), Value::Bool(false));

    // Everything below the target stays applied, and the target can be
    // re-applied afterwards.
    assert!(migrator
        .is_applied(&NodeId::new("items", "0002_share_token"))
        .unwrap());
    let report = migrator.apply_all(&history).unwrap();
    assert_eq!(report.applied, vec![NodeId::new("items", "0003_visibility")]);
}

#[test]
fn test_token_regeneration_rollback_is_refused() {
    let (_dir, migrator) = open_migrator();
    seed(&migrator);

    let history = platform_history();
    migrator.apply_all(&history).unwrap();

    // 0002 carries an irreversible transform; unwinding reaches it after its
    // dependent 0003 and fails there, leaving 0002 applied.
    let err = migrator
        .rollback(&history, &NodeId::new("items", "0002_share_token"))
        .unwrap_err();
    assert!(matches!(
        err,
        comuniza_migrate::MigrationError::Rollback { .. }
    ));
    assert!(migrator
        .is_applied(&NodeId::new("items", "0002_share_token"))
        .unwrap());
    assert!(!migrator
        .is_applied(&NodeId::new("items", "0003_visibility"))
        .unwrap());
}
